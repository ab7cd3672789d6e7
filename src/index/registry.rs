use std::collections::HashMap;

use serde_json::Value;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BlockIndex, Document};
use crate::index::kdv::{IndexKey, KdvSet};

/// The field indexes of one collection, keyed by field name and bounded
/// by the configured maximum.
#[derive(Debug)]
pub struct IndexRegistry {
    indices: HashMap<String, KdvSet>,
    max_indices: usize,
}

impl IndexRegistry {
    pub fn new(max_indices: usize) -> Self {
        IndexRegistry {
            indices: HashMap::new(),
            max_indices,
        }
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indices.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indexed field names, sorted for stable output.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.indices.keys().map(String::as_str).collect();
        fields.sort_unstable();
        fields
    }

    /// Distinct keys in one field's index.
    pub fn size(&self, field: &str) -> Option<usize> {
        self.indices.get(field).map(KdvSet::len)
    }

    /// Total entries in one field's index, duplicates included.
    pub fn deep_size(&self, field: &str) -> Option<usize> {
        self.indices.get(field).map(KdvSet::deep_len)
    }

    /// Candidate block addresses for an exact value match, `None` when the
    /// field carries no index.
    pub fn lookup(&self, field: &str, value: &Value) -> Option<&[BlockIndex]> {
        self.indices
            .get(field)
            .map(|set| set.get(&IndexKey::of(value)))
    }

    /// Builds indexes on `fields` over `docs`, creating any that are
    /// missing. Fails upfront when the registry would overflow its bound.
    pub fn build<'a, I>(&mut self, fields: &[&str], docs: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let new = fields.iter().filter(|&&f| !self.is_indexed(f)).count();
        if self.indices.len() + new > self.max_indices {
            return Err(Error::new(
                ErrorKind::Capacity,
                format!(
                    "indexing {} more field(s) would exceed the limit of {}",
                    new, self.max_indices
                ),
            ));
        }
        for &field in fields {
            self.indices.entry(field.to_string()).or_default();
        }
        let mut entries = 0usize;
        for doc in docs {
            let Some(addr) = doc.block_index() else { continue };
            for &field in fields {
                let Some(value) = doc.get(field) else { continue };
                if let Some(set) = self.indices.get_mut(field) {
                    set.add(IndexKey::of(value), addr);
                    entries += 1;
                }
            }
        }
        tracing::debug!("Index - built {:?} with {} entries", fields, entries);
        Ok(())
    }

    /// Enters a document into every index whose field it carries.
    pub fn add_document(&mut self, doc: &Document, addr: BlockIndex) {
        for (field, set) in self.indices.iter_mut() {
            if let Some(value) = doc.get(field) {
                set.add(IndexKey::of(value), addr);
            }
        }
    }

    /// Clears every index entry a document holds at `addr`.
    pub fn remove_document(&mut self, doc: &Document, addr: BlockIndex) {
        for (field, set) in self.indices.iter_mut() {
            if let Some(value) = doc.get(field) {
                let key = IndexKey::of(value);
                set.update(&key, &key, addr, true);
            }
        }
    }

    /// Adds one entry to a field's index, a no-op when the field has none.
    pub fn add(&mut self, field: &str, key: IndexKey, addr: BlockIndex) {
        if let Some(set) = self.indices.get_mut(field) {
            set.add(key, addr);
        }
    }

    /// Moves a document's entry between two keys of one field's index, a
    /// no-op when the field has none.
    pub fn update(
        &mut self,
        field: &str,
        old_key: &IndexKey,
        new_key: &IndexKey,
        addr: BlockIndex,
    ) -> bool {
        match self.indices.get_mut(field) {
            Some(set) => set.update(old_key, new_key, addr, false),
            None => false,
        }
    }

    /// Drops a field's index entirely.
    pub fn destroy(&mut self, field: &str) -> bool {
        let dropped = self.indices.remove(field).is_some();
        if dropped {
            tracing::debug!("Index - dropped index on '{}'", field);
        }
        dropped
    }
}
