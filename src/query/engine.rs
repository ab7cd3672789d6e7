use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;

use serde_json::Value;

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::types::{
    BlockIndex, Document, FIELD_BLOCK_INDEX, FIELD_ID, Patch, Predicate, Slot,
};
use crate::index::kdv::IndexKey;
use crate::index::registry::IndexRegistry;
use crate::journal::journal::{Journal, WindowReport};
use crate::query::matcher;
use crate::query::options::{self, FindOptions};
use crate::storage::block::BlockCodec;

/// One collection of documents: the resident window, its field indexes
/// and the journal underneath.
///
/// A collection has a single owner. Reads that miss the resident window
/// flush and page through the store, so every operation takes `&mut self`.
#[derive(Debug)]
pub struct Collection {
    name: String,
    config: Config,
    codec: BlockCodec,
    journal: Journal,
    indexes: IndexRegistry,
    /// Slots of the resident window; slot `i` holds block
    /// `resident_start + i`.
    resident: Vec<Slot>,
    resident_start: BlockIndex,
    /// Blocks allocated so far, queued appends included.
    total_blocks: u64,
}

impl Collection {
    /// Opens the collection stored at `path`, loading the first partition
    /// window when data exists.
    pub fn open(path: impl Into<PathBuf>, config: Config) -> Result<Collection> {
        config.validate()?;
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("collection")
            .to_string();
        let codec = BlockCodec::new(config.block_size);
        let journal = Journal::open(&path, config.clone())?;
        let mut collection = Collection {
            name,
            codec,
            journal,
            indexes: IndexRegistry::new(config.max_indices),
            resident: Vec::new(),
            resident_start: 0,
            total_blocks: 0,
            config,
        };
        if let Some(window) = collection.journal.load()? {
            collection.install_window(window);
        }
        tracing::debug!(
            "Collection - opened '{}', {} of {} document(s) resident",
            collection.name,
            collection.loaded(),
            collection.count()
        );
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total allocated blocks, free-listed slots included.
    pub fn count(&self) -> u64 {
        self.total_blocks
    }

    /// Documents resident in memory.
    pub fn loaded(&self) -> usize {
        self.resident.len()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.journal.flush()
    }

    /// Flushes and consumes the handle.
    pub fn close(mut self) -> Result<()> {
        self.journal.flush()
    }

    /// Inserts one document or a batch. A JSON object inserts as one
    /// document and an array as a batch; anything else is rejected with a
    /// count of zero. Returns how many documents were inserted.
    pub fn insert(&mut self, value: Value) -> Result<usize> {
        match value {
            Value::Object(fields) => {
                self.insert_document(Document::from(fields))?;
                Ok(1)
            }
            Value::Array(values) => self.insert_many(values),
            _ => {
                tracing::warn!("Collection - insert rejected: payload is not a document");
                Ok(0)
            }
        }
    }

    fn insert_document(&mut self, mut doc: Document) -> Result<()> {
        doc.ensure_id();
        let (addr, reuse) = match self.journal.peek_free_block() {
            Some(addr) => (addr, true),
            None => (self.total_blocks, false),
        };
        doc.set_block_index(addr);
        // reject an oversize document before any state moves
        self.codec.check_fit(&doc)?;
        if reuse {
            self.journal.next_free_block();
            tracing::debug!("Collection - reusing freed block {}", addr);
        } else {
            self.total_blocks += 1;
        }
        self.indexes.add_document(&doc, addr);
        self.place_resident(addr, &doc);
        self.journal.insert(doc)
    }

    /// Inserts a batch in one write-through pass. Every entry must be a
    /// JSON object; other entries are skipped with a warning. Returns the
    /// count inserted.
    pub fn insert_many(&mut self, values: Vec<Value>) -> Result<usize> {
        let mut docs: Vec<Document> = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Value::Object(fields) => docs.push(Document::from(fields)),
                _ => tracing::warn!("Collection - skipped a non-document batch entry"),
            }
        }
        if docs.is_empty() {
            return Ok(0);
        }
        // queued writes must land first: the batch may fill blocks the
        // queue still points at
        self.journal.flush()?;
        // address every document up front so a rejection leaves no state
        let free: Vec<BlockIndex> = self.journal.free_blocks().collect();
        let mut reused = 0usize;
        let mut next_append = self.total_blocks;
        for doc in docs.iter_mut() {
            doc.ensure_id();
            let addr = if reused < free.len() {
                let addr = free[reused];
                reused += 1;
                addr
            } else {
                let addr = next_append;
                next_append += 1;
                addr
            };
            doc.set_block_index(addr);
            self.codec.check_fit(doc)?;
        }
        let count = docs.len();
        self.journal.insert_batch(&mut docs)?;
        // the write landed: commit addresses, indexes and residency
        self.journal.consume_free_blocks(reused);
        self.total_blocks = next_append;
        for doc in &docs {
            let Some(addr) = doc.block_index() else { continue };
            self.indexes.add_document(doc, addr);
            self.place_resident(addr, doc);
        }
        tracing::debug!(
            "Collection - batch inserted {} document(s), {} into freed blocks",
            count,
            reused
        );
        Ok(count)
    }

    /// Finds every document matching all predicate fields. An empty
    /// predicate returns the resident window's documents.
    pub fn find(
        &mut self,
        query: &Predicate,
        options: Option<&FindOptions>,
    ) -> Result<Vec<Document>> {
        self.find_many(query, true, options)
    }

    /// Finds every document matching at least one predicate field.
    pub fn find_any(
        &mut self,
        query: &Predicate,
        options: Option<&FindOptions>,
    ) -> Result<Vec<Document>> {
        self.find_many(query, false, options)
    }

    /// First document matching all predicate fields.
    pub fn find_one(
        &mut self,
        query: &Predicate,
        options: Option<&FindOptions>,
    ) -> Result<Option<Document>> {
        self.find_first(query, true, options)
    }

    /// First document matching any predicate field.
    pub fn find_any_one(
        &mut self,
        query: &Predicate,
        options: Option<&FindOptions>,
    ) -> Result<Option<Document>> {
        self.find_first(query, false, options)
    }

    fn find_many(
        &mut self,
        query: &Predicate,
        all: bool,
        options: Option<&FindOptions>,
    ) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = if query.is_empty() {
            self.resident
                .iter()
                .filter_map(Slot::as_live)
                .cloned()
                .collect()
        } else {
            self.resolve(query, true, all)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect()
        };
        if let Some(options) = options {
            options::apply_multi(&mut docs, options);
        }
        Ok(docs)
    }

    fn find_first(
        &mut self,
        query: &Predicate,
        all: bool,
        options: Option<&FindOptions>,
    ) -> Result<Option<Document>> {
        let mut doc = if query.is_empty() {
            self.resident
                .iter()
                .find_map(|slot| slot.as_live().cloned())
        } else {
            self.resolve(query, false, all)?
                .into_iter()
                .map(|(_, doc)| doc)
                .next()
        };
        if let (Some(doc), Some(options)) = (doc.as_mut(), options) {
            options::apply_single(doc, options);
        }
        Ok(doc)
    }

    /// Applies `patch` to every document matching all predicate fields,
    /// as a shallow merge. Returns how many documents changed.
    pub fn update(&mut self, query: &Predicate, patch: &Patch) -> Result<usize> {
        self.update_matches(query, patch, true, true)
    }

    /// Patches the first document matching all predicate fields.
    pub fn update_one(&mut self, query: &Predicate, patch: &Patch) -> Result<usize> {
        self.update_matches(query, patch, false, true)
    }

    /// Patches every document matching any predicate field.
    pub fn update_any(&mut self, query: &Predicate, patch: &Patch) -> Result<usize> {
        self.update_matches(query, patch, true, false)
    }

    /// Patches the first document matching any predicate field.
    pub fn update_any_one(&mut self, query: &Predicate, patch: &Patch) -> Result<usize> {
        self.update_matches(query, patch, false, false)
    }

    fn update_matches(
        &mut self,
        query: &Predicate,
        patch: &Patch,
        multi: bool,
        all: bool,
    ) -> Result<usize> {
        if query.is_empty() || patch.is_empty() {
            return Ok(0);
        }
        let matches = self.resolve(query, multi, all)?;
        let mut updated = 0usize;
        for (addr, doc) in matches {
            let mut merged = doc.clone();
            merged.merge(patch);
            // the merged form must still fit its block
            self.codec.check_fit(&merged)?;
            for (field, new_value) in patch {
                if field == FIELD_ID || field == FIELD_BLOCK_INDEX {
                    continue;
                }
                if !self.indexes.is_indexed(field) {
                    continue;
                }
                let new_key = IndexKey::of(new_value);
                match doc.get(field) {
                    Some(old_value) => {
                        self.indexes
                            .update(field, &IndexKey::of(old_value), &new_key, addr);
                    }
                    None => self.indexes.add(field, new_key, addr),
                }
            }
            if self.in_window(addr) {
                let slot = (addr - self.resident_start) as usize;
                self.resident[slot] = Slot::Live(merged.clone());
            }
            self.journal.update(merged)?;
            updated += 1;
        }
        if updated > 0 {
            tracing::debug!("Collection - updated {} document(s)", updated);
        }
        Ok(updated)
    }

    /// Removes every document matching all predicate fields, freeing their
    /// blocks for reuse and clearing their index entries.
    pub fn remove(&mut self, query: &Predicate) -> Result<usize> {
        self.remove_matches(query, true, true)
    }

    /// Removes the first document matching all predicate fields.
    pub fn remove_one(&mut self, query: &Predicate) -> Result<usize> {
        self.remove_matches(query, false, true)
    }

    /// Removes every document matching any predicate field.
    pub fn remove_any(&mut self, query: &Predicate) -> Result<usize> {
        self.remove_matches(query, true, false)
    }

    /// Removes the first document matching any predicate field.
    pub fn remove_any_one(&mut self, query: &Predicate) -> Result<usize> {
        self.remove_matches(query, false, false)
    }

    fn remove_matches(&mut self, query: &Predicate, multi: bool, all: bool) -> Result<usize> {
        if query.is_empty() {
            return Ok(0);
        }
        let matches = self.resolve(query, multi, all)?;
        let mut removed = 0usize;
        for (addr, doc) in matches {
            self.indexes.remove_document(&doc, addr);
            if self.in_window(addr) {
                let slot = (addr - self.resident_start) as usize;
                self.resident[slot] = Slot::Dead;
            }
            self.journal.remove(addr);
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!("Collection - removed {} document(s)", removed);
        }
        Ok(removed)
    }

    /// Builds indexes on `fields`, paging through the whole store when the
    /// resident window does not cover it. Returns `false` when every field
    /// was already indexed.
    pub fn create_index(&mut self, fields: &[&str]) -> Result<bool> {
        let new_fields: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|&f| !self.indexes.is_indexed(f))
            .collect();
        if new_fields.is_empty() {
            return Ok(false);
        }
        if (self.resident.len() as u64) >= self.total_blocks {
            self.indexes
                .build(&new_fields, self.resident.iter().filter_map(Slot::as_live))?;
            return Ok(true);
        }
        // page one full cycle so every window contributes exactly once
        self.journal.flush()?;
        let windows = self.journal.window_count();
        for _ in 0..windows {
            if !self.page_next_window()? {
                break;
            }
            self.indexes
                .build(&new_fields, self.resident.iter().filter_map(Slot::as_live))?;
        }
        Ok(true)
    }

    /// Drops the index on each named field. Returns whether any existed.
    pub fn remove_index(&mut self, fields: &[&str]) -> bool {
        let mut dropped = false;
        for &field in fields {
            dropped |= self.indexes.destroy(field);
        }
        dropped
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub fn index_fields(&self) -> Vec<&str> {
        self.indexes.fields()
    }

    /// Distinct keys in one field's index, `None` when it has no index.
    pub fn index_size(&self, field: &str) -> Option<usize> {
        self.indexes.size(field)
    }

    /// Entries in one field's index, duplicate keys included.
    pub fn index_deep_size(&self, field: &str) -> Option<usize> {
        self.indexes.deep_size(field)
    }

    /// Resolves a predicate to its matching documents in three passes:
    /// indexed candidates first, then candidates outside the resident
    /// window through the journal, then a window scan for the fields
    /// without an index, paging a full cycle when the store holds more
    /// than the window.
    fn resolve(
        &mut self,
        query: &Predicate,
        multi: bool,
        all: bool,
    ) -> Result<Vec<(BlockIndex, Document)>> {
        let mut matches: Vec<(BlockIndex, Document)> = Vec::new();
        let mut seen: HashSet<BlockIndex> = HashSet::new();
        let mut pending: Vec<BlockIndex> = Vec::new();
        let mut pending_seen: HashSet<BlockIndex> = HashSet::new();
        let mut unindexed: Vec<&str> = Vec::new();
        let mut any_indexed = false;

        'fields: for (field, value) in query {
            let Some(candidates) = self.indexes.lookup(field, value) else {
                unindexed.push(field);
                continue;
            };
            any_indexed = true;
            // snapshot: the live list shrinks under updates and removes
            let candidates: Vec<BlockIndex> = candidates.to_vec();
            for addr in candidates {
                if seen.contains(&addr) {
                    continue;
                }
                if self.in_window(addr) {
                    let Some(doc) = self.resident_doc(addr) else { continue };
                    let hit = if all {
                        matcher::match_all(doc, query)
                    } else {
                        matcher::match_any(doc, query)
                    };
                    if hit {
                        seen.insert(addr);
                        matches.push((addr, doc.clone()));
                        if !multi {
                            break 'fields;
                        }
                    }
                } else if pending_seen.insert(addr) {
                    pending.push(addr);
                }
            }
        }
        if !multi && !matches.is_empty() {
            return Ok(matches);
        }

        if !pending.is_empty() {
            tracing::debug!(
                "Collection - {} candidate(s) outside the resident window",
                pending.len()
            );
            // queued writes must land before reading around the window
            self.journal.flush()?;
            for doc in self.journal.load_blocks(&pending)? {
                let Some(addr) = doc.block_index() else { continue };
                if seen.contains(&addr) || doc.is_tombstone() {
                    continue;
                }
                let hit = if all {
                    matcher::match_all(&doc, query)
                } else {
                    matcher::match_any(&doc, query)
                };
                if hit {
                    seen.insert(addr);
                    matches.push((addr, doc));
                    if !multi {
                        return Ok(matches);
                    }
                }
            }
        }

        if unindexed.is_empty() {
            return Ok(matches);
        }

        // an index already covered its own fields, so a match-any scan
        // only needs the ones that had none
        let reduced: Predicate;
        let scan_query: &Predicate = if any_indexed && !all {
            reduced = query
                .iter()
                .filter(|(field, _)| unindexed.contains(&field.as_str()))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            &reduced
        } else {
            query
        };

        self.scan_window(scan_query, all, multi, &mut seen, &mut matches);
        if !multi && !matches.is_empty() {
            return Ok(matches);
        }

        if (self.resident.len() as u64) < self.total_blocks {
            // one full cycle of window loads visits every window, wherever
            // the paging cursor happens to sit; already-seen addresses
            // dedupe the overlap with the window scanned above
            self.journal.flush()?;
            let windows = self.journal.window_count();
            for _ in 0..windows {
                if !self.page_next_window()? {
                    break;
                }
                self.scan_window(scan_query, all, multi, &mut seen, &mut matches);
                if !multi && !matches.is_empty() {
                    break;
                }
            }
        }
        Ok(matches)
    }

    fn scan_window(
        &self,
        scan_query: &Predicate,
        all: bool,
        multi: bool,
        seen: &mut HashSet<BlockIndex>,
        matches: &mut Vec<(BlockIndex, Document)>,
    ) {
        for (i, slot) in self.resident.iter().enumerate() {
            let Some(doc) = slot.as_live() else { continue };
            let addr = self.resident_start + i as u64;
            if seen.contains(&addr) {
                continue;
            }
            let hit = if all {
                matcher::match_all(doc, scan_query)
            } else {
                matcher::match_any(doc, scan_query)
            };
            if hit {
                seen.insert(addr);
                matches.push((addr, doc.clone()));
                if !multi {
                    return;
                }
            }
        }
    }

    // A window is flushed before it pages out, so what comes back in later
    // always reflects the writes made while it was resident.
    fn page_next_window(&mut self) -> Result<bool> {
        self.journal.flush()?;
        match self.journal.load()? {
            Some(window) => {
                self.install_window(window);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn install_window(&mut self, window: WindowReport) {
        let free: HashSet<BlockIndex> = self.journal.free_blocks().collect();
        self.resident_start = window.start;
        self.resident = window
            .docs
            .into_iter()
            .map(|doc| {
                let freed = doc
                    .block_index()
                    .is_some_and(|addr| free.contains(&addr));
                if freed || doc.is_tombstone() {
                    Slot::Dead
                } else {
                    Slot::Live(doc)
                }
            })
            .collect();
        self.total_blocks = window.total_docs;
        tracing::debug!(
            "Collection - window at {} holds {} slot(s)",
            self.resident_start,
            self.resident.len()
        );
    }

    // A document lands in its window slot when its address falls inside,
    // or extends the window when it is the very next address and the
    // window is still under its bound.
    fn place_resident(&mut self, addr: BlockIndex, doc: &Document) {
        if self.in_window(addr) {
            let slot = (addr - self.resident_start) as usize;
            self.resident[slot] = Slot::Live(doc.clone());
        } else if addr == self.resident_start + self.resident.len() as u64
            && self.resident.len() < self.config.max_collection_size
        {
            self.resident.push(Slot::Live(doc.clone()));
        }
    }

    fn in_window(&self, addr: BlockIndex) -> bool {
        addr >= self.resident_start && addr < self.resident_start + self.resident.len() as u64
    }

    fn resident_doc(&self, addr: BlockIndex) -> Option<&Document> {
        if addr < self.resident_start {
            return None;
        }
        self.resident
            .get((addr - self.resident_start) as usize)
            .and_then(Slot::as_live)
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        if let Err(err) = self.journal.flush() {
            tracing::warn!(
                "Collection - flush on drop failed for '{}': {}",
                self.name,
                err
            );
        }
    }
}
