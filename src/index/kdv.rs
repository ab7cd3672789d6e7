use std::collections::HashMap;

use serde_json::Value;

use crate::core::types::BlockIndex;

/// Canonical textual encoding of an indexed field value.
///
/// Two field values collide in an index exactly when their compact JSON
/// serializations are equal; candidates are always re-verified against the
/// full predicate afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(String);

impl IndexKey {
    pub fn of(value: &Value) -> Self {
        IndexKey(value.to_string())
    }
}

/// Key → duplicate-value multimap over block addresses.
///
/// Every key maps to the ordered list of addresses inserted under it;
/// duplicate keys accumulate. A key whose list empties is removed, so no
/// key ever maps to an empty list.
#[derive(Debug, Default)]
pub struct KdvSet {
    set: HashMap<IndexKey, Vec<BlockIndex>>,
    deep: usize,
}

impl KdvSet {
    pub fn new() -> Self {
        KdvSet {
            set: HashMap::new(),
            deep: 0,
        }
    }

    /// Appends `value` under `key`, creating the list on first use.
    pub fn add(&mut self, key: IndexKey, value: BlockIndex) {
        self.set.entry(key).or_default().push(value);
        self.deep += 1;
    }

    /// The address list under `key`, empty when the key is absent.
    pub fn get(&self, key: &IndexKey) -> &[BlockIndex] {
        self.set.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.set.contains_key(key)
    }

    /// Drops a key and its whole list. Reports whether the key existed.
    pub fn remove(&mut self, key: &IndexKey) -> bool {
        match self.set.remove(key) {
            Some(list) => {
                self.deep -= list.len();
                true
            }
            None => false,
        }
    }

    /// Moves one occurrence of `value` from `old_key` to `new_key`, or
    /// drops it when `is_delete` is set.
    ///
    /// Acts on the first occurrence found. When `old_key` is absent and
    /// `is_delete` is not set, the value is inserted fresh under `new_key`.
    /// Returns `false` (no mutation) when the value is not present under
    /// `old_key`, or when `old_key` is absent on a delete.
    pub fn update(
        &mut self,
        old_key: &IndexKey,
        new_key: &IndexKey,
        value: BlockIndex,
        is_delete: bool,
    ) -> bool {
        if !self.set.contains_key(old_key) {
            if is_delete {
                return false;
            }
            self.add(new_key.clone(), value);
            return true;
        }
        let (removed, emptied) = match self.set.get_mut(old_key) {
            Some(list) => match list.iter().position(|&a| a == value) {
                Some(pos) => {
                    list.remove(pos);
                    (true, list.is_empty())
                }
                None => (false, false),
            },
            None => (false, false),
        };
        if !removed {
            return false;
        }
        self.deep -= 1;
        if emptied {
            self.set.remove(old_key);
        }
        if !is_delete {
            self.add(new_key.clone(), value);
        }
        true
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Total number of stored values across all keys.
    pub fn deep_len(&self) -> usize {
        self.deep
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
