use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::error::{Error, ErrorKind, Result};

/// Block address of a document across the whole partition set.
pub type BlockIndex = u64;

/// Query predicate and update patch are both open field maps.
pub type Predicate = Map<String, Value>;
pub type Patch = Map<String, Value>;

/// Engine-assigned identifier field, set once on first insert.
pub const FIELD_ID: &str = "_id";
/// Engine-assigned block address field.
pub const FIELD_BLOCK_INDEX: &str = "_blki";

/// A schemaless document: an open map of field name to JSON value.
///
/// Serializes transparently as its field map, so the padded block payload
/// is exactly one JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Map::new() }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(FIELD_ID).and_then(Value::as_str)
    }

    pub fn block_index(&self) -> Option<BlockIndex> {
        self.fields.get(FIELD_BLOCK_INDEX).and_then(Value::as_u64)
    }

    pub fn set_block_index(&mut self, addr: BlockIndex) {
        self.fields
            .insert(FIELD_BLOCK_INDEX.to_string(), Value::from(addr));
    }

    /// Assigns a fresh id when the document does not carry one yet.
    pub fn ensure_id(&mut self) {
        if self.id().is_none() {
            self.fields
                .insert(FIELD_ID.to_string(), Value::from(new_document_id()));
        }
    }

    /// Shallow-merges `patch` into the document. The engine fields are
    /// never patchable and are skipped.
    pub fn merge(&mut self, patch: &Patch) {
        for (field, value) in patch {
            if field == FIELD_ID || field == FIELD_BLOCK_INDEX {
                continue;
            }
            self.fields.insert(field.clone(), value.clone());
        }
    }

    /// A bare document holding only a block address. Written in place of a
    /// removed document so its slot still decodes to valid content.
    pub fn tombstone(addr: BlockIndex) -> Document {
        let mut doc = Document::new();
        doc.set_block_index(addr);
        doc
    }

    /// Every live document carries an id from its first insert; a document
    /// without one is a tombstone (or was never inserted by the engine).
    pub fn is_tombstone(&self) -> bool {
        self.id().is_none()
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Document { fields }
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("document payload must be a JSON object, got {}", other),
            )),
        }
    }
}

/// UUID v4 in its dashless textual form.
pub fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// One slot of the resident window: a document, or the tombstone a remove
/// leaves behind until the block address is reused.
#[derive(Debug, Clone)]
pub enum Slot {
    Live(Document),
    Dead,
}

impl Slot {
    pub fn as_live(&self) -> Option<&Document> {
        match self {
            Slot::Live(doc) => Some(doc),
            Slot::Dead => None,
        }
    }
}
