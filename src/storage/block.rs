use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Document;

/// Filler byte used to right-pad a serialized document out to the block
/// size. Distinct from the NUL bytes a never-written block holds.
pub const PAD_BYTE: u8 = b'0';

/// Fixed-size block codec. Each block holds exactly one JSON document,
/// right-padded with [`PAD_BYTE`], so a block address maps to a byte
/// offset by plain multiplication.
#[derive(Debug, Clone, Copy)]
pub struct BlockCodec {
    block_size: usize,
}

impl BlockCodec {
    pub fn new(block_size: usize) -> Self {
        BlockCodec { block_size }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Serializes `doc` and pads it to exactly one block.
    ///
    /// A document whose serialized form does not fit in one block is
    /// rejected before any padding happens.
    pub fn encode(&self, doc: &Document) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(doc)?;
        if bytes.len() > self.block_size {
            return Err(Error::new(
                ErrorKind::Capacity,
                format!(
                    "document serializes to {} bytes, over the {} byte block",
                    bytes.len(),
                    self.block_size
                ),
            ));
        }
        bytes.resize(self.block_size, PAD_BYTE);
        Ok(bytes)
    }

    /// Rejects a document that would not fit in one block. Used to fail an
    /// operation before it commits any state.
    pub fn check_fit(&self, doc: &Document) -> Result<()> {
        self.encode(doc).map(|_| ())
    }

    /// Parses one padded block back into a document.
    ///
    /// Padding is stripped by cutting at the last `}` in the block; the
    /// serialized object always ends with one and the filler never
    /// contains one. A block with no `}` was never written.
    pub fn decode(&self, block: &[u8]) -> Result<Document> {
        if block.len() != self.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block is {} bytes, expected {}", block.len(), self.block_size),
            ));
        }
        let end = block.iter().rposition(|&b| b == b'}').ok_or_else(|| {
            Error::new(
                ErrorKind::Parse,
                "block holds no document terminator".to_string(),
            )
        })?;
        let doc = serde_json::from_slice(&block[..=end])?;
        Ok(doc)
    }
}
