use std::time::Duration;

use crate::core::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub block_size: usize,
    pub map_size: usize,

    // Journal tuning
    pub max_queue: usize,
    pub flush_interval: Duration,
    pub cache_capacity: usize,
    pub cache_max_age: Duration,

    // Engine bounds
    pub max_collection_size: usize,
    pub max_indices: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            block_size: 4096,                          // one document per block
            map_size: 4096 * 256_000,                  // ~1GB per partition file

            max_queue: 1024,                           // flush a queue at 1024 docs
            flush_interval: Duration::from_secs(30),   // or 30 seconds since last flush
            cache_capacity: 128_000,                   // recency cache entries
            cache_max_age: Duration::from_secs(3600),  // cached blocks expire after 60 min

            max_collection_size: 256_000,              // resident window bound (one full partition)
            max_indices: 32,                           // field indexes per collection
        }
    }
}

impl Config {
    /// Blocks held by one full partition file.
    pub fn partition_max(&self) -> u64 {
        (self.map_size / self.block_size) as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size < 64 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block_size {} is below the 64 byte minimum", self.block_size),
            ));
        }
        if self.map_size == 0 || self.map_size % self.block_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "map_size {} must be a non-zero multiple of block_size {}",
                    self.map_size, self.block_size
                ),
            ));
        }
        if self.max_queue == 0 || self.max_collection_size == 0 || self.cache_capacity == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "max_queue, max_collection_size and cache_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
