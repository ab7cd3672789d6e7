use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// The backing files of one collection.
///
/// The first partition lives at the collection's base path; each overflow
/// partition appends its ordinal to that name (`users.db`, `users.db1`,
/// `users.db2`, ...). A global byte offset lands in partition
/// `offset / map_size` at local offset `offset % map_size`.
#[derive(Debug)]
pub struct PartitionSet {
    base: PathBuf,
    map_size: usize,
    paths: Vec<PathBuf>,
    sizes: Vec<u64>,
}

impl PartitionSet {
    /// Opens the partition files under `base`, creating the first one when
    /// the collection is new. Overflow partitions are discovered by probing
    /// successive ordinals until one is missing.
    pub fn open(base: &Path, map_size: usize) -> Result<PartitionSet> {
        if !base.exists() {
            File::create(base)?;
        }
        let mut paths = vec![base.to_path_buf()];
        loop {
            let next = partition_path(base, paths.len());
            if !next.exists() {
                break;
            }
            paths.push(next);
        }
        let mut sizes = Vec::with_capacity(paths.len());
        for path in &paths {
            sizes.push(path.metadata()?.len());
        }
        tracing::debug!(
            "Store - opened {} partition(s) under {}",
            paths.len(),
            base.display()
        );
        Ok(PartitionSet {
            base: base.to_path_buf(),
            map_size,
            paths,
            sizes,
        })
    }

    pub fn count(&self) -> usize {
        self.paths.len()
    }

    pub fn path(&self, partition: usize) -> &Path {
        &self.paths[partition]
    }

    /// Bytes currently allocated in `partition`, zero when it does not exist.
    pub fn size(&self, partition: usize) -> u64 {
        self.sizes.get(partition).copied().unwrap_or(0)
    }

    pub fn total_size(&self) -> u64 {
        self.sizes.iter().sum()
    }

    /// Splits a global byte offset into a partition ordinal and the offset
    /// inside that partition's file.
    pub fn locate(&self, offset: u64) -> (usize, u64) {
        let map = self.map_size as u64;
        ((offset / map) as usize, offset % map)
    }

    /// Grows `partition` to at least `len` bytes. Partition files are never
    /// shrunk.
    pub fn ensure_len(&mut self, partition: usize, len: u64) -> Result<()> {
        if self.sizes[partition] >= len {
            return Ok(());
        }
        let file = OpenOptions::new().write(true).open(&self.paths[partition])?;
        file.set_len(len)?;
        self.sizes[partition] = len;
        Ok(())
    }

    /// Creates the next overflow partition file and returns its ordinal.
    pub fn add_partition(&mut self) -> Result<usize> {
        let ordinal = self.paths.len();
        let path = partition_path(&self.base, ordinal);
        File::create(&path)?;
        tracing::debug!("Store - new partition file {}", path.display());
        self.paths.push(path);
        self.sizes.push(0);
        Ok(ordinal)
    }
}

fn partition_path(base: &Path, ordinal: usize) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(ordinal.to_string());
    PathBuf::from(name)
}
