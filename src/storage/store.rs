use std::fs::OpenOptions;
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BlockIndex, Document};
use crate::storage::block::BlockCodec;
use crate::storage::partition::PartitionSet;

/// Padded-block document store over a set of memory-mapped partition files.
///
/// Writes map only the touched byte range, copy the padded blocks in and
/// flush the mapping before dropping it. Files are grown ahead of a write
/// and never shrunk.
#[derive(Debug)]
pub struct BlockStore {
    partitions: PartitionSet,
    codec: BlockCodec,
    map_size: usize,
    page_size: usize,
}

impl BlockStore {
    pub fn open(base: &Path, config: &Config) -> Result<BlockStore> {
        Ok(BlockStore {
            partitions: PartitionSet::open(base, config.map_size)?,
            codec: BlockCodec::new(config.block_size),
            map_size: config.map_size,
            page_size: system_page_size(),
        })
    }

    pub fn block_size(&self) -> usize {
        self.codec.block_size()
    }

    /// Blocks allocated across all partitions.
    pub fn total_blocks(&self) -> u64 {
        self.partitions.total_size() / self.block_size() as u64
    }

    /// Blocks allocated in one partition file.
    pub fn partition_blocks(&self, partition: usize) -> u64 {
        self.partitions.size(partition) / self.block_size() as u64
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.count()
    }

    /// Update mode: every document overwrites its own block, one scattered
    /// write per document.
    pub fn write_update(&mut self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            self.overwrite_block(doc)?;
        }
        if !docs.is_empty() {
            tracing::debug!("Store - overwrote {} block(s) in place", docs.len());
        }
        Ok(())
    }

    /// Insert mode: `docs` must be sorted by block address. The first `fill`
    /// documents overwrite previously freed blocks one by one; the rest form
    /// an append run written with one mapping per partition file touched.
    pub fn write_insert(&mut self, docs: &[Document], fill: usize) -> Result<()> {
        let fill = fill.min(docs.len());
        for doc in &docs[..fill] {
            self.overwrite_block(doc)?;
        }
        if fill > 0 {
            tracing::debug!("Store - filled {} freed block(s)", fill);
        }
        self.append_run(&docs[fill..])
    }

    /// Writes a sorted run of new blocks. The run may cross at most one
    /// partition boundary: the head fills the current partition to exactly
    /// the map size and the tail starts the next one at offset zero.
    fn append_run(&mut self, docs: &[Document]) -> Result<()> {
        let (Some(first), Some(last)) = (docs.first(), docs.last()) else {
            return Ok(());
        };
        let first_addr = block_addr(first)?;
        let last_addr = block_addr(last)?;
        let block = self.block_size() as u64;
        let map = self.map_size as u64;
        let offset = first_addr * block;
        let run_bytes = (last_addr - first_addr + 1) * block;
        let first_part = (offset / map) as usize;
        let last_part = ((offset + run_bytes - 1) / map) as usize;
        if last_part > first_part + 1 {
            return Err(Error::new(
                ErrorKind::Capacity,
                format!(
                    "append run of {} blocks would span {} partitions",
                    docs.len(),
                    last_part - first_part + 1
                ),
            ));
        }
        while self.partitions.count() <= last_part {
            self.partitions.add_partition()?;
        }
        let local = offset % map;
        let head_bytes = if last_part > first_part {
            map - local
        } else {
            run_bytes
        };
        self.partitions.ensure_len(first_part, local + head_bytes)?;
        // (partition, local offset, region length, run bytes to skip)
        let mut regions = vec![(first_part, local, head_bytes, 0u64)];
        if last_part > first_part {
            let tail_bytes = run_bytes - head_bytes;
            self.partitions.ensure_len(last_part, tail_bytes)?;
            regions.push((last_part, 0, tail_bytes, head_bytes));
        }
        for (part, local, len, skip) in regions {
            let (mut mapping, delta) = self.map_region_mut(part, local, len as usize)?;
            for doc in docs {
                let pos = (block_addr(doc)? - first_addr) * block;
                if pos < skip || pos >= skip + len {
                    continue;
                }
                let bytes = self.codec.encode(doc)?;
                let at = delta + (pos - skip) as usize;
                mapping[at..at + bytes.len()].copy_from_slice(&bytes);
            }
            mapping.flush()?;
        }
        tracing::debug!(
            "Store - appended run of {} block(s) at address {}",
            docs.len(),
            first_addr
        );
        Ok(())
    }

    fn overwrite_block(&mut self, doc: &Document) -> Result<()> {
        let addr = block_addr(doc)?;
        let block = self.block_size() as u64;
        let (part, local) = self.partitions.locate(addr * block);
        if part >= self.partitions.count() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block {} lies beyond the partition set", addr),
            ));
        }
        self.partitions.ensure_len(part, local + block)?;
        let bytes = self.codec.encode(doc)?;
        let (mut mapping, delta) = self.map_region_mut(part, local, self.block_size())?;
        mapping[delta..delta + bytes.len()].copy_from_slice(&bytes);
        mapping.flush()?;
        tracing::trace!("Store - wrote block {} in partition {}", addr, part);
        Ok(())
    }

    /// Reads `count` consecutive blocks starting at `start`. The range must
    /// lie inside one partition file.
    pub fn load(&self, start: BlockIndex, count: u64) -> Result<Vec<Document>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let block = self.block_size() as u64;
        let (part, local) = self.partitions.locate(start * block);
        let bytes = count * block;
        if local + bytes > self.map_size as u64 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "load of {} block(s) at {} crosses a partition boundary",
                    count, start
                ),
            ));
        }
        if part >= self.partitions.count() || local + bytes > self.partitions.size(part) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "load of {} block(s) at {} runs past the end of the store",
                    count, start
                ),
            ));
        }
        let (mapping, delta) = self.map_region(part, local, bytes as usize)?;
        let mut docs = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let at = delta + i * self.block_size();
            docs.push(self.codec.decode(&mapping[at..at + self.block_size()])?);
        }
        tracing::trace!("Store - loaded {} block(s) from address {}", count, start);
        Ok(docs)
    }

    pub fn load_one(&self, addr: BlockIndex) -> Result<Document> {
        match self.load(addr, 1)?.pop() {
            Some(doc) => Ok(doc),
            None => Err(Error::new(
                ErrorKind::InvalidState,
                format!("block {} produced no document", addr),
            )),
        }
    }

    // Mapping offsets must be page-aligned; `delta` realigns `local` down
    // to the nearest page and widens the mapping to compensate.
    fn map_region_mut(&self, partition: usize, local: u64, len: usize) -> Result<(MmapMut, usize)> {
        let delta = (local % self.page_size as u64) as usize;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.partitions.path(partition))?;
        let mapping = unsafe {
            MmapOptions::new()
                .offset(local - delta as u64)
                .len(len + delta)
                .map_mut(&file)?
        };
        Ok((mapping, delta))
    }

    fn map_region(&self, partition: usize, local: u64, len: usize) -> Result<(Mmap, usize)> {
        let delta = (local % self.page_size as u64) as usize;
        let file = OpenOptions::new()
            .read(true)
            .open(self.partitions.path(partition))?;
        let mapping = unsafe {
            MmapOptions::new()
                .offset(local - delta as u64)
                .len(len + delta)
                .map(&file)?
        };
        Ok((mapping, delta))
    }
}

fn system_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

fn block_addr(doc: &Document) -> Result<BlockIndex> {
    doc.block_index().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            "document carries no block address".to_string(),
        )
    })
}
