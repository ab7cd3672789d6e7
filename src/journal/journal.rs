use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{BlockIndex, Document};
use crate::journal::cache::{BlockCache, CacheStats};
use crate::storage::store::BlockStore;

/// One paged read out of the store: the documents of a partition window
/// plus the bookkeeping a caller needs to keep paging.
#[derive(Debug)]
pub struct WindowReport {
    pub docs: Vec<Document>,
    /// Blocks allocated across the whole store at load time.
    pub total_docs: u64,
    /// Ordinal of this window since the cursor was last reset.
    pub index: usize,
    pub start: BlockIndex,
    pub size: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    index: usize,
    start: BlockIndex,
    size: u64,
    max: u64,
}

/// Write-behind journal between the engine and the block store.
///
/// Writes queue here and land on disk when a queue reaches its bound or
/// the flush interval has passed; batch inserts write straight through.
/// Scattered reads go through the recency cache. Freed block addresses
/// are collected for reuse by later inserts.
#[derive(Debug)]
pub struct Journal {
    store: BlockStore,
    cache: BlockCache,
    config: Config,
    insert_queue: VecDeque<Document>,
    update_queue: VecDeque<Document>,
    free_blocks: VecDeque<BlockIndex>,
    last_flush: Instant,
    window: WindowState,
    marker_path: PathBuf,
}

impl Journal {
    /// Opens the journal over the store at `path`. A `.journal` sidecar
    /// marker is created next to the partition files.
    pub fn open(path: &Path, config: Config) -> Result<Journal> {
        let store = BlockStore::open(path, &config)?;
        let mut marker = OsString::from(path.as_os_str());
        marker.push(".journal");
        let marker_path = PathBuf::from(marker);
        if !marker_path.exists() {
            File::create(&marker_path)?;
        }
        let window_max = config.partition_max().min(config.max_collection_size as u64);
        Ok(Journal {
            cache: BlockCache::new(config.cache_capacity, config.cache_max_age),
            insert_queue: VecDeque::new(),
            update_queue: VecDeque::new(),
            free_blocks: VecDeque::new(),
            last_flush: Instant::now(),
            window: WindowState {
                index: 0,
                start: 0,
                size: window_max,
                max: window_max,
            },
            marker_path,
            store,
            config,
        })
    }

    pub fn total_blocks(&self) -> u64 {
        self.store.total_blocks()
    }

    /// Number of windows a full paging cycle visits.
    pub fn window_count(&self) -> u64 {
        self.store.total_blocks().div_ceil(self.window.max)
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn queued_inserts(&self) -> usize {
        self.insert_queue.len()
    }

    pub fn queued_updates(&self) -> usize {
        self.update_queue.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn peek_free_block(&self) -> Option<BlockIndex> {
        self.free_blocks.front().copied()
    }

    pub fn next_free_block(&mut self) -> Option<BlockIndex> {
        self.free_blocks.pop_front()
    }

    pub fn free_blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.free_blocks.iter().copied()
    }

    pub fn free_block_count(&self) -> usize {
        self.free_blocks.len()
    }

    pub fn consume_free_blocks(&mut self, n: usize) {
        for _ in 0..n {
            self.free_blocks.pop_front();
        }
    }

    /// Queues a freshly addressed document and caches it. Runs the bound
    /// and interval checks.
    pub fn insert(&mut self, doc: Document) -> Result<()> {
        let addr = queued_addr(&doc)?;
        self.cache.put(addr, doc.clone());
        self.insert_queue.push_back(doc);
        self.check()
    }

    /// Writes a batch straight through to the store, bypassing the queue.
    /// Documents headed for freed blocks are filled first; the rest append.
    pub fn insert_batch(&mut self, docs: &mut [Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        docs.sort_by_key(|d| d.block_index());
        let end = self.store.total_blocks();
        let fill = docs
            .iter()
            .take_while(|d| d.block_index().is_some_and(|a| a < end))
            .count();
        tracing::debug!(
            "Journal - batch of {} writes through, {} into freed blocks",
            docs.len(),
            fill
        );
        self.store.write_insert(docs, fill)?;
        self.check()
    }

    /// Queues an overwrite of an existing block and refreshes the cache.
    pub fn update(&mut self, doc: Document) -> Result<()> {
        let addr = queued_addr(&doc)?;
        self.cache.put(addr, doc.clone());
        self.update_queue.push_back(doc);
        self.check()
    }

    /// Releases a block for reuse. Queued writes against it are
    /// neutralized: a queued insert becomes a bare tombstone (the slot
    /// still needs valid content on flush) and queued updates are dropped.
    pub fn remove(&mut self, addr: BlockIndex) {
        for doc in self.insert_queue.iter_mut() {
            if doc.block_index() == Some(addr) {
                *doc = Document::tombstone(addr);
            }
        }
        self.update_queue.retain(|doc| doc.block_index() != Some(addr));
        self.cache.evict(addr);
        self.free_blocks.push_back(addr);
        tracing::trace!("Journal - block {} marked free", addr);
    }

    /// Flushes both queues to the store. A failed write leaves the failing
    /// queue intact for the next attempt.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_inserts()?;
        self.flush_updates()
    }

    fn flush_inserts(&mut self) -> Result<()> {
        if self.insert_queue.is_empty() {
            return Ok(());
        }
        let mut docs: Vec<Document> = self.insert_queue.iter().cloned().collect();
        // stable sort: writes to the same address keep their queue order
        docs.sort_by_key(|d| d.block_index());
        let end = self.store.total_blocks();
        let fill = docs
            .iter()
            .take_while(|d| d.block_index().is_some_and(|a| a < end))
            .count();
        tracing::debug!(
            "Journal - flushing {} queued insert(s), {} into freed blocks",
            docs.len(),
            fill
        );
        self.store.write_insert(&docs, fill)?;
        self.insert_queue.clear();
        self.last_flush = Instant::now();
        Ok(())
    }

    fn flush_updates(&mut self) -> Result<()> {
        if self.update_queue.is_empty() {
            return Ok(());
        }
        let docs: Vec<Document> = self.update_queue.iter().cloned().collect();
        tracing::debug!("Journal - flushing {} queued update(s)", docs.len());
        self.store.write_update(&docs)?;
        self.update_queue.clear();
        self.last_flush = Instant::now();
        Ok(())
    }

    // Bound and interval checks run after every enqueue.
    fn check(&mut self) -> Result<()> {
        let interval_due = self.last_flush.elapsed() >= self.config.flush_interval;
        if interval_due || self.insert_queue.len() >= self.config.max_queue {
            self.flush_inserts()?;
        }
        if interval_due || self.update_queue.len() >= self.config.max_queue {
            self.flush_updates()?;
        }
        Ok(())
    }

    /// Loads the next partition window and advances the paging cursor. The
    /// cursor cycles back to the first window once it runs off the end.
    /// Returns `None` when the store holds nothing.
    pub fn load(&mut self) -> Result<Option<WindowReport>> {
        let total_docs = self.store.total_blocks();
        if total_docs == 0 {
            return Ok(None);
        }
        let mut index = self.window.index;
        let mut start = self.window.start;
        if start >= total_docs {
            tracing::debug!("Journal - cycling back to the first window");
            index = 0;
            start = 0;
        }
        // a window never crosses a partition file
        let per_partition = self.config.partition_max();
        let partition = (start / per_partition) as usize;
        let local = start % per_partition;
        let remaining = self.store.partition_blocks(partition).saturating_sub(local);
        let size = remaining.min(self.window.max);
        if size == 0 {
            return Ok(None);
        }
        let loaded = WindowState {
            index,
            start,
            size,
            max: self.window.max,
        };
        self.window = WindowState {
            index: index + 1,
            start: start + size,
            size,
            max: self.window.max,
        };
        tracing::debug!(
            "Journal - loading window {} at {} ({} of {} block(s))",
            loaded.index,
            loaded.start,
            loaded.size,
            total_docs
        );
        let docs = self.load_window_docs(loaded.start, loaded.size)?;
        Ok(Some(WindowReport {
            docs,
            total_docs,
            index: loaded.index,
            start: loaded.start,
            size: loaded.size,
            max: loaded.max,
        }))
    }

    /// Resets the paging cursor and loads the first window.
    pub fn reload(&mut self) -> Result<Option<WindowReport>> {
        self.window = WindowState {
            index: 0,
            start: 0,
            size: self.window.max,
            max: self.window.max,
        };
        self.load()
    }

    // A window with any cached member is assembled block by block through
    // the cache; otherwise one bulk read covers it.
    fn load_window_docs(&mut self, start: BlockIndex, size: u64) -> Result<Vec<Document>> {
        let any_cached = (start..start + size).any(|addr| self.cache.contains(addr));
        if any_cached {
            let addrs: Vec<BlockIndex> = (start..start + size).collect();
            self.load_blocks(&addrs)
        } else {
            self.store.load(start, size)
        }
    }

    /// Reads scattered blocks in request order, through the cache.
    pub fn load_blocks(&mut self, addrs: &[BlockIndex]) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(addrs.len());
        let mut misses = 0usize;
        for &addr in addrs {
            if let Some(doc) = self.cache.get(addr) {
                docs.push(doc);
                continue;
            }
            misses += 1;
            let doc = self.store.load_one(addr)?;
            self.cache.put(addr, doc.clone());
            docs.push(doc);
        }
        tracing::debug!(
            "Journal - loaded {} block(s), {} from the store",
            docs.len(),
            misses
        );
        Ok(docs)
    }
}

fn queued_addr(doc: &Document) -> Result<BlockIndex> {
    doc.block_index().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            "document queued without a block address".to_string(),
        )
    })
}
