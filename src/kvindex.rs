//! Public library-level entry point: `Load`, `Get`, `SetOffset`.
//!
//! Wires together the sharded extendible-hash index and the value cache
//! the way a thin driver binary would: `Get` consults the value cache
//! first, falling through to the index on a miss and populating the cache
//! with whatever it found (including an empty result, by design — see
//! `value_cache`). `SetOffset` writes through to the index and then
//! invalidates any cached value for that key, closing a staleness window a
//! write-through-without-invalidation design would otherwise leave open.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ConfigTrait};
use crate::error::Result;
use crate::loader::{self, LoadStats};
use crate::sharded_index::ShardedHashIndex;
use crate::value_cache::ValueCache;

/// The crate's top-level handle: a sharded extendible-hash index with a
/// value cache in front of it.
pub struct KvIndex {
    index: ShardedHashIndex,
    value_cache: ValueCache,
    data_file: Arc<std::fs::File>,
    loader_workers: usize,
}

impl KvIndex {
    /// Opens (or creates) the index files under `cfg.paths().index_dir`,
    /// rebuilding them from scratch — index files are always truncated on
    /// open — and backs them with the data file at `data_file_path`.
    pub fn open<P: AsRef<Path>>(data_file_path: P, cfg: &Config) -> Result<Self> {
        let data_file = Arc::new(
            OpenOptions::new()
                .read(true)
                .open(data_file_path.as_ref())?,
        );

        let index = ShardedHashIndex::open(
            &cfg.paths().index_dir,
            data_file.clone(),
            cfg.directory().shards,
            cfg,
        )?;

        let value_cache = ValueCache::new(cfg.lru().shards, cfg.value_cache().capacity_bytes);

        tracing::info!(
            event = "kvindex_open",
            data_file = ?data_file_path.as_ref(),
            shards = cfg.directory().shards,
        );

        Ok(KvIndex {
            index,
            value_cache,
            data_file,
            loader_workers: cfg.loader().workers,
        })
    }

    /// Rescans the backing data file and calls `SetOffset` for every record
    /// found, fanning the calls out across the loader's worker pool. This is
    /// the crate's only recovery mechanism: there is no durability guarantee
    /// between a `SetOffset` and the next crash, so a restarted process must
    /// call `load` again before trusting `get`.
    pub fn load(&self) -> Result<LoadStats> {
        loader::load(self.data_file.as_ref(), &self.index, self.loader_workers)
    }

    /// Looks up `key`, consulting the value cache before falling through to
    /// the hash index on a miss.
    pub fn get(&self, key: &[u8]) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.value_cache.get(key) {
            return Ok(cached);
        }
        let value = Arc::new(self.index.get_value(key)?);
        self.value_cache.put(key, value.clone());
        Ok(value)
    }

    /// Records that `key`'s record lives at `offset`, then invalidates any
    /// stale cached value for `key`.
    pub fn set_offset(&self, key: &[u8], offset: u64) -> Result<()> {
        self.index.set_offset(key, offset)?;
        self.value_cache.invalidate(key);
        Ok(())
    }

    /// Flushes every shard's page buffer pool to disk. Used on teardown.
    pub fn flush(&self) {
        self.index.flush();
    }
}

#[cfg(test)]
#[path = "kvindex_tests.rs"]
mod kvindex_tests;
