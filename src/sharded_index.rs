//! Top-level partition of the whole index into `S` independent extendible-hash
//! instances, reducing lock contention across unrelated keys.
//!
//! Routing uses the same platform-neutral hash the page buffer pool's
//! [`crate::cache::ShardedLru`] uses for its own shard selection (xxHash3),
//! deliberately distinct from the MurmurHash2-A each instance uses internally.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigTrait;
use crate::error::Result;
use crate::hash::{prefix, shard_hash_64};
use crate::index::ExtendibleHashIndex;

/// A fixed array of independent extendible-hash instances, one per top-level
/// shard. Every instance owns its own index file and buffer pool.
pub struct ShardedHashIndex {
    shards: Vec<ExtendibleHashIndex>,
    shard_bits: u32,
}

impl ShardedHashIndex {
    /// Opens (truncating — index files are always rebuilt from the data file
    /// on startup) `shards` index files under `index_dir`, named
    /// `hash.<n>.idx`, each backing its own [`ExtendibleHashIndex`] over the
    /// shared `data_file`.
    pub fn open<C: ConfigTrait>(
        index_dir: &Path,
        data_file: Arc<File>,
        shards: usize,
        cfg: &C,
    ) -> Result<Self> {
        assert!(shards.is_power_of_two(), "shard count must be a power of two");
        std::fs::create_dir_all(index_dir)?;

        let mut instances = Vec::with_capacity(shards);
        for n in 0..shards {
            let path = index_dir.join(format!("hash.{n}.idx"));
            let index_file = Arc::new(
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?,
            );
            instances.push(ExtendibleHashIndex::from_config(
                index_file,
                data_file.clone(),
                cfg,
            )?);
        }

        tracing::info!(event = "sharded_index_open", shards = shards, dir = ?index_dir);

        Ok(ShardedHashIndex {
            shards: instances,
            shard_bits: shards.trailing_zeros(),
        })
    }

    fn shard_for(&self, key: &[u8]) -> &ExtendibleHashIndex {
        let idx = prefix(shard_hash_64(key), self.shard_bits) as usize;
        &self.shards[idx]
    }

    /// Records that `key`'s record lives at `offset`, routed to its shard.
    pub fn set_offset(&self, key: &[u8], offset: u64) -> Result<()> {
        self.shard_for(key).set_offset(key, offset)
    }

    /// Looks up `key`, routed to its shard.
    pub fn get_value(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.shard_for(key).get_value(key)
    }

    /// Flushes every shard's buffer pool. Used on teardown.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.flush();
        }
    }
}

#[cfg(test)]
#[path = "sharded_index_tests.rs"]
mod sharded_index_tests;
