//! Configuration loading and resolution.
//!
//! Mirrors a raw, mostly-`Option` struct deserialized straight from YAML,
//! folded against this crate's fixed defaults into a fully-resolved
//! [`Config`] the rest of the crate borrows. Call sites go through
//! [`ConfigTrait`] rather than matching on the raw struct directly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Fixed page size, in bytes, of every index page.
pub const PAGE_SIZE: usize = 8192;
/// Header region reserved at the front of a page (padding to a 128-byte boundary).
pub const PAGE_HEADER_SIZE: usize = 128;
/// Per-node slot size within a page.
pub const NODE_SLOT_SIZE: usize = 128;
/// Number of node slots a page holds.
pub const NODES_PER_PAGE: usize = (PAGE_SIZE - PAGE_HEADER_SIZE) / NODE_SLOT_SIZE;

const DEFAULT_INITIAL_BITS: u32 = 10;
const DEFAULT_DIRECTORY_SHARDS: usize = 16;
const DEFAULT_PAGE_POOL_CAPACITY_BYTES: u64 = 300 * 1024 * 1024;
const DEFAULT_VALUE_CACHE_CAPACITY_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_LRU_SHARDS: usize = 16;
const DEFAULT_LOADER_WORKERS: usize = 10;
const DEFAULT_INDEX_DIR: &str = "public/index";
const DEFAULT_DATA_FILE: &str = "data.dat";

/// Raw, partially-specified configuration as deserialized from YAML.
///
/// Every field is optional; absent fields fall back to this crate's fixed
/// defaults in [`Config::from_raw`].
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    kvindex: RawKvIndex,
}

#[derive(Debug, Default, Deserialize)]
struct RawKvIndex {
    directory: Option<RawDirectory>,
    page_pool: Option<RawPagePool>,
    value_cache: Option<RawValueCache>,
    lru: Option<RawLru>,
    loader: Option<RawLoader>,
    paths: Option<RawPaths>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDirectory {
    initial_bits: Option<u32>,
    shards: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPagePool {
    capacity_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawValueCache {
    capacity_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLru {
    shards: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLoader {
    workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    index_dir: Option<PathBuf>,
    data_file: Option<PathBuf>,
}

/// Directory (extendible-hash) tunables.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Initial global depth `g0` new instances are constructed with.
    pub initial_bits: u32,
    /// Number of independent extendible-hash instances (`S`).
    pub shards: usize,
}

/// Page buffer pool tunables.
#[derive(Debug, Clone)]
pub struct PagePool {
    /// Total capacity, in bytes, of a single instance's page buffer pool.
    pub capacity_bytes: u64,
}

/// Value cache tunables.
#[derive(Debug, Clone)]
pub struct ValueCache {
    /// Total capacity, in bytes, of the process-wide value cache.
    pub capacity_bytes: u64,
}

/// Sharded-LRU tunables shared by the page pool and value cache.
#[derive(Debug, Clone)]
pub struct Lru {
    /// Number of independent LRU shards (`S_lru`).
    pub shards: usize,
}

/// Parallel loader tunables.
#[derive(Debug, Clone)]
pub struct Loader {
    /// Fixed size of the worker pool `Load` dispatches `SetOffset` onto.
    pub workers: usize,
}

/// File-system paths the crate reads and writes.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding the per-shard index files.
    pub index_dir: PathBuf,
    /// Data file to load records from, unless overridden on the CLI.
    pub data_file: PathBuf,
}

/// Fully-resolved configuration. Every field has a concrete value; there is
/// no further `Option` unwrapping once a `Config` exists.
#[derive(Debug, Clone)]
pub struct Config {
    directory: Directory,
    page_pool: PagePool,
    value_cache: ValueCache,
    lru: Lru,
    loader: Loader,
    paths: Paths,
}

/// Typed accessors over a resolved [`Config`].
///
/// Exists so call sites never need to know whether a setting came from a
/// YAML file or a built-in default — they just ask for it.
pub trait ConfigTrait {
    /// Extendible-hash directory settings.
    fn directory(&self) -> &Directory;
    /// Page buffer pool settings.
    fn page_pool(&self) -> &PagePool;
    /// Value cache settings.
    fn value_cache(&self) -> &ValueCache;
    /// Sharded-LRU shard count.
    fn lru(&self) -> &Lru;
    /// Parallel loader settings.
    fn loader(&self) -> &Loader;
    /// File-system paths.
    fn paths(&self) -> &Paths;
}

impl ConfigTrait for Config {
    fn directory(&self) -> &Directory {
        &self.directory
    }

    fn page_pool(&self) -> &PagePool {
        &self.page_pool
    }

    fn value_cache(&self) -> &ValueCache {
        &self.value_cache
    }

    fn lru(&self) -> &Lru {
        &self.lru
    }

    fn loader(&self) -> &Loader {
        &self.loader
    }

    fn paths(&self) -> &Paths {
        &self.paths
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::from_raw(RawConfig::default())
    }
}

impl Config {
    /// Loads configuration from a YAML file, falling back to this crate's
    /// fixed defaults for any field the file does not set.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config yaml file {:?}", path))?;
        let raw: RawConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("parse config yaml from {:?}", path))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let k = raw.kvindex;
        Config {
            directory: Directory {
                initial_bits: k
                    .directory
                    .as_ref()
                    .and_then(|d| d.initial_bits)
                    .unwrap_or(DEFAULT_INITIAL_BITS),
                shards: k
                    .directory
                    .as_ref()
                    .and_then(|d| d.shards)
                    .unwrap_or(DEFAULT_DIRECTORY_SHARDS),
            },
            page_pool: PagePool {
                capacity_bytes: k
                    .page_pool
                    .as_ref()
                    .and_then(|p| p.capacity_bytes)
                    .unwrap_or(DEFAULT_PAGE_POOL_CAPACITY_BYTES),
            },
            value_cache: ValueCache {
                capacity_bytes: k
                    .value_cache
                    .as_ref()
                    .and_then(|v| v.capacity_bytes)
                    .unwrap_or(DEFAULT_VALUE_CACHE_CAPACITY_BYTES),
            },
            lru: Lru {
                shards: k
                    .lru
                    .as_ref()
                    .and_then(|l| l.shards)
                    .unwrap_or(DEFAULT_LRU_SHARDS),
            },
            loader: Loader {
                workers: k
                    .loader
                    .as_ref()
                    .and_then(|l| l.workers)
                    .unwrap_or(DEFAULT_LOADER_WORKERS),
            },
            paths: Paths {
                index_dir: k
                    .paths
                    .as_ref()
                    .and_then(|p| p.index_dir.clone())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR)),
                data_file: k
                    .paths
                    .as_ref()
                    .and_then(|p| p.data_file.clone())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
            },
        }
    }
}

#[cfg(test)]
impl Config {
    /// Builds a resolved config with a handful of knobs overridden and every
    /// other field at its built-in default. Only ever used by other modules'
    /// test suites to keep fixtures (initial depth, shard count, pool
    /// capacity) small and fast.
    pub fn for_test(initial_bits: u32, shards: usize, page_pool_capacity_bytes: u64) -> Self {
        let mut cfg = Config::default();
        cfg.directory.initial_bits = initial_bits;
        cfg.directory.shards = shards;
        cfg.page_pool.capacity_bytes = page_pool_capacity_bytes;
        cfg
    }

    /// Points `paths.index_dir` at `dir`, so tests never touch the crate's
    /// default on-disk location.
    pub fn with_index_dir(mut self, dir: PathBuf) -> Self {
        self.paths.index_dir = dir;
        self
    }
}
