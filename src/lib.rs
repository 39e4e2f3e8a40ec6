//! An on-disk key/value index backed by a sharded extendible hash table.
//!
//! Given an append-only data file of length-prefixed `(key, value)` records,
//! this crate answers point lookups (`get`) and records where a key's
//! record lives (`set_offset`). The engineering substance is the
//! extendible-hash index itself (directory, paged buffer pool, split/double
//! protocol) plus the sharded top-level partition and value cache layered
//! in front of it; [`kvindex::KvIndex`] is the thin library-level facade a
//! driver binary calls into.

pub mod cache;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod kvindex;
pub mod loader;
pub mod page;
pub mod page_pool;
pub mod record;
pub mod sharded_index;
pub mod value_cache;

pub use config::{Config, ConfigTrait};
pub use error::{Error, Result};
pub use kvindex::KvIndex;
pub use loader::LoadStats;
