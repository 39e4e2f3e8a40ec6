//! Error types for the index.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or querying the index.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O failure (short read/write, seek, or open failure).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page is full, every node on it shares the same 64-bit hash as the
    /// incoming node, and a split therefore cannot separate them.
    #[error("overflow unresolvable: all nodes on the page share hash {prefix:#x}")]
    OverflowUnresolvable {
        /// Hash every node on the overflowing page shares.
        prefix: u64,
    },

    /// A record's on-disk framing could not be decoded (a non-empty short
    /// read, as opposed to a clean end-of-file).
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration could not be parsed or resolved.
    #[error("configuration error: {0}")]
    Config(String),
}
