//! Error taxonomy for the filesystem engine (§7 of the design).
//!
//! Every public operation returns a `Result<_, Error<E>>` where `E` is the
//! underlying block device's own error type. The engine never panics on
//! malformed on-disk data; corruption is reported, not asserted away.

use std::fmt;

/// Errors produced by the filesystem engine.
///
/// Generic over the block device's I/O error type so that callers get their
/// own error type back out of `Io` without this crate inventing one.
#[derive(thiserror::Error)]
pub enum Error<E> {
    /// No entry exists for the given key, or a path segment has no id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The key names a directory (or an empty name was given) where a value
    /// was expected.
    #[error("value expected at: {0}")]
    ValueExpected(String),

    /// The key names a value where a directory was expected.
    #[error("dictionary expected at: {0}")]
    DictionaryExpected(String),

    /// The allocator ran out of free blocks, or no commit/split could make a
    /// write fit.
    #[error("no space left on device")]
    NoSpace,

    /// Reserved for a higher-level batch facility that retries a bounded
    /// number of times before giving up.
    #[error("too many retries: {0}")]
    TooManyRetries(u32),

    /// A metadata block failed to parse: bad tag, bad CRC, or a structurally
    /// inconsistent commit. Surfaced as `Disconnected` when encountered while
    /// following links for the free-block scan.
    #[error("filesystem is corrupt at block {0}")]
    Corrupt(u64),

    /// Traversal could not reach every block it needed to (implies at least
    /// one `Corrupt` block along a required path).
    #[error("filesystem traversal disconnected at block {0}")]
    Disconnected(u64),

    /// The block device reported an I/O error.
    #[error("device I/O error: {0}")]
    Io(E),

    /// The supplied `FilesystemConfig` is not internally consistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl<E: fmt::Debug> fmt::Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(k) => f.debug_tuple("NotFound").field(k).finish(),
            Error::ValueExpected(k) => f.debug_tuple("ValueExpected").field(k).finish(),
            Error::DictionaryExpected(k) => f.debug_tuple("DictionaryExpected").field(k).finish(),
            Error::NoSpace => write!(f, "NoSpace"),
            Error::TooManyRetries(n) => f.debug_tuple("TooManyRetries").field(n).finish(),
            Error::Corrupt(b) => f.debug_tuple("Corrupt").field(b).finish(),
            Error::Disconnected(b) => f.debug_tuple("Disconnected").field(b).finish(),
            Error::Io(e) => f.debug_tuple("Io").field(e).finish(),
            Error::InvalidConfig(s) => f.debug_tuple("InvalidConfig").field(s).finish(),
        }
    }
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
