//! Error types for shardlru

use std::fmt;

use crate::entry::Handle;

/// Result type alias for shardlru operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Handle was released to a cache that did not issue it
    ForeignHandle {
        /// Id of the shard that created the handle's entry
        handle_cache: u64,
        /// Id of the shard the handle was released to
        cache: u64,
    },

    /// Shard bit count outside the supported range
    InvalidShardBits(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ForeignHandle { handle_cache, cache } => write!(
                f,
                "Foreign handle: issued by cache {} but released to cache {}",
                handle_cache, cache
            ),
            Error::InvalidShardBits(bits) => write!(
                f,
                "Invalid shard bits: {} (max {})",
                bits,
                crate::config::MAX_SHARD_BITS
            ),
        }
    }
}

impl std::error::Error for Error {}

/// A release that was refused, carrying the handle back to the caller.
///
/// The handle still holds its counted reference, so it can be released to
/// the cache that issued it.
pub struct ReleaseError<K, V> {
    error: Error,
    handle: Handle<K, V>,
}

impl<K, V> ReleaseError<K, V> {
    pub(crate) fn new(error: Error, handle: Handle<K, V>) -> Self {
        Self { error, handle }
    }

    /// Why the release was refused
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Take back the unreleased handle
    pub fn into_handle(self) -> Handle<K, V> {
        self.handle
    }

    /// Split into the reason and the unreleased handle
    pub fn into_parts(self) -> (Error, Handle<K, V>) {
        (self.error, self.handle)
    }
}

impl<K, V> fmt::Debug for ReleaseError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseError")
            .field("error", &self.error)
            .field("charge", &self.handle.charge())
            .finish_non_exhaustive()
    }
}

impl<K, V> fmt::Display for ReleaseError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<K, V> std::error::Error for ReleaseError<K, V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<K, V> From<ReleaseError<K, V>> for Error {
    fn from(err: ReleaseError<K, V>) -> Self {
        err.error
    }
}
