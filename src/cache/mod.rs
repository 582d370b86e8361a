//! Local audio file cache.
//!
//! The engine asks the cache to keep the current track and prefetch the next
//! few. Backends that play from URLs can then be pointed at the local file
//! instead of the stream.
//!
//! - [`AudioCache`] - the contract the engine consumes
//! - [`DiskAudioCache`] - files on disk, downloaded on the tokio runtime

mod disk;

pub use disk::DiskAudioCache;

use std::path::PathBuf;

/// A file the cache should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub id: String,
    pub download_url: String,
}

impl CacheRequest {
    pub fn new(id: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            download_url: download_url.into(),
        }
    }
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download failed: {0}")]
    Network(String),
}

/// Cache operations the engine uses. All calls return immediately; downloads
/// happen in the background.
///
/// Implement this trait to create mock implementations for testing.
pub trait AudioCache: Send + Sync {
    /// Make sure `id` is cached, downloading from `download_url` if needed.
    fn cache_file(&self, id: &str, download_url: &str);

    /// Keep only `keep_id` and the files in `fetch`, starting any missing
    /// downloads. Everything else is evicted.
    fn cache_only(&self, keep_id: &str, fetch: Vec<CacheRequest>);

    /// Local path of a fully downloaded file.
    fn path_for_cached_file(&self, id: &str) -> Option<PathBuf>;
}
