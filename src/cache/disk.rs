//! Disk-backed audio cache.
//!
//! Files are stored flat under the cache directory, named by item ID.
//! Downloads stream into `<id>.part` and are renamed once complete, so a
//! file with the final name is always whole.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::{AudioCache, CacheError, CacheRequest};
use crate::config::CacheConfig;

#[derive(Debug, Default)]
struct CacheEntry {
    done: bool,
    ref_count: u32,
    pending_deletion: bool,
    task: Option<AbortHandle>,
    /// Download that owns this entry. A finished task only touches the
    /// entry it started.
    generation: u64,
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Audio file cache on the local disk.
pub struct DiskAudioCache {
    cache_dir: PathBuf,
    http_client: reqwest::Client,
    runtime: Handle,
    entries: Entries,
    next_generation: AtomicU64,
}

impl DiskAudioCache {
    /// Create a cache in `cache_dir`, spawning downloads on `runtime`.
    pub fn new(cache_dir: impl Into<PathBuf>, runtime: Handle) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|source| CacheError::CreateDir {
            path: cache_dir.clone(),
            source,
        })?;

        let http_client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| CacheError::Network(e.to_string()))?;

        Ok(Self {
            cache_dir,
            http_client,
            runtime,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Build the cache described by the config, or `None` when disabled.
    pub fn from_config(config: &CacheConfig, runtime: Handle) -> Result<Option<Self>, CacheError> {
        if !config.enabled {
            return Ok(None);
        }
        let dir = config.dir.clone().unwrap_or_else(Self::default_dir);
        Self::new(dir, runtime).map(Some)
    }

    /// Default location (user cache directory).
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("sonic-engine")
            .join("audio")
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Pin a finished file so eviction leaves it alone until released.
    pub fn obtain_reference(&self, id: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id)?;
        if !entry.done {
            return None;
        }
        entry.ref_count += 1;
        Some(file_path(&self.cache_dir, id))
    }

    /// Drop a pin taken with [`obtain_reference`](Self::obtain_reference).
    pub fn release_reference(&self, id: &str) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 && entry.pending_deletion {
            entries.remove(id);
            remove_files(&self.cache_dir, id);
        }
    }

    /// Number of tracked entries, finished or downloading.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort all downloads and delete the cache directory.
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock();
        for (_, entry) in entries.drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        if let Err(e) = fs::remove_dir_all(&self.cache_dir) {
            tracing::warn!(target: "cache", dir = %self.cache_dir.display(), error = %e, "Failed to remove cache directory");
        }
    }

    /// Record an entry and start its download. Caller holds the lock.
    fn start_download(&self, entries: &mut HashMap<String, CacheEntry>, id: &str, url: &str) {
        tracing::debug!(target: "cache", id = %id, "Starting download");

        let client = self.http_client.clone();
        let shared = Arc::clone(&self.entries);
        let dir = self.cache_dir.clone();
        let owned_id = id.to_string();
        let owned_url = url.to_string();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let handle = self.runtime.spawn(async move {
            let result = download(&client, &owned_url, &dir, &owned_id).await;
            finish_download(&shared, &dir, &owned_id, generation, result);
        });

        entries.insert(
            id.to_string(),
            CacheEntry {
                task: Some(handle.abort_handle()),
                generation,
                ..Default::default()
            },
        );
    }

    #[cfg(test)]
    fn insert_finished(&self, id: &str, contents: &[u8]) {
        fs::write(file_path(&self.cache_dir, id), contents).unwrap();
        self.entries.lock().insert(
            id.to_string(),
            CacheEntry {
                done: true,
                ..Default::default()
            },
        );
    }
}

impl AudioCache for DiskAudioCache {
    fn cache_file(&self, id: &str, download_url: &str) {
        if download_url.is_empty() {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            entry.pending_deletion = false;
            return;
        }
        self.start_download(&mut entries, id, download_url);
    }

    fn cache_only(&self, keep_id: &str, fetch: Vec<CacheRequest>) {
        let mut keep: HashSet<&str> = fetch.iter().map(|r| r.id.as_str()).collect();
        if !keep_id.is_empty() {
            keep.insert(keep_id);
        }

        let mut entries = self.entries.lock();

        let evict: Vec<String> = entries
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        for id in evict {
            let Some(entry) = entries.get_mut(&id) else {
                continue;
            };
            if entry.ref_count > 0 {
                entry.pending_deletion = true;
                continue;
            }
            if let Some(task) = entry.task.take() {
                task.abort();
            }
            entries.remove(&id);
            remove_files(&self.cache_dir, &id);
            tracing::debug!(target: "cache", id = %id, "Evicted");
        }

        if let Some(entry) = entries.get_mut(keep_id) {
            entry.pending_deletion = false;
        }

        for req in &fetch {
            if let Some(entry) = entries.get_mut(&req.id) {
                entry.pending_deletion = false;
                continue;
            }
            if req.download_url.is_empty() {
                continue;
            }
            self.start_download(&mut entries, &req.id, &req.download_url);
        }
    }

    fn path_for_cached_file(&self, id: &str) -> Option<PathBuf> {
        let entries = self.entries.lock();
        match entries.get(id) {
            Some(entry) if entry.done => Some(file_path(&self.cache_dir, id)),
            _ => None,
        }
    }
}

/// Stream `url` into `<id>.part`, then rename to the final name.
async fn download(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    id: &str,
) -> Result<(), CacheError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CacheError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(CacheError::Network(format!("HTTP {}", response.status())));
    }

    let part = part_path(dir, id);
    let mut file = tokio::fs::File::create(&part).await?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CacheError::Network(e.to_string()))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, file_path(dir, id)).await?;
    Ok(())
}

fn finish_download(
    entries: &Entries,
    dir: &Path,
    id: &str,
    generation: u64,
    result: Result<(), CacheError>,
) {
    let mut entries = entries.lock();
    if let Some(entry) = entries.get(id)
        && entry.generation != generation
    {
        // Evicted and requested again; the newer download owns the files
        tracing::debug!(target: "cache", id = %id, generation, "Ignoring superseded download");
        return;
    }
    match result {
        Ok(()) => match entries.get_mut(id) {
            Some(entry) => {
                entry.done = true;
                entry.task = None;
                tracing::debug!(target: "cache", id = %id, "Download complete");
            }
            // Evicted while the rename was in flight
            None => remove_files(dir, id),
        },
        Err(e) => {
            tracing::warn!(target: "cache", id = %id, error = %e, "Download failed");
            entries.remove(id);
            remove_files(dir, id);
        }
    }
}

/// IDs come from the server; keep them from escaping the cache directory.
fn file_name(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn file_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(file_name(id))
}

fn part_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.part", file_name(id)))
}

fn remove_files(dir: &Path, id: &str) {
    for path in [file_path(dir, id), part_path(dir, id)] {
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(target: "cache", path = %path.display(), error = %e, "Failed to remove cached file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn cache_in(dir: &TempDir) -> DiskAudioCache {
        DiskAudioCache::new(dir.path().join("audio"), Handle::current()).unwrap()
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let disabled = CacheConfig {
            enabled: false,
            dir: Some(dir.path().join("off")),
        };
        assert!(DiskAudioCache::from_config(&disabled, Handle::current()).unwrap().is_none());
        assert!(!dir.path().join("off").exists());

        let enabled = CacheConfig {
            enabled: true,
            dir: Some(dir.path().join("on")),
        };
        let cache = DiskAudioCache::from_config(&enabled, Handle::current())
            .unwrap()
            .unwrap();
        assert_eq!(cache.cache_dir(), dir.path().join("on"));
        assert!(cache.cache_dir().exists());
    }

    /// Serves `body` once over plain HTTP and returns the URL.
    async fn serve_once(body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/stream", addr)
    }

    #[tokio::test]
    async fn test_unknown_file_has_no_path() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.path_for_cached_file("nope").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_empty_urls_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.cache_file("a", "");
        cache.cache_only("", vec![CacheRequest::new("b", "")]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_only_evicts_everything_else() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.insert_finished("keep", b"k");
        cache.insert_finished("prefetched", b"p");
        cache.insert_finished("old", b"o");

        cache.cache_only("keep", vec![CacheRequest::new("prefetched", "")]);

        assert!(cache.path_for_cached_file("keep").is_some());
        assert!(cache.path_for_cached_file("prefetched").is_some());
        assert!(cache.path_for_cached_file("old").is_none());
        assert!(!cache.cache_dir().join("old").exists());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_referenced_file_survives_until_released() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.insert_finished("pinned", b"x");

        let path = cache.obtain_reference("pinned").unwrap();
        cache.cache_only("", Vec::new());
        assert!(path.exists());

        cache.release_reference("pinned");
        assert!(!path.exists());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_requested_again_clears_pending_deletion() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.insert_finished("t", b"x");

        let path = cache.obtain_reference("t").unwrap();
        cache.cache_only("", Vec::new());
        cache.cache_only("t", Vec::new());
        cache.release_reference("t");

        assert!(path.exists());
        assert!(cache.path_for_cached_file("t").is_some());
    }

    #[tokio::test]
    async fn test_superseded_download_leaves_newer_entry_alone() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.entries.lock().insert(
            "t".to_string(),
            CacheEntry {
                generation: 2,
                ..Default::default()
            },
        );
        fs::write(part_path(cache.cache_dir(), "t"), b"partial").unwrap();

        let failed = Err(CacheError::Network("aborted".into()));
        finish_download(&cache.entries, cache.cache_dir(), "t", 1, failed);
        assert_eq!(cache.len(), 1);
        assert!(part_path(cache.cache_dir(), "t").exists());

        finish_download(&cache.entries, cache.cache_dir(), "t", 1, Ok(()));
        assert!(cache.path_for_cached_file("t").is_none());

        finish_download(&cache.entries, cache.cache_dir(), "t", 2, Ok(()));
        assert!(cache.path_for_cached_file("t").is_some());
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_directory() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.insert_finished("../evil", b"x");
        let path = cache.path_for_cached_file("../evil").unwrap();
        assert_eq!(path.parent().unwrap(), cache.cache_dir());
    }

    #[tokio::test]
    async fn test_shutdown_removes_directory() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.insert_finished("a", b"x");
        cache.shutdown();
        assert!(!cache.cache_dir().exists());
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_download_completes() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let url = serve_once(b"audio-bytes").await;

        cache.cache_file("song", &url);

        let mut path = None;
        for _ in 0..200 {
            path = cache.path_for_cached_file("song");
            if path.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let path = path.expect("download did not finish");
        assert_eq!(std::fs::read(&path).unwrap(), b"audio-bytes");
        assert!(!cache.cache_dir().join("song.part").exists());
    }
}
