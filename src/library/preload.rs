use bytes::Bytes;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::library::scan::{list_videos, relative_key};

// Whole-file video cache that is only filled while at least one viewer
// session is open.
//
// Lock order is sessions, then bytes. Entries are inserted and the cache is
// cleared with the sessions lock held, so a loader from an ended wave can
// never repopulate the cache.
#[derive(Clone)]
pub struct PreloadCache(Arc<Inner>);

struct Inner {
    root: PathBuf,
    sessions: Mutex<Sessions>,
    bytes: RwLock<HashMap<String, CachedVideo>>,

    // Loader tasks currently inside `preload`.
    running: AtomicUsize,

    #[cfg(test)]
    peak: AtomicUsize,
}

/// A preloaded file and the metadata it was read with.
#[derive(Debug, Clone)]
pub struct CachedVideo {
    pub data: Bytes,
    pub metadata: Metadata,
}

#[derive(Default)]
struct Sessions {
    ids: HashSet<String>,

    // Advanced every time the last session ends.
    wave: u64,

    // Wave of the running loader, if any.
    loader: Option<u64>,

    // Path the loader is reading right now.
    current: Option<String>,

    // Most recently spawned loader task.
    task: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub cached: usize,
    pub total: usize,
    pub caching: Option<String>,
    pub videos: Vec<String>,
}

impl PreloadCache {
    pub fn new(root: PathBuf) -> Self {
        Self(Arc::new(Inner {
            root,
            sessions: Mutex::new(Sessions::default()),
            bytes: RwLock::new(HashMap::new()),
            running: AtomicUsize::new(0),
            #[cfg(test)]
            peak: AtomicUsize::new(0),
        }))
    }

    /// Registers a session and starts a loader unless one is already running
    /// for the current wave. Returns true if a loader was started.
    ///
    /// A loader left over from an ended wave may still be finishing a read,
    /// the new one waits for it so that only one loader runs at a time.
    pub async fn start_session(&self, id: &str) -> bool {
        let mut sessions = self.0.sessions.lock().await;
        if sessions.ids.insert(id.to_owned()) {
            debug!("Session {id} started, {} active", sessions.ids.len());
        }

        if sessions.loader == Some(sessions.wave) {
            return false;
        }
        let wave = sessions.wave;
        sessions.loader = Some(wave);

        let previous = sessions.task.take();
        let cache = self.clone();
        sessions.task = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    error!("Previous preload task failed: {}", e);
                }
            }
            cache.preload(wave).await;
        }));
        true
    }

    /// Removes a session. When it was the last one the cache is emptied.
    /// Returns true if the cache was cleared.
    pub async fn end_session(&self, id: &str) -> bool {
        let mut sessions = self.0.sessions.lock().await;
        if !sessions.ids.remove(id) {
            debug!("Ignoring end of unknown session {id}");
            return false;
        }
        if !sessions.ids.is_empty() {
            debug!("Session {id} ended, {} active", sessions.ids.len());
            return false;
        }

        sessions.wave += 1;
        sessions.loader = None;
        sessions.current = None;

        let mut bytes = self.0.bytes.write().await;
        let freed: usize = bytes.values().map(|v| v.data.len()).sum();
        bytes.clear();
        info!(
            "Last session ended, dropped {} cached bytes",
            freed
        );
        true
    }

    pub async fn get(&self, key: &str) -> Option<CachedVideo> {
        self.0.bytes.read().await.get(key).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.0.sessions.lock().await.ids.len()
    }

    #[cfg(test)]
    pub async fn is_loading(&self) -> bool {
        self.0.sessions.lock().await.loader.is_some()
    }

    // Most loaders ever seen running at once.
    #[cfg(test)]
    pub fn peak_loaders(&self) -> usize {
        self.0.peak.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> std::io::Result<CacheStatus> {
        let root = self.0.root.clone();
        let total = tokio::task::spawn_blocking(move || list_videos(&root))
            .await
            .map_err(std::io::Error::other)??
            .len();

        let caching = self.0.sessions.lock().await.current.clone();
        let mut videos: Vec<String> = self.0.bytes.read().await.keys().cloned().collect();
        videos.sort();

        Ok(CacheStatus {
            cached: videos.len(),
            total,
            caching,
            videos,
        })
    }

    async fn preload(self, wave: u64) {
        let running = self.0.running.fetch_add(1, Ordering::SeqCst) + 1;
        #[cfg(test)]
        self.0.peak.fetch_max(running, Ordering::SeqCst);
        info!("Preloading videos under {}", self.0.root.display());
        debug!("Preload wave {wave} started, {running} loaders running");

        match self.load_all(wave).await {
            Ok(Some(loaded)) => info!("Preload finished, {loaded} videos loaded"),
            Ok(None) => info!("Preload cancelled, no active sessions"),
            Err(e) => error!("Preload failed: {}", e),
        }
        self.0.running.fetch_sub(1, Ordering::SeqCst);

        let mut sessions = self.0.sessions.lock().await;
        if sessions.loader == Some(wave) {
            sessions.loader = None;
            sessions.current = None;
        }
    }

    // Returns the number of files loaded, or None if the wave ended.
    async fn load_all(&self, wave: u64) -> std::io::Result<Option<usize>> {
        let root = self.0.root.clone();
        let files = tokio::task::spawn_blocking(move || list_videos(&root))
            .await
            .map_err(std::io::Error::other)??;

        let mut loaded = 0;
        for path in files {
            let Some(key) = relative_key(&self.0.root, &path) else {
                continue;
            };
            if self.0.bytes.read().await.contains_key(&key) {
                continue;
            }
            if !self.begin(wave, &key).await {
                return Ok(None);
            }

            let video = match read_video(&path).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to preload {}: {}", path.display(), e);
                    continue;
                }
            };
            if !self.store(wave, key, video).await {
                return Ok(None);
            }
            loaded += 1;
        }
        Ok(Some(loaded))
    }

    // Should-continue check, marks `key` as the file being read.
    async fn begin(&self, wave: u64, key: &str) -> bool {
        let mut sessions = self.0.sessions.lock().await;
        if !sessions.is_live(wave) {
            return false;
        }
        sessions.current = Some(key.to_owned());
        true
    }

    async fn store(&self, wave: u64, key: String, video: CachedVideo) -> bool {
        let mut sessions = self.0.sessions.lock().await;
        if !sessions.is_live(wave) {
            return false;
        }
        sessions.current = None;
        debug!("Cached {key} ({} bytes)", video.data.len());
        self.0.bytes.write().await.insert(key, video);
        true
    }
}

// Metadata comes from the open handle so it describes the bytes read.
async fn read_video(path: &Path) -> std::io::Result<CachedVideo> {
    let mut file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    let mut data = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut data).await?;
    Ok(CachedVideo {
        data: Bytes::from(data),
        metadata,
    })
}

impl Sessions {
    fn is_live(&self, wave: u64) -> bool {
        self.wave == wave && !self.ids.is_empty()
    }
}
