pub mod clip;
pub mod error;
pub mod preload;
pub mod probe;
pub mod scan;
pub mod selector;

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::library::error::LibraryError;
use crate::library::preload::{CachedVideo, PreloadCache};
use crate::library::probe::DurationResolver;
use crate::library::scan::{list_videos, relative_key, resolve_relative, TreeNode};
use crate::library::selector::{SelectionPolicy, Selector};

/// A clip picked by [`Library::random_clip`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClipChoice {
    pub file: String,
    pub start: f64,
    pub length: f64,
    pub duration: f64,
}

pub enum VideoSource {
    Cached(CachedVideo),
    Disk(PathBuf),
}

// Shared service behind every request: the video root plus the duration,
// selection and preload state. Built once in main and handed to the
// handlers.
pub struct Library {
    root: PathBuf,
    durations: DurationResolver,
    selector: Selector,
    cache: PreloadCache,
}

impl Library {
    pub fn new(root: PathBuf, ffprobe_bin: &str, policy: SelectionPolicy) -> Self {
        Self {
            durations: DurationResolver::new(ffprobe_bin),
            selector: Selector::new(policy),
            cache: PreloadCache::new(root.clone()),
            root,
        }
    }

    pub fn cache(&self) -> &PreloadCache {
        &self.cache
    }

    pub async fn tree(&self) -> Result<Vec<TreeNode>, LibraryError> {
        let root = self.root.clone();
        Ok(tokio::task::spawn_blocking(move || scan::tree(&root)).await??)
    }

    /// Videos a `/random` request may choose from. A missing or empty target
    /// means the whole library, a file target is the only candidate.
    pub async fn candidates(&self, target: Option<&str>) -> Result<Vec<String>, LibraryError> {
        let dir = match target.filter(|t| !t.is_empty()) {
            None => self.root.clone(),
            Some(target) => {
                let path = resolve_relative(&self.root, target)
                    .ok_or_else(|| LibraryError::NotFound(target.to_owned()))?;
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .map_err(|_| LibraryError::NotFound(target.to_owned()))?;
                if metadata.is_file() {
                    return relative_key(&self.root, &path)
                        .map(|key| vec![key])
                        .ok_or_else(|| LibraryError::NotFound(target.to_owned()));
                }
                if !metadata.is_dir() {
                    return Err(LibraryError::NotFound(target.to_owned()));
                }
                path
            }
        };

        let root = self.root.clone();
        let keys = tokio::task::spawn_blocking(move || {
            list_videos(&dir).map(|videos| {
                videos
                    .iter()
                    .filter_map(|p| relative_key(&root, p))
                    .collect::<Vec<_>>()
            })
        })
        .await??;
        Ok(keys)
    }

    /// Picks a video under `target` and a clip window inside it.
    ///
    /// Returns `None` when the target holds no videos. Preview requests
    /// leave play counts and clip history untouched.
    pub async fn random_clip(
        &self,
        target: Option<&str>,
        preview: bool,
    ) -> Result<Option<ClipChoice>, LibraryError> {
        let candidates = self.candidates(target).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let (file, previous_start) = self.selector.choose(&candidates, preview).await?;
        let duration = self.durations.resolve(&self.root.join(&file)).await;
        let placement = clip::place(duration, previous_start, &mut rand::rng());

        if !preview {
            self.selector.record_start(&file, placement.start).await;
        }
        debug!(
            "Picked {} at {:.2}s for {:.2}s after {} draws",
            file, placement.start, placement.length, placement.attempts
        );

        Ok(Some(ClipChoice {
            file,
            start: placement.start,
            length: placement.length,
            duration,
        }))
    }

    /// Where to serve `rel` from, preferring the preload cache.
    pub async fn video(&self, rel: &str) -> Result<VideoSource, LibraryError> {
        let path = resolve_relative(&self.root, rel)
            .ok_or_else(|| LibraryError::NotFound(rel.to_owned()))?;
        if let Some(video) = self.cached(&path).await {
            return Ok(VideoSource::Cached(video));
        }

        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(VideoSource::Disk(path)),
            _ => Err(LibraryError::NotFound(rel.to_owned())),
        }
    }

    async fn cached(&self, path: &Path) -> Option<CachedVideo> {
        let key = relative_key(&self.root, path)?;
        self.cache.get(&key).await
    }

    #[cfg(test)]
    pub async fn plays(&self, file: &str) -> u64 {
        self.selector.plays(file).await
    }
}
