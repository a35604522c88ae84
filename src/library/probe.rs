use async_process::Command;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Duration assumed for files ffprobe cannot read.
pub const FALLBACK_DURATION: f64 = 60.0;

/// How long ffprobe may run before the fallback is used instead.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// Memoized video durations. Each path is probed at most once per process,
// failures included.
pub struct DurationResolver {
    ffprobe_bin: String,
    timeout: Duration,
    durations: Mutex<HashMap<PathBuf, f64>>,
}

impl DurationResolver {
    pub fn new(ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
            timeout: PROBE_TIMEOUT,
            durations: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Duration of `path` in seconds, or [`FALLBACK_DURATION`] if it cannot
    /// be probed.
    pub async fn resolve(&self, path: &Path) -> f64 {
        if let Some(duration) = self.cached(path).await {
            return duration;
        }

        let probed = match self.probe(path).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!(
                    "Using fallback duration for {}: {}",
                    path.display(),
                    e
                );
                FALLBACK_DURATION
            }
        };

        // The lock is not held while probing, first stored value wins.
        *self
            .durations
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_insert(probed)
    }

    pub async fn cached(&self, path: &Path) -> Option<f64> {
        self.durations.lock().await.get(path).copied()
    }

    async fn probe(&self, path: &Path) -> anyhow::Result<f64> {
        debug!("Probing duration of {}", path.display());

        let mut command = Command::new(&self.ffprobe_bin);
        command
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(path)
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("ffprobe timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("ffprobe failed: {}", error.trim()));
        }

        parse_duration(&output.stdout)
            .ok_or_else(|| anyhow::anyhow!("no usable duration in ffprobe output"))
    }
}

/// Extracts `format.duration` from ffprobe's JSON output.
pub fn parse_duration(stdout: &[u8]) -> Option<f64> {
    let v: Value = serde_json::from_slice(stdout).ok()?;
    let raw = &v["format"]["duration"];
    let duration = match raw {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (duration.is_finite() && duration > 0.0).then_some(duration)
}
