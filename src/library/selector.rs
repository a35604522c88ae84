use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::library::error::SelectError;

pub const DEFAULT_RECENT_WINDOW: usize = 8;

/// Knobs distinguishing the balanced selector from plain uniform choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Only pick among the least played candidates.
    pub fairness: bool,

    /// Capacity of the recent selection window, 0 disables it.
    pub recent_window: usize,

    /// Keep consecutive clip starts of the same video apart.
    pub separation: bool,
}

impl SelectionPolicy {
    pub fn balanced() -> Self {
        Self {
            fairness: true,
            recent_window: DEFAULT_RECENT_WINDOW,
            separation: true,
        }
    }

    pub fn uniform() -> Self {
        Self {
            fairness: false,
            recent_window: 0,
            separation: false,
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::balanced()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStats {
    pub plays: u64,
    pub last_played: Option<SystemTime>,
    pub last_start: Option<f64>,
}

// Play statistics and the recent selection window. Every method runs under
// the selector lock, so a choice and its bookkeeping are never interleaved
// with another request.
#[derive(Debug)]
pub struct SelectionState {
    policy: SelectionPolicy,
    stats: HashMap<String, VideoStats>,
    recent: VecDeque<String>,
}

impl SelectionState {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            stats: HashMap::new(),
            recent: VecDeque::with_capacity(policy.recent_window),
        }
    }

    pub fn choose<R: Rng + ?Sized>(
        &mut self,
        candidates: &[String],
        preview: bool,
        rng: &mut R,
    ) -> Result<String, SelectError> {
        if candidates.is_empty() {
            return Err(SelectError::EmptyPool);
        }

        let mut pool: Vec<&String> = candidates.iter().collect();

        if self.policy.recent_window > 0 {
            let recent: HashSet<&String> = self.recent.iter().collect();
            let fresh: Vec<&String> = pool
                .iter()
                .copied()
                .filter(|c| !recent.contains(c))
                .collect();
            // Small pools would starve otherwise.
            if !fresh.is_empty() {
                pool = fresh;
            }
        }

        if self.policy.fairness {
            let min_plays = pool
                .iter()
                .map(|c| self.plays(c))
                .min()
                .unwrap_or_default();
            pool.retain(|c| self.plays(c) == min_plays);
        }

        let chosen = (*pool.choose(rng).ok_or(SelectError::EmptyPool)?).clone();

        if !preview {
            self.commit(&chosen);
        }
        Ok(chosen)
    }

    fn commit(&mut self, chosen: &str) {
        let stats = self.stats.entry(chosen.to_owned()).or_default();
        let now = SystemTime::now();
        if let Some(since) = stats.last_played.and_then(|t| now.duration_since(t).ok()) {
            debug!("Replaying {chosen} after {}s", since.as_secs());
        }
        stats.plays += 1;
        stats.last_played = Some(now);

        let capacity = self.policy.recent_window;
        if capacity > 0 {
            while self.recent.len() >= capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(chosen.to_owned());
        }
    }

    pub fn plays(&self, id: &str) -> u64 {
        self.stats.get(id).map(|s| s.plays).unwrap_or(0)
    }

    /// Start of the previous clip of `id`, if start separation applies.
    pub fn last_start(&self, id: &str) -> Option<f64> {
        if !self.policy.separation {
            return None;
        }
        self.stats.get(id).and_then(|s| s.last_start)
    }

    pub fn record_start(&mut self, id: &str, start: f64) {
        self.stats.entry(id.to_owned()).or_default().last_start = Some(start);
    }

    #[cfg(test)]
    pub fn stats(&self, id: &str) -> Option<&VideoStats> {
        self.stats.get(id)
    }

    #[cfg(test)]
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }
}

/// Shared handle to the selection state.
#[derive(Debug)]
pub struct Selector(Mutex<SelectionState>);

impl Selector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self(Mutex::new(SelectionState::new(policy)))
    }

    /// Chooses a video and returns it with the start of its previous clip.
    pub async fn choose(
        &self,
        candidates: &[String],
        preview: bool,
    ) -> Result<(String, Option<f64>), SelectError> {
        let mut state = self.0.lock().await;
        let chosen = state.choose(candidates, preview, &mut rand::rng())?;
        let previous = state.last_start(&chosen);
        Ok((chosen, previous))
    }

    pub async fn record_start(&self, id: &str, start: f64) {
        self.0.lock().await.record_start(id, start);
    }

    #[cfg(test)]
    pub async fn plays(&self, id: &str) -> u64 {
        self.0.lock().await.plays(id)
    }
}
