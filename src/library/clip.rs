use rand::Rng;

/// Shortest clip handed out, unless the whole video is shorter.
pub const MIN_CLIP_SECS: f64 = 8.0;

/// Videos at or below this length are always played whole.
const WHOLE_CLIP_SECS: f64 = 20.0;

const MAX_START_ATTEMPTS: u32 = 6;

/// A clip window inside a video of known duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start: f64,
    pub length: f64,

    // Number of start draws made, 0 when the clip covers the whole video.
    pub attempts: u32,
}

/// Picks a clip window for a video of `duration` seconds.
///
/// When `previous_start` is set, the start is redrawn (bounded) until it lands
/// far enough from the previous one, see [`separation`].
pub fn place<R: Rng + ?Sized>(
    duration: f64,
    previous_start: Option<f64>,
    rng: &mut R,
) -> Placement {
    if !duration.is_finite() || duration <= 0.0 {
        return Placement {
            start: 0.0,
            length: 0.0,
            attempts: 0,
        };
    }

    let length = clip_length(duration, rng);
    let (start, attempts) = pick_start(duration, length, previous_start, rng);
    Placement {
        start,
        length,
        attempts,
    }
}

/// Duration-bucketed clip length, clamped to `[min(D, 8), D]`.
pub fn clip_length<R: Rng + ?Sized>(duration: f64, rng: &mut R) -> f64 {
    let d = duration;
    let raw = if d <= WHOLE_CLIP_SECS {
        d
    } else if d <= 50.0 {
        uniform(rng, 0.55 * d, 0.85 * d)
    } else if d <= 150.0 {
        uniform(rng, 0.25 * d, (0.5 * d).min(45.0))
    } else if d <= 420.0 {
        uniform(rng, 22.0, (0.3 * d).min(75.0))
    } else {
        uniform(rng, 28.0, (0.25 * d).min(95.0))
    };
    raw.clamp(d.min(MIN_CLIP_SECS), d)
}

/// Minimum distance between two consecutive starts of the same video.
pub fn separation(duration: f64, length: f64) -> f64 {
    (length * 0.5)
        .max((duration * 0.15).min(30.0))
        .max(6.0)
}

/// Draws a start in `[0, duration - length]`, returning it with the number of
/// draws used.
pub fn pick_start<R: Rng + ?Sized>(
    duration: f64,
    length: f64,
    previous_start: Option<f64>,
    rng: &mut R,
) -> (f64, u32) {
    let max_start = duration - length;
    if max_start <= 0.0 {
        return (0.0, 0);
    }

    let Some(previous) = previous_start else {
        return (uniform(rng, 0.0, max_start), 1);
    };

    let min_gap = separation(duration, length);
    let mut candidate = 0.0;
    for attempt in 1..=MAX_START_ATTEMPTS {
        candidate = uniform(rng, 0.0, max_start);
        if (candidate - previous).abs() >= min_gap {
            return (candidate, attempt);
        }
    }

    // Out of attempts, settle for the last draw.
    (candidate, MAX_START_ATTEMPTS)
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high <= low {
        return low;
    }
    rng.random_range(low..=high)
}
