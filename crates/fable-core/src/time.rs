use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Time duration with sub-millisecond precision (stored as fractional seconds).
///
/// Negative inputs clamp to zero, so subtraction saturates. Deserialized
/// values go through the same clamp.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "RawDuration")]
pub struct Duration {
    /// Duration in seconds.
    seconds: f64,
}

#[derive(Deserialize)]
struct RawDuration {
    seconds: f64,
}

impl From<RawDuration> for Duration {
    fn from(raw: RawDuration) -> Self {
        Duration::from_seconds(raw.seconds)
    }
}

impl Duration {
    /// Create a duration from seconds.
    pub fn from_seconds(s: f64) -> Self {
        Self {
            seconds: if s.is_finite() { s.max(0.0) } else { 0.0 },
        }
    }

    /// Create a duration from milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        Self::from_seconds(ms / 1000.0)
    }

    /// Create a duration from minutes.
    pub fn from_minutes(m: f64) -> Self {
        Self::from_seconds(m * 60.0)
    }

    /// Duration of `frames` frames at the given frame rate.
    pub fn from_frames(frames: f64, fps: f64) -> Self {
        if fps <= 0.0 {
            return Self::zero();
        }
        Self::from_seconds(frames / fps)
    }

    /// Create a zero duration.
    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    /// Get duration as seconds.
    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Get duration as milliseconds.
    pub fn as_millis(&self) -> f64 {
        self.seconds * 1000.0
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0.0
    }

    /// Convert to a std duration for timers. Values too large for a std
    /// duration saturate at `std::time::Duration::MAX`.
    pub fn to_std(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.seconds)
            .unwrap_or(std::time::Duration::MAX)
    }

    /// Whether a timer can wait exactly this long.
    pub fn is_representable(&self) -> bool {
        std::time::Duration::try_from_secs_f64(self.seconds).is_ok()
    }

    /// Convert from a std duration.
    pub fn from_std(d: std::time::Duration) -> Self {
        Self::from_seconds(d.as_secs_f64())
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::zero()
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration::from_std(d)
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_seconds(self.seconds + rhs.seconds)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_seconds((self.seconds - rhs.seconds).max(0.0))
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;
    fn mul(self, rhs: f64) -> Duration {
        Duration::from_seconds(self.seconds * rhs)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds < 1.0 {
            write!(f, "{:.0}ms", self.seconds * 1000.0)
        } else {
            write!(f, "{:.2}s", self.seconds)
        }
    }
}
