//! Lifetime policies: how long a node stays active once activated.
//!
//! Lifetimes are plain values. Every transition returns a new value which the
//! owner writes back into its node; nothing here mutates in place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::Duration;

/// Policy for how long a node stays active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Lifetime {
    /// Survives `count` advancement steps.
    CountBased { count: i64 },
    /// Over only once a timer has marked it expired. Elapsed wall time is
    /// never polled.
    TimeBased { duration: Duration, expired: bool },
    /// Over immediately; used by one-shot events.
    Instant,
    /// Never over.
    Infinite,
    /// Externally controlled flag. Group nodes derive it from their children.
    Indefinite { is_over: bool },
}

impl Lifetime {
    /// `CountBased(count)`.
    pub fn steps(count: i64) -> Self {
        Lifetime::CountBased { count }
    }

    /// A fresh, unexpired `TimeBased` lifetime.
    pub fn timed(duration: Duration) -> Self {
        Lifetime::TimeBased {
            duration,
            expired: false,
        }
    }

    /// An `Indefinite` lifetime that is not over yet.
    pub fn indefinite() -> Self {
        Lifetime::Indefinite { is_over: false }
    }

    pub fn is_over(&self) -> bool {
        match *self {
            Lifetime::CountBased { count } => count <= 0,
            Lifetime::TimeBased { expired, .. } => expired,
            Lifetime::Instant => true,
            Lifetime::Infinite => false,
            Lifetime::Indefinite { is_over } => is_over,
        }
    }

    /// One advancement step later. Only `CountBased` changes.
    pub fn decreased(&self) -> Self {
        match *self {
            Lifetime::CountBased { count } => Lifetime::CountBased {
                count: count.saturating_sub(1),
            },
            other => other,
        }
    }

    /// The lifetime after its timer fired. Only `TimeBased` changes.
    pub fn expired(&self) -> Self {
        match *self {
            Lifetime::TimeBased { duration, .. } => Lifetime::TimeBased {
                duration,
                expired: true,
            },
            other => other,
        }
    }

    /// Set the externally controlled flag. Only `Indefinite` changes.
    pub fn with_over(&self, over: bool) -> Self {
        match *self {
            Lifetime::Indefinite { .. } => Lifetime::Indefinite { is_over: over },
            other => other,
        }
    }

    pub fn is_count_based(&self) -> bool {
        matches!(self, Lifetime::CountBased { .. })
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, Lifetime::Instant)
    }

    pub fn is_indefinite(&self) -> bool {
        matches!(self, Lifetime::Indefinite { .. })
    }

    /// The finite duration of a `TimeBased` lifetime.
    pub fn time_limit(&self) -> Option<Duration> {
        match *self {
            Lifetime::TimeBased { duration, .. } => Some(duration),
            _ => None,
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::CountBased { count: 1 }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::CountBased { count } => write!(f, "steps({})", count),
            Lifetime::TimeBased { duration, expired } => {
                write!(f, "time({}{})", duration, if *expired { ", expired" } else { "" })
            }
            Lifetime::Instant => write!(f, "instant"),
            Lifetime::Infinite => write!(f, "infinite"),
            Lifetime::Indefinite { is_over } => write!(f, "indefinite(over: {})", is_over),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_based_over_on_nth_decrease() {
        for n in 1..6 {
            let mut lifetime = Lifetime::steps(n);
            for step in 1..=n {
                assert!(!lifetime.is_over(), "over too early at step {step} of {n}");
                lifetime = lifetime.decreased();
            }
            assert!(lifetime.is_over());
        }
    }

    #[test]
    fn test_count_based_zero_is_over() {
        assert!(Lifetime::steps(0).is_over());
        assert!(Lifetime::steps(-2).is_over());
    }

    #[test]
    fn test_count_based_decrease_saturates() {
        let floor: Lifetime = serde_json::from_str(&format!(
            r#"{{"policy":"count_based","count":{}}}"#,
            i64::MIN
        ))
        .unwrap();
        assert_eq!(floor.decreased(), Lifetime::steps(i64::MIN));
        assert!(floor.decreased().is_over());
    }

    #[test]
    fn test_time_based_negative_duration_clamps() {
        let lifetime: Lifetime = serde_json::from_str(
            r#"{"policy":"time_based","duration":{"seconds":-4.0},"expired":false}"#,
        )
        .unwrap();
        assert_eq!(lifetime.time_limit(), Some(Duration::zero()));
    }

    #[test]
    fn test_time_based_only_over_after_expired() {
        let lifetime = Lifetime::timed(Duration::from_seconds(0.0));
        assert!(!lifetime.is_over());
        assert!(!lifetime.decreased().is_over());
        assert!(lifetime.expired().is_over());
        assert_eq!(lifetime.expired().time_limit(), Some(Duration::zero()));
    }

    #[test]
    fn test_transitions_leave_other_variants_alone() {
        for lifetime in [Lifetime::Instant, Lifetime::Infinite, Lifetime::indefinite()] {
            assert_eq!(lifetime.decreased(), lifetime);
            assert_eq!(lifetime.expired(), lifetime);
        }
        assert_eq!(Lifetime::steps(2).expired(), Lifetime::steps(2));
        assert_eq!(Lifetime::steps(2).with_over(true), Lifetime::steps(2));
    }

    #[test]
    fn test_instant_and_infinite() {
        assert!(Lifetime::Instant.is_over());
        assert!(!Lifetime::Infinite.is_over());
    }

    #[test]
    fn test_indefinite_flag() {
        let lifetime = Lifetime::indefinite();
        assert!(!lifetime.is_over());
        assert!(lifetime.with_over(true).is_over());
    }

    #[test]
    fn test_default_is_one_step() {
        assert_eq!(Lifetime::default(), Lifetime::steps(1));
    }

    #[test]
    fn test_lifetime_serde_shape() {
        let json = serde_json::to_string(&Lifetime::steps(2)).unwrap();
        assert_eq!(json, r#"{"policy":"count_based","count":2}"#);
        let back: Lifetime = serde_json::from_str(r#"{"policy":"instant"}"#).unwrap();
        assert_eq!(back, Lifetime::Instant);
    }
}
