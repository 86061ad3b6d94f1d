//! Media clocks and cue classification for media-driven groups.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use fable_core::{Duration, Lifetime};

/// Playback position of one media group.
///
/// The engine keeps this clock itself and mirrors transport changes to the
/// [`MediaBackend`](crate::backend::MediaBackend), so cue timing does not
/// depend on the decoder reporting positions back.
#[derive(Clone)]
pub struct MediaClock {
    state: Arc<Mutex<ClockState>>,
    paused: Arc<watch::Sender<bool>>,
}

struct ClockState {
    /// When the current running stretch began; None while paused.
    anchor: Option<Instant>,
    /// Position accumulated before `anchor`.
    accumulated: std::time::Duration,
}

impl MediaClock {
    /// A clock that starts running at position zero.
    pub fn started() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(ClockState {
                anchor: Some(Instant::now()),
                accumulated: std::time::Duration::ZERO,
            })),
            paused: Arc::new(tx),
        }
    }

    pub fn position(&self) -> Duration {
        let state = self.state.lock();
        let running = state.anchor.map(|a| a.elapsed()).unwrap_or_default();
        Duration::from_std(state.accumulated + running)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(anchor) = state.anchor.take() {
            state.accumulated += anchor.elapsed();
            self.paused.send_replace(true);
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
            self.paused.send_replace(false);
        }
    }

    /// Wait until the clock has reached `target`, sleeping through pauses.
    pub async fn wait_until(&self, target: Duration) {
        let mut paused = self.paused.subscribe();
        loop {
            if *paused.borrow_and_update() {
                // The sender lives as long as `self`, so this only fails on teardown.
                if paused.changed().await.is_err() {
                    return;
                }
                continue;
            }
            let position = self.position();
            if position >= target {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep((target - position).to_std()) => {}
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClock")
            .field("position", &self.position())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// How a media cue is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueBucket {
    /// At or before the first tick: revealed synchronously on activation.
    Immediate,
    /// Revealed when the media clock crosses the offset.
    DeferredDurable,
    /// Instant child revealed at the offset, then held until it has been seen.
    DeferredInstant,
}

/// Classify a cue by its offset and the child's lifetime.
///
/// The first tick counts as "now" so same-frame reveals skip the timer.
pub fn classify_cue(offset: Duration, lifetime: &Lifetime, tick: Duration) -> CueBucket {
    if offset <= tick {
        CueBucket::Immediate
    } else if lifetime.is_instant() {
        CueBucket::DeferredInstant
    } else {
        CueBucket::DeferredDurable
    }
}

/// Media time at which a revealed child is taken down again, if it is finite.
pub fn removal_time(offset: Duration, lifetime: &Lifetime) -> Option<Duration> {
    lifetime.time_limit().map(|d| offset + d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_seconds(s)
    }

    #[test]
    fn test_classify_cue() {
        let tick = Duration::from_frames(1.0, 60.0);
        let steps = Lifetime::steps(1);
        assert_eq!(classify_cue(Duration::zero(), &steps, tick), CueBucket::Immediate);
        assert_eq!(classify_cue(tick, &Lifetime::Instant, tick), CueBucket::Immediate);
        assert_eq!(classify_cue(secs(1.0), &steps, tick), CueBucket::DeferredDurable);
        assert_eq!(
            classify_cue(secs(1.0), &Lifetime::Infinite, tick),
            CueBucket::DeferredDurable
        );
        assert_eq!(
            classify_cue(secs(1.0), &Lifetime::Instant, tick),
            CueBucket::DeferredInstant
        );
    }

    #[test]
    fn test_removal_time() {
        let timed = Lifetime::timed(secs(1.5));
        let at = removal_time(secs(2.0), &timed).unwrap();
        assert!((at.as_seconds() - 3.5).abs() < 0.001);
        assert!(removal_time(secs(2.0), &Lifetime::Infinite).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_runs_and_pauses() {
        let clock = MediaClock::started();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert!((clock.position().as_seconds() - 2.0).abs() < 0.01);

        clock.pause();
        assert!(clock.is_paused());
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert!((clock.position().as_seconds() - 2.0).abs() < 0.01);

        clock.resume();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert!((clock.position().as_seconds() - 3.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_sleeps_through_pause() {
        let clock = MediaClock::started();
        let waiter = clock.clone();
        let start = Instant::now();
        let task = tokio::spawn(async move { waiter.wait_until(secs(3.0)).await });

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        clock.pause();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(!task.is_finished());
        clock.resume();

        task.await.unwrap();
        let elapsed = start.elapsed().as_secs_f64();
        assert!((elapsed - 13.0).abs() < 0.05, "elapsed {}", elapsed);
    }
}
