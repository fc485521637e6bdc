//! Blocking cooldown waits.
//!
//! The backfill engine never calls `thread::sleep` directly; it asks a
//! [`Sleeper`] so tests can shrink waits to zero and count them.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Why the engine is pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    /// The upstream had no sample for a target; wait before re-asking.
    Gap,
    /// A batch of new points was stored; respect the upstream rate limit.
    Pacing,
}

impl fmt::Display for CooldownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownReason::Gap => write!(f, "gap retry"),
            CooldownReason::Pacing => write!(f, "rate-limit pacing"),
        }
    }
}

pub trait Sleeper {
    fn pause(&self, reason: CooldownReason, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn pause(&self, _reason: CooldownReason, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records every requested pause without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<(CooldownReason, Duration)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All pauses requested so far, in order.
    pub fn pauses(&self) -> Vec<(CooldownReason, Duration)> {
        self.pauses.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn count(&self, reason: CooldownReason) -> usize {
        self.pauses().iter().filter(|(r, _)| *r == reason).count()
    }
}

impl Sleeper for RecordingSleeper {
    fn pause(&self, reason: CooldownReason, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push((reason, duration));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn thread_sleeper_skips_zero_waits() {
        let start = Instant::now();
        ThreadSleeper.pause(CooldownReason::Pacing, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn recording_sleeper_keeps_order_and_reasons() {
        let sleeper = RecordingSleeper::new();
        sleeper.pause(CooldownReason::Gap, Duration::from_secs(60));
        sleeper.pause(CooldownReason::Pacing, Duration::from_secs(30));
        sleeper.pause(CooldownReason::Gap, Duration::from_secs(60));

        assert_eq!(sleeper.count(CooldownReason::Gap), 2);
        assert_eq!(sleeper.count(CooldownReason::Pacing), 1);
        assert_eq!(
            sleeper.pauses()[1],
            (CooldownReason::Pacing, Duration::from_secs(30))
        );
    }
}
