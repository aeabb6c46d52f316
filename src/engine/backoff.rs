// src/engine/backoff.rs

use std::time::Duration;

/// Bounded exponential backoff for polling sweeps.
///
/// Starts at `initial`, doubles after every empty sweep, never exceeds `max`.
/// The runtime builds a fresh backoff each time it starts waiting for the
/// next completion, so a burst of completions is picked up quickly.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl PollBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to sleep now; advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
