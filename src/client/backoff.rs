use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_MS: u64 = 200;
/// Upper bound on the retry delay.
pub const DEFAULT_MAX_MS: u64 = 3000;

/// Reconnect timing as read from the `[backoff]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_initial_ms() -> u64 {
    DEFAULT_INITIAL_MS
}

fn default_max_ms() -> u64 {
    DEFAULT_MAX_MS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_INITIAL_MS,
            max_ms: DEFAULT_MAX_MS,
        }
    }
}

/// Doubling delay between failed connection attempts, capped and resettable.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to sleep now; the following one is doubled up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Back to the initial delay, after a successful authentication.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Backoff::new(
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
        )
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::from(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(backoff: &mut Backoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_delay().as_millis() as u64).collect()
    }

    #[test]
    fn test_backoff_sequence_is_capped() {
        let mut backoff = Backoff::default();
        assert_eq!(millis(&mut backoff, 7), vec![200, 400, 800, 1600, 3000, 3000, 3000]);
    }

    #[test]
    fn test_backoff_resets_after_success() {
        let mut backoff = Backoff::default();
        millis(&mut backoff, 4);
        backoff.reset();
        assert_eq!(millis(&mut backoff, 3), vec![200, 400, 800]);
    }

    #[test]
    fn test_backoff_max_never_below_initial() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(100));
        assert_eq!(millis(&mut backoff, 2), vec![500, 500]);
    }
}
