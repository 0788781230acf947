use rand::Rng;
use std::time::Duration;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const MULTIPLIER: f64 = 1.5;

/// Exponential reconnect delay with ±20% jitter.
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self::with_bounds(INITIAL_DELAY, MAX_DELAY)
    }

    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.as_secs_f64();
        let jitter: f64 = rand::rng().random_range(0.8..=1.2);
        let cap = self.max.as_secs_f64();

        let delay = Duration::from_secs_f64((base * jitter).min(cap));
        self.current = Duration::from_secs_f64((base * MULTIPLIER).min(cap));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_increases() {
        let mut b = Backoff::new();
        let d1 = b.next_delay();
        let d2 = b.next_delay();
        let d3 = b.next_delay();
        assert!(d1.as_secs_f64() >= 0.79);
        assert!(d2.as_secs_f64() > d1.as_secs_f64() * 0.8);
        assert!(d3.as_secs_f64() <= 60.0);
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let mut b = Backoff::new();
        for _ in 0..50 {
            b.next_delay();
        }
        assert!(b.next_delay() <= MAX_DELAY);
    }

    #[test]
    fn test_backoff_reset() {
        let mut b = Backoff::new();
        for _ in 0..20 {
            b.next_delay();
        }
        b.reset();
        assert!(b.next_delay().as_secs_f64() < 1.3);
    }
}
