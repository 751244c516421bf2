use std::time::Duration;

/// Multiplicative backoff used for empty queue polls and result store
/// polling. Starts at `initial`, grows by `factor` per miss and is
/// capped at `max`; a successful poll resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f32,
    max: Duration,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, factor: f32, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            current: initial,
        }
    }

    /// Returns the delay to sleep for and grows the next one.
    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f32(self.factor.max(1.0)).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_millis(350));

        assert_eq!(backoff.next(), Duration::from_millis(100));
        assert_eq!(backoff.next(), Duration::from_millis(200));
        assert_eq!(backoff.next(), Duration::from_millis(350));
        assert_eq!(backoff.next(), Duration::from_millis(350));
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 1.15, Duration::from_secs(10));

        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(100));
    }

    #[test]
    fn factor_below_one_never_shrinks() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 0.5, Duration::from_secs(1));

        assert_eq!(backoff.next(), Duration::from_millis(100));
        assert_eq!(backoff.next(), Duration::from_millis(100));
    }
}
