use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How far apart outbound lookups are spaced inside one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    interval: Duration,
}

impl PacingPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Creates a fresh single-cell bucket; each stream gets its own.
    pub fn pacer(&self) -> Pacer {
        Pacer {
            limiter: Quota::with_period(self.interval).map(RateLimiter::direct),
        }
    }
}

/// Token bucket admitting one lookup per interval. The first call passes immediately.
pub struct Pacer {
    limiter: Option<Limiter>,
}

impl Pacer {
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn disabled_policy_never_waits() {
        let pacer = PacingPolicy::disabled().pacer();
        let started = Instant::now();
        for _ in 0..50 {
            pacer.ready().await;
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn spaces_calls_by_interval() {
        let pacer = PacingPolicy::new(Duration::from_millis(60)).pacer();
        let started = Instant::now();

        pacer.ready().await;
        assert!(started.elapsed() < Duration::from_millis(30));

        pacer.ready().await;
        pacer.ready().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
