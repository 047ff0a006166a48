//! Backoff policies for transport retries and push reconnects.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a multiplicative factor and optional jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub jitter: Jitter,
}

/// Jitter strategy applied to the computed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    None,
    /// Scale the delay by a random factor in `[1 - spread, 1 + spread]`.
    Proportional(f64),
    /// Pick uniformly in `[0, delay]` (decorrelates reconnect storms).
    Full,
}

impl ExponentialBackoff {
    /// Transport policy: 0.5s base, doubling, ±20% jitter.
    #[must_use]
    pub fn transport() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter: Jitter::Proportional(0.2),
        }
    }

    /// Push reconnect policy: 1s base, doubling, 60s cap, full jitter.
    #[must_use]
    pub fn reconnect() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            jitter: Jitter::Full,
        }
    }

    /// Rate-limit policy for command triggers: 1s, 2s, 4s.
    #[must_use]
    pub fn rate_limit() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(4),
            jitter: Jitter::None,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = raw.min(self.cap.as_secs_f64());
        let jittered = match self.jitter {
            Jitter::None => capped,
            Jitter::Proportional(spread) => {
                let factor = rand::thread_rng().gen_range(1.0 - spread..=1.0 + spread);
                capped * factor
            }
            Jitter::Full => rand::thread_rng().gen_range(0.0..=capped),
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_sequence_is_1_2_4() {
        let b = ExponentialBackoff::rate_limit();
        assert_eq!(b.delay(0), Duration::from_secs(1));
        assert_eq!(b.delay(1), Duration::from_secs(2));
        assert_eq!(b.delay(2), Duration::from_secs(4));
        assert_eq!(b.delay(5), Duration::from_secs(4)); // capped
    }

    #[test]
    fn transport_jitter_stays_within_spread() {
        let b = ExponentialBackoff::transport();
        for attempt in 0..3 {
            let nominal = 0.5 * 2f64.powi(attempt);
            for _ in 0..50 {
                let d = b.delay(attempt as u32).as_secs_f64();
                assert!(d >= nominal * 0.79 && d <= nominal * 1.21, "{d} vs {nominal}");
            }
        }
    }

    #[test]
    fn full_jitter_is_bounded_by_cap() {
        let b = ExponentialBackoff::reconnect();
        for _ in 0..100 {
            assert!(b.delay(20) <= Duration::from_secs(60));
        }
    }
}
