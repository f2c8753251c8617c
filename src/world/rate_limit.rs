//! Per-session command throttling.
//!
//! A classic token bucket: each session starts with `max_tokens`, every
//! command costs one, and one token comes back per `fill_interval` of wall
//! time. Refill is computed lazily on each check, so there is no timer task
//! and a denial never blocks the caller.

use std::time::{Duration, Instant};

/// Default bucket capacity.
pub const DEFAULT_MAX_TOKENS: u32 = 5;

/// Default time to earn back one token.
pub const DEFAULT_FILL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CommandRateLimiter {
    tokens: u32,
    max_tokens: u32,
    fill_interval: Duration,
    last_refill: Instant,
}

impl CommandRateLimiter {
    pub fn new(max_tokens: u32, fill_interval: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            fill_interval,
            last_refill: Instant::now(),
        }
    }

    /// Check and consume one token now.
    pub fn is_allowed(&mut self) -> bool {
        self.is_allowed_at(Instant::now())
    }

    /// Check and consume one token as of `now`.
    pub fn is_allowed_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn refill(&mut self, now: Instant) {
        if self.tokens >= self.max_tokens {
            // A full bucket does not bank idle time.
            self.last_refill = now;
            return;
        }
        if self.fill_interval.is_zero() {
            self.tokens = self.max_tokens;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / self.fill_interval.as_nanos();
        if earned == 0 {
            return;
        }
        let room = u128::from(self.max_tokens - self.tokens);
        if earned >= room {
            self.tokens = self.max_tokens;
            self.last_refill = now;
        } else {
            // earned < room <= u32::MAX, so the casts are lossless.
            self.tokens += earned as u32;
            self.last_refill += self.fill_interval * earned as u32;
        }
    }
}

impl Default for CommandRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS, DEFAULT_FILL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_allowed_then_denied() {
        let mut limiter = CommandRateLimiter::new(5, Duration::from_secs(1));
        let now = Instant::now();
        for i in 0..5 {
            assert!(limiter.is_allowed_at(now), "call {} should pass", i + 1);
        }
        assert!(!limiter.is_allowed_at(now));
        assert_eq!(limiter.tokens(), 0);
    }

    #[test]
    fn one_interval_restores_a_token() {
        let mut limiter = CommandRateLimiter::new(5, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.is_allowed_at(start));
        }
        assert!(!limiter.is_allowed_at(start));
        let later = start + Duration::from_secs(1);
        assert!(limiter.is_allowed_at(later));
        assert!(!limiter.is_allowed_at(later));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let mut limiter = CommandRateLimiter::new(3, Duration::from_millis(100));
        let start = Instant::now();
        assert!(limiter.is_allowed_at(start));
        let much_later = start + Duration::from_secs(60);
        assert!(limiter.is_allowed_at(much_later));
        assert_eq!(limiter.tokens(), 2);
        assert!(limiter.tokens() <= limiter.max_tokens());
    }

    #[test]
    fn partial_intervals_accumulate_across_checks() {
        let mut limiter = CommandRateLimiter::new(1, Duration::from_secs(1));
        let start = Instant::now();
        assert!(limiter.is_allowed_at(start));
        assert!(!limiter.is_allowed_at(start + Duration::from_millis(600)));
        // 600ms + 600ms crosses one full interval even though each gap is shorter.
        assert!(limiter.is_allowed_at(start + Duration::from_millis(1200)));
    }

    #[test]
    fn real_clock_denies_a_burst() {
        let mut limiter = CommandRateLimiter::default();
        let allowed = (0..10).filter(|_| limiter.is_allowed()).count();
        assert_eq!(allowed, DEFAULT_MAX_TOKENS as usize);
    }
}
