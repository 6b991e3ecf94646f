use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::{ChatId, UserId};

const PRUNE_THRESHOLD: usize = 4096;

// ============== Flood limiter (token bucket) ==============

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Per-(user, chat) token bucket: `limit` messages, refilled over `window`.
#[derive(Clone, Debug)]
pub struct FloodLimiter {
    enabled: bool,
    max_tokens: f64,
    refill_per_sec: f64,
    buckets: HashMap<(UserId, ChatId), Bucket>,
}

impl FloodLimiter {
    /// `limit = 0` disables the limiter.
    pub fn new(limit: u32, window: Duration) -> Self {
        let max_tokens = limit as f64;
        let window_secs = window.as_secs_f64().max(1e-9);

        Self {
            enabled: limit > 0,
            max_tokens,
            refill_per_sec: max_tokens / window_secs,
            buckets: HashMap::new(),
        }
    }

    /// Consume one token; `false` means the sender is flooding.
    pub fn check(&mut self, user: UserId, chat: ChatId) -> bool {
        self.check_at(user, chat, Instant::now())
    }

    pub fn check_at(&mut self, user: UserId, chat: ChatId, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        if self.buckets.len() >= PRUNE_THRESHOLD {
            self.prune(now);
        }

        let bucket = self.buckets.entry((user, chat)).or_insert_with(|| Bucket {
            tokens: self.max_tokens,
            last_update: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return true;
        }
        false
    }

    /// Drop buckets that have refilled completely.
    pub fn prune(&mut self, now: Instant) {
        let max = self.max_tokens;
        let rate = self.refill_per_sec;
        self.buckets.retain(|_, b| {
            let elapsed = now.saturating_duration_since(b.last_update).as_secs_f64();
            b.tokens + elapsed * rate < max
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_drains_then_refills() {
        let mut lim = FloodLimiter::new(2, Duration::from_secs(2));
        let t0 = Instant::now();
        let (u, c) = (UserId(1), ChatId(-1));

        assert!(lim.check_at(u, c, t0));
        assert!(lim.check_at(u, c, t0));
        assert!(!lim.check_at(u, c, t0));

        // One token per second.
        assert!(lim.check_at(u, c, t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn buckets_are_per_user_and_chat() {
        let mut lim = FloodLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(lim.check_at(UserId(1), ChatId(-1), t0));
        assert!(!lim.check_at(UserId(1), ChatId(-1), t0));
        assert!(lim.check_at(UserId(1), ChatId(-2), t0));
        assert!(lim.check_at(UserId(2), ChatId(-1), t0));
    }

    #[test]
    fn zero_limit_disables() {
        let mut lim = FloodLimiter::new(0, Duration::from_secs(10));
        for _ in 0..100 {
            assert!(lim.check(UserId(1), ChatId(-1)));
        }
    }

    #[test]
    fn prune_drops_full_buckets() {
        let mut lim = FloodLimiter::new(1, Duration::from_secs(1));
        let t0 = Instant::now();
        lim.check_at(UserId(1), ChatId(-1), t0);
        lim.prune(t0 + Duration::from_secs(5));
        assert!(lim.buckets.is_empty());
    }
}
