//! Token-bucket rate limiting for venue API budgets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use kimp_core::Venue;

use crate::wait::AdaptiveWait;

/// Lock-free token bucket: `rate` tokens per second refill, `burst` cap.
///
/// State is two atomics: the token count as `f64` bits and the last refill
/// time in nanoseconds since construction. Refill is CAS-gated so only one
/// caller advances the clock per window.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: AtomicU64,
    last_refill_ns: AtomicU64,
    origin: Instant,
}

impl TokenBucket {
    /// # Panics
    /// If `rate` is not positive or `burst` is zero.
    #[must_use]
    pub fn new(rate: f64, burst: usize) -> Self {
        assert!(rate > 0.0 && burst > 0, "bad rate limiter parameters");
        Self {
            rate,
            burst: burst as f64,
            tokens: AtomicU64::new((burst as f64).to_bits()),
            last_refill_ns: AtomicU64::new(0),
            origin: Instant::now(),
        }
    }

    fn refill(&self) {
        let now_ns = self.origin.elapsed().as_nanos() as u64;
        let last = self.last_refill_ns.load(Ordering::Relaxed);
        let elapsed = now_ns.saturating_sub(last) as f64 / 1e9;
        if elapsed < 0.001 {
            return;
        }
        // Whoever wins this CAS owns the refill for the elapsed window.
        if self
            .last_refill_ns
            .compare_exchange(last, now_ns, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let add = elapsed * self.rate;
        let mut current = self.tokens.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + add).min(self.burst);
            match self.tokens.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    /// Takes `count` tokens if available, without blocking.
    pub fn try_acquire(&self, count: usize) -> bool {
        self.refill();
        let needed = count as f64;
        let mut current = self.tokens.load(Ordering::Relaxed);
        while f64::from_bits(current) >= needed {
            match self.tokens.compare_exchange_weak(
                current,
                (f64::from_bits(current) - needed).to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(c) => current = c,
            }
        }
        false
    }

    /// Takes `count` tokens, waiting adaptively until they are available.
    pub fn acquire(&self, count: usize) {
        let mut waiter = AdaptiveWait::new();
        while !self.try_acquire(count) {
            waiter.wait();
        }
    }

    /// Like [`acquire`](Self::acquire) with a deadline; false on timeout.
    pub fn acquire_for(&self, count: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut waiter = AdaptiveWait::new();
        while !self.try_acquire(count) {
            if start.elapsed() >= timeout {
                return false;
            }
            waiter.wait();
        }
        true
    }

    /// Current token count (approximate under contention).
    #[must_use]
    pub fn tokens(&self) -> f64 {
        f64::from_bits(self.tokens.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[must_use]
    pub fn burst(&self) -> f64 {
        self.burst
    }
}

// =============================================================================
// Per-venue manager
// =============================================================================

/// Which API budget a call draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    /// Order placement/cancel: the strict budget.
    Order,
    /// Account and market queries.
    Query,
}

/// Rate parameters for one venue.
#[derive(Debug, Clone, Copy)]
pub struct VenueRateLimits {
    pub order_rate: f64,
    pub order_burst: usize,
    pub query_rate: f64,
    pub query_burst: usize,
}

/// Documented per-venue defaults.
#[must_use]
pub fn default_limits(venue: Venue) -> VenueRateLimits {
    match venue {
        Venue::UpbitKrw => VenueRateLimits {
            order_rate: 8.0,
            order_burst: 10,
            query_rate: 30.0,
            query_burst: 50,
        },
        Venue::BithumbKrw => VenueRateLimits {
            order_rate: 10.0,
            order_burst: 15,
            query_rate: 20.0,
            query_burst: 30,
        },
        Venue::BinanceUsdt => VenueRateLimits {
            order_rate: 20.0,
            order_burst: 30,
            query_rate: 100.0,
            query_burst: 150,
        },
        Venue::MexcUsdt => VenueRateLimits {
            order_rate: 20.0,
            order_burst: 30,
            query_rate: 50.0,
            query_burst: 80,
        },
    }
}

/// One token bucket per venue and API kind.
pub struct RateLimitManager {
    order: [TokenBucket; 4],
    query: [TokenBucket; 4],
}

impl RateLimitManager {
    /// Manager with the documented per-venue defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(|venue| default_limits(venue))
    }

    /// Manager with caller-supplied limits per venue.
    #[must_use]
    pub fn with_limits(limits: impl Fn(Venue) -> VenueRateLimits) -> Self {
        let order = std::array::from_fn(|i| {
            let l = limits(Venue::ALL[i]);
            TokenBucket::new(l.order_rate, l.order_burst)
        });
        let query = std::array::from_fn(|i| {
            let l = limits(Venue::ALL[i]);
            TokenBucket::new(l.query_rate, l.query_burst)
        });
        Self { order, query }
    }

    fn bucket(&self, venue: Venue, kind: ApiKind) -> &TokenBucket {
        match kind {
            ApiKind::Order => &self.order[venue.index()],
            ApiKind::Query => &self.query[venue.index()],
        }
    }

    pub fn acquire(&self, venue: Venue, kind: ApiKind, count: usize) {
        self.bucket(venue, kind).acquire(count);
    }

    pub fn try_acquire(&self, venue: Venue, kind: ApiKind, count: usize) -> bool {
        self.bucket(venue, kind).try_acquire(count)
    }

    pub fn acquire_for(
        &self,
        venue: Venue,
        kind: ApiKind,
        count: usize,
        timeout: Duration,
    ) -> bool {
        self.bucket(venue, kind).acquire_for(count, timeout)
    }

    #[must_use]
    pub fn tokens(&self, venue: Venue, kind: ApiKind) -> f64 {
        self.bucket(venue, kind).tokens()
    }
}

impl Default for RateLimitManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_deny() {
        // Refill rate low enough that no token can appear mid-test.
        let bucket = TokenBucket::new(0.1, 5);
        for _ in 0..5 {
            assert!(bucket.try_acquire(1));
        }
        assert!(!bucket.try_acquire(1));
    }

    #[test]
    fn test_rate_bound_over_window() {
        // rate 200/s, burst 10; over 250ms the total grants must stay
        // within burst + rate * t (plus slack for timer jitter).
        let bucket = TokenBucket::new(200.0, 10);
        let window = Duration::from_millis(250);
        let start = Instant::now();
        let mut granted = 0u64;
        while start.elapsed() < window {
            if bucket.try_acquire(1) {
                granted += 1;
            }
        }
        let elapsed = start.elapsed().as_secs_f64();
        let bound = 10.0 + 200.0 * elapsed * 1.25;
        assert!(
            (granted as f64) <= bound,
            "granted {granted} exceeds bound {bound}"
        );
        // And the refill actually happened: well above the burst alone.
        assert!(granted > 10);
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let bucket = TokenBucket::new(1_000_000.0, 3);
        assert!(bucket.try_acquire(3));
        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.try_acquire(1));
        assert!(bucket.tokens() <= 3.0);
    }

    #[test]
    fn test_acquire_for_times_out() {
        let bucket = TokenBucket::new(0.5, 1);
        assert!(bucket.try_acquire(1));
        assert!(!bucket.acquire_for(1, Duration::from_millis(30)));
    }

    #[test]
    fn test_acquire_blocks_until_refill() {
        let bucket = TokenBucket::new(100.0, 1);
        assert!(bucket.try_acquire(1));
        let start = Instant::now();
        bucket.acquire(1);
        assert!(start.elapsed() >= Duration::from_millis(1));
    }

    #[test]
    fn test_manager_budgets_are_independent() {
        let mgr = RateLimitManager::new();
        assert!(mgr.try_acquire(Venue::UpbitKrw, ApiKind::Order, 10));
        assert!(!mgr.try_acquire(Venue::UpbitKrw, ApiKind::Order, 1));
        // Query budget untouched, other venues untouched.
        assert!(mgr.try_acquire(Venue::UpbitKrw, ApiKind::Query, 1));
        assert!(mgr.try_acquire(Venue::BinanceUsdt, ApiKind::Order, 1));
    }
}
