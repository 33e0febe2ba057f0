//! Token bucket limiter with reservations.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum number of requests admitted without pacing.
const CAPACITY: f64 = 1.0;

/// Mutable accounting state, always accessed under the limiter's lock.
#[derive(Debug)]
struct BucketState {
    /// Available tokens. Drops below zero while reservations are outstanding.
    tokens: f64,
    /// When `tokens` was last brought up to date
    last_refill: Instant,
    /// Earliest slot the next reservation can be granted
    next_available: Instant,
}

impl BucketState {
    /// Credit the tokens accrued since the last update, capped at capacity.
    fn refill(&mut self, now: Instant, rate: f64) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * rate).min(CAPACITY);
            self.last_refill = now;
        }
    }
}

/// A token bucket holding a single token that refills at a fixed rate.
///
/// This struct is thread-safe and is meant to be shared by every request
/// going through one throttler. The lock is only held for the arithmetic,
/// never while a caller waits for its slot.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    /// Refill rate in tokens per second
    rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Create a full bucket refilling at `rate` tokens per second.
    ///
    /// `rate` must be positive and finite.
    pub fn new(rate: f64) -> Self {
        Self::new_at(rate, Instant::now())
    }

    pub(crate) fn new_at(rate: f64, now: Instant) -> Self {
        debug_assert!(rate.is_finite() && rate > 0.0, "rate must be positive");
        Self {
            rate,
            state: Mutex::new(BucketState {
                tokens: CAPACITY,
                last_refill: now,
                next_available: now,
            }),
        }
    }

    /// The refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// The earliest instant at which the next reservation would have a token.
    ///
    /// Never decreases. Lies in the past once the bucket has refilled.
    pub fn next_available(&self) -> Instant {
        self.state.lock().next_available
    }

    /// Time between two consecutive slots.
    fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.rate).unwrap_or(Duration::MAX)
    }

    /// Record that `slot` has been granted.
    fn advance_past(&self, state: &mut BucketState, slot: Instant) {
        let following = slot.checked_add(self.interval()).unwrap_or(slot);
        state.next_available = state.next_available.max(following);
    }

    /// Take a token if one is available right now.
    ///
    /// Never waits and never reserves a future slot.
    pub fn try_acquire_now(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.refill(now, self.rate);

        if state.tokens < 1.0 {
            return false;
        }
        state.tokens -= 1.0;
        self.advance_past(&mut state, now);
        true
    }

    /// Reserve the next free slot and return how long to wait for it.
    ///
    /// Reservations are granted in call order and are never handed back,
    /// even if the caller stops waiting.
    pub fn reserve_delay(&self) -> Duration {
        self.reserve_at(Instant::now())
    }

    pub(crate) fn reserve_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        state.refill(now, self.rate);

        state.tokens -= 1.0;
        let delay = if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-state.tokens / self.rate).unwrap_or(Duration::MAX)
        };

        let slot = now.checked_add(delay).unwrap_or(state.next_available);
        self.advance_past(&mut state, slot);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// Durations computed through f64 may be off by a few nanoseconds.
    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff < Duration::from_micros(1),
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_first_acquire_is_free() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(5.0, start);

        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start));
    }

    #[test]
    fn test_acquire_after_refill() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(5.0, start);

        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start + ms(100)));
        assert!(limiter.try_acquire_at(start + ms(210)));
    }

    #[test]
    fn test_idle_bucket_caps_at_one_token() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);

        let later = start + Duration::from_secs(60);
        assert!(limiter.try_acquire_at(later));
        assert!(!limiter.try_acquire_at(later));
    }

    #[test]
    fn test_reservations_are_spaced_by_rate() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);

        assert_eq!(limiter.reserve_at(start), Duration::ZERO);
        assert_close(limiter.reserve_at(start), ms(100));
        assert_close(limiter.reserve_at(start), ms(200));
        assert_close(limiter.reserve_at(start), ms(300));
        assert_close(limiter.next_available() - start, ms(400));
    }

    #[test]
    fn test_next_available_predicts_next_reservation() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);
        assert_eq!(limiter.next_available(), start);

        assert!(limiter.try_acquire_at(start));
        let predicted = limiter.next_available() - start;
        assert_close(predicted, ms(100));
        assert_close(limiter.reserve_at(start), predicted);

        let now = start + ms(30);
        let predicted = limiter.next_available() - now;
        assert_close(predicted, ms(170));
        assert_close(limiter.reserve_at(now), predicted);
        assert_close(limiter.next_available() - start, ms(300));
    }

    #[test]
    fn test_rate_is_fixed_at_construction() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(2.5, start);
        assert_eq!(limiter.rate(), 2.5);

        limiter.reserve_at(start);
        limiter.reserve_at(start + ms(100));
        assert_eq!(limiter.rate(), 2.5);
        // One slot every 1 / 2.5 s
        assert_close(limiter.reserve_at(start + ms(100)), ms(700));
    }

    #[test]
    fn test_reservation_accounts_for_elapsed_time() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);

        assert_eq!(limiter.reserve_at(start), Duration::ZERO);
        assert_close(limiter.reserve_at(start + ms(40)), ms(60));
        // Previous slot lands at 100ms, so this one lands at 200ms
        assert_close(limiter.reserve_at(start + ms(150)), ms(50));
    }

    #[test]
    fn test_try_acquire_does_not_jump_the_queue() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);

        limiter.reserve_at(start);
        limiter.reserve_at(start);
        limiter.reserve_at(start);

        // Reservations hold the slots up to 200ms; the next free one is at 300ms
        assert!(!limiter.try_acquire_at(start + ms(150)));
        assert!(!limiter.try_acquire_at(start + ms(250)));
        assert!(limiter.try_acquire_at(start + ms(310)));
    }

    #[test]
    fn test_failed_acquire_reserves_nothing() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(10.0, start);

        assert!(limiter.try_acquire_at(start));
        for _ in 0..10 {
            assert!(!limiter.try_acquire_at(start));
        }
        assert_close(limiter.reserve_at(start), ms(100));
    }

    #[test]
    fn test_next_available_is_monotonic() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(4.0, start);

        let mut previous = limiter.next_available();
        for i in 0..20u64 {
            let now = start + ms(i * 30);
            if i % 3 == 0 {
                limiter.try_acquire_at(now);
            } else {
                limiter.reserve_at(now);
            }
            let current = limiter.next_available();
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_slow_rate_does_not_overflow() {
        let start = Instant::now();
        let limiter = TokenBucketLimiter::new_at(1.0 / 86_400.0, start);

        assert_eq!(limiter.reserve_at(start), Duration::ZERO);
        assert_close(limiter.reserve_at(start), Duration::from_secs(86_400));
    }

    #[test]
    fn test_concurrent_reservations_get_distinct_slots() {
        let start = Instant::now();
        let limiter = Arc::new(TokenBucketLimiter::new_at(100.0, start));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50).map(|_| limiter.reserve_at(start)).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut delays: Vec<Duration> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        delays.sort();

        assert_eq!(delays.len(), 400);
        assert_eq!(delays[0], Duration::ZERO);
        for pair in delays.windows(2) {
            // Consecutive slots are exactly one refill period apart
            assert_close(pair[1] - pair[0], ms(10));
        }
    }
}
