//! Leaky-bucket bandwidth limiter.
//!
//! The pump owns its limiter exclusively; the type is deliberately not
//! shareable across tasks. The budget regenerates continuously and
//! linearly up to `capacity` over one `window`, so short bursts up to the
//! capacity are allowed while sustained throughput is bounded.

use std::time::{Duration, Instant};

/// A leaky bucket tracking a byte budget over a time window.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: u64,
    window: Duration,
    available: f64,
    last_refill: Instant,
}

impl LeakyBucket {
    /// Create a bucket that starts full.
    #[must_use]
    pub fn new(capacity: u64, window: Duration) -> Self {
        Self::new_at(capacity, window, Instant::now())
    }

    fn new_at(capacity: u64, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            window,
            available: capacity as f64,
            last_refill: now,
        }
    }

    /// Deduct `n` bytes from the budget if at least `n` are available.
    ///
    /// Returns `false` without consuming anything when the budget is
    /// insufficient. The caller decides how to back off; refusal is a
    /// flow-control signal, not an error.
    pub fn try_consume(&mut self, n: usize) -> bool {
        self.consume_at(n, Instant::now())
    }

    /// Bytes currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.available as u64
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn consume_at(&mut self, n: usize, now: Instant) -> bool {
        self.refill(now);

        let n = n as f64;
        if n <= self.available {
            self.available -= n;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if !elapsed.is_zero() && !self.window.is_zero() {
            let regenerated =
                self.capacity as f64 * (elapsed.as_secs_f64() / self.window.as_secs_f64());
            self.available = (self.available + regenerated).min(self.capacity as f64);
        }
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_starts_full() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(1000, WINDOW, start);
        assert_eq!(bucket.available(), 1000);
        assert!(bucket.consume_at(1000, start));
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_conservation_without_elapsed_time() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(1000, WINDOW, start);

        // 4 successful consumes of 200 deduct exactly 800.
        for _ in 0..4 {
            assert!(bucket.consume_at(200, start));
        }
        assert_eq!(bucket.available(), 200);

        // One byte over the remaining budget is refused, nothing deducted.
        assert!(!bucket.consume_at(201, start));
        assert_eq!(bucket.available(), 200);

        // The exact remainder still fits.
        assert!(bucket.consume_at(200, start));
        assert!(!bucket.consume_at(1, start));
    }

    #[test]
    fn test_refill_after_full_window() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(1000, WINDOW, start);
        assert!(bucket.consume_at(1000, start));
        assert!(!bucket.consume_at(1, start));

        // A full window later the entire capacity is back.
        assert!(bucket.consume_at(1000, start + WINDOW));
    }

    #[test]
    fn test_refill_is_linear() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(1000, WINDOW, start);
        assert!(bucket.consume_at(1000, start));

        // Half a window regenerates half the capacity.
        let halfway = start + WINDOW / 2;
        assert!(bucket.consume_at(500, halfway));
        assert!(!bucket.consume_at(1, halfway));
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(1000, WINDOW, start);

        // Ten windows of idle time still cap out at capacity.
        assert!(!bucket.consume_at(1001, start + WINDOW * 10));
        assert!(bucket.consume_at(1000, start + WINDOW * 10));
    }

    #[test]
    fn test_oversized_request_always_refused() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new_at(100, WINDOW, start);
        assert!(!bucket.consume_at(101, start));
        assert_eq!(bucket.available(), 100);
    }
}
