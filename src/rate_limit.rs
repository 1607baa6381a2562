// Sliding-window admission control for outgoing prompts.
//
// The window is re-evaluated on every call; nothing runs on a timer. Stale
// timestamps are pruned lazily at the start of each `try_admit`.

use std::collections::VecDeque;

/// Outcome of a single admission attempt. Both variants carry the number of
/// admissions left in the window *after* the decision, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        remaining: usize,
    },
    Rejected {
        /// Whole seconds until the oldest admission leaves the window.
        wait_seconds: u64,
        /// Epoch milliseconds at which a retry will be admitted.
        retry_at_ms: i64,
        remaining: usize,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    pub fn remaining(&self) -> usize {
        match *self {
            Admission::Admitted { remaining } | Admission::Rejected { remaining, .. } => remaining,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window_ms: i64,
    // Insertion order is admission order; equal timestamps keep call order.
    admissions: VecDeque<i64>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window_ms: u64) -> Self {
        Self {
            capacity,
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
            admissions: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Prunes the window relative to `now_ms` and admits if there is room.
    pub fn try_admit(&mut self, now_ms: i64) -> Admission {
        self.prune(now_ms);

        if self.admissions.len() >= self.capacity {
            // An empty window with zero capacity never frees up; report a full window.
            let oldest = self.admissions.iter().copied().min().unwrap_or(now_ms);
            let retry_at_ms = oldest.saturating_add(self.window_ms);
            let wait_ms = retry_at_ms.saturating_sub(now_ms).max(0);
            let wait_seconds = u64::try_from(wait_ms).unwrap_or(0).div_ceil(1000);
            log::debug!(
                "Rate limit reached ({} in window), retry in {}s",
                self.admissions.len(),
                wait_seconds
            );
            return Admission::Rejected {
                wait_seconds,
                retry_at_ms,
                remaining: self.remaining(),
            };
        }

        self.admissions.push_back(now_ms);
        Admission::Admitted {
            remaining: self.remaining(),
        }
    }

    /// Admissions left without pruning; a later `try_admit` may find more.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.admissions.len())
    }

    fn prune(&mut self, now_ms: i64) {
        let window_ms = self.window_ms;
        self.admissions
            .retain(|&admitted_at| now_ms.saturating_sub(admitted_at) < window_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 60_000;

    #[test]
    fn test_full_window_scenario() {
        let mut limiter = RateLimiter::new(5, WINDOW);
        for expected_remaining in (0..5).rev() {
            assert_eq!(
                limiter.try_admit(0),
                Admission::Admitted {
                    remaining: expected_remaining
                }
            );
        }

        assert_eq!(
            limiter.try_admit(0),
            Admission::Rejected {
                wait_seconds: 60,
                retry_at_ms: 60_000,
                remaining: 0
            }
        );
        assert!(limiter.try_admit(61_000).is_admitted());
    }

    #[test]
    fn test_overflow_always_waits() {
        for capacity in 1..8 {
            let mut limiter = RateLimiter::new(capacity, WINDOW);
            for i in 0..capacity {
                assert!(limiter.try_admit(i as i64 * 1_000).is_admitted());
            }
            match limiter.try_admit(capacity as i64 * 1_000) {
                Admission::Rejected { wait_seconds, .. } => assert!(wait_seconds > 0),
                other => panic!("expected rejection, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_wait_rounds_up() {
        let mut limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.try_admit(1_000).is_admitted());
        // 60_000 - 500 = 59.5s left
        match limiter.try_admit(1_500) {
            Admission::Rejected { wait_seconds, retry_at_ms, .. } => {
                assert_eq!(wait_seconds, 60);
                assert_eq!(retry_at_ms, 61_000);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        // 1ms before the window frees up still costs a full second
        assert!(matches!(
            limiter.try_admit(60_999),
            Admission::Rejected { wait_seconds: 1, .. }
        ));
    }

    #[test]
    fn test_window_slides_one_entry_at_a_time() {
        let mut limiter = RateLimiter::new(2, WINDOW);
        assert!(limiter.try_admit(0).is_admitted());
        assert!(limiter.try_admit(30_000).is_admitted());
        assert!(!limiter.try_admit(59_999).is_admitted());

        // Only the t=0 entry has expired
        assert_eq!(limiter.try_admit(60_000), Admission::Admitted { remaining: 0 });
        assert!(matches!(
            limiter.try_admit(60_001),
            Admission::Rejected { retry_at_ms: 90_000, .. }
        ));
    }

    #[test]
    fn test_rejection_does_not_consume_capacity() {
        let mut limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.try_admit(0).is_admitted());
        for t in [1, 2, 3] {
            assert!(!limiter.try_admit(t).is_admitted());
        }
        assert_eq!(limiter.remaining(), 0);
        assert!(limiter.try_admit(60_000).is_admitted());
    }

    #[test]
    fn test_same_millisecond_counts_each_call() {
        let mut limiter = RateLimiter::new(3, WINDOW);
        assert_eq!(limiter.try_admit(5), Admission::Admitted { remaining: 2 });
        assert_eq!(limiter.try_admit(5), Admission::Admitted { remaining: 1 });
        assert_eq!(limiter.try_admit(5), Admission::Admitted { remaining: 0 });
        assert!(!limiter.try_admit(5).is_admitted());
    }

    #[test]
    fn test_zero_capacity_rejects() {
        let mut limiter = RateLimiter::new(0, WINDOW);
        assert!(matches!(
            limiter.try_admit(10),
            Admission::Rejected { remaining: 0, .. }
        ));
    }
}
