//! Fixed-window counter state and the decision it produces.

use serde::{Deserialize, Serialize};

use super::policy::RateLimitPolicy;

/// The outcome of a single `check_and_increment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request fits inside the limit
    pub allowed: bool,
    /// Post-increment count for the current window
    pub count: u64,
    /// The limit this decision was made against
    pub limit: u64,
    /// `max(0, limit - count)`
    pub remaining: u64,
    /// End of the current window, Unix milliseconds (exclusive)
    pub reset_at: u64,
    /// Seconds until the window ends; only set on denial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl Decision {
    /// Window end in whole Unix seconds, as sent in `X-RateLimit-Reset`.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at / 1000
    }
}

/// Per-key counting state for one fixed window.
///
/// A `window_reset_at` of zero means the window was never opened (or was
/// reset), which the next check treats as a rollover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    count: u64,
    window_reset_at: u64,
}

impl CounterState {
    /// A never-used counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests counted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Exclusive end of the current window in Unix milliseconds, 0 if unset.
    pub fn window_reset_at(&self) -> u64 {
        self.window_reset_at
    }

    /// Count this request and decide whether it is within `policy`.
    ///
    /// The request is counted even when it exceeds the limit, so `count`
    /// may grow past `limit` until the window rolls over.
    pub fn check_and_increment(&mut self, policy: RateLimitPolicy, now_ms: u64) -> Decision {
        if now_ms >= self.window_reset_at {
            self.count = 0;
            self.window_reset_at = now_ms.saturating_add(policy.window_ms());
        }

        self.count += 1;

        let limit = policy.limit();
        let allowed = self.count <= limit;
        let retry_after_seconds = if allowed {
            None
        } else {
            Some(self.window_reset_at.saturating_sub(now_ms).div_ceil(1000))
        };

        Decision {
            allowed,
            count: self.count,
            limit,
            remaining: limit.saturating_sub(self.count),
            reset_at: self.window_reset_at,
            retry_after_seconds,
        }
    }

    /// Forget the current window entirely.
    pub fn reset(&mut self) {
        self.count = 0;
        self.window_reset_at = 0;
    }

    /// Whether the current window has ended at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.window_reset_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MAX_WINDOW_SECONDS;

    const T0: u64 = 1_700_000_000_000;

    fn policy(limit: u64, window_seconds: u64) -> RateLimitPolicy {
        RateLimitPolicy::new(limit, window_seconds).unwrap()
    }

    #[test]
    fn test_first_check_opens_window() {
        let mut state = CounterState::new();
        let decision = state.check_and_increment(policy(10, 60), T0);

        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, T0 + 60_000);
        assert_eq!(decision.retry_after_seconds, None);
    }

    #[test]
    fn test_five_per_minute_scenario() {
        let mut state = CounterState::new();
        let p = policy(5, 60);

        let decisions: Vec<Decision> = (0..6).map(|_| state.check_and_increment(p, T0)).collect();
        let allowed: Vec<bool> = decisions.iter().map(|d| d.allowed).collect();

        assert_eq!(allowed, vec![true, true, true, true, true, false]);
        assert_eq!(decisions[4].remaining, 0);
        assert_eq!(decisions[5].remaining, 0);
        assert_eq!(decisions[5].count, 6);
        assert_eq!(decisions[5].retry_after_seconds, Some(60));
    }

    #[test]
    fn test_limit_plus_one_is_denied_and_counted() {
        let mut state = CounterState::new();
        let p = policy(3, 10);

        for _ in 0..3 {
            assert!(state.check_and_increment(p, T0).allowed);
        }
        let denied = state.check_and_increment(p, T0 + 1);
        assert!(!denied.allowed);
        assert_eq!(denied.count, 4);

        // Denied requests keep counting.
        let again = state.check_and_increment(p, T0 + 2);
        assert_eq!(again.count, 5);
        assert_eq!(again.remaining, 0);
    }

    #[test]
    fn test_remaining_never_increases_within_window() {
        let mut state = CounterState::new();
        let p = policy(4, 60);
        let mut last = u64::MAX;

        for i in 0..10 {
            let decision = state.check_and_increment(p, T0 + i * 100);
            assert!(decision.remaining <= last);
            last = decision.remaining;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let mut state = CounterState::new();
        let p = policy(1, 60);

        state.check_and_increment(p, T0);
        let denied = state.check_and_increment(p, T0 + 59_001);
        assert_eq!(denied.retry_after_seconds, Some(1));

        let denied = state.check_and_increment(p, T0 + 30_500);
        assert_eq!(denied.retry_after_seconds, Some(30));
    }

    #[test]
    fn test_rollover_at_boundary_counts_triggering_call() {
        let mut state = CounterState::new();
        let p = policy(2, 60);

        for _ in 0..5 {
            state.check_and_increment(p, T0);
        }

        // Exactly at windowResetAt the window is over.
        let boundary = T0 + 60_000;
        let decision = state.check_and_increment(p, boundary);
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.reset_at, boundary + 60_000);
    }

    #[test]
    fn test_one_ms_before_boundary_stays_in_window() {
        let mut state = CounterState::new();
        let p = policy(1, 60);

        state.check_and_increment(p, T0);
        let decision = state.check_and_increment(p, T0 + 59_999);
        assert!(!decision.allowed);
        assert_eq!(decision.reset_at, T0 + 60_000);
    }

    #[test]
    fn test_longest_window_near_clock_limit_does_not_overflow() {
        let mut state = CounterState::new();
        let p = policy(1, MAX_WINDOW_SECONDS);
        let now = u64::MAX - 5;

        let first = state.check_and_increment(p, now);
        assert!(first.allowed);
        assert_eq!(first.reset_at, u64::MAX);

        let denied = state.check_and_increment(p, now + 1);
        assert!(!denied.allowed);
        assert_eq!(denied.count, 2);
        assert_eq!(denied.retry_after_seconds, Some(1));
    }

    #[test]
    fn test_longest_window_keeps_count() {
        let mut state = CounterState::new();
        let p = policy(2, MAX_WINDOW_SECONDS);

        state.check_and_increment(p, T0);
        let second = state.check_and_increment(p, T0 + 1);
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_at, T0 + MAX_WINDOW_SECONDS * 1000);
    }

    #[test]
    fn test_reset_matches_fresh_counter() {
        let p = policy(3, 60);

        let mut used = CounterState::new();
        for _ in 0..7 {
            used.check_and_increment(p, T0);
        }
        used.reset();
        assert_eq!(used, CounterState::new());

        let mut fresh = CounterState::new();
        assert_eq!(
            used.check_and_increment(p, T0 + 5),
            fresh.check_and_increment(p, T0 + 5)
        );
    }

    #[test]
    fn test_decision_wire_format() {
        let mut state = CounterState::new();
        let p = policy(1, 60);

        let allowed = serde_json::to_value(state.check_and_increment(p, T0)).unwrap();
        assert_eq!(allowed["resetAt"], T0 + 60_000);
        assert!(allowed.get("retryAfterSeconds").is_none());

        let denied = serde_json::to_value(state.check_and_increment(p, T0)).unwrap();
        assert_eq!(denied["allowed"], false);
        assert_eq!(denied["retryAfterSeconds"], 60);
    }
}
