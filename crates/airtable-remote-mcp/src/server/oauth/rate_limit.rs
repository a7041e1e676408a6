//! Sliding-window rate limiting for the OAuth endpoints.
//!
//! Each (subject, endpoint class) pair keeps its own window of request
//! timestamps, so one noisy client cannot starve the others.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::{RateBudget, RateBudgets};

/// OAuth endpoint classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// `POST /register`, keyed by caller IP.
    Register,
    /// `GET /authorize`, keyed by client id.
    Authorize,
    /// `POST /token`, keyed by client id.
    Token,
    /// `POST /introspect` and `POST /revoke`, keyed by caller IP.
    Introspect,
}

/// Per-subject sliding-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<(String, EndpointClass), VecDeque<Instant>>,
    budgets: RateBudgets,
}

impl RateLimiter {
    #[must_use]
    pub fn new(budgets: RateBudgets) -> Self {
        Self { windows: DashMap::new(), budgets }
    }

    /// Record a request for `subject` against `class` at `now`.
    ///
    /// # Errors
    ///
    /// Returns the suggested `Retry-After` duration when the budget is
    /// exhausted. A denied request is not recorded.
    pub fn allow(
        &self,
        subject: &str,
        class: EndpointClass,
        now: Instant,
    ) -> Result<(), Duration> {
        let budget = self.budget(class);

        let mut window = self.windows.entry((subject.to_owned(), class)).or_default();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= budget.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= budget.max_requests as usize {
            let oldest = window.front().copied().unwrap_or(now);
            let retry_after =
                budget.window.saturating_sub(now.saturating_duration_since(oldest));
            return Err(retry_after);
        }

        window.push_back(now);
        Ok(())
    }

    /// Drop windows whose newest timestamp is older than its class window.
    ///
    /// Returns the number of subjects evicted.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|(_, class), window| {
            let budget = budget_for(&self.budgets, *class);
            window
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < budget.window)
        });
        before - self.windows.len()
    }

    /// Number of tracked (subject, class) windows.
    #[must_use]
    pub fn tracked_subjects(&self) -> usize {
        self.windows.len()
    }

    fn budget(&self, class: EndpointClass) -> RateBudget {
        budget_for(&self.budgets, class)
    }
}

fn budget_for(budgets: &RateBudgets, class: EndpointClass) -> RateBudget {
    match class {
        EndpointClass::Register => budgets.register,
        EndpointClass::Authorize => budgets.authorize,
        EndpointClass::Token => budgets.token,
        EndpointClass::Introspect => budgets.introspect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budgets(max_requests: u32, window_secs: u64) -> RateBudgets {
        let budget = RateBudget::new(max_requests, window_secs);
        RateBudgets { register: budget, authorize: budget, token: budget, introspect: budget }
    }

    #[test]
    fn test_nth_allowed_n_plus_first_denied() {
        let limiter = RateLimiter::new(budgets(3, 300));
        let now = Instant::now();

        assert!(limiter.allow("1.2.3.4", EndpointClass::Register, now).is_ok());
        assert!(limiter.allow("1.2.3.4", EndpointClass::Register, now).is_ok());
        assert!(limiter.allow("1.2.3.4", EndpointClass::Register, now).is_ok());

        let retry_after = limiter.allow("1.2.3.4", EndpointClass::Register, now).unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(300));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(budgets(2, 300));
        let start = Instant::now();

        assert!(limiter.allow("client1", EndpointClass::Token, start).is_ok());
        assert!(limiter
            .allow("client1", EndpointClass::Token, start + Duration::from_secs(100))
            .is_ok());
        assert!(limiter
            .allow("client1", EndpointClass::Token, start + Duration::from_secs(200))
            .is_err());

        // First timestamp ages out at start+300.
        assert!(limiter
            .allow("client1", EndpointClass::Token, start + Duration::from_secs(300))
            .is_ok());
    }

    #[test]
    fn test_subjects_are_independent() {
        let limiter = RateLimiter::new(budgets(1, 300));
        let now = Instant::now();

        assert!(limiter.allow("a", EndpointClass::Register, now).is_ok());
        assert!(limiter.allow("a", EndpointClass::Register, now).is_err());
        assert!(limiter.allow("b", EndpointClass::Register, now).is_ok());
    }

    #[test]
    fn test_classes_are_independent() {
        let limiter = RateLimiter::new(budgets(1, 300));
        let now = Instant::now();

        assert!(limiter.allow("client1", EndpointClass::Authorize, now).is_ok());
        assert!(limiter.allow("client1", EndpointClass::Authorize, now).is_err());
        assert!(limiter.allow("client1", EndpointClass::Token, now).is_ok());
    }

    #[test]
    fn test_denied_request_not_recorded() {
        let limiter = RateLimiter::new(budgets(1, 300));
        let start = Instant::now();

        assert!(limiter.allow("a", EndpointClass::Register, start).is_ok());

        // Denied attempts must not extend the window.
        for i in 1..5 {
            let at = start + Duration::from_secs(i);
            assert!(limiter.allow("a", EndpointClass::Register, at).is_err());
        }

        assert!(limiter
            .allow("a", EndpointClass::Register, start + Duration::from_secs(300))
            .is_ok());
    }

    #[test]
    fn test_retry_after_shrinks_as_window_ages() {
        let limiter = RateLimiter::new(budgets(1, 300));
        let start = Instant::now();

        assert!(limiter.allow("a", EndpointClass::Register, start).is_ok());

        let at = start + Duration::from_secs(100);
        let retry_after = limiter.allow("a", EndpointClass::Register, at).unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(200));
    }

    #[test]
    fn test_evict_stale_windows() {
        let limiter = RateLimiter::new(budgets(5, 300));
        let start = Instant::now();

        limiter.allow("old", EndpointClass::Register, start).unwrap();
        limiter
            .allow("fresh", EndpointClass::Register, start + Duration::from_secs(250))
            .unwrap();
        assert_eq!(limiter.tracked_subjects(), 2);

        let evicted = limiter.evict_stale(start + Duration::from_secs(301));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_subjects(), 1);
    }
}
