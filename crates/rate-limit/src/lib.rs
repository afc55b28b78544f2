//! Sliding-window rate limiting with endpoint-policy resolution.
//!
//! [`SlidingWindow`] does the raw per-key timestamp bookkeeping; the
//! [`RateLimiter`] facade layers the policy priority rule on top: an exact
//! `method|route` policy is authoritative for its route and decides alone;
//! routes without an exact policy are checked against every matching
//! wildcard policy, each under its own independent window.

pub mod routes;
pub mod sliding_window;

use appshield_common::{endpoint_key, EndpointPolicy};
use dashmap::DashMap;
use regex::Regex;

pub use sliding_window::SlidingWindow;

/// The outcome of a rate-limit check: whether the request may proceed, and
/// the policy that denied it if not.
pub type RateLimitVerdict = (bool, Option<EndpointPolicy>);

/// Policy-aware rate limiter shared by all request threads.
pub struct RateLimiter {
    window: SlidingWindow,
    // Compiled route patterns, keyed by pattern source. Patterns change only
    // on config sync, so the memo stays tiny.
    patterns: DashMap<String, Regex>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(SlidingWindow::new())
    }

    /// Builds a limiter over a caller-provided window store (tests shrink
    /// capacity and TTL this way).
    pub fn with_window(window: SlidingWindow) -> Self {
        Self {
            window,
            patterns: DashMap::new(),
        }
    }

    /// Raw window check for a fully formed key. See
    /// [`SlidingWindow::is_allowed`] for the zero-argument semantics.
    pub fn is_allowed(&self, key: &str, window_ms: u64, max_requests: u64) -> bool {
        self.window.is_allowed(key, window_ms, max_requests)
    }

    /// Applies every applicable endpoint policy to a request.
    ///
    /// The exact `method|route` policy, when one exists, is evaluated first
    /// and decides alone; a failing check denies with that policy as cause.
    /// Otherwise wildcard policies are evaluated in list order under their
    /// own keys, and the first failing one denies. Disabled policies and
    /// policies with protection forced off are ignored; requests with no
    /// applicable policies always pass.
    pub fn is_request_allowed(
        &self,
        method: &str,
        route: &str,
        identity: &str,
        endpoints: &[EndpointPolicy],
    ) -> RateLimitVerdict {
        if method.is_empty() || route.is_empty() {
            return (true, None);
        }

        let limited: Vec<&EndpointPolicy> = endpoints
            .iter()
            .filter(|e| !e.force_protection_off && e.rate_limiting_enabled().is_some())
            .collect();
        if limited.is_empty() {
            return (true, None);
        }

        let request_key = endpoint_key(method, route);

        // An exact policy is authoritative for its route: it alone decides,
        // and the request never counts against broader pattern windows.
        if let Some(exact) = limited
            .iter()
            .find(|e| !routes::is_wildcard(&e.route) && e.key().eq_ignore_ascii_case(&request_key))
        {
            if !self.check_policy(exact, identity) {
                tracing::debug!(key = %request_key, identity, "rate limited by exact policy");
                return (false, Some((*exact).clone()));
            }
            return (true, None);
        }

        for policy in limited
            .iter()
            .filter(|e| routes::is_wildcard(&e.route) && e.method.eq_ignore_ascii_case(method))
        {
            if !self.matches_pattern(&policy.route, route) {
                continue;
            }
            if !self.check_policy(policy, identity) {
                tracing::debug!(pattern = %policy.route, identity, "rate limited by wildcard policy");
                return (false, Some((*policy).clone()));
            }
        }

        (true, None)
    }

    /// Runs one policy's window check under its `:user-or-ip:` key.
    fn check_policy(&self, policy: &EndpointPolicy, identity: &str) -> bool {
        let Some(limits) = policy.rate_limiting_enabled() else {
            return true;
        };
        let key = format!("{}:user-or-ip:{}", policy.key(), identity);
        self.window
            .is_allowed(&key, limits.window_size_in_ms, limits.max_requests)
    }

    fn matches_pattern(&self, pattern: &str, route: &str) -> bool {
        if let Some(re) = self.patterns.get(pattern) {
            return re.is_match(route.trim_start_matches('/'));
        }
        match Regex::new(&routes::regex_source(pattern)) {
            Ok(re) => {
                let matched = re.is_match(route.trim_start_matches('/'));
                self.patterns.insert(pattern.to_string(), re);
                matched
            }
            Err(err) => {
                tracing::warn!(pattern, %err, "unusable route pattern");
                false
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshield_common::RateLimitPolicy;

    fn policy(method: &str, route: &str, max: u64, window_ms: u64) -> EndpointPolicy {
        EndpointPolicy {
            method: method.into(),
            route: route.into(),
            rate_limiting: Some(RateLimitPolicy {
                enabled: true,
                max_requests: max,
                window_size_in_ms: window_ms,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn no_policies_always_allows() {
        let limiter = RateLimiter::new();
        for _ in 0..10 {
            let (allowed, cause) = limiter.is_request_allowed("GET", "/a", "ip:1.1.1.1", &[]);
            assert!(allowed);
            assert!(cause.is_none());
        }
    }

    #[test]
    fn disabled_policies_are_skipped() {
        let limiter = RateLimiter::new();
        let mut p = policy("GET", "/a", 1, 60_000);
        p.rate_limiting.as_mut().unwrap().enabled = false;
        for _ in 0..5 {
            let (allowed, _) = limiter.is_request_allowed("GET", "/a", "u1", &[p.clone()]);
            assert!(allowed);
        }
    }

    #[test]
    fn force_protection_off_policies_are_skipped() {
        let limiter = RateLimiter::new();
        let mut p = policy("GET", "/health", 1, 60_000);
        p.force_protection_off = true;
        for _ in 0..5 {
            let (allowed, _) = limiter.is_request_allowed("GET", "/health", "u1", &[p.clone()]);
            assert!(allowed);
        }
    }

    #[test]
    fn exact_policy_limits() {
        let limiter = RateLimiter::new();
        let policies = vec![policy("GET", "/a/1", 2, 60_000)];

        for _ in 0..2 {
            let (allowed, _) = limiter.is_request_allowed("GET", "/a/1", "u1", &policies);
            assert!(allowed);
        }
        let (allowed, cause) = limiter.is_request_allowed("GET", "/a/1", "u1", &policies);
        assert!(!allowed);
        assert_eq!(cause.unwrap().route, "/a/1");
    }

    #[test]
    fn exact_beats_wildcard_on_specific_route() {
        let limiter = RateLimiter::new();
        let policies = vec![
            policy("GET", "/a/1", 2, 60_000),
            policy("GET", "/a/{id}", 5, 60_000),
        ];

        // The specific route is denied on the 3rd request by the exact rule.
        assert!(limiter.is_request_allowed("GET", "/a/1", "u1", &policies).0);
        assert!(limiter.is_request_allowed("GET", "/a/1", "u1", &policies).0);
        let (allowed, cause) = limiter.is_request_allowed("GET", "/a/1", "u1", &policies);
        assert!(!allowed);
        assert_eq!(cause.unwrap().route, "/a/1");

        // Other routes under the pattern get the wildcard budget of 5.
        for i in 0..5 {
            let (allowed, _) = limiter.is_request_allowed("GET", "/a/2", "u1", &policies);
            assert!(allowed, "request {i} within wildcard budget");
        }
        let (allowed, cause) = limiter.is_request_allowed("GET", "/a/2", "u1", &policies);
        assert!(!allowed, "denied on the 6th by the wildcard rule");
        assert_eq!(cause.unwrap().route, "/a/{id}");
    }

    #[test]
    fn identities_get_independent_windows() {
        let limiter = RateLimiter::new();
        let policies = vec![policy("GET", "/a", 1, 60_000)];

        assert!(limiter.is_request_allowed("GET", "/a", "u1", &policies).0);
        assert!(!limiter.is_request_allowed("GET", "/a", "u1", &policies).0);
        assert!(limiter.is_request_allowed("GET", "/a", "u2", &policies).0);
    }

    #[test]
    fn wildcard_respects_method() {
        let limiter = RateLimiter::new();
        let policies = vec![policy("POST", "/a/{id}", 1, 60_000)];

        // GET traffic never touches the POST pattern's window.
        for _ in 0..3 {
            assert!(limiter.is_request_allowed("GET", "/a/1", "u1", &policies).0);
        }
        assert!(limiter.is_request_allowed("POST", "/a/1", "u1", &policies).0);
        assert!(!limiter.is_request_allowed("POST", "/a/1", "u1", &policies).0);
    }

    #[test]
    fn missing_method_or_route_allows() {
        let limiter = RateLimiter::new();
        let policies = vec![policy("GET", "/a", 0, 60_000)];
        assert!(limiter.is_request_allowed("", "/a", "u1", &policies).0);
        assert!(limiter.is_request_allowed("GET", "", "u1", &policies).0);
    }
}
