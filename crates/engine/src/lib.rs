//! The in-process runtime state engine.
//!
//! [`ShieldEngine`] is the single object the interception layer talks to. It
//! owns the three shared stores -- configuration snapshots, rolling agent
//! statistics, and the rate limiter -- and exposes the per-request decision
//! surface on top of them. Every method is safe to call concurrently from
//! request threads; configuration syncs happen on a background task and
//! publish atomically.

use appshield_common::{endpoint_key, EndpointPolicy, RateLimitPolicy, RequestContext, User};
use appshield_config::{BlockReason, ConfigStore, ConfigUpdate, FirewallLists};
use appshield_rate_limit::RateLimiter;
use appshield_stats::{AgentStats, StatsSnapshot};
use dashmap::DashMap;

/// The outcome of a rate-limit check for one request.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// The policy that denied the request, when `allowed` is false.
    pub policy: Option<EndpointPolicy>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            policy: None,
        }
    }
}

/// Shared runtime state for one protected process.
pub struct ShieldEngine {
    config: ConfigStore,
    stats: AgentStats,
    limiter: RateLimiter,
    // Endpoints that have actually rate-limited a request, with the policy
    // that triggered, reported alongside the statistics.
    rate_limited: DashMap<String, RateLimitPolicy>,
}

impl ShieldEngine {
    pub fn new() -> Self {
        Self {
            config: ConfigStore::new(),
            stats: AgentStats::new(),
            limiter: RateLimiter::new(),
            rate_limited: DashMap::new(),
        }
    }

    /// The configuration store, for callers that need several lookups from
    /// one consistent snapshot.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    // --- per-call inspection ------------------------------------------------

    /// Records one intercepted call on a monitored operation.
    pub fn inspect_call(
        &self,
        operation: &str,
        kind: &str,
        duration_ms: f64,
        attack_detected: bool,
        blocked: bool,
        without_context: bool,
    ) {
        self.stats.on_inspected_call(
            operation,
            kind,
            duration_ms,
            attack_detected,
            blocked,
            without_context,
        );
    }

    /// Records that an interceptor itself failed on an operation.
    pub fn interceptor_threw_error(&self, operation: &str, kind: &str) {
        self.stats.interceptor_threw_error(operation, kind);
    }

    // --- per-request decisions ----------------------------------------------

    /// Runs the request through every applicable rate-limit policy.
    ///
    /// Bypassed IPs and endpoints with protection forced off are never
    /// limited. The identity charged is the user id when authenticated, the
    /// remote address otherwise.
    pub fn check_rate_limit(&self, ctx: &RequestContext) -> RateLimitDecision {
        let snapshot = self.config.snapshot();
        if let Some(ip) = &ctx.remote_address {
            if snapshot.block_list.is_ip_bypassed(ip) {
                return RateLimitDecision::allow();
            }
        }

        let (allowed, policy) = self.limiter.is_request_allowed(
            &ctx.method,
            &ctx.route,
            ctx.identity(),
            &snapshot.endpoints,
        );
        if !allowed {
            if let Some(limits) = policy.as_ref().and_then(|p| p.rate_limiting.clone()) {
                self.rate_limited
                    .insert(endpoint_key(&ctx.method, &ctx.route), limits);
            }
        }
        RateLimitDecision { allowed, policy }
    }

    /// Endpoints that have rate-limited at least one request since the last
    /// [`clear`](Self::clear), with the policy limits that triggered.
    pub fn rate_limited_routes(&self) -> Vec<(String, RateLimitPolicy)> {
        self.rate_limited
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Runs the full block chain for a request: blocked user, blocked user
    /// agent, then the IP block and allow lists. First match wins; `None`
    /// means the request may proceed. Requests from a bypassed address
    /// always proceed.
    pub fn is_request_blocked(&self, ctx: &RequestContext) -> Option<BlockReason> {
        let snapshot = self.config.snapshot();

        let ip = ctx.remote_address.as_deref();
        if let Some(ip) = ip {
            if snapshot.block_list.is_ip_bypassed(ip) {
                return None;
            }
        }

        let reason = self.blocked_reason(&snapshot, ctx, ip)?;
        tracing::debug!(
            method = %ctx.method,
            route = %ctx.route,
            reason = reason.as_str(),
            "request blocked"
        );
        Some(reason)
    }

    fn blocked_reason(
        &self,
        snapshot: &appshield_config::ConfigSnapshot,
        ctx: &RequestContext,
        ip: Option<&str>,
    ) -> Option<BlockReason> {
        if let Some(user) = &ctx.user {
            if snapshot.blocked_users.contains(&user.id) {
                return Some(BlockReason::UserBlocked);
            }
        }
        if let (Some(agent), Some(pattern)) = (&ctx.user_agent, &snapshot.blocked_user_agents) {
            if pattern.is_match(agent) {
                return Some(BlockReason::UserAgentBlocked);
            }
        }
        let ip = ip?;
        snapshot
            .block_list
            .check(ip, &endpoint_key(&ctx.method, &ctx.route))
    }

    pub fn is_user_blocked(&self, user_id: &str) -> bool {
        self.config.is_user_blocked(user_id)
    }

    pub fn is_user_agent_blocked(&self, user_agent: &str) -> bool {
        self.config.is_user_agent_blocked(user_agent)
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.config.is_ip_blocked(ip)
    }

    pub fn is_ip_allowed_for_endpoint(&self, ip: &str, endpoint: &str) -> bool {
        self.config.is_ip_allowed_for_endpoint(ip, endpoint)
    }

    // --- request accounting -------------------------------------------------

    /// Records one inbound request and tracks its route.
    pub fn record_request(&self, ctx: &RequestContext) {
        self.stats.on_request();
        self.stats.add_route(ctx);
        if let Some(user) = &ctx.user {
            self.track_user(user, ctx.remote_address.as_deref().unwrap_or(""));
        }
    }

    pub fn record_aborted_request(&self) {
        self.stats.on_aborted_request();
    }

    pub fn record_attack(&self, blocked: bool) {
        self.stats.on_detected_attack(blocked);
    }

    pub fn record_attack_wave(&self, blocked: bool) {
        self.stats.on_detected_attack_wave(blocked);
    }

    /// Records the firewall-list keys that matched a request's user agent.
    pub fn record_user_agent_matches<'a>(&self, matches: impl IntoIterator<Item = &'a str>) {
        self.stats.on_user_agent_matches(matches);
    }

    /// Records the firewall-list keys that matched a request's IP address.
    pub fn record_ip_address_matches<'a>(&self, matches: impl IntoIterator<Item = &'a str>) {
        self.stats.on_ip_address_matches(matches);
    }

    pub fn track_hostname(&self, raw: &str) {
        self.stats.add_hostname(raw);
    }

    pub fn track_user(&self, user: &User, ip: &str) {
        self.stats.add_user(user, ip);
    }

    pub fn track_route(&self, ctx: &RequestContext) {
        self.stats.add_route(ctx);
    }

    // --- configuration ------------------------------------------------------

    pub fn apply_config(&self, update: &ConfigUpdate) {
        self.config.update_config(update);
    }

    pub fn apply_firewall_lists(&self, lists: Option<&FirewallLists>) {
        self.config.update_firewall_lists(lists);
    }

    pub fn block_mode(&self) -> bool {
        self.config.block_mode()
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.config.heartbeat_interval_ms()
    }

    // --- reporting ----------------------------------------------------------

    /// Compresses pending timing samples and returns the reporting snapshot.
    pub fn export_stats(&self) -> StatsSnapshot {
        self.stats.force_compress();
        self.stats.snapshot()
    }

    /// Starts a fresh reporting window.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Drops all runtime state: configuration, statistics, and the
    /// rate-limited endpoint record. Used on agent shutdown and between
    /// tests.
    pub fn clear(&self) {
        self.config.clear();
        self.stats.reset();
        self.rate_limited.clear();
    }
}

impl Default for ShieldEngine {
    fn default() -> Self {
        Self::new()
    }
}
