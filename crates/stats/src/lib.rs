//! Statistics aggregation for the appshield agent.
//!
//! [`AgentStats`] sits on the hot path of every intercepted call and every
//! inbound request, so all of it is plain counter arithmetic: atomic
//! increments for counters, a short per-operation mutex for the latency
//! sample buffer, and LFU caches bounding the hostname/user/route trackers.
//! Recording is best-effort -- malformed input is silently ignored and
//! nothing here ever errors toward the intercepted call.
//!
//! The whole mutable state lives in one inner block behind an `ArcSwap`:
//! [`AgentStats::reset`] swaps in a fresh block in a single store, so the
//! reporting window rolls over atomically.

pub mod percentiles;
pub mod snapshot;
pub mod tracked;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;

use appshield_cache::LfuCache;
use appshield_common::{unix_ms, RequestContext, User};

pub use percentiles::CompressedTiming;
pub use snapshot::{
    AttackTotals, MatchBreakdown, OperationSnapshot, RequestsSnapshot, StatsSnapshot,
};
pub use tracked::{Host, Route, UserExtended};

/// Capacity and compression limits for an [`AgentStats`] instance.
#[derive(Debug, Clone, Copy)]
pub struct StatsLimits {
    /// Raw latency samples kept per operation before compressing.
    pub max_samples: usize,
    /// Compressed timing blocks kept per operation (oldest evicted first).
    pub max_compressed: usize,
    pub max_hostnames: usize,
    pub max_users: usize,
    pub max_routes: usize,
}

impl Default for StatsLimits {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            max_compressed: 100,
            max_hostnames: 2000,
            max_users: 2000,
            max_routes: 5000,
        }
    }
}

/// Counters for one monitored operation (e.g. `MySqlCommand.Execute`).
pub struct OperationStats {
    kind: String,
    total: AtomicU64,
    interceptor_threw_error: AtomicU64,
    without_context: AtomicU64,
    attacks_detected: AtomicU64,
    attacks_blocked: AtomicU64,
    timings: Mutex<TimingBuffer>,
}

#[derive(Default)]
struct TimingBuffer {
    durations: Vec<f64>,
    compressed: VecDeque<CompressedTiming>,
}

impl OperationStats {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            total: AtomicU64::new(0),
            interceptor_threw_error: AtomicU64::new(0),
            without_context: AtomicU64::new(0),
            attacks_detected: AtomicU64::new(0),
            attacks_blocked: AtomicU64::new(0),
            timings: Mutex::new(TimingBuffer::default()),
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn without_context(&self) -> u64 {
        self.without_context.load(Ordering::Relaxed)
    }

    pub fn compressed_timings(&self) -> Vec<CompressedTiming> {
        let buffer = self.timings.lock().expect("timing buffer lock poisoned");
        buffer.compressed.iter().cloned().collect()
    }

    pub fn pending_samples(&self) -> usize {
        let buffer = self.timings.lock().expect("timing buffer lock poisoned");
        buffer.durations.len()
    }

    fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            kind: self.kind.clone(),
            total: self.total.load(Ordering::Relaxed),
            interceptor_threw_error: self.interceptor_threw_error.load(Ordering::Relaxed),
            without_context: self.without_context.load(Ordering::Relaxed),
            attacks_detected: AttackTotals {
                total: self.attacks_detected.load(Ordering::Relaxed),
                blocked: self.attacks_blocked.load(Ordering::Relaxed),
            },
            compressed_timings: self.compressed_timings(),
        }
    }
}

#[derive(Default)]
struct RequestCounters {
    total: AtomicU64,
    aborted: AtomicU64,
    attacks_detected: AtomicU64,
    attacks_blocked: AtomicU64,
    attack_waves_detected: AtomicU64,
    attack_waves_blocked: AtomicU64,
}

struct StatsInner {
    operations: DashMap<String, Arc<OperationStats>>,
    requests: RequestCounters,
    // Counts per matched firewall-list key.
    user_agents: DashMap<String, u64>,
    ip_addresses: DashMap<String, u64>,
    hostnames: LfuCache<String, Host>,
    users: LfuCache<String, UserExtended>,
    routes: LfuCache<String, Route>,
    started_at: i64,
}

impl StatsInner {
    fn new(limits: &StatsLimits) -> Self {
        Self {
            operations: DashMap::new(),
            requests: RequestCounters::default(),
            user_agents: DashMap::new(),
            ip_addresses: DashMap::new(),
            hostnames: LfuCache::new(limits.max_hostnames),
            users: LfuCache::new(limits.max_users),
            routes: LfuCache::new(limits.max_routes),
            started_at: unix_ms(),
        }
    }
}

/// The agent's statistics aggregator.
pub struct AgentStats {
    inner: ArcSwap<StatsInner>,
    limits: StatsLimits,
}

impl AgentStats {
    pub fn new() -> Self {
        Self::with_limits(StatsLimits::default())
    }

    pub fn with_limits(limits: StatsLimits) -> Self {
        Self {
            inner: ArcSwap::from_pointee(StatsInner::new(&limits)),
            limits,
        }
    }

    /// Records an inbound request.
    pub fn on_request(&self) {
        self.inner.load().requests.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an aborted inbound request.
    pub fn on_aborted_request(&self) {
        self.inner.load().requests.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an attack detected while handling a request.
    pub fn on_detected_attack(&self, blocked: bool) {
        let inner = self.inner.load();
        inner.requests.attacks_detected.fetch_add(1, Ordering::Relaxed);
        if blocked {
            inner.requests.attacks_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a detected attack wave: a burst of related attack attempts
    /// counted once rather than per attempt.
    pub fn on_detected_attack_wave(&self, blocked: bool) {
        let inner = self.inner.load();
        inner.requests.attack_waves_detected.fetch_add(1, Ordering::Relaxed);
        if blocked {
            inner.requests.attack_waves_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records which firewall-list keys matched an incoming user agent.
    pub fn on_user_agent_matches<I, S>(&self, matches: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = self.inner.load();
        Self::update_breakdown(&inner.user_agents, matches);
    }

    /// Records which firewall-list keys matched an incoming IP address.
    pub fn on_ip_address_matches<I, S>(&self, matches: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = self.inner.load();
        Self::update_breakdown(&inner.ip_addresses, matches);
    }

    /// Records one intercepted call on a monitored operation.
    ///
    /// Calls made outside any tracked request (`without_context`) bump a
    /// dedicated counter and carry no timing or attack detail.
    pub fn on_inspected_call(
        &self,
        operation: &str,
        kind: &str,
        duration_ms: f64,
        attack_detected: bool,
        blocked: bool,
        without_context: bool,
    ) {
        if operation.is_empty() {
            return;
        }
        let inner = self.inner.load();
        let stats = Self::operation_entry(&inner, operation, kind);
        stats.total.fetch_add(1, Ordering::Relaxed);

        if without_context {
            stats.without_context.fetch_add(1, Ordering::Relaxed);
            return;
        }

        {
            let mut buffer = stats.timings.lock().expect("timing buffer lock poisoned");
            if buffer.durations.len() >= self.limits.max_samples {
                Self::compress_buffer(&mut buffer, self.limits.max_compressed);
            }
            buffer.durations.push(duration_ms);
        }

        if attack_detected {
            stats.attacks_detected.fetch_add(1, Ordering::Relaxed);
            if blocked {
                stats.attacks_blocked.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records that the interceptor itself failed on an operation.
    pub fn interceptor_threw_error(&self, operation: &str, kind: &str) {
        if operation.is_empty() {
            return;
        }
        let inner = self.inner.load();
        let stats = Self::operation_entry(&inner, operation, kind);
        stats.total.fetch_add(1, Ordering::Relaxed);
        stats.interceptor_threw_error.fetch_add(1, Ordering::Relaxed);
    }

    /// Compresses every operation's pending samples, regardless of fill
    /// level. Run before exporting a snapshot.
    pub fn force_compress(&self) {
        let inner = self.inner.load();
        for entry in inner.operations.iter() {
            let mut buffer = entry.timings.lock().expect("timing buffer lock poisoned");
            if !buffer.durations.is_empty() {
                Self::compress_buffer(&mut buffer, self.limits.max_compressed);
            }
        }
    }

    /// Whether any operation currently holds compressed timing blocks.
    pub fn has_compressed_stats(&self) -> bool {
        let inner = self.inner.load();
        let has_compressed = inner.operations.iter().any(|entry| {
            let buffer = entry.timings.lock().expect("timing buffer lock poisoned");
            !buffer.compressed.is_empty()
        });
        has_compressed
    }

    /// Tracks an outbound hostname (`"host:port"`, port defaults to 80).
    pub fn add_hostname(&self, raw: &str) {
        let Some(host) = Host::parse(raw) else {
            return;
        };
        let inner = self.inner.load();
        inner.hostnames.upsert(host.key(), || host, |_| {});
    }

    /// Tracks a user sighting, refreshing last-seen details on repeats.
    pub fn add_user(&self, user: &User, ip: &str) {
        if user.id.is_empty() || user.name.is_empty() {
            return;
        }
        let inner = self.inner.load();
        inner.users.upsert(
            user.id.clone(),
            || UserExtended::new(&user.id, &user.name, ip),
            |existing| existing.seen(ip),
        );
    }

    /// Tracks the route an inbound request hit.
    pub fn add_route(&self, ctx: &RequestContext) {
        if ctx.route.is_empty() {
            return;
        }
        let inner = self.inner.load();
        inner.routes.upsert(
            ctx.route.clone(),
            || Route::new(&ctx.route, &ctx.method),
            |_| {},
        );
    }

    /// Rolls the reporting window over: every map and counter is replaced by
    /// a fresh empty block in one atomic store. Idempotent.
    pub fn reset(&self) {
        self.inner.store(Arc::new(StatsInner::new(&self.limits)));
        tracing::debug!("agent statistics reset");
    }

    /// Copies the current state into a serializable snapshot. Pending raw
    /// samples are not included; call [`force_compress`](Self::force_compress)
    /// first when exporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.load();
        StatsSnapshot {
            started_at: inner.started_at,
            ended_at: unix_ms(),
            operations: inner
                .operations
                .iter()
                .map(|entry| (entry.key().clone(), entry.snapshot()))
                .collect(),
            requests: RequestsSnapshot {
                total: inner.requests.total.load(Ordering::Relaxed),
                aborted: inner.requests.aborted.load(Ordering::Relaxed),
                attacks_detected: AttackTotals {
                    total: inner.requests.attacks_detected.load(Ordering::Relaxed),
                    blocked: inner.requests.attacks_blocked.load(Ordering::Relaxed),
                },
                attack_waves: AttackTotals {
                    total: inner.requests.attack_waves_detected.load(Ordering::Relaxed),
                    blocked: inner.requests.attack_waves_blocked.load(Ordering::Relaxed),
                },
            },
            user_agents: MatchBreakdown {
                breakdown: inner
                    .user_agents
                    .iter()
                    .map(|e| (e.key().clone(), *e.value()))
                    .collect(),
            },
            ip_addresses: MatchBreakdown {
                breakdown: inner
                    .ip_addresses
                    .iter()
                    .map(|e| (e.key().clone(), *e.value()))
                    .collect(),
            },
            hostnames: inner.hostnames.values(),
            users: inner.users.values(),
            routes: inner.routes.values(),
        }
    }

    /// Looks up an operation, if it has been seen this window.
    pub fn operation(&self, name: &str) -> Option<Arc<OperationStats>> {
        self.inner.load().operations.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn requests_total(&self) -> u64 {
        self.inner.load().requests.total.load(Ordering::Relaxed)
    }

    fn operation_entry(inner: &StatsInner, operation: &str, kind: &str) -> Arc<OperationStats> {
        // First writer wins when two threads race on a new operation.
        let entry = inner
            .operations
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(OperationStats::new(kind)));
        Arc::clone(entry.value())
    }

    fn update_breakdown<I, S>(breakdown: &DashMap<String, u64>, matches: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in matches {
            *breakdown.entry(key.as_ref().to_string()).or_insert(0) += 1;
        }
    }

    fn compress_buffer(buffer: &mut TimingBuffer, max_compressed: usize) {
        let Some(block) = percentiles::compress(&buffer.durations) else {
            return;
        };
        buffer.compressed.push_back(block);
        while buffer.compressed.len() > max_compressed {
            buffer.compressed.pop_front();
        }
        buffer.durations.clear();
    }
}

impl Default for AgentStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> StatsLimits {
        StatsLimits {
            max_samples: 5,
            max_compressed: 2,
            max_hostnames: 3,
            max_users: 3,
            max_routes: 3,
        }
    }

    #[test]
    fn counts_requests_and_attacks() {
        let stats = AgentStats::new();
        stats.on_request();
        stats.on_request();
        stats.on_aborted_request();
        stats.on_detected_attack(false);
        stats.on_detected_attack(true);

        let snap = stats.snapshot();
        assert_eq!(snap.requests.total, 2);
        assert_eq!(snap.requests.aborted, 1);
        assert_eq!(snap.requests.attacks_detected.total, 2);
        assert_eq!(snap.requests.attacks_detected.blocked, 1);
    }

    #[test]
    fn without_context_skips_timing() {
        let stats = AgentStats::new();
        stats.on_inspected_call("db.query", "sql_op", 12.0, true, true, true);

        let op = stats.operation("db.query").unwrap();
        assert_eq!(op.total(), 1);
        assert_eq!(op.without_context(), 1);
        assert_eq!(op.pending_samples(), 0);
        let snap = stats.snapshot();
        assert_eq!(snap.operations["db.query"].attacks_detected.total, 0);
    }

    #[test]
    fn compresses_when_sample_buffer_fills() {
        let stats = AgentStats::with_limits(small_limits());
        // Exactly max_samples durations, then one more to trigger compression.
        for d in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.on_inspected_call("op", "k", d, false, false, false);
        }
        let op = stats.operation("op").unwrap();
        assert_eq!(op.pending_samples(), 5);
        assert!(op.compressed_timings().is_empty());

        stats.on_inspected_call("op", "k", 6.0, false, false, false);
        let blocks = op.compressed_timings();
        assert_eq!(blocks.len(), 1);
        assert!((blocks[0].average_in_ms - 3.0).abs() < 1e-9);
        assert_eq!(blocks[0].percentiles["50"], 3.0);
        assert_eq!(op.pending_samples(), 1);
    }

    #[test]
    fn compressed_blocks_evict_oldest() {
        let stats = AgentStats::with_limits(small_limits());
        // Fill and force-compress four times against a cap of two blocks.
        for round in 0..4 {
            for _ in 0..5 {
                stats.on_inspected_call("op", "k", round as f64, false, false, false);
            }
            stats.force_compress();
        }
        let blocks = stats.operation("op").unwrap().compressed_timings();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].average_in_ms, 2.0);
        assert_eq!(blocks[1].average_in_ms, 3.0);
    }

    #[test]
    fn force_compress_flushes_partial_buffers() {
        let stats = AgentStats::new();
        stats.on_inspected_call("op", "k", 10.0, false, false, false);
        assert!(!stats.has_compressed_stats());

        stats.force_compress();
        assert!(stats.has_compressed_stats());
        assert_eq!(stats.operation("op").unwrap().pending_samples(), 0);
    }

    #[test]
    fn attack_counters_per_operation() {
        let stats = AgentStats::new();
        stats.on_inspected_call("op", "k", 1.0, true, false, false);
        stats.on_inspected_call("op", "k", 1.0, true, true, false);
        let snap = stats.snapshot();
        let op = &snap.operations["op"];
        assert_eq!(op.attacks_detected.total, 2);
        assert_eq!(op.attacks_detected.blocked, 1);
    }

    #[test]
    fn interceptor_errors_count_toward_total() {
        let stats = AgentStats::new();
        stats.interceptor_threw_error("op", "k");
        let snap = stats.snapshot();
        assert_eq!(snap.operations["op"].total, 1);
        assert_eq!(snap.operations["op"].interceptor_threw_error, 1);
    }

    #[test]
    fn counts_attack_waves_separately_from_attacks() {
        let stats = AgentStats::new();
        stats.on_detected_attack(true);
        stats.on_detected_attack_wave(false);
        stats.on_detected_attack_wave(true);

        let snap = stats.snapshot();
        assert_eq!(snap.requests.attacks_detected.total, 1);
        assert_eq!(snap.requests.attack_waves.total, 2);
        assert_eq!(snap.requests.attack_waves.blocked, 1);
    }

    #[test]
    fn match_breakdowns_aggregate_per_key() {
        let stats = AgentStats::new();
        stats.on_user_agent_matches(["crawlers", "ai-bots"]);
        stats.on_user_agent_matches(["crawlers"]);
        stats.on_ip_address_matches(["tor-exit-nodes"]);

        let snap = stats.snapshot();
        assert_eq!(snap.user_agents.breakdown["crawlers"], 2);
        assert_eq!(snap.user_agents.breakdown["ai-bots"], 1);
        assert_eq!(snap.ip_addresses.breakdown["tor-exit-nodes"], 1);
    }

    #[test]
    fn reset_clears_breakdowns_and_waves() {
        let stats = AgentStats::new();
        stats.on_detected_attack_wave(true);
        stats.on_user_agent_matches(["crawlers"]);
        stats.on_ip_address_matches(["tor-exit-nodes"]);

        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.requests.attack_waves.total, 0);
        assert!(snap.user_agents.breakdown.is_empty());
        assert!(snap.ip_addresses.breakdown.is_empty());
    }

    #[test]
    fn trackers_are_capacity_bounded() {
        let stats = AgentStats::with_limits(small_limits());
        for i in 0..10 {
            stats.add_hostname(&format!("host{i}.test:443"));
            stats.add_user(&User::new(format!("u{i}"), "user"), "1.1.1.1");
            stats.add_route(&RequestContext {
                method: "GET".into(),
                route: format!("/r/{i}"),
                ..Default::default()
            });
        }
        let snap = stats.snapshot();
        assert!(snap.hostnames.len() <= 3);
        assert!(snap.users.len() <= 3);
        assert!(snap.routes.len() <= 3);
    }

    #[test]
    fn repeat_user_sighting_refreshes_not_replaces() {
        let stats = AgentStats::new();
        let user = User::new("u1", "alice");
        stats.add_user(&user, "1.1.1.1");
        stats.add_user(&user, "2.2.2.2");

        let snap = stats.snapshot();
        assert_eq!(snap.users.len(), 1);
        let tracked = &snap.users[0];
        assert_eq!(tracked.last_ip_address, "2.2.2.2");
        assert_eq!(tracked.hits.get(), 2);
    }

    #[test]
    fn malformed_input_is_ignored() {
        let stats = AgentStats::new();
        stats.add_hostname("");
        stats.add_hostname(":443");
        stats.add_user(&User::new("", "x"), "1.1.1.1");
        stats.add_route(&RequestContext::default());
        stats.on_inspected_call("", "k", 1.0, false, false, false);

        let snap = stats.snapshot();
        assert!(snap.hostnames.is_empty());
        assert!(snap.users.is_empty());
        assert!(snap.routes.is_empty());
        assert!(snap.operations.is_empty());
    }

    #[test]
    fn reset_is_idempotent() {
        let stats = AgentStats::new();
        stats.on_request();
        stats.on_inspected_call("op", "k", 1.0, false, false, false);
        stats.add_hostname("example.com:80");

        stats.reset();
        let once = stats.snapshot();
        stats.reset();
        let twice = stats.snapshot();

        for snap in [&once, &twice] {
            assert_eq!(snap.requests.total, 0);
            assert!(snap.operations.is_empty());
            assert!(snap.hostnames.is_empty());
        }
    }
}
