//! Hot-swappable agent configuration.
//!
//! The control plane periodically delivers two payloads: the configuration
//! sync (blocked users, endpoint policies, block mode) and the firewall
//! lists (blocked/allowed IPs, blocked user agents). Both land here as a
//! brand-new immutable [`ConfigSnapshot`] swapped in behind an `ArcSwap`, so
//! request threads read lock-free and never observe a half-updated
//! configuration -- the same pattern the proxy uses for IP reputation lists.

pub mod blocklist;
pub mod ipset;
pub mod payload;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

use appshield_common::{EndpointPolicy, ShieldError, ShieldResult};

pub use blocklist::{BlockList, BlockReason};
pub use ipset::IpSet;
pub use payload::{ConfigUpdate, FirewallLists, IpList};

/// Fallback heartbeat interval when the control plane does not set one.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

/// A fully formed configuration as of one sync. Never mutated after
/// publication.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// `false` means detect-only (dry) mode.
    pub block_mode: bool,
    pub blocked_users: HashSet<String>,
    pub blocked_user_agents: Option<Regex>,
    pub endpoints: Vec<EndpointPolicy>,
    pub block_list: BlockList,
    pub config_updated_at: i64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            block_mode: false,
            blocked_users: HashSet::new(),
            blocked_user_agents: None,
            endpoints: Vec::new(),
            block_list: BlockList::new(),
            config_updated_at: 0,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// The atomically swappable configuration reference shared by every request
/// thread and the background sync task.
pub struct ConfigStore {
    snapshot: ArcSwap<ConfigSnapshot>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::default()),
        }
    }

    /// The current snapshot. Callers doing several related lookups should
    /// load once and query the returned snapshot so all answers come from
    /// the same configuration version.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_user_blocked(&self, user_id: &str) -> bool {
        self.snapshot.load().blocked_users.contains(user_id)
    }

    /// An absent or empty pattern never blocks.
    pub fn is_user_agent_blocked(&self, user_agent: &str) -> bool {
        match &self.snapshot.load().blocked_user_agents {
            Some(pattern) => pattern.is_match(user_agent),
            None => false,
        }
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.snapshot.load().block_list.is_ip_blocked(ip)
    }

    pub fn is_ip_bypassed(&self, ip: &str) -> bool {
        self.snapshot.load().block_list.is_ip_bypassed(ip)
    }

    pub fn is_ip_allowed_for_endpoint(&self, ip: &str, endpoint: &str) -> bool {
        self.snapshot
            .load()
            .block_list
            .is_ip_allowed_for_endpoint(ip, endpoint)
    }

    pub fn block_mode(&self) -> bool {
        self.snapshot.load().block_mode
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.snapshot.load().heartbeat_interval_ms
    }

    pub fn config_updated_at(&self) -> i64 {
        self.snapshot.load().config_updated_at
    }

    /// Applies a configuration sync. The firewall lists and user-agent
    /// pattern from the previous snapshot are carried forward unchanged;
    /// everything else is rebuilt from the payload. The new snapshot is
    /// published in a single store.
    pub fn update_config(&self, update: &ConfigUpdate) {
        let current = self.snapshot.load();

        let endpoints: Vec<EndpointPolicy> = update
            .endpoints
            .iter()
            .filter(|e| !e.graphql)
            .cloned()
            .collect();

        let mut allowed_per_endpoint = HashMap::new();
        for endpoint in &endpoints {
            if !endpoint.allowed_ip_addresses.is_empty() {
                allowed_per_endpoint
                    .insert(endpoint.key(), IpSet::parse(&endpoint.allowed_ip_addresses));
            }
        }

        let next = ConfigSnapshot {
            block_mode: update.block,
            blocked_users: update.blocked_user_ids.iter().cloned().collect(),
            blocked_user_agents: current.blocked_user_agents.clone(),
            block_list: BlockList {
                blocked: current.block_list.blocked.clone(),
                bypassed: current.block_list.bypassed.clone(),
                allowed: IpSet::parse(&update.allowed_ip_addresses),
                allowed_per_endpoint,
            },
            endpoints,
            config_updated_at: update.config_updated_at,
            heartbeat_interval_ms: if update.heartbeat_interval_in_ms == 0 {
                DEFAULT_HEARTBEAT_INTERVAL_MS
            } else {
                update.heartbeat_interval_in_ms
            },
        };

        tracing::info!(
            endpoints = next.endpoints.len(),
            blocked_users = next.blocked_users.len(),
            block_mode = next.block_mode,
            updated_at = next.config_updated_at,
            "applied configuration sync"
        );
        self.snapshot.store(Arc::new(next));
    }

    /// Applies a firewall-lists sync. `None` clears the lists and the
    /// user-agent pattern rather than leaving stale data in place. An
    /// invalid user-agent pattern is dropped with a warning; the IP lists
    /// still apply.
    pub fn update_firewall_lists(&self, lists: Option<&FirewallLists>) {
        let current = self.snapshot.load();
        let mut next = ConfigSnapshot::clone(&current);

        match lists {
            Some(lists) => {
                next.block_list.blocked = IpSet::parse(lists.blocked_ips());
                next.block_list.bypassed = IpSet::parse(lists.allowed_ips());
                next.blocked_user_agents = compile_user_agent_pattern(&lists.blocked_user_agents);
                tracing::info!(
                    blocked = next.block_list.blocked.len(),
                    bypassed = next.block_list.bypassed.len(),
                    has_user_agent_pattern = next.blocked_user_agents.is_some(),
                    "applied firewall lists"
                );
            }
            None => {
                next.block_list.blocked = IpSet::new();
                next.block_list.bypassed = IpSet::new();
                next.blocked_user_agents = None;
                tracing::info!("cleared firewall lists");
            }
        }

        self.snapshot.store(Arc::new(next));
    }

    /// Resets to the empty snapshot (agent shutdown and test teardown).
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(ConfigSnapshot::default()));
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_user_agent_pattern(source: &str) -> Option<Regex> {
    if source.trim().is_empty() {
        return None;
    }
    match user_agent_pattern(source) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            tracing::warn!(source, %err, "dropping invalid blocked-user-agent pattern");
            None
        }
    }
}

/// Compiles a blocked-user-agent pattern source, case-insensitively.
fn user_agent_pattern(source: &str) -> ShieldResult<Regex> {
    Regex::new(&format!("(?i){source}")).map_err(|err| ShieldError::Pattern(err.to_string()))
}
