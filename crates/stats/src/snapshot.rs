//! Serializable export of the aggregated statistics, handed to the reporting
//! collaborator after a `force_compress`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::percentiles::CompressedTiming;
use crate::tracked::{Host, Route, UserExtended};

/// Attack counters, globally or per operation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackTotals {
    pub total: u64,
    pub blocked: u64,
}

/// Inbound request counters for the current reporting window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsSnapshot {
    pub total: u64,
    pub aborted: u64,
    pub attacks_detected: AttackTotals,
    pub attack_waves: AttackTotals,
}

/// Counts per matched firewall-list key (blocked/monitored user agents or
/// IP lists).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchBreakdown {
    pub breakdown: BTreeMap<String, u64>,
}

/// Per-operation counters and compressed timing blocks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub kind: String,
    pub total: u64,
    pub interceptor_threw_error: u64,
    pub without_context: u64,
    pub attacks_detected: AttackTotals,
    pub compressed_timings: Vec<CompressedTiming>,
}

/// Everything the reporting collaborator ships to the control plane.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub started_at: i64,
    pub ended_at: i64,
    pub operations: BTreeMap<String, OperationSnapshot>,
    pub requests: RequestsSnapshot,
    pub user_agents: MatchBreakdown,
    pub ip_addresses: MatchBreakdown,
    pub hostnames: Vec<Host>,
    pub users: Vec<UserExtended>,
    pub routes: Vec<Route>,
}
