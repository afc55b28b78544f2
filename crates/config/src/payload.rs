//! Control-plane sync payloads.
//!
//! Field-level tolerance is deliberate: every field defaults when absent or
//! null, so a partially malformed sync still delivers whatever protection it
//! can instead of being rejected wholesale.

use appshield_common::{EndpointPolicy, ShieldResult};
use serde::Deserialize;

/// The periodic configuration sync payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    /// Blocking mode: `false` means detect-only (dry mode).
    pub block: bool,
    pub blocked_user_ids: Vec<String>,
    pub endpoints: Vec<EndpointPolicy>,
    #[serde(rename = "allowedIPAddresses")]
    pub allowed_ip_addresses: Vec<String>,
    #[serde(rename = "heartbeatIntervalInMS")]
    pub heartbeat_interval_in_ms: u64,
    pub config_updated_at: i64,
    pub received_any_stats: bool,
}

impl ConfigUpdate {
    pub fn from_json(raw: &str) -> ShieldResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One named IP list from the firewall-lists sync.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpList {
    pub key: String,
    pub source: String,
    pub description: String,
    pub ips: Vec<String>,
}

/// The firewall-lists sync payload: blocked/allowed IP lists plus the
/// blocked-user-agent pattern source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallLists {
    #[serde(rename = "blockedIPAddresses")]
    pub blocked_ip_addresses: Vec<IpList>,
    #[serde(rename = "allowedIPAddresses")]
    pub allowed_ip_addresses: Vec<IpList>,
    pub blocked_user_agents: String,
}

impl FirewallLists {
    pub fn from_json(raw: &str) -> ShieldResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// All blocked entries, flattened across lists.
    pub fn blocked_ips(&self) -> impl Iterator<Item = &str> {
        self.blocked_ip_addresses
            .iter()
            .flat_map(|list| list.ips.iter().map(String::as_str))
    }

    /// All allowed entries, flattened across lists.
    pub fn allowed_ips(&self) -> impl Iterator<Item = &str> {
        self.allowed_ip_addresses
            .iter()
            .flat_map(|list| list.ips.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_update_parses_full_payload() {
        let update = ConfigUpdate::from_json(
            r#"{
                "block": true,
                "blockedUserIds": ["mal"],
                "allowedIPAddresses": ["10.0.0.0/8"],
                "heartbeatIntervalInMS": 60000,
                "configUpdatedAt": 1700000000000,
                "endpoints": [
                    {"method": "GET", "route": "/a",
                     "rateLimiting": {"enabled": true, "maxRequests": 2, "windowSizeInMS": 1000}}
                ]
            }"#,
        )
        .unwrap();
        assert!(update.block);
        assert_eq!(update.blocked_user_ids, vec!["mal"]);
        assert_eq!(update.endpoints.len(), 1);
        assert_eq!(update.heartbeat_interval_in_ms, 60000);
    }

    #[test]
    fn missing_fields_default() {
        let update = ConfigUpdate::from_json("{}").unwrap();
        assert!(!update.block);
        assert!(update.endpoints.is_empty());
        assert_eq!(update.config_updated_at, 0);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(ConfigUpdate::from_json("{not json").is_err());
    }

    #[test]
    fn firewall_lists_flatten() {
        let lists = FirewallLists::from_json(
            r#"{
                "blockedIPAddresses": [
                    {"key": "tor", "source": "feed", "description": "", "ips": ["1.1.1.1", "2.2.0.0/16"]},
                    {"key": "manual", "ips": ["3.3.3.3"]}
                ],
                "blockedUserAgents": "badbot|scraper"
            }"#,
        )
        .unwrap();
        let blocked: Vec<&str> = lists.blocked_ips().collect();
        assert_eq!(blocked, vec!["1.1.1.1", "2.2.0.0/16", "3.3.3.3"]);
        assert!(lists.allowed_ips().next().is_none());
        assert_eq!(lists.blocked_user_agents, "badbot|scraper");
    }
}
