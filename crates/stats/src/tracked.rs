//! Hit-counted entities tracked in the LFU caches: outbound hostnames,
//! authenticated users, and served routes.

use appshield_cache::{HitCount, HitCounted};
use appshield_common::unix_ms;
use serde::Serialize;

/// An outbound host the application talked to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub hostname: String,
    pub port: u16,
    pub hits: HitCount,
}

impl Host {
    /// Parses `"hostname:port"`; the port defaults to 80 when absent or
    /// malformed. Empty hostnames are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (name, port) = match raw.rsplit_once(':') {
            Some((name, port)) => (name, port.parse().unwrap_or(80)),
            None => (raw, 80),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            hostname: name.to_string(),
            port,
            hits: HitCount::new(),
        })
    }

    /// The `hostname:port` cache key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

impl HitCounted for Host {
    fn hit_count(&self) -> &HitCount {
        &self.hits
    }
}

/// A served route, with its discovered API shape when available.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    pub method: String,
    #[serde(rename = "apispec")]
    pub api_spec: Option<serde_json::Value>,
    pub hits: HitCount,
}

impl Route {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            api_spec: None,
            hits: HitCount::new(),
        }
    }
}

impl HitCounted for Route {
    fn hit_count(&self) -> &HitCount {
        &self.hits
    }
}

/// A user seen on inbound requests, with first/last-seen bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExtended {
    pub id: String,
    pub name: String,
    pub last_ip_address: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub hits: HitCount,
}

impl UserExtended {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ip: impl Into<String>) -> Self {
        let now = unix_ms();
        Self {
            id: id.into(),
            name: name.into(),
            last_ip_address: ip.into(),
            first_seen_at: now,
            last_seen_at: now,
            hits: HitCount::new(),
        }
    }

    /// Refreshes the mutable fields on a repeat sighting.
    pub fn seen(&mut self, ip: &str) {
        self.last_ip_address = ip.to_string();
        self.last_seen_at = unix_ms();
    }
}

impl HitCounted for UserExtended {
    fn hit_count(&self) -> &HitCount {
        &self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_parses_name_and_port() {
        let host = Host::parse("db.internal:5432").unwrap();
        assert_eq!(host.hostname, "db.internal");
        assert_eq!(host.port, 5432);
        assert_eq!(host.key(), "db.internal:5432");
    }

    #[test]
    fn host_port_defaults_to_80() {
        assert_eq!(Host::parse("example.com").unwrap().port, 80);
        assert_eq!(Host::parse("example.com:notaport").unwrap().port, 80);
    }

    #[test]
    fn empty_hostname_rejected() {
        assert!(Host::parse("").is_none());
        assert!(Host::parse(":8080").is_none());
    }

    #[test]
    fn user_seen_refreshes_ip_and_timestamp() {
        let mut user = UserExtended::new("u1", "alice", "1.1.1.1");
        let first_seen = user.first_seen_at;
        user.seen("2.2.2.2");
        assert_eq!(user.last_ip_address, "2.2.2.2");
        assert_eq!(user.first_seen_at, first_seen);
        assert!(user.last_seen_at >= first_seen);
    }
}
