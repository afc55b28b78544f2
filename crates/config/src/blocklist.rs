use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use crate::ipset::IpSet;

/// Why a request was refused by the block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    UserBlocked,
    UserAgentBlocked,
    IpBlocked,
    IpNotInAllowlist,
    IpNotAllowedForEndpoint,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::UserBlocked => "user is blocked",
            BlockReason::UserAgentBlocked => "user agent is blocked",
            BlockReason::IpBlocked => "IP is blocked",
            BlockReason::IpNotInAllowlist => "IP is not in the allowlist",
            BlockReason::IpNotAllowedForEndpoint => "IP is not allowed for this endpoint",
        }
    }
}

/// IP-level access rules from the most recent sync, immutable once built.
///
/// Three global lists plus per-endpoint allow lists:
/// - `bypassed` (firewall allow list) always passes, overriding everything;
/// - `blocked` (firewall block list) refuses matching addresses;
/// - `allowed` (config allow list), when non-empty, refuses everything
///   outside it;
/// - `allowed_per_endpoint` restricts individual `METHOD|route` endpoints.
///
/// Unparsable client addresses are never blocked by IP rules -- blocking on
/// garbage input would take down legitimate traffic behind broken proxies.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    pub(crate) blocked: IpSet,
    pub(crate) bypassed: IpSet,
    pub(crate) allowed: IpSet,
    pub(crate) allowed_per_endpoint: HashMap<String, IpSet>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ip_bypassed(&self, ip: &str) -> bool {
        match IpAddr::from_str(ip) {
            Ok(addr) => self.bypassed.contains(addr),
            Err(_) => false,
        }
    }

    /// Whether the address is refused globally, by block list or by an
    /// exclusive allow list. The bypass list overrides both.
    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        let Ok(addr) = IpAddr::from_str(ip) else {
            return false;
        };
        if self.bypassed.contains(addr) {
            return false;
        }
        if self.blocked.contains(addr) {
            return true;
        }
        !self.allowed.is_empty() && !self.allowed.contains(addr)
    }

    /// Whether the address may reach a specific endpoint. Endpoints without
    /// an allow list (or with an empty one) accept everyone.
    pub fn is_ip_allowed_for_endpoint(&self, ip: &str, endpoint: &str) -> bool {
        let Some(allowed) = self.allowed_per_endpoint.get(endpoint) else {
            return true;
        };
        if allowed.is_empty() {
            return true;
        }
        match IpAddr::from_str(ip) {
            Ok(addr) => allowed.contains(addr),
            Err(_) => true,
        }
    }

    /// Full check for one request, first matching rule wins.
    pub fn check(&self, ip: &str, endpoint: &str) -> Option<BlockReason> {
        if self.is_ip_bypassed(ip) {
            return None;
        }
        if let Ok(addr) = IpAddr::from_str(ip) {
            if self.blocked.contains(addr) {
                return Some(BlockReason::IpBlocked);
            }
            if !self.allowed.is_empty() && !self.allowed.contains(addr) {
                return Some(BlockReason::IpNotInAllowlist);
            }
        }
        if !self.is_ip_allowed_for_endpoint(ip, endpoint) {
            return Some(BlockReason::IpNotAllowedForEndpoint);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_list() -> BlockList {
        BlockList {
            blocked: IpSet::parse(["9.9.9.9", "10.0.0.0/8"]),
            bypassed: IpSet::parse(["10.1.1.1"]),
            allowed: IpSet::new(),
            allowed_per_endpoint: HashMap::from([(
                "GET|admin".to_string(),
                IpSet::parse(["192.168.0.0/16"]),
            )]),
        }
    }

    #[test]
    fn blocked_addresses_and_ranges() {
        let list = block_list();
        assert!(list.is_ip_blocked("9.9.9.9"));
        assert!(list.is_ip_blocked("10.2.3.4"));
        assert!(!list.is_ip_blocked("8.8.8.8"));
    }

    #[test]
    fn bypass_overrides_block() {
        let list = block_list();
        assert!(list.is_ip_bypassed("10.1.1.1"));
        assert!(!list.is_ip_blocked("10.1.1.1"));
        assert_eq!(list.check("10.1.1.1", "GET|x"), None);
    }

    #[test]
    fn exclusive_allowlist_refuses_outsiders() {
        let list = BlockList {
            allowed: IpSet::parse(["172.16.0.0/12"]),
            ..Default::default()
        };
        assert!(!list.is_ip_blocked("172.16.5.5"));
        assert!(list.is_ip_blocked("8.8.8.8"));
        assert_eq!(list.check("8.8.8.8", "GET|x"), Some(BlockReason::IpNotInAllowlist));
    }

    #[test]
    fn per_endpoint_allowlist() {
        let list = block_list();
        assert!(list.is_ip_allowed_for_endpoint("192.168.1.1", "GET|admin"));
        assert!(!list.is_ip_allowed_for_endpoint("8.8.8.8", "GET|admin"));
        // Endpoints without a list accept everyone.
        assert!(list.is_ip_allowed_for_endpoint("8.8.8.8", "GET|public"));
        assert_eq!(
            list.check("8.8.8.8", "GET|admin"),
            Some(BlockReason::IpNotAllowedForEndpoint)
        );
    }

    #[test]
    fn unparsable_ip_is_never_blocked() {
        let list = block_list();
        assert!(!list.is_ip_blocked("not-an-ip"));
        assert!(list.is_ip_allowed_for_endpoint("not-an-ip", "GET|admin"));
        assert_eq!(list.check("not-an-ip", "GET|admin"), None);
    }
}
