use serde::{Deserialize, Serialize};

/// Rate-limit settings attached to an endpoint policy.
///
/// `max_requests == 0` means deny every request; `window_size_in_ms == 0`
/// disables limiting for the policy entirely. Both are defined behaviors,
/// not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub max_requests: u64,
    #[serde(rename = "windowSizeInMS")]
    pub window_size_in_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 0,
            window_size_in_ms: 0,
        }
    }
}

/// Per-endpoint protection policy delivered by the control plane.
///
/// The route may contain `{param}` segments or `*` wildcards. Policies are
/// immutable once part of a configuration snapshot; a sync replaces the whole
/// list atomically rather than mutating entries in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointPolicy {
    pub method: String,
    pub route: String,
    pub force_protection_off: bool,
    /// Deprecated control-plane field; entries carrying it are skipped on
    /// ingest.
    #[serde(rename = "graphql")]
    pub graphql: bool,
    #[serde(rename = "allowedIPAddresses")]
    pub allowed_ip_addresses: Vec<String>,
    pub rate_limiting: Option<RateLimitPolicy>,
}

impl EndpointPolicy {
    /// Returns the rate-limit settings if limiting is enabled on this policy.
    pub fn rate_limiting_enabled(&self) -> Option<&RateLimitPolicy> {
        self.rate_limiting.as_ref().filter(|rl| rl.enabled)
    }

    /// The normalized `METHOD|route` key for this policy.
    pub fn key(&self) -> String {
        endpoint_key(&self.method, &self.route)
    }
}

/// Builds the normalized `METHOD|route` key used for endpoint lookups.
///
/// The leading slash is trimmed from the route so `/api/users` and
/// `api/users` resolve to the same policy.
pub fn endpoint_key(method: &str, route: &str) -> String {
    format!("{}|{}", method, route.trim_start_matches('/'))
}
