use serde::{Deserialize, Serialize};

/// The authenticated user attached to a request, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The slice of an inbound request the core consumes.
///
/// The interception layer fills this from whatever web framework it hooks
/// into; the core never touches raw HTTP. `route` is the matched route
/// template (e.g. `/api/users/{id}`), `url` the concrete path requested.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub route: String,
    pub url: String,
    pub user: Option<User>,
    pub remote_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// The identity used for per-client rate limiting: user id when
    /// authenticated, remote address otherwise.
    pub fn identity(&self) -> &str {
        if let Some(user) = &self.user {
            return &user.id;
        }
        self.remote_address.as_deref().unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_user_id() {
        let ctx = RequestContext {
            user: Some(User::new("u-1", "alice")),
            remote_address: Some("1.2.3.4".into()),
            ..Default::default()
        };
        assert_eq!(ctx.identity(), "u-1");
    }

    #[test]
    fn identity_falls_back_to_ip_then_unknown() {
        let ctx = RequestContext {
            remote_address: Some("1.2.3.4".into()),
            ..Default::default()
        };
        assert_eq!(ctx.identity(), "1.2.3.4");
        assert_eq!(RequestContext::default().identity(), "unknown");
    }
}
