//! Authentication configuration for the query endpoints
//!
//! Two independent schemes are supported: HTTP Basic (username and password)
//! and a static bearer token. When both are configured a request passing
//! either one is accepted. When neither is configured the endpoints are open.

use std::fmt;

/// Username and password for HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// HTTP Basic credentials
    pub basic: Option<BasicCredentials>,

    /// Static bearer token
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    /// Build from optional parts. Basic auth is only enabled when both the
    /// username and the password are present and non-empty.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        bearer_token: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let basic = match (non_empty(username), non_empty(password)) {
            (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
            _ => None,
        };
        Self {
            basic,
            bearer_token: non_empty(bearer_token),
        }
    }

    /// Whether any scheme is configured.
    pub fn is_enabled(&self) -> bool {
        self.basic.is_some() || self.bearer_token.is_some()
    }

    /// Value for the `WWW-Authenticate` header of a 401 response.
    pub fn challenge(&self) -> &'static str {
        if self.basic.is_some() {
            "Basic realm=\"duckgate\", charset=\"UTF-8\""
        } else {
            "Bearer realm=\"duckgate\""
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("basic", &self.basic)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
