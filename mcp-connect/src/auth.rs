//! API-key resolution and the `Authorization` header.
//!
//! An `api_key` is either a literal secret or an `env:NAME` reference. A
//! reference that does not resolve is a warning, never an error.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

const ENV_PREFIX: &str = "env:";

/// Header name used for bearer authentication.
pub const AUTHORIZATION: &str = "Authorization";

/// A configured API key, before resolution.
#[derive(Clone, PartialEq, Eq)]
pub enum ApiKey {
    /// The secret itself.
    Literal(String),
    /// Name of an environment variable holding the secret.
    Env(String),
}

impl ApiKey {
    /// Parses a raw `api_key` value. `env:NAME` becomes [`ApiKey::Env`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(ENV_PREFIX).map_or_else(
            || Self::Literal(raw.to_owned()),
            |name| Self::Env(name.to_owned()),
        )
    }

    /// Resolves the key against the process environment.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolves the key using `lookup` for environment references.
    ///
    /// Returns `None` for an empty literal, or for a reference whose variable
    /// is unset or empty.
    pub fn resolve_with<F>(&self, lookup: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        match self {
            Self::Literal(secret) => Some(secret.clone()).filter(|s| !s.is_empty()),
            Self::Env(name) => match lookup(name).filter(|v| !v.is_empty()) {
                Some(secret) => {
                    debug!(var = %name, "loaded API key from environment variable");
                    Some(secret)
                }
                None => {
                    warn!(var = %name, "API key environment variable specified but not found");
                    None
                }
            },
        }
    }
}

impl From<&str> for ApiKey {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for ApiKey {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("ApiKey::Literal(<redacted>)"),
            Self::Env(name) => f.debug_tuple("ApiKey::Env").field(name).finish(),
        }
    }
}

/// Inserts `Authorization: Bearer <secret>`, replacing any existing
/// authorization header regardless of its case.
pub fn apply_bearer(headers: &mut HashMap<String, String>, secret: &str) {
    let before = headers.len();
    headers.retain(|k, _| !k.eq_ignore_ascii_case(AUTHORIZATION));
    if headers.len() != before {
        debug!("replacing configured Authorization header with resolved API key");
    }
    headers.insert(AUTHORIZATION.to_owned(), format!("Bearer {secret}"));
}

/// Builds the final header set from configured headers and an optional key.
#[must_use]
pub fn resolve_headers(
    configured: &HashMap<String, String>,
    api_key: Option<&ApiKey>,
) -> HashMap<String, String> {
    let mut headers = configured.clone();
    if let Some(secret) = api_key.and_then(ApiKey::resolve) {
        apply_bearer(&mut headers, &secret);
    }
    headers
}
