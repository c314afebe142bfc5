//! Validation configuration

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::fetcher::{DEFAULT_MAX_DOCUMENT_BYTES, is_secure_endpoint};
use crate::refresh::EmptyKeySetPolicy;

/// Everything needed to fetch keys and validate tokens for one issuer
///
/// The issuer is either given directly or derived from a hosted-tenant name
/// (`https://{tenant}.auth0.com/`). The JWKS URI defaults to
/// `{issuer}/.well-known/jwks.json`.
///
/// # Example
///
/// ```rust
/// use keystone_auth::AuthConfig;
/// use std::time::Duration;
///
/// let config = AuthConfig::for_tenant("acme", "https://api.acme.dev")
///     .with_clock_skew(Duration::from_secs(30));
///
/// assert_eq!(config.resolved_issuer().unwrap(), "https://acme.auth0.com/");
/// assert_eq!(
///     config.resolved_jwks_uri().unwrap().as_str(),
///     "https://acme.auth0.com/.well-known/jwks.json"
/// );
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected `iss`, verbatim
    pub issuer: Option<String>,
    /// Hosted tenant name, used when `issuer` is not set
    pub tenant: Option<String>,
    /// Expected `aud` entry
    pub audience: String,
    /// Explicit JWKS endpoint
    pub jwks_uri: Option<String>,
    /// Time between refreshes
    #[serde_as(as = "DurationSeconds<u64>")]
    pub refresh_interval: Duration,
    /// Per-request fetch timeout
    #[serde_as(as = "DurationSeconds<u64>")]
    pub fetch_timeout: Duration,
    /// Tolerance applied to `nbf` and `iat`; `exp` is strict
    #[serde_as(as = "DurationSeconds<u64>")]
    pub clock_skew: Duration,
    /// How long startup waits for the first key set
    #[serde_as(as = "DurationSeconds<u64>")]
    pub startup_timeout: Duration,
    /// Fail startup when no key set arrives within `startup_timeout`
    pub require_keys_on_startup: bool,
    /// What to do when a fetch yields no usable keys
    pub empty_key_set_policy: EmptyKeySetPolicy,
    /// Response size limit for the JWKS document
    pub max_document_bytes: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            tenant: None,
            audience: String::new(),
            jwks_uri: None,
            refresh_interval: Duration::from_secs(15 * 60),
            fetch_timeout: Duration::from_secs(10),
            clock_skew: Duration::from_secs(60),
            startup_timeout: Duration::from_secs(10),
            require_keys_on_startup: false,
            empty_key_set_policy: EmptyKeySetPolicy::default(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

impl AuthConfig {
    /// Configuration for an explicit issuer
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            audience: audience.into(),
            ..Self::default()
        }
    }

    /// Configuration for a hosted tenant
    pub fn for_tenant(tenant: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            audience: audience.into(),
            ..Self::default()
        }
    }

    /// Use an explicit JWKS endpoint instead of the derived one
    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    /// Set the refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the clock skew tolerance
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Set the startup wait and whether running without keys is fatal
    pub fn with_startup(mut self, timeout: Duration, require_keys: bool) -> Self {
        self.startup_timeout = timeout;
        self.require_keys_on_startup = require_keys;
        self
    }

    /// Set the empty-document policy
    pub fn with_empty_key_set_policy(mut self, policy: EmptyKeySetPolicy) -> Self {
        self.empty_key_set_policy = policy;
        self
    }

    /// The issuer tokens must carry
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when neither issuer nor tenant is set,
    /// [`ConfigError::Invalid`] for a tenant name that cannot form a host.
    pub fn resolved_issuer(&self) -> Result<String, ConfigError> {
        if let Some(issuer) = self.issuer.as_deref().filter(|i| !i.trim().is_empty()) {
            return Ok(issuer.to_string());
        }

        let tenant = self
            .tenant
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("issuer or tenant"))?;
        if !tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(ConfigError::invalid(
                "tenant",
                format!("{tenant:?} is not a valid tenant name"),
            ));
        }
        Ok(format!("https://{tenant}.auth0.com/"))
    }

    /// The JWKS endpoint to fetch from
    ///
    /// # Errors
    ///
    /// As [`AuthConfig::resolved_issuer`], plus [`ConfigError::Invalid`] when
    /// the endpoint is not a URL or is plain HTTP on a non-loopback host.
    pub fn resolved_jwks_uri(&self) -> Result<Url, ConfigError> {
        let raw = match self.jwks_uri.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => format!(
                "{}/.well-known/jwks.json",
                self.resolved_issuer()?.trim_end_matches('/')
            ),
        };

        let uri = Url::parse(&raw).map_err(|err| ConfigError::invalid("jwks_uri", err.to_string()))?;
        if !is_secure_endpoint(&uri) {
            return Err(ConfigError::invalid(
                "jwks_uri",
                "must use HTTPS (HTTP only allowed for loopback hosts)",
            ));
        }
        Ok(uri)
    }

    /// Check the whole configuration
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Missing("audience"));
        }
        self.resolved_jwks_uri()?;
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::invalid("refresh_interval", "must be non-zero"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::invalid("fetch_timeout", "must be non-zero"));
        }
        if self.max_document_bytes == 0 {
            return Err(ConfigError::invalid("max_document_bytes", "must be non-zero"));
        }
        Ok(())
    }
}
