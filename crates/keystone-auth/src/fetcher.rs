//! JWKS retrieval.
//!
//! [`KeyFetcher`] is the seam between the refresh loop and the network.
//! [`HttpKeyFetcher`] performs one bounded GET per call and never retries;
//! retry cadence belongs to the refresh loop.
//!
//! # Security Considerations
//!
//! - HTTPS required for JWKS endpoints; plain HTTP only on loopback hosts
//! - Response size is capped while the body is read, before it is parsed

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};
use url::{Host, Url};

use crate::config::AuthConfig;
use crate::error::FetchError;
use crate::keys::KeySet;

/// Default upper bound on a JWKS response body
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 256 * 1024;

/// Source of signing key sets
#[async_trait]
pub trait KeyFetcher: Send + Sync + std::fmt::Debug {
    /// Retrieve and filter the current key set
    ///
    /// # Errors
    ///
    /// Any [`FetchError`]; [`FetchError::NoUsableKeys`] when the document
    /// parsed but held no signing keys.
    async fn fetch(&self) -> Result<KeySet, FetchError>;

    /// Where keys come from, for logs
    fn endpoint(&self) -> &str;
}

/// Fetches a JWKS document over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpKeyFetcher {
    jwks_uri: Url,
    http_client: reqwest::Client,
    timeout: Duration,
    max_document_bytes: usize,
}

impl HttpKeyFetcher {
    /// Create a fetcher for `jwks_uri` with a per-request timeout
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidEndpoint`] for non-HTTPS, non-loopback endpoints;
    /// [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(jwks_uri: Url, timeout: Duration) -> Result<Self, FetchError> {
        if !is_secure_endpoint(&jwks_uri) {
            return Err(FetchError::InvalidEndpoint {
                uri: jwks_uri.to_string(),
                reason: "JWKS endpoint must use HTTPS (HTTP only allowed for loopback hosts)"
                    .into(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keystone-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self {
            jwks_uri,
            http_client,
            timeout,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        })
    }

    /// Create a fetcher from validated configuration
    ///
    /// # Errors
    ///
    /// As [`HttpKeyFetcher::new`], plus [`FetchError::InvalidEndpoint`] when
    /// no JWKS URI can be derived from the configuration.
    pub fn from_config(config: &AuthConfig) -> Result<Self, FetchError> {
        let jwks_uri = config
            .resolved_jwks_uri()
            .map_err(|err| FetchError::InvalidEndpoint {
                uri: config.jwks_uri.clone().unwrap_or_default(),
                reason: err.to_string(),
            })?;
        Ok(Self::new(jwks_uri, config.fetch_timeout)?
            .with_max_document_bytes(config.max_document_bytes))
    }

    /// Override the response size limit
    pub fn with_max_document_bytes(mut self, limit: usize) -> Self {
        self.max_document_bytes = limit;
        self
    }

    /// The endpoint this fetcher reads from
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    fn request_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err)
        }
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        let mut response = self
            .http_client
            .get(self.jwks_uri.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        if let Some(length) = response.content_length()
            && length > self.max_document_bytes as u64
        {
            return Err(FetchError::BodyTooLarge {
                limit: self.max_document_bytes,
            });
        }

        // Content-Length may be absent or wrong; the cap applies to bytes read
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| self.request_error(err))?
        {
            if body.len() + chunk.len() > self.max_document_bytes {
                return Err(FetchError::BodyTooLarge {
                    limit: self.max_document_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let set = KeySet::from_jwks_document(&body)?;
        info!(
            jwks_uri = %self.jwks_uri,
            key_count = set.len(),
            "Fetched JWKS"
        );
        Ok(set)
    }

    fn endpoint(&self) -> &str {
        self.jwks_uri.as_str()
    }
}

/// HTTPS anywhere, plain HTTP only for loopback hosts
pub(crate) fn is_secure_endpoint(uri: &Url) -> bool {
    match uri.scheme() {
        "https" => true,
        "http" => match uri.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
            None => false,
        },
        _ => false,
    }
}
