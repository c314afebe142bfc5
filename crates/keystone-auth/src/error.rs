//! Error types for key retrieval, token validation and configuration.
//!
//! Every rejection the validator can produce is a distinct [`ValidationError`]
//! variant so callers can map them to protocol responses. [`ValidationError::code`]
//! yields the stable, machine-readable string used on the wire.

use std::time::Duration;

/// Errors produced while retrieving or parsing a JWKS document
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The configured endpoint is not an acceptable JWKS location
    #[error("invalid JWKS endpoint {uri}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// The request did not complete within the fetch timeout
    #[error("JWKS request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or protocol failure
    #[error("JWKS request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("JWKS endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// The response body exceeded the configured size limit
    #[error("JWKS document exceeds {limit} bytes")]
    BodyTooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// The body is not a JWKS document
    #[error("invalid JWKS document: {0}")]
    InvalidDocument(String),

    /// The document parsed but no entry passed the signing-key filter
    #[error("JWKS document contains no usable signing keys ({candidates} entries inspected)")]
    NoUsableKeys {
        /// Number of entries in the document
        candidates: usize,
    },
}

impl FetchError {
    /// Short label used for log fields and metric dimensions
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::HttpStatus(_) => "http_status",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::InvalidDocument(_) => "invalid_document",
            Self::NoUsableKeys { .. } => "no_usable_keys",
        }
    }
}

/// Reasons a bearer token is rejected
///
/// Variants are listed in the order the validator checks them; the first
/// failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Not three dot-separated segments, undecodable header or payload,
    /// or a required claim (`exp`) is absent
    #[error("malformed token: {reason}")]
    MalformedToken {
        /// Which structural check failed
        reason: &'static str,
    },

    /// Header has no `kid`
    #[error("token header has no key id")]
    UnknownKid,

    /// No key with the token's `kid` in the current key set
    #[error("no signing key found for kid {kid:?}")]
    KeyNotFound {
        /// The `kid` the token asked for
        kid: String,
    },

    /// Signature does not verify, or the header algorithm does not match the key
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// `aud` does not contain the expected audience
    #[error("token audience does not match")]
    AudienceMismatch,

    /// `iss` is not the expected issuer
    #[error("token issuer does not match")]
    IssuerMismatch,

    /// `exp` is at or before the current time
    #[error("token has expired")]
    Expired,

    /// `nbf` is in the future beyond the allowed skew
    #[error("token is not valid yet")]
    NotYetValid,

    /// `iat` is in the future beyond the allowed skew
    #[error("token was issued in the future")]
    IssuedAtInvalid,

    /// `sub` is absent or blank
    #[error("token has no subject")]
    MissingSubject,
}

impl ValidationError {
    /// Stable machine-readable code for this rejection
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedToken { .. } => "malformed_token",
            Self::UnknownKid => "unknown_kid",
            Self::KeyNotFound { .. } => "key_not_found",
            Self::SignatureInvalid => "invalid_signature",
            Self::AudienceMismatch => "invalid_audience",
            Self::IssuerMismatch => "invalid_issuer",
            Self::Expired => "token_expired",
            Self::NotYetValid => "token_not_yet_valid",
            Self::IssuedAtInvalid => "invalid_issued_at",
            Self::MissingSubject => "missing_subject",
        }
    }

    pub(crate) fn malformed(reason: &'static str) -> Self {
        Self::MalformedToken { reason }
    }
}

/// Invalid or incomplete [`AuthConfig`](crate::AuthConfig)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required value was not provided
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    /// A value was provided but cannot be used
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
