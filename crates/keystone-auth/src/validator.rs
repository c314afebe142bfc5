//! Bearer token validation against the cached key set.
//!
//! Checks run in a fixed order and the first failure is returned:
//!
//! 1. structure (three segments, decodable header and claims, `exp` present)
//! 2. `kid` present in the header
//! 3. key lookup in the current [`KeySet`](crate::KeySet)
//! 4. signature, using the key's algorithm and never the header's
//! 5. audience, issuer
//! 6. `exp` strictly, then `nbf` and `iat` with skew, against the injected
//!    [`Clock`]
//! 7. subject
//!
//! Validation is synchronous and never touches the network. A key missing
//! from the cache is reported, not fetched.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth_metrics;
use crate::cache::KeyCache;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::{ConfigError, ValidationError};

/// Default tolerance for `nbf` and `iat`; `exp` gets none
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// `aud` claim, which may be a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "api"`
    Single(String),
    /// `"aud": ["api", "other"]`
    Many(Vec<String>),
}

impl Audience {
    /// True if `audience` is one of the entries
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(value) => value == audience,
            Self::Many(values) => values.iter().any(|v| v == audience),
        }
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// Claims exactly as they appear in the payload
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    aud: Option<Audience>,
    exp: Option<u64>,
    nbf: Option<u64>,
    iat: Option<u64>,
    jti: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Claims of a token that passed every check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    /// `sub`, never blank
    pub subject: String,
    /// `iss`, equal to the expected issuer
    pub issuer: String,
    /// `aud` entries; contains the expected audience
    pub audience: Vec<String>,
    /// `exp`
    pub expires_at: u64,
    /// `nbf`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<u64>,
    /// `iat`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<u64>,
    /// `jti`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    /// `kid` of the key that verified the signature
    pub key_id: String,
    /// Any other claims (scope, permissions, custom namespaces)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validates bearer tokens for one issuer and audience
///
/// # Example
///
/// ```rust
/// use keystone_auth::{KeyCache, TokenValidator, ValidationError};
///
/// let cache = KeyCache::new();
/// let validator = TokenValidator::new(cache, "https://acme.auth0.com/", "https://api.acme.dev");
///
/// // Nothing fetched yet: a structurally valid token would fail with KeyNotFound
/// assert!(matches!(
///     validator.validate("not-a-token"),
///     Err(ValidationError::MalformedToken { .. })
/// ));
/// ```
pub struct TokenValidator {
    cache: KeyCache,
    expected_issuer: String,
    expected_audience: String,
    clock_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("expected_issuer", &self.expected_issuer)
            .field("expected_audience", &self.expected_audience)
            .field("clock_skew", &self.clock_skew)
            .field("key_set_generation", &self.cache.generation())
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Create a validator reading keys from `cache`
    pub fn new(
        cache: KeyCache,
        expected_issuer: impl Into<String>,
        expected_audience: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            expected_issuer: expected_issuer.into(),
            expected_audience: expected_audience.into(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a validator from configuration
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if the configuration does not validate.
    pub fn from_config(cache: KeyCache, config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(cache, config.resolved_issuer()?, config.audience.clone())
            .with_clock_skew(config.clock_skew))
    }

    /// Set the tolerance for `nbf` and `iat`
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issuer tokens must carry
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    /// Audience tokens must carry
    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }

    /// Validate a raw token (without the `Bearer ` prefix)
    ///
    /// # Errors
    ///
    /// The first failing check as a [`ValidationError`].
    pub fn validate(&self, token: &str) -> Result<Claims, ValidationError> {
        let result = self.validate_inner(token.trim());
        match &result {
            Ok(claims) => {
                auth_metrics::record_validation("valid");
                debug!(sub = %claims.subject, kid = %claims.key_id, "Token validated");
            }
            Err(err) => {
                auth_metrics::record_validation(err.code());
                debug!(code = err.code(), error = %err, "Token rejected");
            }
        }
        result
    }

    fn validate_inner(&self, token: &str) -> Result<Claims, ValidationError> {
        let raw = parse_structure(token)?;

        let kid = raw
            .header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(ValidationError::UnknownKid)?;

        let keys = self.cache.current();
        let key = keys
            .get(&kid)
            .ok_or_else(|| ValidationError::KeyNotFound { kid: kid.clone() })?;

        if raw.header.alg != key.algorithm() {
            debug!(
                kid = %kid,
                header_alg = ?raw.header.alg,
                key_alg = ?key.algorithm(),
                "Token algorithm does not match key"
            );
            return Err(ValidationError::SignatureInvalid);
        }

        // Signature only; claims are checked below against our own clock
        let mut validation = Validation::new(key.algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        decode::<serde_json::Value>(token, key.decoding_key(), &validation).map_err(|err| {
            debug!(kid = %kid, error = %err, "Signature verification failed");
            ValidationError::SignatureInvalid
        })?;

        self.check_claims(&raw.claims)?;

        let RawClaims {
            sub,
            iss,
            aud,
            exp,
            nbf,
            iat,
            jti,
            extra,
        } = raw.claims;
        let subject = sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(ValidationError::MissingSubject)?;

        Ok(Claims {
            subject,
            issuer: iss.unwrap_or_default(),
            audience: aud.map(Audience::into_vec).unwrap_or_default(),
            expires_at: exp.unwrap_or_default(),
            not_before: nbf,
            issued_at: iat,
            token_id: jti,
            key_id: kid,
            extra,
        })
    }

    fn check_claims(&self, claims: &RawClaims) -> Result<(), ValidationError> {
        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.expected_audience))
        {
            return Err(ValidationError::AudienceMismatch);
        }
        if claims.iss.as_deref() != Some(self.expected_issuer.as_str()) {
            return Err(ValidationError::IssuerMismatch);
        }

        let now = self.clock.now();
        let skew = self.clock_skew.as_secs();
        let exp = claims.exp.ok_or(ValidationError::malformed("missing exp claim"))?;
        if now >= exp {
            return Err(ValidationError::Expired);
        }
        if let Some(nbf) = claims.nbf
            && now.saturating_add(skew) < nbf
        {
            return Err(ValidationError::NotYetValid);
        }
        if let Some(iat) = claims.iat
            && iat > now.saturating_add(skew)
        {
            return Err(ValidationError::IssuedAtInvalid);
        }
        Ok(())
    }
}

struct RawToken {
    header: jsonwebtoken::Header,
    claims: RawClaims,
}

fn parse_structure(token: &str) -> Result<RawToken, ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::malformed("empty token"));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(ValidationError::malformed("expected three non-empty segments"));
    }

    let header =
        decode_header(token).map_err(|_| ValidationError::malformed("undecodable header"))?;
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| ValidationError::malformed("payload is not base64url"))?;
    let claims: RawClaims = serde_json::from_slice(&payload)
        .map_err(|_| ValidationError::malformed("payload is not a claims object"))?;
    if claims.exp.is_none() {
        return Err(ValidationError::malformed("missing exp claim"));
    }

    Ok(RawToken { header, claims })
}
