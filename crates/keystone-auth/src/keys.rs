//! JSON Web Keys and the immutable key set built from them.
//!
//! A JWKS document is reduced to a [`KeySet`] by keeping only entries that
//! can verify signatures: `use` is `sig`, `kid` is non-empty, the key type
//! and algorithm are supported, and usable public material is present.
//! Everything else is dropped with a debug log.
//!
//! Supported keys:
//! - RSA with RS256/384/512 or PS256/384/512 (RS256 when `alg` is absent),
//!   from `n`/`e` or, failing that, the first `x5c` certificate
//! - EC with ES256 on P-256 or ES384 on P-384

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use tracing::{debug, warn};
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;

use crate::error::FetchError;

/// JWKS document as served by the identity provider
///
/// Entries are kept as raw JSON so one malformed key cannot spoil the
/// whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkDocument {
    /// Raw key entries
    pub keys: Vec<serde_json::Value>,
}

/// JSON Web Key (RFC 7517), public members only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, oct, OKP)
    #[serde(default)]
    pub kty: String,

    /// Key ID used to select the key for a token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Public key use (sig, enc)
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm the key is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Elliptic curve name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// X.509 certificate chain (standard base64 DER), leaf first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

/// Why a JWK entry was not admitted into a key set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyRejection {
    /// `kid` missing or empty
    #[error("missing kid")]
    MissingKid,
    /// `use` is not `sig`
    #[error("key use {0:?} is not sig")]
    NotForSignature(Option<String>),
    /// `kty` is not RSA or EC
    #[error("unsupported key type {0:?}")]
    UnsupportedKeyType(String),
    /// `alg` or `crv` not supported for the key type
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),
    /// Neither component values nor a certificate
    #[error("no public key material")]
    MissingMaterial,
    /// Material present but unusable
    #[error("invalid key material: {0}")]
    InvalidMaterial(String),
}

impl Jwk {
    /// Check this entry against the signing-key filter and build a verifier for it
    ///
    /// # Errors
    ///
    /// Returns the first [`KeyRejection`] reason that applies.
    pub fn to_signing_key(&self) -> Result<SigningKey, KeyRejection> {
        let kid = match self.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(KeyRejection::MissingKid),
        };
        if self.key_use.as_deref() != Some("sig") {
            return Err(KeyRejection::NotForSignature(self.key_use.clone()));
        }

        let algorithm = self.algorithm()?;
        let (key_type, decoding_key) = match self.kty.as_str() {
            "RSA" => (KeyType::Rsa, self.rsa_key()?),
            _ => (KeyType::Ec, self.ec_key()?),
        };

        Ok(SigningKey {
            kid: kid.to_string(),
            algorithm,
            key_type,
            decoding_key,
        })
    }

    fn algorithm(&self) -> Result<Algorithm, KeyRejection> {
        match self.kty.as_str() {
            "RSA" => match self.alg.as_deref() {
                None | Some("RS256") => Ok(Algorithm::RS256),
                Some("RS384") => Ok(Algorithm::RS384),
                Some("RS512") => Ok(Algorithm::RS512),
                Some("PS256") => Ok(Algorithm::PS256),
                Some("PS384") => Ok(Algorithm::PS384),
                Some("PS512") => Ok(Algorithm::PS512),
                Some(other) => Err(KeyRejection::UnsupportedAlgorithm(other.to_string())),
            },
            "EC" => match (self.crv.as_deref(), self.alg.as_deref()) {
                (Some("P-256"), None | Some("ES256")) => Ok(Algorithm::ES256),
                (Some("P-384"), None | Some("ES384")) => Ok(Algorithm::ES384),
                (crv, alg) => Err(KeyRejection::UnsupportedAlgorithm(format!(
                    "{}/{}",
                    crv.unwrap_or("-"),
                    alg.unwrap_or("-")
                ))),
            },
            other => Err(KeyRejection::UnsupportedKeyType(other.to_string())),
        }
    }

    fn rsa_key(&self) -> Result<DecodingKey, KeyRejection> {
        match (non_empty(&self.n), non_empty(&self.e)) {
            (Some(n), Some(e)) => {
                decode_component("n", n)?;
                decode_component("e", e)?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| KeyRejection::InvalidMaterial(err.to_string()))
            }
            _ => match self.x5c.as_ref().and_then(|chain| chain.first()) {
                Some(leaf) => rsa_key_from_certificate(leaf),
                None => Err(KeyRejection::MissingMaterial),
            },
        }
    }

    fn ec_key(&self) -> Result<DecodingKey, KeyRejection> {
        let (Some(x), Some(y)) = (non_empty(&self.x), non_empty(&self.y)) else {
            return Err(KeyRejection::MissingMaterial);
        };
        decode_component("x", x)?;
        decode_component("y", y)?;
        DecodingKey::from_ec_components(x, y)
            .map_err(|err| KeyRejection::InvalidMaterial(err.to_string()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn decode_component(name: &str, value: &str) -> Result<(), KeyRejection> {
    match URL_SAFE_NO_PAD.decode(value) {
        Ok(bytes) if !bytes.is_empty() => Ok(()),
        Ok(_) => Err(KeyRejection::InvalidMaterial(format!("empty {name}"))),
        Err(err) => Err(KeyRejection::InvalidMaterial(format!("{name}: {err}"))),
    }
}

/// Extract the RSA public key from a base64 DER certificate
fn rsa_key_from_certificate(encoded: &str) -> Result<DecodingKey, KeyRejection> {
    let der = STANDARD
        .decode(encoded)
        .map_err(|err| KeyRejection::InvalidMaterial(format!("x5c: {err}")))?;
    let (_, certificate) = x509_parser::parse_x509_certificate(&der)
        .map_err(|err| KeyRejection::InvalidMaterial(format!("x5c: {err}")))?;

    let spki = certificate.public_key();
    if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
        return Err(KeyRejection::InvalidMaterial(
            "x5c certificate does not carry an RSA key".into(),
        ));
    }
    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}

/// Family of a verified key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// RSA (PKCS#1 v1.5 or PSS)
    Rsa,
    /// ECDSA
    Ec,
}

/// A public key admitted into a key set, ready to verify signatures
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    key_type: KeyType,
    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Key ID
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The only algorithm this key verifies
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Key family
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Immutable snapshot of the provider's signing keys, indexed by `kid`
///
/// A set is never modified after construction; rotation installs a whole
/// new set in the [`KeyCache`](crate::KeyCache).
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Option<SystemTime>,
    generation: u64,
}

impl KeySet {
    /// The empty sentinel a cache starts with before the first install
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// A freshly fetched set with no keys
    pub fn empty() -> Self {
        Self {
            fetched_at: Some(SystemTime::now()),
            ..Self::default()
        }
    }

    /// Build a set from already-admitted keys
    ///
    /// When two keys share a `kid` the first one wins.
    pub fn from_keys(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let mut indexed: HashMap<String, SigningKey> = HashMap::new();
        for key in keys {
            if indexed.contains_key(&key.kid) {
                warn!(kid = %key.kid, "Duplicate kid in JWKS document, keeping the first entry");
                continue;
            }
            indexed.insert(key.kid.clone(), key);
        }

        Self {
            keys: indexed,
            fetched_at: Some(SystemTime::now()),
            generation: 0,
        }
    }

    /// Parse a JWKS document body and keep only usable signing keys
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidDocument`] if the body is not a JWKS document,
    /// [`FetchError::NoUsableKeys`] if every entry was filtered out.
    pub fn from_jwks_document(body: &[u8]) -> Result<Self, FetchError> {
        let document: JwkDocument = serde_json::from_slice(body)
            .map_err(|err| FetchError::InvalidDocument(err.to_string()))?;
        let candidates = document.keys.len();

        let admitted: Vec<SigningKey> = document
            .keys
            .into_iter()
            .filter_map(|entry| {
                let jwk: Jwk = match serde_json::from_value(entry) {
                    Ok(jwk) => jwk,
                    Err(err) => {
                        debug!(error = %err, "Skipping unparseable JWK entry");
                        return None;
                    }
                };
                match jwk.to_signing_key() {
                    Ok(key) => Some(key),
                    Err(reason) => {
                        debug!(kid = ?jwk.kid, kty = %jwk.kty, %reason, "Skipping JWK entry");
                        None
                    }
                }
            })
            .collect();

        if admitted.is_empty() {
            return Err(FetchError::NoUsableKeys { candidates });
        }
        Ok(Self::from_keys(admitted))
    }

    /// Look up a key by `kid`
    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the set has no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in no particular order
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// When the document behind this set was fetched; `None` for the sentinel
    pub fn fetched_at(&self) -> Option<SystemTime> {
        self.fetched_at
    }

    /// Install counter assigned by the cache; 0 until installed
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False only for the startup sentinel
    pub fn is_initialized(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}
