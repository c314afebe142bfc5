//! Common test utilities for integration tests
//!
//! Provides a mock identity provider (JWKS endpoint), signing keys with
//! their published JWK form, and token/claims builders.

#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use keystone_auth::AuthConfig;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ISSUER: &str = "https://issuer.keystone.test/";
pub const AUDIENCE: &str = "https://api.keystone.test";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// JWKS endpoint backed by wiremock
pub struct MockIdentityProvider {
    pub server: MockServer,
    pub jwks_uri: String,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_uri = format!("{}{}", server.uri(), JWKS_PATH);
        Self { server, jwks_uri }
    }

    /// Configuration pointing at this provider
    pub fn config(&self) -> AuthConfig {
        AuthConfig::new(ISSUER, AUDIENCE)
            .with_jwks_uri(self.jwks_uri.clone())
            .with_fetch_timeout(Duration::from_secs(2))
    }

    /// Replace whatever is mounted with `template`
    pub async fn respond_with(&self, template: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    pub async fn serve_jwks(&self, document: &Value) {
        self.respond_with(ResponseTemplate::new(200).set_body_json(document))
            .await;
    }

    pub async fn serve_status(&self, status: u16) {
        self.respond_with(ResponseTemplate::new(status)).await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

/// A private key and the JWK the provider would publish for it
#[derive(Clone)]
pub struct TestKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub jwk: Value,
    encoding_key: EncodingKey,
}

impl TestKey {
    /// Sign `claims` with a header naming this key
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        jsonwebtoken::encode(header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }

    /// Same private key, published under a different kid
    pub fn with_kid(&self, kid: &str) -> Self {
        let mut key = self.clone();
        key.kid = kid.to_string();
        key.jwk["kid"] = json!(kid);
        key
    }
}

struct RsaMaterial {
    private_pem: Vec<u8>,
    n: String,
    e: String,
}

fn generate_rsa_material() -> RsaMaterial {
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::traits::PublicKeyParts;

    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .expect("Failed to encode private key")
        .as_bytes()
        .to_vec();

    RsaMaterial {
        private_pem,
        n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
    }
}

static PRIMARY_RSA: OnceLock<RsaMaterial> = OnceLock::new();
static SECONDARY_RSA: OnceLock<RsaMaterial> = OnceLock::new();

fn rsa_test_key(material: &RsaMaterial, kid: &str) -> TestKey {
    TestKey {
        kid: kid.to_string(),
        algorithm: Algorithm::RS256,
        jwk: json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": material.n,
            "e": material.e,
        }),
        encoding_key: EncodingKey::from_rsa_pem(&material.private_pem).expect("Invalid RSA key"),
    }
}

/// RS256 key; every call shares the same key pair
pub fn rsa_key(kid: &str) -> TestKey {
    rsa_test_key(PRIMARY_RSA.get_or_init(generate_rsa_material), kid)
}

/// A second, unrelated RS256 key pair
pub fn other_rsa_key(kid: &str) -> TestKey {
    rsa_test_key(SECONDARY_RSA.get_or_init(generate_rsa_material), kid)
}

/// ES256 key on P-256
pub fn ec_key() -> TestKey {
    let jwk: Value = serde_json::from_str(include_str!("../fixtures/es256_signer.jwk.json"))
        .expect("Invalid EC JWK fixture");
    TestKey {
        kid: jwk["kid"].as_str().expect("kid").to_string(),
        algorithm: Algorithm::ES256,
        jwk,
        encoding_key: EncodingKey::from_ec_pem(include_bytes!("../fixtures/es256_signer.key.pem"))
            .expect("Invalid EC key"),
    }
}

/// RS256 key published only as an X.509 certificate chain
pub fn x5c_key(kid: &str) -> TestKey {
    let certificate = include_str!("../fixtures/x5c_signer.cert.b64").trim();
    TestKey {
        kid: kid.to_string(),
        algorithm: Algorithm::RS256,
        jwk: json!({
            "kty": "RSA",
            "use": "sig",
            "kid": kid,
            "x5c": [certificate],
        }),
        encoding_key: EncodingKey::from_rsa_pem(include_bytes!("../fixtures/x5c_signer.key.pem"))
            .expect("Invalid RSA key"),
    }
}

/// JWKS document publishing `keys`
pub fn jwks(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk.clone()).collect::<Vec<_>>() })
}

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Claims that pass every check at `now`
pub fn claims_at(sub: &str, now: u64) -> Value {
    json!({
        "sub": sub,
        "iss": ISSUER,
        "aud": [AUDIENCE, "https://issuer.keystone.test/userinfo"],
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
        "scope": "openid profile",
    })
}

/// Claims that pass every check right now
pub fn valid_claims(sub: &str) -> Value {
    claims_at(sub, current_timestamp())
}
