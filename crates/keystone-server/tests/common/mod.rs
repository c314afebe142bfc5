//! Common test utilities for server tests
//!
//! Provides a signing key with its JWK, a mock JWKS endpoint, a ready-made
//! application state and server configuration built from flags.

#![allow(dead_code)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use keystone_auth::{KeyCache, KeySet, TokenValidator};
use keystone_server::{AppState, ServerConfig};
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const ISSUER: &str = "https://issuer.keystone.test/";
pub const AUDIENCE: &str = "https://api.keystone.test";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const KID: &str = "server-test-key";

struct RsaMaterial {
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

fn material() -> &'static RsaMaterial {
    static MATERIAL: OnceLock<RsaMaterial> = OnceLock::new();
    MATERIAL.get_or_init(|| {
        use rsa::RsaPrivateKey;
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};
        use rsa::traits::PublicKeyParts;

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key");

        RsaMaterial {
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Invalid RSA key"),
            n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    })
}

/// JWKS document publishing the test key under [`KID`]
pub fn jwks() -> Value {
    let material = material();
    json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KID,
            "n": material.n,
            "e": material.e,
        }]
    })
}

/// Sign `claims` with the test key under `kid`
pub fn sign_with_kid(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, &material().encoding_key).expect("Failed to encode test JWT")
}

/// Sign `claims` with the published test key
pub fn sign(claims: &Value) -> String {
    sign_with_kid(KID, claims)
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Claims that pass every check right now
pub fn valid_claims(sub: &str) -> Value {
    let now = now();
    json!({
        "sub": sub,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

/// State whose cache already holds the test key
pub fn loaded_state() -> AppState {
    let cache = KeyCache::new();
    cache.install(
        KeySet::from_jwks_document(jwks().to_string().as_bytes()).expect("Invalid test JWKS"),
    );
    state_for(cache)
}

/// State over `cache`, expecting the test issuer and audience
pub fn state_for(cache: KeyCache) -> AppState {
    let validator = TokenValidator::new(cache.clone(), ISSUER, AUDIENCE);
    AppState::new(Arc::new(validator), cache)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Invalid request")
}

pub fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", authorization)
        .body(Body::empty())
        .expect("Invalid request")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// JWKS endpoint backed by wiremock
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    pub async fn serve_jwks(&self) {
        self.respond_with(ResponseTemplate::new(200).set_body_json(jwks()))
            .await;
    }

    pub async fn serve_status(&self, status: u16) {
        self.respond_with(ResponseTemplate::new(status)).await;
    }

    async fn respond_with(&self, template: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Server configuration against this provider on an ephemeral local port
    pub fn server_config(&self, extra: &[&str]) -> ServerConfig {
        let jwks_uri = self.jwks_uri();
        let base = [
            "keystone-server",
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--issuer",
            ISSUER,
            "--audience",
            AUDIENCE,
            "--jwks-uri",
            jwks_uri.as_str(),
            "--fetch-timeout-secs",
            "2",
            "--startup-timeout-secs",
            "1",
            "--shutdown-timeout-secs",
            "5",
        ];
        ServerConfig::try_parse_from(base.iter().chain(extra).copied())
            .expect("Invalid test server configuration")
    }
}
