//! Router-level tests driven with `tower::ServiceExt::oneshot`
//!
//! Tests cover:
//! - Public health and readiness checks
//! - Bearer authentication outcomes and their 401 bodies
//! - Request id generation and propagation
//! - Panic recovery

mod common;

use axum::http::{StatusCode, header::WWW_AUTHENTICATE};
use axum::{Router, routing::get as route_get};
use common::{
    AUDIENCE, ISSUER, body_json, get, get_with_auth, loaded_state, now, sign, sign_with_kid,
    state_for, valid_claims,
};
use keystone_auth::{KeyCache, KeySet};
use keystone_server::{middleware::with_common_layers, router};
use pretty_assertions::assert_eq;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_healthz_is_public() {
    let response = router(state_for(KeyCache::new()))
        .oneshot(get("/healthz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_readyz_reports_unavailable_until_keys_arrive() {
    let cache = KeyCache::new();
    let app = router(state_for(cache.clone()));

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    cache.install(KeySet::from_jwks_document(common::jwks().to_string().as_bytes()).unwrap());

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["key_set_generation"], 1);
    assert_eq!(body["key_count"], 1);
}

#[tokio::test]
async fn test_me_returns_token_identity() {
    let token = sign(&valid_claims("auth0|alice"));

    let response = router(loaded_state())
        .oneshot(get_with_auth("/v1/me", &format!("Bearer {token}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "id": "auth0|alice",
            "issuer": ISSUER,
            "audience": [AUDIENCE],
        })
    );
}

#[tokio::test]
async fn test_scheme_is_case_insensitive() {
    let token = sign(&valid_claims("auth0|alice"));

    let response = router(loaded_state())
        .oneshot(get_with_auth("/v1/me", &format!("bEaReR {token}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    let response = router(loaded_state()).oneshot(get("/v1/me")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_non_bearer_header_is_invalid_request() {
    for header in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer a b"] {
        let response = router(loaded_state())
            .oneshot(get_with_auth("/v1/me", header))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header}");
        assert_eq!(body_json(response).await["error"], "invalid_request", "{header}");
    }
}

#[tokio::test]
async fn test_expired_token_carries_invalid_token_challenge() {
    let mut claims = valid_claims("auth0|alice");
    claims["exp"] = json!(now() - 3600);
    claims["iat"] = json!(now() - 7200);

    let response = router(loaded_state())
        .oneshot(get_with_auth("/v1/me", &format!("Bearer {}", sign(&claims))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[WWW_AUTHENTICATE],
        r#"Bearer error="invalid_token""#
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "token_expired");
    assert!(body["error_description"].is_string());
}

#[tokio::test]
async fn test_rejection_codes_follow_validation_errors() {
    let mut wrong_audience = valid_claims("auth0|alice");
    wrong_audience["aud"] = json!("https://other.keystone.test");
    let mut no_subject = valid_claims("auth0|alice");
    no_subject["sub"] = json!("");

    let unknown_kid = sign_with_kid("rotated-away", &valid_claims("auth0|alice"));
    let wrong_audience = sign(&wrong_audience);
    let no_subject = sign(&no_subject);

    let cases = [
        ("not.a.jwt", "malformed_token"),
        (unknown_kid.as_str(), "key_not_found"),
        (wrong_audience.as_str(), "invalid_audience"),
        (no_subject.as_str(), "missing_subject"),
    ];

    for (token, expected) in cases {
        let response = router(loaded_state())
            .oneshot(get_with_auth("/v1/me", &format!("Bearer {token}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], expected);
    }
}

#[tokio::test]
async fn test_token_rejected_before_first_key_set() {
    let token = sign(&valid_claims("auth0|alice"));

    let response = router(state_for(KeyCache::new()))
        .oneshot(get_with_auth("/v1/me", &format!("Bearer {token}")))
        .await
        .unwrap();

    assert_eq!(body_json(response).await["error"], "key_not_found");
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let response = router(loaded_state()).oneshot(get("/healthz")).await.unwrap();

    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok(), "{request_id}");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let request = axum::http::Request::builder()
        .uri("/v1/me")
        .header("x-request-id", "req-1234")
        .body(axum::body::Body::empty())
        .unwrap();

    // Rejected requests still echo the id
    let response = router(loaded_state()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-request-id"], "req-1234");
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_server_error() {
    async fn explode() -> &'static str {
        panic!("handler exploded")
    }
    let app = with_common_layers(Router::new().route("/boom", route_get(explode)));

    let response = app.oneshot(get("/boom")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        body_json(response).await,
        json!({ "error": "internal_server_error" })
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = router(loaded_state())
        .oneshot(get("/v1/unknown"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
