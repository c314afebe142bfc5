//! Route table and handlers

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::middleware::{CurrentUser, authenticate, with_common_layers};
use crate::state::AppState;

/// Build the application router
///
/// `/healthz` and `/readyz` are public; everything under `/v1` requires a
/// valid bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(protected)
        .with_state(state);

    with_common_layers(app)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready once the first key set is installed
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let keys = state.cache.current();
    if keys.is_initialized() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "key_set_generation": keys.generation(),
                "key_count": keys.len(),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "waiting_for_keys" })),
        )
    }
}

#[derive(Debug, Serialize)]
struct Me {
    id: String,
    issuer: String,
    audience: Vec<String>,
}

async fn me(CurrentUser(claims): CurrentUser) -> Json<Me> {
    Json(Me {
        id: claims.subject,
        issuer: claims.issuer,
        audience: claims.audience,
    })
}
