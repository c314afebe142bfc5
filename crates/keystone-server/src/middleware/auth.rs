//! Bearer token authentication for protected routes
//!
//! [`authenticate`] validates the `Authorization` header and stores the
//! resulting [`Claims`] in the request extensions, where handlers pick them
//! up through [`CurrentUser`].

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keystone_auth::{Claims, ValidationError, extract_bearer};
use serde_json::json;
use tracing::debug;

use crate::state::AppState;

/// Why a request was refused
///
/// Always rendered as `401` with a JSON body
/// `{"error": <code>, "error_description": <text>}` and a `WWW-Authenticate`
/// challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    code: &'static str,
    description: String,
    challenge: &'static str,
}

impl AuthRejection {
    /// No credentials were presented
    pub fn missing_credentials() -> Self {
        Self {
            code: "unauthorized",
            description: "Authorization header with a bearer token is required".to_string(),
            challenge: "Bearer",
        }
    }

    /// The `Authorization` header is not a bearer credential
    pub fn invalid_request() -> Self {
        Self {
            code: "invalid_request",
            description: "Authorization header must be 'Bearer <token>'".to_string(),
            challenge: r#"Bearer error="invalid_request""#,
        }
    }

    /// Machine-readable error code sent in the body
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<ValidationError> for AuthRejection {
    fn from(err: ValidationError) -> Self {
        Self {
            code: err.code(),
            description: err.to_string(),
            challenge: r#"Bearer error="invalid_token""#,
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "error_description": self.description,
        }));
        let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static(self.challenge));
        response
    }
}

/// Authentication middleware for `from_fn_with_state`
///
/// On success the validated [`Claims`] are inserted into the request
/// extensions and the subject is recorded on the request span as
/// `enduser.id`.
///
/// # Errors
///
/// An [`AuthRejection`] for a missing or malformed header, or any
/// [`ValidationError`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(HeaderValue::to_str)
        .transpose()
        .map_err(|_| AuthRejection::invalid_request())?;

    let token = match extract_bearer(header) {
        Ok(Some(token)) => token,
        Ok(None) => {
            debug!(path = %request.uri().path(), "Request without credentials");
            return Err(AuthRejection::missing_credentials());
        }
        Err(_) => return Err(AuthRejection::invalid_request()),
    };

    let claims = state.validator.validate(token)?;
    tracing::Span::current().record("enduser.id", claims.subject.as_str());

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Claims of the authenticated caller
///
/// Only usable behind [`authenticate`]; elsewhere it rejects like a request
/// without credentials.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(AuthRejection::missing_credentials)
    }
}
