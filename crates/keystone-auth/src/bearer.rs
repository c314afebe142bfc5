//! `Authorization` header parsing

/// Malformed `Authorization` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BearerError {
    /// The header is present but not `Bearer <token>`
    #[error("authorization header format must be `Bearer <token>`")]
    InvalidFormat,
}

/// Extract the token from an `Authorization` header value
///
/// An absent or blank header is not an error: the request simply carries no
/// token. Otherwise the value must be exactly two whitespace-separated
/// fields, the first being `Bearer` in any case.
///
/// # Errors
///
/// [`BearerError::InvalidFormat`] for any other shape.
///
/// # Example
///
/// ```rust
/// use keystone_auth::extract_bearer;
///
/// assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")), Ok(Some("abc.def.ghi")));
/// assert_eq!(extract_bearer(None), Ok(None));
/// assert!(extract_bearer(Some("Basic dXNlcjpwYXNz")).is_err());
/// ```
pub fn extract_bearer(header: Option<&str>) -> Result<Option<&str>, BearerError> {
    let Some(value) = header.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let mut fields = value.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Some(token))
        }
        _ => Err(BearerError::InvalidFormat),
    }
}
