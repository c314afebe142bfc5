//! Key refresh and validation counters
//!
//! Enable with the `metrics` feature flag. A `metrics` recorder must be
//! installed by the application for the values to go anywhere.
//!
//! ## Metrics Provided
//!
//! - `keystone_jwks_fetch_total` - JWKS refresh attempts (labels: status)
//! - `keystone_key_set_size` - Keys in the most recently installed set
//! - `keystone_token_validations_total` - Validation outcomes (labels: result)

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Register metric descriptions. Idempotent.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "keystone_jwks_fetch_total",
            "JWKS refresh attempts by outcome"
        );
        describe_gauge!(
            "keystone_key_set_size",
            "Number of signing keys in the installed key set"
        );
        describe_counter!(
            "keystone_token_validations_total",
            "Token validations by result code"
        );
    });
}

/// Record a refresh attempt; `status` is `success` or a fetch error kind
#[cfg(feature = "metrics")]
pub(crate) fn record_fetch(status: &'static str) {
    counter!("keystone_jwks_fetch_total", "status" => status).increment(1);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_key_set_size(size: usize) {
    gauge!("keystone_key_set_size").set(size as f64);
}

/// Record a validation; `result` is `valid` or a rejection code
#[cfg(feature = "metrics")]
pub(crate) fn record_validation(result: &'static str) {
    counter!("keystone_token_validations_total", "result" => result).increment(1);
}

/// Register metric descriptions. Idempotent.
#[cfg(not(feature = "metrics"))]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_fetch(_status: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_key_set_size(_size: usize) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_validation(_result: &'static str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        init_auth_metrics();
        init_auth_metrics();
        record_fetch("success");
        record_fetch("http_status");
        record_key_set_size(3);
        record_validation("valid");
        record_validation("token_expired");
    }
}
