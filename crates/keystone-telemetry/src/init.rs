//! Subscriber initialization
//!
//! Provides the [`TelemetryGuard`] marking the lifetime of the logging setup.

use crate::{TelemetryConfig, TelemetryError};
use tracing::info;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Guard for the installed global subscriber
///
/// Keep it alive for the whole program (usually a binding in `main`); its
/// `Drop` records the shutdown.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let _telemetry = TelemetryConfig::default().init()?;
///     run_server().await
/// }
/// ```
#[derive(Debug)]
pub struct TelemetryGuard {
    config: TelemetryConfig,
}

impl TelemetryGuard {
    /// Install the global subscriber described by `config`
    ///
    /// # Errors
    ///
    /// [`TelemetryError::InvalidConfiguration`] for a bad config,
    /// [`TelemetryError::TracingError`] if a global subscriber is already set.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        init_subscriber(&config, config.env_filter()?)?;

        info!(
            service_name = %config.service_name,
            service_version = %config.service_version,
            environment = %config.environment,
            json_logs = config.json_logs,
            "Keystone telemetry initialized"
        );

        Ok(Self { config })
    }

    /// Get the service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        info!(
            service_name = %self.config.service_name,
            "Shutting down keystone telemetry"
        );
    }
}

/// Each format/writer combination is its own layer type, hence one branch per combination
fn init_subscriber(config: &TelemetryConfig, env_filter: EnvFilter) -> Result<(), TelemetryError> {
    if config.json_logs && config.stderr_output {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .with_current_span(true);
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else if config.json_logs {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .json()
            .with_current_span(true);
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else if config.stderr_output {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .pretty();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else {
        let fmt_layer = fmt::layer().with_target(true).pretty();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    }
}
