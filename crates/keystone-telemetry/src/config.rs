//! Logging configuration

use tracing_subscriber::EnvFilter;

use crate::TelemetryError;

/// Logging configuration
///
/// Use [`TelemetryConfigBuilder`] for ergonomic configuration construction.
///
/// # Example
///
/// ```rust
/// use keystone_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::builder()
///     .service_name("keystone")
///     .environment("staging")
///     .log_level("info,keystone_auth=debug")
///     .json_logs(false)
///     .build();
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup record
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Deployment environment (development, staging, production)
    pub environment: String,
    /// Filter directive (e.g., "info", "info,keystone_auth=debug");
    /// `RUST_LOG` takes precedence when set
    pub log_level: String,
    /// One JSON object per line instead of human-readable output
    pub json_logs: bool,
    /// Write to stderr instead of stdout
    pub stderr_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "keystone".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_level: "info,keystone_auth=debug,keystone_server=debug".to_string(),
            json_logs: true,
            stderr_output: false,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Check the configuration without installing anything
    ///
    /// # Errors
    ///
    /// [`TelemetryError::InvalidConfiguration`] for an empty service name or
    /// an unparseable filter directive.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfiguration(
                "service name must not be empty".into(),
            ));
        }
        self.env_filter().map(|_| ())
    }

    /// Install the global subscriber
    ///
    /// Returns a guard that logs shutdown when dropped.
    ///
    /// # Errors
    ///
    /// See [`TelemetryGuard::init`](crate::TelemetryGuard::init).
    pub fn init(self) -> Result<crate::TelemetryGuard, TelemetryError> {
        crate::TelemetryGuard::init(self)
    }

    pub(crate) fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))
    }
}

/// Builder for [`TelemetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    environment: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
    stderr_output: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the service version
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the deployment environment
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Set the log level filter
    ///
    /// Examples: "info", "debug", "warn,keystone_auth=debug,tower_http=info"
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Enable or disable JSON log output
    #[must_use]
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = Some(enabled);
        self
    }

    /// Write to stderr instead of stdout
    #[must_use]
    pub fn stderr_output(mut self, enabled: bool) -> Self {
        self.stderr_output = Some(enabled);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();
        TelemetryConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            service_version: self.service_version.unwrap_or(defaults.service_version),
            environment: self.environment.unwrap_or(defaults.environment),
            log_level: self.log_level.unwrap_or(defaults.log_level),
            json_logs: self.json_logs.unwrap_or(defaults.json_logs),
            stderr_output: self.stderr_output.unwrap_or(defaults.stderr_output),
        }
    }
}
