//! Command line and environment configuration

use clap::{ArgAction, Parser};
use keystone_auth::AuthConfig;
use keystone_telemetry::TelemetryConfig;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Server configuration
///
/// Every option can be given as a flag or through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keystone-server",
    version,
    about = "HTTP service protected by JWKS-backed bearer authentication"
)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "APP_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind (0 picks a free port)
    #[arg(long, env = "APP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Deployment environment, reported in logs
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// Expected token issuer
    #[arg(long, env = "IAM_ISSUER")]
    pub issuer: Option<String>,

    /// Hosted tenant name; derives the issuer when `--issuer` is absent
    #[arg(long, env = "IAM_TENANT", conflicts_with = "issuer")]
    pub tenant: Option<String>,

    /// Expected token audience
    #[arg(long, env = "IAM_AUDIENCE")]
    pub audience: String,

    /// JWKS endpoint override
    #[arg(long, env = "IAM_JWKS_URI")]
    pub jwks_uri: Option<String>,

    /// Seconds between key refreshes
    #[arg(long, env = "IAM_REFRESH_INTERVAL_SECS", default_value_t = 900)]
    pub refresh_interval_secs: u64,

    /// Seconds before a JWKS request is abandoned
    #[arg(long, env = "IAM_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Clock skew tolerance in seconds
    #[arg(long, env = "IAM_CLOCK_SKEW_SECS", default_value_t = 60)]
    pub clock_skew_secs: u64,

    /// Seconds to wait for the first key set before serving
    #[arg(long, env = "IAM_STARTUP_TIMEOUT_SECS", default_value_t = 10)]
    pub startup_timeout_secs: u64,

    /// Refuse to start without a key set
    #[arg(long, env = "IAM_REQUIRE_KEYS_ON_STARTUP", action = ArgAction::Set, default_value_t = false)]
    pub require_keys_on_startup: bool,

    /// Seconds allowed for draining connections and stopping the refresh loop
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 15)]
    pub shutdown_timeout_secs: u64,

    /// Log filter directive; `RUST_LOG` wins when set
    #[arg(
        long,
        env = "LOG_LEVEL",
        default_value = "info,keystone_auth=debug,keystone_server=debug,tower_http=info"
    )]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON", action = ArgAction::Set, default_value_t = true)]
    pub log_json: bool,
}

impl ServerConfig {
    /// Socket address the listener binds
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validation settings derived from the `IAM_*` options
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            issuer: self.issuer.clone(),
            tenant: self.tenant.clone(),
            audience: self.audience.clone(),
            jwks_uri: self.jwks_uri.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            clock_skew: Duration::from_secs(self.clock_skew_secs),
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            require_keys_on_startup: self.require_keys_on_startup,
            ..AuthConfig::default()
        }
    }

    /// Logging settings
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::builder()
            .service_name(env!("CARGO_PKG_NAME"))
            .service_version(env!("CARGO_PKG_VERSION"))
            .environment(self.environment.clone())
            .log_level(self.log_level.clone())
            .json_logs(self.log_json)
            .build()
    }

    /// Upper bound for each shutdown phase
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
