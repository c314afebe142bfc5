//! Structured logging setup for keystone services
//!
//! Installs a global `tracing` subscriber with an `EnvFilter` and either
//! JSON or human-readable output. `RUST_LOG` overrides the configured level.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use keystone_telemetry::TelemetryConfig;
//!
//! # fn main() -> Result<(), keystone_telemetry::TelemetryError> {
//! let _guard = TelemetryConfig::builder()
//!     .service_name("keystone")
//!     .json_logs(true)
//!     .build()
//!     .init()?;
//!
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod config;
mod error;
mod init;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::{TelemetryError, TelemetryResult};
pub use init::TelemetryGuard;
