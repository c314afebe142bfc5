//! # Keystone Server
//!
//! HTTP service bootstrap around [`keystone_auth`]: configuration from flags
//! and environment, a background JWKS refresh loop, bearer authentication
//! middleware and graceful shutdown.
//!
//! ## Routes
//!
//! | Route | Auth | Response |
//! |-------|------|----------|
//! | `GET /healthz` | none | `200 {"status":"ok"}` |
//! | `GET /readyz` | none | `200` once keys are loaded, `503` before |
//! | `GET /v1/me` | bearer | subject, issuer and audience of the token |
//!
//! Authentication failures are `401` with `{"error": <code>}`, where the code
//! is [`keystone_auth::ValidationError::code`] for token problems,
//! `unauthorized` for a missing header and `invalid_request` for a header
//! that is not a bearer credential.
//!
//! ## Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use keystone_server::{Server, ServerConfig};
//!
//! # async fn start() -> anyhow::Result<()> {
//! let config = ServerConfig::parse();
//! let server = Server::bind(&config).await?;
//! server.serve_until(keystone_server::shutdown_signal()).await
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod config;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use middleware::{AuthRejection, CurrentUser};
pub use routes::router;
pub use server::{Server, run, shutdown_signal};
pub use state::AppState;
