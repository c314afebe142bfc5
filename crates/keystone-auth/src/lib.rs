//! # Keystone Auth - JWKS-backed JWT validation
//!
//! Validates bearer tokens issued by a single external identity provider
//! against the provider's published signing keys.
//!
//! ## Design Principles
//!
//! - **Validation never blocks on the network**: keys come from an in-memory
//!   snapshot that a background task keeps fresh
//! - **Whole-set rotation**: a refresh swaps in a complete new key set, so a
//!   reader sees either the old set or the new one
//! - **Stale beats empty**: a failed refresh leaves the previous keys in place
//! - **Typed rejections**: every failure is a distinct [`ValidationError`]
//!
//! ## Architecture
//!
//! - [`keys`] - JWK parsing, signing-key filter, immutable [`KeySet`]
//! - [`fetcher`] - [`KeyFetcher`] trait and the HTTP implementation
//! - [`cache`] - [`KeyCache`], the lock-free current-set holder
//! - [`refresh`] - [`RefreshLoop`], periodic refresh with cancellation
//! - [`validator`] - [`TokenValidator`] and validated [`Claims`]
//! - [`bearer`] - `Authorization` header parsing
//! - [`config`] - [`AuthConfig`] with issuer and endpoint derivation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone_auth::{AuthConfig, HttpKeyFetcher, KeyCache, RefreshLoop, TokenValidator};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::for_tenant("acme", "https://api.acme.dev");
//! let cache = KeyCache::new();
//!
//! let fetcher = Arc::new(HttpKeyFetcher::from_config(&config)?);
//! let shutdown = CancellationToken::new();
//! let refresh = RefreshLoop::from_config(fetcher, cache.clone(), &config).spawn(shutdown.clone());
//!
//! cache.wait_initialized(config.startup_timeout).await;
//!
//! let validator = TokenValidator::from_config(cache, &config)?;
//! match validator.validate("eyJhbGciOi...") {
//!     Ok(claims) => println!("hello {}", claims.subject),
//!     Err(err) => println!("rejected: {}", err.code()),
//! }
//!
//! shutdown.cancel();
//! refresh.await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod auth_metrics;
pub mod bearer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod keys;
pub mod refresh;
pub mod validator;

pub use auth_metrics::init_auth_metrics;
pub use bearer::{BearerError, extract_bearer};
pub use cache::KeyCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{ConfigError, FetchError, ValidationError};
pub use fetcher::{HttpKeyFetcher, KeyFetcher};
pub use keys::{Jwk, KeyRejection, KeySet, KeyType, SigningKey};
pub use refresh::{CancelPolicy, EmptyKeySetPolicy, RefreshLoop, RefreshOutcome, RefreshStats};
pub use validator::{Audience, Claims, TokenValidator};
