//! # azctl
//!
//! Azure container deployment CLI with layered configuration.
//!
//! ## Overview
//!
//! Every command works from one flat, case-insensitive configuration store
//! assembled from three sources, lowest precedence first:
//!
//! - Azure App Configuration, read through `az appconfig kv show`
//! - A dotenv file (`.env` or `.env.<env>`)
//! - The process environment
//!
//! Values are merged into a staging map and committed only if no source
//! failed fatally. A malformed remote entry aborts the load and leaves the
//! store untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use azctl::prelude::*;
//!
//! # async fn example() -> azctl::error::Result<()> {
//! let ctx = AppContext::builder()
//!     .with_env_file(".env.staging")
//!     .with_environment("staging")
//!     .build();
//!
//! ctx.init().await?;
//! let registry = ctx.store().require("ACR_REGISTRY")?;
//! println!("registry: {}", registry);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `yaml` (default): YAML export for `azctl appconfig --format yaml`

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod cli;
pub mod core;
pub mod error;
pub mod export;
pub mod logging;
pub mod runner;
pub mod sources;
pub mod template;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{AppContext, AppContextBuilder, ConfigLoader, ConfigStore, Validate};
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::runner::{AzCli, CommandRunner};
    pub use crate::sources::{ConfigSource, EnvSource, FileSource, RemoteSettings, RemoteSource};
}
