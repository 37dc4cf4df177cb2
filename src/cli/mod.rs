//! Command-line surface.
//!
//! Each subcommand lives in its own module with an `Args` struct and an async
//! `run` that receives the shared [`AppContext`].

pub mod aci;
pub mod acr;
pub mod appconfig;
pub mod webapp;

use crate::core::AppContext;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_ENV_FILE: &str = ".env";

/// Azure container deployment CLI.
#[derive(Debug, Parser)]
#[command(name = "azctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Global flags.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path to the .env file (optional)
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    pub envfile: PathBuf,

    /// Environment name (dev, staging, prod); selects the .env file and the remote label
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LogLevel,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    /// The env file to read: `.env.<env>` when an environment is given and
    /// `--envfile` was left at its default.
    pub fn env_file(&self) -> PathBuf {
        match self.environment() {
            Some(env) if self.envfile.as_os_str() == DEFAULT_ENV_FILE => {
                PathBuf::from(format!("{}.{}", DEFAULT_ENV_FILE, env))
            }
            _ => self.envfile.clone(),
        }
    }

    /// The environment label, if one was given.
    pub fn environment(&self) -> Option<&str> {
        self.env.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// Logging options.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            format: self.log_format,
            verbose: self.verbose,
        }
    }

    /// Build the application context these flags describe.
    pub fn context(&self) -> AppContext {
        let builder = AppContext::builder().with_env_file(self.env_file());
        match self.environment() {
            Some(env) => builder.with_environment(env).build(),
            None => builder.build(),
        }
    }
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Build and push a container image to Azure Container Registry
    Acr(acr::AcrArgs),

    /// Deploy an Azure Container Instance from a JSON template
    Aci(aci::AciArgs),

    /// Deploy a container image to an Azure Web App
    Webapp(webapp::WebappArgs),

    /// Export configuration from Azure App Configuration
    Appconfig(appconfig::AppconfigArgs),
}

/// Load configuration into `ctx` and run `command`.
///
/// # Errors
///
/// Returns the load or command failure with context for each layer.
pub async fn execute(command: &Commands, ctx: &AppContext) -> Result<()> {
    ctx.init().await.context("init config")?;

    match command {
        Commands::Acr(args) => acr::run(ctx, args).await,
        Commands::Aci(args) => aci::run(ctx, args).await.map(|_| ()),
        Commands::Webapp(args) => webapp::run(ctx, args).await,
        Commands::Appconfig(args) => appconfig::run(ctx, args).await,
    }
}
