//! `azctl appconfig`: export remote configuration in a shell-friendly format.

use crate::core::{AppContext, normalize};
use crate::export::ExportFormat;
use crate::sources::{ConfigSource, RemoteSettings};
use anyhow::{Context, Result, anyhow};
use clap::Args;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Flags for `azctl appconfig`.
#[derive(Debug, Clone, Default, Args)]
pub struct AppconfigArgs {
    /// Specific variable(s) to export (repeatable)
    #[arg(long = "var")]
    pub vars: Vec<String>,

    /// Output format: env, json, yaml, dotenv
    #[arg(long, default_value = "env")]
    pub format: ExportFormat,

    /// Output file (default: stdout)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Export configuration and write it out.
///
/// # Errors
///
/// Fails when no configuration set is named, the fetch hits a malformed
/// entry, formatting fails, or the output file cannot be written.
pub async fn run(ctx: &AppContext, flags: &AppconfigArgs) -> Result<()> {
    let data = export(ctx, &flags.vars).await?;
    if data.is_empty() {
        warn!("no configuration variables found");
        return Ok(());
    }
    info!(count = data.len(), "exported variables");

    let output = flags.format.format(&data)?;
    match &flags.output {
        Some(path) => {
            write_private(path, &output)
                .await
                .with_context(|| format!("failed to write to file {}", path.display()))?;
            info!(path = %path.display(), "configuration exported");
        }
        None => println!("{}", output),
    }
    Ok(())
}

/// Fetch the configuration set straight from the remote service.
///
/// The set name comes from the store's `APP_CONFIG_NAME` or `APP_CONFIG`, the
/// label from `APP_CONFIG_LABEL` or the environment. `APP_CONFIG_SKIP` does
/// not apply here. When `vars` is non-empty only those keys are returned.
///
/// # Errors
///
/// Fails when no set name is configured or a fetched entry is malformed.
pub async fn export(ctx: &AppContext, vars: &[String]) -> Result<HashMap<String, String>> {
    let env = ctx.resolve_environment().unwrap_or_default();
    let mut settings = RemoteSettings::from_vars(&ctx.store().get_all(), &env);
    settings.skip = false;
    let name = settings
        .name
        .clone()
        .ok_or_else(|| anyhow!("APP_CONFIG_NAME or APP_CONFIG environment variable is required"))?;
    info!(config_set = %name, label = ?settings.label, "exporting from App Configuration");

    let mut data = ctx
        .remote_source(settings)
        .load()
        .await
        .context("failed to export config")?;

    if !vars.is_empty() {
        let wanted: Vec<String> = vars.iter().map(|v| normalize(v)).collect();
        for key in wanted.iter().filter(|k| !data.contains_key(k.as_str())) {
            warn!(key = %key, "requested variable not found");
        }
        data.retain(|key, _| wanted.contains(key));
    }
    Ok(data)
}

#[cfg(unix)]
async fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await
}
