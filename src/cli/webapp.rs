//! `azctl webapp`: point an existing Web App at a registry image.

use crate::core::{AppContext, ConfigStore, WEBAPP_REQUIRED, environment, required_keys};
use crate::runner::args;
use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use tracing::{debug, info};

/// Settings sent per `az webapp config appsettings set` call.
pub const SETTINGS_BATCH_SIZE: usize = 20;

/// Values longer than this are not sent as application settings.
pub const MAX_SETTING_LEN: usize = 4000;

/// Key prefixes that belong to the application rather than to azctl.
const APPLICATION_PREFIXES: &[&str] = &[
    "NEXT_PUBLIC_",
    "SUPABASE_",
    "SOLANA_",
    "AZURE_OPENAI_",
    "OPENAI_",
    "LOGFLARE_",
    "FIREBASE_",
    "SAGEMAKER_",
];

const APPLICATION_KEYS: &[&str] = &["PORT", "NODE_ENV", "ENVIRONMENT"];

/// Deployment keys never forwarded to the container.
const INTERNAL_KEYS: &[&str] = &[
    "ACR_REGISTRY",
    "ACR_RESOURCE_GROUP",
    "ACR_USERNAME",
    "ACR_PASSWORD",
    "RESOURCE_GROUP",
    "IMAGE_NAME",
    "IMAGE_TAG",
    "WEBAPP_NAME",
    "APP_SERVICE_PLAN",
    "LOG_STORAGE_ACCOUNT",
    "LOG_STORAGE_KEY",
    "LOG_STORAGE_NAME",
    "FLUENTBIT_CONFIG",
    "APP_CONFIG_NAME",
    "APP_CONFIG_LABEL",
    "APP_CONFIG_SKIP",
];

/// Flags for `azctl webapp`.
#[derive(Debug, Clone, Default, Args)]
pub struct WebappArgs {
    /// Resource group (env: RESOURCE_GROUP)
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Web App name (env: WEBAPP_NAME or <ENV>_WEBAPP_NAME)
    #[arg(long)]
    pub name: Option<String>,

    /// App Service Plan (env: APP_SERVICE_PLAN or <ENV>_APP_SERVICE_PLAN)
    #[arg(long)]
    pub plan: Option<String>,
}

/// Deploy the configured image.
///
/// # Errors
///
/// Fails without an environment, on missing keys, when the Web App does not
/// exist, or when an `az` call fails.
pub async fn run(ctx: &AppContext, flags: &WebappArgs) -> Result<()> {
    let env = ctx.resolve_environment().ok_or_else(|| {
        anyhow!("environment required for webapp deployment (--env dev|staging|prod)")
    })?;

    let store = ctx.store();
    if ctx.is_ci() {
        environment::apply_ci_detection(store, ctx.vars());
    }
    if let Some(group) = flags.resource_group.as_deref().filter(|g| !g.is_empty()) {
        store.set("RESOURCE_GROUP", group);
    }
    let name = match flags.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => webapp_name(store, &env),
    };
    let plan = match flags.plan.as_deref().filter(|p| !p.is_empty()) {
        Some(plan) => Some(plan.to_string()),
        None => app_service_plan(store, &env),
    };

    required_keys(store, WEBAPP_REQUIRED).context("WebApp deployment validation failed")?;
    let group = store.require("RESOURCE_GROUP")?;

    let show = args(["webapp", "show", "--name", name.as_str(), "--resource-group", group.as_str()]);
    if let Err(e) = ctx.runner().run_capture(&show).await {
        debug!(error = %e, "webapp show failed");
        match plan {
            Some(plan) => bail!(
                "Web App '{}' not found in resource group '{}'; create it on plan '{}' first",
                name,
                group,
                plan
            ),
            None => bail!("Web App '{}' not found in resource group '{}'", name, group),
        }
    }

    info!(webapp = %name, environment = %env, "updating Web App");
    ctx.runner()
        .run(&container_command(store, &name, &group)?)
        .await
        .context("failed to update webapp container")?;

    let settings = application_settings(store);
    if settings.is_empty() {
        debug!(webapp = %name, "no application settings to configure");
        return Ok(());
    }

    let batches = settings.len().div_ceil(SETTINGS_BATCH_SIZE);
    for (i, batch) in settings.chunks(SETTINGS_BATCH_SIZE).enumerate() {
        debug!(batch = i + 1, of = batches, count = batch.len(), "setting application settings");
        let mut cmd = args([
            "webapp",
            "config",
            "appsettings",
            "set",
            "--name",
            name.as_str(),
            "--resource-group",
            group.as_str(),
            "--settings",
        ]);
        cmd.extend(batch.iter().cloned());
        ctx.runner()
            .run(&cmd)
            .await
            .with_context(|| format!("failed to set application settings batch {}", i + 1))?;
    }

    info!(webapp = %name, count = settings.len(), "application settings updated");
    Ok(())
}

/// `<ENV>_WEBAPP_NAME`, then `WEBAPP_NAME`, then `<IMAGE_NAME>-<env>`.
pub fn webapp_name(store: &ConfigStore, env: &str) -> String {
    let scoped = store.get(&format!("{}_WEBAPP_NAME", env.to_uppercase()));
    if !scoped.is_empty() {
        return scoped;
    }
    let name = store.get("WEBAPP_NAME");
    if !name.is_empty() {
        return name;
    }
    match store.get("IMAGE_NAME") {
        image if image.is_empty() => format!("webapp-{}", env),
        image => format!("{}-{}", image, env),
    }
}

/// `<ENV>_APP_SERVICE_PLAN`, then `APP_SERVICE_PLAN`.
pub fn app_service_plan(store: &ConfigStore, env: &str) -> Option<String> {
    [format!("{}_APP_SERVICE_PLAN", env.to_uppercase()), "APP_SERVICE_PLAN".to_string()]
        .iter()
        .map(|key| store.get(key))
        .find(|plan| !plan.is_empty())
}

/// Registry host for an image reference. Bare names get the ACR suffix.
pub fn registry_host(registry: &str) -> String {
    if registry.contains('.') {
        registry.to_string()
    } else {
        format!("{}.azurecr.io", registry)
    }
}

fn container_command(store: &ConfigStore, name: &str, group: &str) -> Result<Vec<String>> {
    let host = registry_host(&store.require("ACR_REGISTRY")?);
    let image = format!(
        "{}/{}:{}",
        host,
        store.require("IMAGE_NAME")?,
        store.require("IMAGE_TAG")?
    );
    let url = format!("https://{}", host);
    Ok(args([
        "webapp",
        "config",
        "container",
        "set",
        "--name",
        name,
        "--resource-group",
        group,
        "--container-image-name",
        image.as_str(),
        "--container-registry-url",
        url.as_str(),
    ]))
}

/// Whether `key` is forwarded to the container as an application setting.
pub fn is_application_key(key: &str) -> bool {
    if INTERNAL_KEYS.contains(&key) {
        return false;
    }
    APPLICATION_PREFIXES.iter().any(|p| key.starts_with(p)) || APPLICATION_KEYS.contains(&key)
}

/// `KEY=value` settings for the container, sorted by key.
pub fn application_settings(store: &ConfigStore) -> Vec<String> {
    let mut settings: Vec<(String, String)> = store
        .get_all()
        .into_iter()
        .filter(|(key, value)| {
            if !is_application_key(key) {
                return false;
            }
            if value.len() > MAX_SETTING_LEN {
                debug!(key = %key, len = value.len(), "value too long, skipping");
                return false;
            }
            true
        })
        .collect();
    settings.sort();
    settings
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}
