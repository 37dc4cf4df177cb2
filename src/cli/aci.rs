//! `azctl aci`: render a container group manifest and deploy it.

use crate::core::{
    ACI_REQUIRED, ALIASES, AppContext, ConfigStore, ValidationEngine, aci_rule, aliases,
    environment, required_keys,
};
use crate::runner::args;
use crate::template::render_with_store;
use anyhow::{Context, Result, bail};
use clap::Args;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest used when `--template` is not given.
pub const DEFAULT_TEMPLATE: &str = "deploy/manifests/aci.json";

/// Older manifest location, tried when the default is missing.
pub const LEGACY_TEMPLATE: &str = "azctl/aci.json";

/// Where `--dry-run` writes the rendered manifest.
pub const DRY_RUN_OUTPUT: &str = ".azctl/aci-dry-run.json";

/// Values used when the configuration leaves them empty.
pub const ACI_DEFAULTS: &[(&str, &str)] = &[
    ("LOCATION", "eastus"),
    ("OS_TYPE", "Linux"),
    ("ACI_PORT", "8080"),
    ("ACI_CPU", "1"),
    ("ACI_MEMORY", "2"),
];

/// Flags for `azctl aci`.
#[derive(Debug, Clone, Default, Args)]
pub struct AciArgs {
    /// Resource group (env: RESOURCE_GROUP)
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Path to the aci.json template
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Write the rendered manifest to .azctl/aci-dry-run.json instead of deploying
    #[arg(long)]
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AciOutcome {
    /// The manifest was written to this path.
    DryRun(PathBuf),
    /// The container group was created.
    Deployed,
}

/// Run relative to the working directory.
///
/// # Errors
///
/// See [`run_in`].
pub async fn run(ctx: &AppContext, flags: &AciArgs) -> Result<AciOutcome> {
    run_in(ctx, flags, Path::new(".")).await
}

/// Run with templates and dry-run output resolved against `root`.
///
/// # Errors
///
/// Fails on a reload error, missing or invalid configuration, a template that
/// is missing or renders to invalid JSON, or a failed `az container create`.
pub async fn run_in(ctx: &AppContext, flags: &AciArgs, root: &Path) -> Result<AciOutcome> {
    let env = ctx.resolve_environment();
    if let Some(env) = env.as_deref() {
        info!(environment = %env, "loading environment configuration");
        ctx.reload_for_environment(env)
            .await
            .context("failed to load environment config")?;
    }

    let store = ctx.store();
    if let Some(group) = flags.resource_group.as_deref().filter(|g| !g.is_empty()) {
        store.set("RESOURCE_GROUP", group);
    }
    prepare(store, env.as_deref());

    required_keys(store, ACI_REQUIRED).context("ACI deployment validation failed")?;
    ValidationEngine::new()
        .with_rule(aci_rule()?)
        .validate(store)
        .context("ACI deployment validation failed")?;

    let template_path = resolve_template(flags.template.as_deref(), root)?;
    debug!(template = %template_path.display(), "rendering manifest");
    let raw = tokio::fs::read_to_string(&template_path)
        .await
        .with_context(|| format!("failed to read template {}", template_path.display()))?;
    let rendered = render_with_store(&raw, store)
        .with_context(|| format!("failed to render template {}", template_path.display()))?;
    serde_json::from_str::<serde_json::Value>(&rendered).context("rendered JSON invalid")?;

    if flags.dry_run {
        let output = root.join(DRY_RUN_OUTPUT);
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        tokio::fs::write(&output, &rendered)
            .await
            .context("failed to write dry-run output")?;
        info!(path = %output.display(), "dry run complete, review the manifest and rerun without --dry-run");
        return Ok(AciOutcome::DryRun(output));
    }

    let group = store.require("RESOURCE_GROUP")?;
    create_container_group(ctx, &group, &rendered)
        .await
        .context("ACI deployment failed")?;
    Ok(AciOutcome::Deployed)
}

/// Fill derived values and defaults before validation.
///
/// Sets `ENV_NAME`, maps `<ENV>_*` and `ACI_*` variables, re-applies the
/// alias table to the mapped values, applies [`ACI_DEFAULTS`] and derives
/// `CONTAINER_GROUP_NAME` and `DNS_NAME_LABEL` from `IMAGE_NAME` when they
/// are empty.
pub fn prepare(store: &ConfigStore, env: Option<&str>) {
    if let Some(env) = env {
        store.set("ENV_NAME", env);
        environment::map_prefixed_variables(store, env);
    }
    environment::map_aci_variables(store);
    aliases::apply(store, ALIASES);

    for (key, value) in ACI_DEFAULTS {
        store.set_default(key, *value);
    }

    let image = store.get("IMAGE_NAME");
    if !image.is_empty() {
        store.set_default("CONTAINER_GROUP_NAME", image);
    }
    if let Some(env) = env {
        let group = store.get("CONTAINER_GROUP_NAME");
        if !group.is_empty() {
            store.set_default("DNS_NAME_LABEL", format!("{}-{}", group, env));
        }
    }
}

fn resolve_template(explicit: Option<&Path>, root: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = root.join(path);
        if !path.exists() {
            bail!("template not found: {}", path.display());
        }
        return Ok(path);
    }

    let default = root.join(DEFAULT_TEMPLATE);
    if default.exists() {
        return Ok(default);
    }
    let legacy = root.join(LEGACY_TEMPLATE);
    if legacy.exists() {
        debug!(template = %legacy.display(), "using legacy template location");
        return Ok(legacy);
    }
    bail!("template not found: {}", default.display())
}

async fn create_container_group(ctx: &AppContext, group: &str, rendered: &str) -> Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix("aci-")
        .suffix(".json")
        .tempfile()
        .context("failed to create manifest file")?;
    file.write_all(rendered.as_bytes())
        .and_then(|()| file.flush())
        .context("failed to write manifest file")?;

    let path = file.path().to_string_lossy().into_owned();
    info!(resource_group = %group, "creating container group");
    ctx.runner()
        .run(&args([
            "container",
            "create",
            "--resource-group",
            group,
            "--file",
            path.as_str(),
        ]))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_defaults_and_names() {
        let store = ConfigStore::new();
        store.set("IMAGE_NAME", "api");
        store.set("LOCATION", "westeurope");

        prepare(&store, Some("dev"));
        assert_eq!(store.get("ENV_NAME"), "dev");
        assert_eq!(store.get("LOCATION"), "westeurope");
        assert_eq!(store.get("OS_TYPE"), "Linux");
        assert_eq!(store.get("ACI_PORT"), "8080");
        assert_eq!(store.get("CONTAINER_GROUP_NAME"), "api");
        assert_eq!(store.get("DNS_NAME_LABEL"), "api-dev");
    }

    #[test]
    fn test_prepare_keeps_explicit_names() {
        let store = ConfigStore::new();
        store.set("IMAGE_NAME", "api");
        store.set("CONTAINER_GROUP_NAME", "api-group");

        prepare(&store, Some("staging"));
        assert_eq!(store.get("CONTAINER_GROUP_NAME"), "api-group");
        assert_eq!(store.get("DNS_NAME_LABEL"), "api-group-staging");
    }

    #[test]
    fn test_prepare_derives_aliases_from_scoped_values() {
        let store = ConfigStore::new();
        store.set("DEV_REGISTRY", "devacr");
        store.set("DEV_RESOURCE_GROUP", "rg-dev");

        prepare(&store, Some("dev"));
        assert_eq!(store.get("REGISTRY"), "devacr");
        assert_eq!(store.get("ACR_REGISTRY"), "devacr");
        assert_eq!(store.get("IMAGE_REGISTRY"), "devacr");
        assert_eq!(store.get("RESOURCE_GROUP"), "rg-dev");
        assert_eq!(store.get("ACR_RESOURCE_GROUP"), "rg-dev");
    }

    #[test]
    fn test_prepare_without_environment() {
        let store = ConfigStore::new();
        store.set("IMAGE_NAME", "api");
        prepare(&store, None);
        assert!(!store.has("ENV_NAME"));
        assert!(!store.has("DNS_NAME_LABEL"));
    }

    #[test]
    fn test_resolve_template() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(resolve_template(None, dir.path()).is_err());

        std::fs::create_dir_all(dir.path().join("azctl")).unwrap();
        std::fs::write(dir.path().join(LEGACY_TEMPLATE), "{}").unwrap();
        assert_eq!(
            resolve_template(None, dir.path()).unwrap(),
            dir.path().join(LEGACY_TEMPLATE)
        );

        std::fs::create_dir_all(dir.path().join("deploy/manifests")).unwrap();
        std::fs::write(dir.path().join(DEFAULT_TEMPLATE), "{}").unwrap();
        assert_eq!(
            resolve_template(None, dir.path()).unwrap(),
            dir.path().join(DEFAULT_TEMPLATE)
        );

        assert!(resolve_template(Some(Path::new("missing.json")), dir.path()).is_err());
    }
}
