//! `azctl acr`: build and push an image with `az acr build`.

use crate::core::{ACR_REQUIRED, AppContext, ConfigStore, environment, required_keys};
use crate::runner::args;
use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info, warn};

/// Flags for `azctl acr`.
#[derive(Debug, Clone, Default, Args)]
pub struct AcrArgs {
    /// ACR registry name (env: ACR_REGISTRY)
    #[arg(long)]
    pub registry: Option<String>,

    /// Resource group for ACR (env: ACR_RESOURCE_GROUP)
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Image name (env: IMAGE_NAME)
    #[arg(long)]
    pub image: Option<String>,

    /// Image tag (env: IMAGE_TAG)
    #[arg(long)]
    pub tag: Option<String>,

    /// Build context path
    #[arg(long, default_value = ".")]
    pub context: String,

    /// Dockerfile path
    #[arg(long)]
    pub file: Option<String>,
}

/// Prefix of variables passed to the image build as `--build-arg`.
pub const BUILD_ARG_PREFIX: &str = "NEXT_PUBLIC_";

/// Run the build.
///
/// # Errors
///
/// Fails when required keys are missing or `az acr build` fails.
pub async fn run(ctx: &AppContext, flags: &AcrArgs) -> Result<()> {
    let store = ctx.store();
    if let Some(env) = ctx.resolve_environment() {
        debug!(environment = %env, "building for environment");
    }

    apply_flags(store, flags);
    if ctx.is_ci() {
        environment::apply_ci_detection(store, ctx.vars());
    }
    if !store.has("ACR_RESOURCE_GROUP") && store.has("ACR_REGISTRY") {
        discover_resource_group(ctx).await;
    }

    required_keys(store, ACR_REQUIRED).context("ACR build validation failed")?;

    let registry = store.require("ACR_REGISTRY")?;
    let image = store.require("IMAGE_NAME")?;
    let tag = store.require("IMAGE_TAG")?;
    let full_name = format!("{}.azurecr.io/{}:{}", registry, image, tag);

    if image_exists(ctx, &registry, &image, &tag).await {
        info!(image = %full_name, "image already exists, skipping build");
        return Ok(());
    }

    info!(image = %full_name, "building and pushing image");
    let cmd = build_command(store, flags)?;
    ctx.runner()
        .run(&cmd)
        .await
        .context("failed to build and push image")?;

    info!(image = %full_name, "image pushed");
    Ok(())
}

/// Write flag values into the store. Flags win over every loaded source.
pub fn apply_flags(store: &ConfigStore, flags: &AcrArgs) {
    let overrides = [
        ("ACR_REGISTRY", &flags.registry),
        ("ACR_RESOURCE_GROUP", &flags.resource_group),
        ("IMAGE_NAME", &flags.image),
        ("IMAGE_TAG", &flags.tag),
    ];
    for (key, value) in overrides {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            store.set(key, value);
        }
    }
}

/// The `az acr build` argument list for the current store.
///
/// # Errors
///
/// Fails if a required key is missing.
pub fn build_command(store: &ConfigStore, flags: &AcrArgs) -> Result<Vec<String>> {
    let image = format!("{}:{}", store.require("IMAGE_NAME")?, store.require("IMAGE_TAG")?);
    let registry = store.require("ACR_REGISTRY")?;
    let group = store.require("ACR_RESOURCE_GROUP")?;
    let mut cmd = args([
        "acr",
        "build",
        "--registry",
        registry.as_str(),
        "--image",
        image.as_str(),
        "--resource-group",
        group.as_str(),
    ]);
    if let Some(file) = flags.file.as_deref().filter(|f| !f.is_empty()) {
        cmd.extend(args(["--file", file]));
    }
    cmd.extend(build_args(store));
    cmd.push(if flags.context.is_empty() { ".".to_string() } else { flags.context.clone() });
    Ok(cmd)
}

/// `--build-arg KEY=value` pairs for every `NEXT_PUBLIC_*` key, sorted by key.
pub fn build_args(store: &ConfigStore) -> Vec<String> {
    let mut keys: Vec<(String, String)> = store
        .get_all()
        .into_iter()
        .filter(|(key, _)| key.starts_with(BUILD_ARG_PREFIX))
        .collect();
    keys.sort();

    keys.into_iter()
        .flat_map(|(key, value)| {
            debug!(key = %key, "adding build arg");
            ["--build-arg".to_string(), format!("{}={}", key, value)]
        })
        .collect()
}

async fn discover_resource_group(ctx: &AppContext) {
    let registry = ctx.store().get("ACR_REGISTRY");
    let cmd = args([
        "acr",
        "show",
        "--name",
        registry.as_str(),
        "--query",
        "resourceGroup",
        "-o",
        "tsv",
    ]);
    match ctx.runner().run_capture(&cmd).await {
        Ok(output) if !output.trim().is_empty() => {
            let group = output.trim();
            info!(registry = %registry, resource_group = %group, "found registry resource group");
            ctx.store().set("ACR_RESOURCE_GROUP", group);
        }
        Ok(_) => warn!(registry = %registry, "registry has no resource group"),
        Err(e) => warn!(registry = %registry, error = %e, "could not look up registry resource group"),
    }
}

async fn image_exists(ctx: &AppContext, registry: &str, image: &str, tag: &str) -> bool {
    let cmd = args([
        "acr",
        "repository",
        "show-tags",
        "--name",
        registry,
        "--repository",
        image,
        "--output",
        "tsv",
    ]);
    match ctx.runner().run_capture(&cmd).await {
        Ok(tags) => tags.lines().any(|line| line.trim() == tag),
        Err(e) => {
            debug!(error = %e, "no existing tags found");
            false
        }
    }
}
