//! CI detection and environment-scoped variable mapping.
//!
//! Functions here take a variable snapshot instead of reading the process
//! environment directly, so callers decide what "the environment" is.

use super::ConfigStore;
use std::collections::HashMap;
use tracing::debug;

/// Variables whose presence means "running in CI".
const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "AZURE_PIPELINE",
    "GITLAB_CI",
    "JENKINS_URL",
    "TRAVIS",
    "CIRCLECI",
];

/// Names that may be provided as `<ENV>_NAME` and are mapped onto `NAME`.
pub const PREFIXED_VARIABLES: &[&str] = &[
    "RESOURCE_GROUP",
    "APP_CONFIG",
    "APP_CONFIG_RESOURCE_GROUP",
    "WEBAPP_NAME",
    "APP_SERVICE_PLAN",
    "DNS_NAME_LABEL",
    "ACI_PORT",
    "ACI_CPU",
    "ACI_MEMORY",
    "OS_TYPE",
    "LOCATION",
    "REGISTRY",
    "ACR_RESOURCE_GROUP",
    "CONTAINER_GROUP_NAME",
    "IMAGE_NAME",
    "IMAGE_TAG",
    "ACR_USERNAME",
    "ACR_PASSWORD",
    "LOG_SHARE_NAME",
    "LOG_STORAGE_ACCOUNT",
    "LOG_STORAGE_KEY",
    "FLUENTBIT_CONFIG_SHARE",
    "APP_CONFIG_SKIP",
    "APP_CONFIG_DEBUG",
];

/// `ACI_*` names mapped onto the application variable the container reads.
pub const ACI_VARIABLES: &[(&str, &str)] = &[
    ("ACI_SUPABASE_KEY", "SUPABASE_KEY"),
    ("ACI_SUPABASE_URL", "SUPABASE_URL"),
    ("ACI_AZURE_OPENAI_API_KEY", "AZURE_OPENAI_API_KEY"),
    ("ACI_OPENAI_AZURE_EMBEDDINGS_ENDPOINT", "OPENAI_AZURE_EMBEDDINGS_ENDPOINT"),
    ("ACI_AZURE_OPENAI_MODEL", "AZURE_OPENAI_MODEL"),
    ("ACI_FIREBASE_KEY", "FIREBASE_KEY"),
    ("ACI_FIREBASE_URL", "FIREBASE_URL"),
    ("ACI_SAGEMAKER_OPENAI_MODEL", "SAGEMAKER_OPENAI_MODEL"),
    ("ACI_SAGEMAKER_OPENAI_API_KEY", "SAGEMAKER_OPENAI_API_KEY"),
    ("ACI_OPENAI_SAGEMAKER_EMBEDDINGS_ENDPOINT", "OPENAI_SAGEMAKER_EMBEDDINGS_ENDPOINT"),
];

fn var<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn is_true(vars: &HashMap<String, String>, key: &str) -> bool {
    var(vars, key) == Some("true")
}

/// Whether any common CI marker is set.
pub fn is_ci(vars: &HashMap<String, String>) -> bool {
    CI_MARKERS.iter().any(|marker| var(vars, marker).is_some())
}

/// Detect the deployment environment from CI context.
///
/// GitHub branches map `dev|development` → `dev`, `staging` → `staging` and
/// `main|master|prod|production` → `prod`. Azure Pipelines and GitLab report
/// their own environment names, and `ENVIRONMENT` is the last resort.
pub fn detect_environment(vars: &HashMap<String, String>) -> Option<String> {
    if is_true(vars, "GITHUB_ACTIONS") {
        if let Some(branch) = var(vars, "GITHUB_REF").and_then(|r| r.strip_prefix("refs/heads/")) {
            let env = match branch {
                "dev" | "development" => Some("dev"),
                "staging" => Some("staging"),
                "main" | "master" | "prod" | "production" => Some("prod"),
                _ => None,
            };
            if let Some(env) = env {
                return Some(env.to_string());
            }
        }
    }

    if is_true(vars, "AZURE_PIPELINE") {
        if let Some(env) = var(vars, "SYSTEM_ENVIRONMENT") {
            return Some(env.to_lowercase());
        }
    }

    if is_true(vars, "GITLAB_CI") {
        if let Some(env) = var(vars, "CI_ENVIRONMENT_NAME") {
            return Some(env.to_lowercase());
        }
    }

    var(vars, "ENVIRONMENT").map(str::to_lowercase)
}

/// Detect the image name from CI context (repository name).
pub fn detect_image_name(vars: &HashMap<String, String>) -> Option<String> {
    if is_true(vars, "GITHUB_ACTIONS") {
        let repo = var(vars, "GITHUB_REPOSITORY").and_then(|r| r.split_once('/'));
        if let Some((_, name)) = repo.filter(|(_, name)| !name.is_empty() && !name.contains('/')) {
            return Some(name.to_string());
        }
    }
    if is_true(vars, "AZURE_PIPELINE") {
        if let Some(name) = var(vars, "BUILD_REPOSITORY_NAME") {
            return Some(name.to_string());
        }
    }
    if is_true(vars, "GITLAB_CI") {
        if let Some(name) = var(vars, "CI_PROJECT_NAME") {
            return Some(name.to_string());
        }
    }
    None
}

/// Detect the image tag from CI context (commit or build id).
pub fn detect_image_tag(vars: &HashMap<String, String>) -> Option<String> {
    let found = if is_true(vars, "GITHUB_ACTIONS") {
        var(vars, "GITHUB_SHA")
    } else {
        None
    }
    .or_else(|| {
        is_true(vars, "AZURE_PIPELINE")
            .then(|| var(vars, "BUILD_BUILDID").or_else(|| var(vars, "BUILD_SOURCEVERSION")))
            .flatten()
    })
    .or_else(|| {
        is_true(vars, "GITLAB_CI")
            .then(|| var(vars, "CI_COMMIT_SHA"))
            .flatten()
    });
    found.map(str::to_string)
}

/// Fill empty `IMAGE_NAME` / `IMAGE_TAG` from CI context.
pub fn apply_ci_detection(store: &ConfigStore, vars: &HashMap<String, String>) {
    if !store.has("IMAGE_NAME") {
        if let Some(name) = detect_image_name(vars) {
            debug!(image_name = %name, "detected IMAGE_NAME from CI");
            store.set("IMAGE_NAME", name);
        }
    }
    if !store.has("IMAGE_TAG") {
        if let Some(tag) = detect_image_tag(vars) {
            debug!(image_tag = %tag, "detected IMAGE_TAG from CI");
            store.set("IMAGE_TAG", tag);
        }
    }
}

/// Map `<ENV>_NAME` entries onto `NAME` for the given environment.
///
/// Unprefixed values already present are kept. Returns the keys that were set.
pub fn map_prefixed_variables(store: &ConfigStore, environment: &str) -> Vec<String> {
    let prefix = format!("{}_", environment.trim().to_uppercase());
    if prefix == "_" {
        return Vec::new();
    }

    let pairs = PREFIXED_VARIABLES
        .iter()
        .map(|name| (*name, *name))
        .chain(ACI_VARIABLES.iter().copied());

    let mut mapped = Vec::new();
    for (source, target) in pairs {
        let prefixed = format!("{}{}", prefix, source);
        let value = store.get(&prefixed);
        if value.is_empty() {
            continue;
        }
        if store.set_default(target, value) {
            debug!(from = %prefixed, to = target, "mapped environment-scoped variable");
            mapped.push(target.to_string());
        } else {
            debug!(key = target, "unprefixed value already set, keeping it");
        }
    }
    mapped
}

/// Map unprefixed `ACI_*` entries onto the application variables they feed.
///
/// Existing application values are kept. Returns the keys that were set.
pub fn map_aci_variables(store: &ConfigStore) -> Vec<String> {
    let mut mapped = Vec::new();
    for (source, target) in ACI_VARIABLES {
        let value = store.get(source);
        if !value.is_empty() && store.set_default(target, value) {
            debug!(from = source, to = target, "mapped container variable");
            mapped.push(target.to_string());
        }
    }
    mapped
}
