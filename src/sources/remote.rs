//! Remote configuration source backed by Azure App Configuration.
//!
//! Entries are fetched through the Azure CLI (`az appconfig kv show`). Each
//! entry's value is a JSON object of string fields which is flattened into
//! individual upper-case keys.

use super::ConfigSource;
use super::file::ci_flag_set;
use crate::error::{ConfigError, Result};
use crate::runner::{CommandRunner, args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key of the shared entry every configuration set carries.
pub const GLOBAL_KEY: &str = "global-configurations";

/// Where and what to fetch from the remote configuration service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Configuration set (App Configuration store) name. `None` disables the source.
    pub name: Option<String>,
    /// Environment label, e.g. `staging`.
    pub label: Option<String>,
    /// Entity key layered on top of the global entry, e.g. an image name.
    pub entity_key: Option<String>,
    /// Skip the remote source entirely.
    pub skip: bool,
}

impl RemoteSettings {
    /// Resolve settings from a set of variables.
    ///
    /// - name: `APP_CONFIG_NAME`, else `APP_CONFIG`
    /// - label: `APP_CONFIG_LABEL`, else `environment`
    /// - entity key: the repository name on GitHub Actions in CI, else `IMAGE_NAME`
    /// - skip: `APP_CONFIG_SKIP=true`
    pub fn from_vars(vars: &HashMap<String, String>, environment: &str) -> Self {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let on_github = get("GITHUB_ACTIONS").as_deref() == Some("true");
        let entity_key = if ci_flag_set(get("CI").as_deref()) && on_github {
            get("GITHUB_REPOSITORY")
                .and_then(|repo| repo.split_once('/').map(|(_, name)| name.to_string()))
                .filter(|name| !name.is_empty() && !name.contains('/'))
                .or_else(|| get("IMAGE_NAME"))
        } else {
            get("IMAGE_NAME")
        };

        Self {
            name: get("APP_CONFIG_NAME").or_else(|| get("APP_CONFIG")),
            label: get("APP_CONFIG_LABEL")
                .or_else(|| Some(environment.trim().to_string()).filter(|e| !e.is_empty())),
            entity_key,
            skip: get("APP_CONFIG_SKIP").as_deref() == Some("true"),
        }
    }

    /// Set the configuration set name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the entity key.
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }
}

/// The `{key, value}` record printed by `az appconfig kv show`.
#[derive(Debug, Deserialize)]
struct KeyValueRecord {
    value: Option<String>,
}

/// Remote configuration source.
///
/// Fetches the [`GLOBAL_KEY`] entry and then, when configured, the entity
/// entry. Entity fields overwrite global ones with the same name. A labeled
/// lookup whose command fails is retried once without a label. With a
/// timeout set, a fetch that runs past it fails the source, which the loader
/// logs and skips.
///
/// # Examples
///
/// ```rust,no_run
/// use azctl::runner::AzCli;
/// use azctl::sources::{RemoteSettings, RemoteSource};
/// use std::sync::Arc;
///
/// let settings = RemoteSettings::default()
///     .with_name("cfg")
///     .with_label("staging")
///     .with_entity_key("app1");
/// let source = RemoteSource::new(Arc::new(AzCli::new()), settings);
/// ```
pub struct RemoteSource {
    runner: Arc<dyn CommandRunner>,
    settings: RemoteSettings,
    priority: i32,
    timeout: Option<Duration>,
}

impl RemoteSource {
    /// Create a remote source using `runner` to reach the service.
    pub fn new(runner: Arc<dyn CommandRunner>, settings: RemoteSettings) -> Self {
        Self {
            runner,
            settings,
            priority: 10, // Shared defaults, lowest precedence
            timeout: None,
        }
    }

    /// Abort each `az` call that takes longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Fetch a single entry and flatten it.
    ///
    /// Returns `Ok(None)` when the `az` call fails (not found or
    /// unreachable). A response that is not a `{key, value}` record counts as
    /// found and contributes nothing, so it does not trigger the unlabeled
    /// retry. A value of `null` is an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedRemoteValue`] when the entry exists but
    /// its value is not a JSON object, and [`ConfigError::LoadError`] when the
    /// call runs past the timeout.
    pub async fn fetch_entry(
        &self,
        name: &str,
        key: &str,
        label: Option<&str>,
    ) -> Result<Option<HashMap<String, String>>> {
        let mut cmd = args([
            "appconfig",
            "kv",
            "show",
            "--name",
            name,
            "--key",
            key,
            "--query",
            "{key:key,value:value}",
            "-o",
            "json",
        ]);
        if let Some(label) = label {
            cmd.extend(args(["--label", label]));
        }

        let fetched = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.runner.run_capture(&cmd))
                .await
                .map_err(|_| {
                    ConfigError::LoadError(format!(
                        "fetching '{}' from {} timed out after {:?}",
                        key, name, limit
                    ))
                })?,
            None => self.runner.run_capture(&cmd).await,
        };

        let output = match fetched {
            Ok(output) => output,
            Err(e) => {
                debug!(key, label = ?label, error = %e, "remote entry not found");
                return Ok(None);
            }
        };

        let record: KeyValueRecord = match serde_json::from_str(&output) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, label = ?label, error = %e, "unreadable response from az, skipping entry");
                return Ok(Some(HashMap::new()));
            }
        };

        let malformed = |reason: String| ConfigError::MalformedRemoteValue {
            key: key.to_string(),
            label: label.map(str::to_string),
            reason,
        };

        let raw = record
            .value
            .ok_or_else(|| malformed("entry has no value".to_string()))?;
        flatten_object(&raw).map(Some).map_err(malformed)
    }

    /// Fetch an entry under the configured label, falling back to no label.
    async fn fetch_with_fallback(
        &self,
        name: &str,
        key: &str,
    ) -> Result<HashMap<String, String>> {
        let label = self.settings.label.as_deref();
        if let Some(found) = self.fetch_entry(name, key, label).await? {
            debug!(key, label = ?label, count = found.len(), "fetched remote entry");
            return Ok(found);
        }

        if label.is_some() {
            if let Some(found) = self.fetch_entry(name, key, None).await? {
                debug!(key, count = found.len(), "fetched remote entry without label");
                return Ok(found);
            }
        }

        Ok(HashMap::new())
    }
}

/// Parse a JSON object and keep its string fields under upper-case keys.
fn flatten_object(raw: &str) -> std::result::Result<HashMap<String, String>, String> {
    let value: JsonValue = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let fields = match value {
        JsonValue::Object(fields) => fields,
        JsonValue::Null => return Ok(HashMap::new()),
        _ => return Err("expected a JSON object".to_string()),
    };

    let mut map = HashMap::with_capacity(fields.len());
    for (key, value) in fields {
        match value {
            JsonValue::String(s) => {
                map.insert(key.to_uppercase(), s);
            }
            other => debug!(key, kind = json_kind(&other), "ignoring non-string field"),
        }
    }
    Ok(map)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[async_trait]
impl ConfigSource for RemoteSource {
    async fn load(&self) -> Result<HashMap<String, String>> {
        if self.settings.skip {
            debug!("APP_CONFIG_SKIP set, skipping remote configuration");
            return Ok(HashMap::new());
        }
        let Some(name) = self.settings.name.as_deref() else {
            return Ok(HashMap::new());
        };

        let mut map = self.fetch_with_fallback(name, GLOBAL_KEY).await?;

        if let Some(entity) = self.settings.entity_key.as_deref() {
            map.extend(self.fetch_with_fallback(name, entity).await?);
        }

        Ok(map)
    }

    fn name(&self) -> String {
        match &self.settings.name {
            Some(name) => format!("appconfig:{}", name),
            None => "appconfig".to_string(),
        }
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::MockRunner;

    fn record(value: &str) -> String {
        serde_json::json!({ "key": "k", "value": value }).to_string()
    }

    fn has_label(args: &[String], label: &str) -> bool {
        args.windows(2).any(|w| w[0] == "--label" && w[1] == label)
    }

    fn no_label(args: &[String]) -> bool {
        !args.iter().any(|a| a == "--label")
    }

    fn key_is(args: &[String], key: &str) -> bool {
        args.windows(2).any(|w| w[0] == "--key" && w[1] == key)
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_global_and_entity_merge() {
        let runner = MockRunner::new()
            .when(
                |a| key_is(a, GLOBAL_KEY) && has_label(a, "staging"),
                record(r#"{"REGISTRY":"r.example.com"}"#),
            )
            .when(
                |a| key_is(a, "app1") && has_label(a, "staging"),
                record(r#"{"PORT":"8080"}"#),
            );
        let settings = RemoteSettings::default()
            .with_name("cfg")
            .with_label("staging")
            .with_entity_key("app1");

        let map = RemoteSource::new(Arc::new(runner), settings)
            .load()
            .await
            .unwrap();
        assert_eq!(map["REGISTRY"], "r.example.com");
        assert_eq!(map["PORT"], "8080");
    }

    #[tokio::test]
    async fn test_entity_overrides_global() {
        let runner = MockRunner::new()
            .when(|a| key_is(a, GLOBAL_KEY), record(r#"{"port":"80","region":"eu"}"#))
            .when(|a| key_is(a, "api"), record(r#"{"PORT":"9000"}"#));
        let settings = RemoteSettings::default().with_name("cfg").with_entity_key("api");

        let map = RemoteSource::new(Arc::new(runner), settings)
            .load()
            .await
            .unwrap();
        assert_eq!(map["PORT"], "9000");
        assert_eq!(map["REGION"], "eu");
    }

    #[tokio::test]
    async fn test_falls_back_to_unlabeled() {
        let runner = Arc::new(MockRunner::new().when(
            |a| key_is(a, GLOBAL_KEY) && no_label(a),
            record(r#"{"SHARED":"yes"}"#),
        ));
        let settings = RemoteSettings::default().with_name("cfg").with_label("dev");

        let map = RemoteSource::new(runner.clone(), settings).load().await.unwrap();
        assert_eq!(map["SHARED"], "yes");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(has_label(&calls[0], "dev"));
        assert!(no_label(&calls[1]));
    }

    #[tokio::test]
    async fn test_no_retry_without_label() {
        let runner = Arc::new(MockRunner::new());
        let settings = RemoteSettings::default().with_name("cfg");

        let map = RemoteSource::new(runner.clone(), settings).load().await.unwrap();
        assert!(map.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_value_is_fatal() {
        let runner = MockRunner::new().when(|a| key_is(a, GLOBAL_KEY), record(r#"{"A":"1",}"#));
        let settings = RemoteSettings::default().with_name("cfg").with_label("prod");

        let err = RemoteSource::new(Arc::new(runner), settings)
            .load()
            .await
            .unwrap_err();
        assert!(err.is_fatal_to_load());
        assert!(err.to_string().contains(GLOBAL_KEY));
    }

    #[tokio::test]
    async fn test_non_object_value_is_malformed() {
        let runner = MockRunner::new().when(|a| key_is(a, GLOBAL_KEY), record("[1,2]"));
        let settings = RemoteSettings::default().with_name("cfg");

        let result = RemoteSource::new(Arc::new(runner), settings).load().await;
        assert!(matches!(result, Err(ConfigError::MalformedRemoteValue { .. })));
    }

    #[tokio::test]
    async fn test_non_string_fields_ignored() {
        let runner = MockRunner::new().when(
            |a| key_is(a, GLOBAL_KEY),
            record(r#"{"NAME":"x","REPLICAS":3,"DEBUG":true,"NESTED":{"A":"b"},"NONE":null}"#),
        );
        let settings = RemoteSettings::default().with_name("cfg");

        let map = RemoteSource::new(Arc::new(runner), settings)
            .load()
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["NAME"], "x");
    }

    #[tokio::test]
    async fn test_unreadable_envelope_skipped_without_retry() {
        let runner = Arc::new(
            MockRunner::new()
                .when(|a| key_is(a, GLOBAL_KEY) && has_label(a, "dev"), "WARNING: not json")
                .when(|a| key_is(a, GLOBAL_KEY) && no_label(a), record(r#"{"SHARED":"yes"}"#)),
        );
        let settings = RemoteSettings::default().with_name("cfg").with_label("dev");

        let map = RemoteSource::new(runner.clone(), settings).load().await.unwrap();
        assert!(map.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_null_value_is_empty() {
        let runner = MockRunner::new().when(|a| key_is(a, GLOBAL_KEY), record("null"));
        let settings = RemoteSettings::default().with_name("cfg");

        let map = RemoteSource::new(Arc::new(runner), settings)
            .load()
            .await
            .unwrap();
        assert!(map.is_empty());
    }

    struct StalledRunner;

    #[async_trait]
    impl CommandRunner for StalledRunner {
        async fn run(&self, _args: &[String]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn run_capture(&self, _args: &[String]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(record(r#"{"LATE":"1"}"#))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_source_without_being_fatal() {
        let settings = RemoteSettings::default().with_name("cfg").with_label("dev");
        let source =
            RemoteSource::new(Arc::new(StalledRunner), settings).with_timeout(Duration::from_millis(100));

        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
        assert!(!err.is_fatal_to_load());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unconfigured_or_skipped_is_empty() {
        let runner = Arc::new(MockRunner::new());
        let map = RemoteSource::new(runner.clone(), RemoteSettings::default())
            .load()
            .await
            .unwrap();
        assert!(map.is_empty());

        let mut settings = RemoteSettings::default().with_name("cfg");
        settings.skip = true;
        let map = RemoteSource::new(runner.clone(), settings).load().await.unwrap();
        assert!(map.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_settings_from_vars() {
        let settings = RemoteSettings::from_vars(
            &vars(&[("APP_CONFIG", "store-a"), ("IMAGE_NAME", "api")]),
            "dev",
        );
        assert_eq!(settings.name.as_deref(), Some("store-a"));
        assert_eq!(settings.label.as_deref(), Some("dev"));
        assert_eq!(settings.entity_key.as_deref(), Some("api"));
        assert!(!settings.skip);

        let settings = RemoteSettings::from_vars(
            &vars(&[
                ("APP_CONFIG_NAME", "store-b"),
                ("APP_CONFIG", "store-a"),
                ("APP_CONFIG_LABEL", "blue"),
                ("APP_CONFIG_SKIP", "true"),
            ]),
            "dev",
        );
        assert_eq!(settings.name.as_deref(), Some("store-b"));
        assert_eq!(settings.label.as_deref(), Some("blue"));
        assert_eq!(settings.entity_key, None);
        assert!(settings.skip);
    }

    #[test]
    fn test_settings_entity_from_github() {
        let settings = RemoteSettings::from_vars(
            &vars(&[
                ("CI", "true"),
                ("GITHUB_ACTIONS", "true"),
                ("GITHUB_REPOSITORY", "acme/embedding-service"),
                ("IMAGE_NAME", "ignored"),
            ]),
            "",
        );
        assert_eq!(settings.entity_key.as_deref(), Some("embedding-service"));
        assert_eq!(settings.label, None);
    }

    #[test]
    fn test_name() {
        let source = RemoteSource::new(
            Arc::new(MockRunner::new()),
            RemoteSettings::default().with_name("cfg"),
        );
        assert_eq!(source.name(), "appconfig:cfg");
        assert_eq!(source.priority(), 10);
    }
}
