//! The application context every command receives.

use super::aliases::{self, ALIASES};
use super::environment;
use super::{ConfigLoader, ConfigStore};
use crate::error::{ConfigError, Result};
use crate::runner::{AzCli, CommandRunner};
use crate::sources::{EnvSource, FileSource, RemoteSettings, RemoteSource, ci_flag_set, process_vars};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Owns the configuration store and the handle to the cloud CLI.
///
/// Built once at process start and passed by reference to every command.
/// [`init`](Self::init) loads the store exactly once; later calls replay the
/// first outcome instead of fetching again.
///
/// # Examples
///
/// ```rust,no_run
/// use azctl::core::AppContext;
///
/// # async fn example() -> azctl::error::Result<()> {
/// let ctx = AppContext::builder()
///     .with_env_file(".env.staging")
///     .with_environment("staging")
///     .build();
/// ctx.init().await?;
///
/// let registry = ctx.store().require("ACR_REGISTRY")?;
/// # Ok(())
/// # }
/// ```
pub struct AppContext {
    store: ConfigStore,
    runner: Arc<dyn CommandRunner>,
    env_file: PathBuf,
    environment: Option<String>,
    vars: HashMap<String, String>,
    timeout: Option<Duration>,
    init: OnceCell<std::result::Result<(), Arc<ConfigError>>>,
}

impl AppContext {
    /// Create a new builder.
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    /// The configuration store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The cloud CLI runner.
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// The environment label given at startup, if any.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// The dotenv file the store is loaded from.
    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// The process variable snapshot taken when the context was built.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Whether the process runs under a CI system.
    pub fn is_ci(&self) -> bool {
        environment::is_ci(&self.vars)
    }

    /// The startup environment, or one detected from CI context.
    pub fn resolve_environment(&self) -> Option<String> {
        if let Some(env) = self.environment.as_deref().filter(|e| !e.is_empty()) {
            return Some(env.to_string());
        }
        if self.is_ci() {
            let detected = environment::detect_environment(&self.vars);
            if let Some(env) = &detected {
                debug!(environment = %env, "detected environment from CI");
            }
            return detected;
        }
        None
    }

    /// Whether [`init`](Self::init) has completed (successfully or not).
    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }

    /// Load the store from every source. Runs at most once per context.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Init`] wrapping the first load's failure, on
    /// this and every later call.
    pub async fn init(&self) -> Result<()> {
        let outcome = self
            .init
            .get_or_init(|| async {
                let settings = RemoteSettings::from_vars(&self.vars, self.environment().unwrap_or_default());
                let loader = self.loader(settings);
                loader.load_into(&self.store).await.map_err(Arc::new)
            })
            .await;
        outcome.clone().map_err(ConfigError::Init)
    }

    /// Reload the store for `env` from its environment-specific config set.
    ///
    /// The config set is the store's `<ENV>_APP_CONFIG`, falling back to
    /// `app-config-<env>`, and the label is `env`. A successful reload
    /// replaces every entry, so values set earlier through
    /// [`ConfigStore::set`] are discarded. The process environment is not
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns the initial load's failure, or the reload's fatal source error.
    /// The store is unchanged on error.
    pub async fn reload_for_environment(&self, env: &str) -> Result<()> {
        self.init().await?;

        let key = format!("{}_APP_CONFIG", env.to_uppercase());
        let name = match self.store.get(&key) {
            name if name.is_empty() => {
                let fallback = format!("app-config-{}", env);
                debug!(key = %key, name = %fallback, "no environment config set, using default name");
                fallback
            }
            name => {
                debug!(key = %key, name = %name, "using environment config set");
                name
            }
        };

        let settings = RemoteSettings::from_vars(&self.vars, env)
            .with_name(name.clone())
            .with_label(env);
        let merged = self.loader(settings).merge().await?;

        self.store.replace_all(merged);
        if self.is_ci() {
            environment::map_prefixed_variables(&self.store, env);
        }
        aliases::apply(&self.store, ALIASES);
        info!(environment = %env, config_set = %name, "configuration reloaded");
        Ok(())
    }

    /// A remote source for `settings`, sharing this context's runner and
    /// fetch timeout.
    pub fn remote_source(&self, settings: RemoteSettings) -> RemoteSource {
        let source = RemoteSource::new(Arc::clone(&self.runner), settings);
        match self.timeout {
            Some(limit) => source.with_timeout(limit),
            None => source,
        }
    }

    fn loader(&self, settings: RemoteSettings) -> ConfigLoader {
        let ci = ci_flag_set(self.vars.get("CI").map(String::as_str));
        ConfigLoader::new()
            .with_source(self.remote_source(settings))
            .with_source(FileSource::new(&self.env_file).with_ci(ci))
            .with_source(EnvSource::from_vars(self.vars.clone()))
    }
}

/// Builder for an [`AppContext`].
pub struct AppContextBuilder {
    env_file: PathBuf,
    environment: Option<String>,
    runner: Option<Arc<dyn CommandRunner>>,
    vars: Option<HashMap<String, String>>,
    timeout: Option<Duration>,
}

impl AppContextBuilder {
    /// Create a builder with `.env` as the env file and the `az` runner.
    pub fn new() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            environment: None,
            runner: None,
            vars: None,
            timeout: None,
        }
    }

    /// Read dotenv values from `path`.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = path.into();
        self
    }

    /// Scope the remote source to an environment label.
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        let env = env.into();
        self.environment = (!env.trim().is_empty()).then(|| env.trim().to_string());
        self
    }

    /// Use a different command runner.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Use a fixed variable set instead of the process environment.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Abort each remote `az` call that takes longer than `limit`. The child
    /// is killed and the remote source is skipped for that load; the dotenv
    /// file and process environment still apply.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Build the context. Nothing is loaded until [`AppContext::init`].
    pub fn build(self) -> AppContext {
        AppContext {
            store: ConfigStore::new(),
            runner: self.runner.unwrap_or_else(|| Arc::new(AzCli::new())),
            env_file: self.env_file,
            environment: self.environment,
            vars: self.vars.unwrap_or_else(process_vars),
            timeout: self.timeout,
            init: OnceCell::new(),
        }
    }
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn record(value: &str) -> String {
        serde_json::json!({ "key": "k", "value": value }).to_string()
    }

    fn context(runner: MockRunner, env: &[(&str, &str)]) -> (AppContext, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        let ctx = AppContext::builder()
            .with_env_file("/nonexistent/.env")
            .with_runner(runner.clone())
            .with_vars(vars(env))
            .build();
        (ctx, runner)
    }

    #[tokio::test]
    async fn test_init_loads_once() {
        let (ctx, runner) = context(
            MockRunner::new().on(&["global-configurations"], record(r#"{"REGION":"eu"}"#)),
            &[("APP_CONFIG", "cfg")],
        );
        assert!(!ctx.is_initialized());

        ctx.init().await.unwrap();
        ctx.store().set("REGION", "changed");
        ctx.init().await.unwrap();

        assert!(ctx.is_initialized());
        assert_eq!(ctx.store().get("REGION"), "changed");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_replayed() {
        let (ctx, runner) = context(
            MockRunner::new().on(&["global-configurations"], record("{not json")),
            &[("APP_CONFIG", "cfg"), ("KEEP", "x")],
        );

        let first = ctx.init().await.unwrap_err();
        let second = ctx.init().await.unwrap_err();
        assert!(matches!(first, ConfigError::Init(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.to_string().contains("Malformed JSON"));
        assert!(ctx.store().is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_env_wins_over_file_and_remote() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        fs::write(&path, "PORT=2\nHOST=file\n").unwrap();

        let runner = Arc::new(
            MockRunner::new().on(&["global-configurations"], record(r#"{"PORT":"1","REGION":"eu"}"#)),
        );
        let ctx = AppContext::builder()
            .with_env_file(&path)
            .with_runner(runner)
            .with_vars(vars(&[("APP_CONFIG", "cfg"), ("PORT", "3")]))
            .build();

        ctx.init().await.unwrap();
        assert_eq!(ctx.store().get("PORT"), "3");
        assert_eq!(ctx.store().get("HOST"), "file");
        assert_eq!(ctx.store().get("REGION"), "eu");
    }

    #[tokio::test]
    async fn test_reload_for_environment() {
        let runner = MockRunner::new()
            .when(
                |a| a.iter().any(|x| x == "cfg-dev") && a.iter().any(|x| x == "dev"),
                record(r#"{"REGISTRY":"devacr"}"#),
            )
            .on(&["global-configurations"], record(r#"{"REGISTRY":"base"}"#));
        let (ctx, runner) = context(runner, &[("APP_CONFIG", "cfg"), ("DEV_APP_CONFIG", "cfg-dev")]);

        ctx.init().await.unwrap();
        assert_eq!(ctx.store().get("ACR_REGISTRY"), "base");

        ctx.store().set("TRANSIENT", "1");
        ctx.reload_for_environment("dev").await.unwrap();
        assert_eq!(ctx.store().get("ACR_REGISTRY"), "devacr");
        assert!(!ctx.store().has("TRANSIENT"));

        let last = runner.calls().last().cloned().unwrap();
        assert!(last.windows(2).any(|w| w[0] == "--name" && w[1] == "cfg-dev"));
    }

    #[tokio::test]
    async fn test_reload_falls_back_to_default_set_name() {
        let (ctx, runner) = context(MockRunner::new(), &[]);
        ctx.reload_for_environment("staging").await.unwrap();

        let calls = runner.calls();
        assert!(!calls.is_empty());
        assert!(
            calls
                .iter()
                .all(|c| c.windows(2).any(|w| w[0] == "--name" && w[1] == "app-config-staging"))
        );
    }

    #[tokio::test]
    async fn test_reload_maps_prefixed_variables_in_ci() {
        let (ctx, _) = context(
            MockRunner::new(),
            &[("CI", "true"), ("DEV_RESOURCE_GROUP", "rg-dev")],
        );
        ctx.reload_for_environment("dev").await.unwrap();
        assert_eq!(ctx.store().get("RESOURCE_GROUP"), "rg-dev");
        assert_eq!(ctx.store().get("ACR_RESOURCE_GROUP"), "rg-dev");
    }

    #[test]
    fn test_resolve_environment() {
        let (ctx, _) = context(
            MockRunner::new(),
            &[("GITHUB_ACTIONS", "true"), ("GITHUB_REF", "refs/heads/main")],
        );
        assert_eq!(ctx.resolve_environment().as_deref(), Some("prod"));

        let ctx = AppContext::builder()
            .with_environment("staging")
            .with_vars(HashMap::new())
            .build();
        assert_eq!(ctx.resolve_environment().as_deref(), Some("staging"));

        let ctx = AppContext::builder().with_environment("  ").with_vars(HashMap::new()).build();
        assert_eq!(ctx.resolve_environment(), None);
    }

    struct StalledRunner;

    #[async_trait::async_trait]
    impl CommandRunner for StalledRunner {
        async fn run(&self, _args: &[String]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn run_capture(&self, _args: &[String]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_keeps_other_sources() {
        let ctx = AppContext::builder()
            .with_env_file("/nonexistent/.env")
            .with_runner(Arc::new(StalledRunner))
            .with_vars(vars(&[("APP_CONFIG", "cfg"), ("FROM_ENV", "yes")]))
            .with_timeout(Duration::from_millis(100))
            .build();

        ctx.init().await.unwrap();
        assert_eq!(ctx.store().get("FROM_ENV"), "yes");

        ctx.reload_for_environment("dev").await.unwrap();
        assert_eq!(ctx.store().get("FROM_ENV"), "yes");
    }
}
