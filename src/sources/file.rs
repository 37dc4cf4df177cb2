//! Dotenv file configuration source.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Dotenv file configuration source.
///
/// Reads `KEY=value` lines from a local file. The source contributes nothing
/// when the path is empty, when the file does not exist, or when running in
/// CI, where the pipeline's own environment is authoritative.
///
/// # Examples
///
/// ```rust,no_run
/// use azctl::sources::FileSource;
///
/// let source = FileSource::new(".env.staging");
/// ```
pub struct FileSource {
    path: PathBuf,
    ci: bool,
    priority: i32,
}

impl FileSource {
    /// Create a new dotenv source. CI is detected from the `CI` variable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ci: ci_flag_set(std::env::var("CI").ok().as_deref()),
            priority: 50,
        }
    }

    /// Override CI detection.
    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The configured file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether a `CI` variable value means "running in CI".
pub(crate) fn ci_flag_set(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "0"),
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn load(&self) -> Result<HashMap<String, String>> {
        if self.path.as_os_str().is_empty() {
            return Ok(HashMap::new());
        }

        if self.ci {
            debug!(path = %self.path.display(), "CI detected, skipping env file");
            return Ok(HashMap::new());
        }

        if !self.path.exists() {
            debug!(path = %self.path.display(), "env file not found, skipping");
            return Ok(HashMap::new());
        }

        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            ConfigError::LoadError(format!(
                "Failed to read env file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut map = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                ConfigError::ParseError(format!(
                    "Failed to parse env file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            map.insert(key.to_uppercase(), value);
        }

        Ok(map)
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
