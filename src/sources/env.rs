//! Process environment configuration source.

use super::ConfigSource;
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use config::{Environment, Source};
use std::collections::HashMap;

/// Process environment configuration source.
///
/// Snapshots every variable currently set in the process. This is the highest
/// precedence source so that CI-provided variables win over files.
///
/// # Examples
///
/// ```rust
/// use azctl::sources::EnvSource;
///
/// let source = EnvSource::new();
/// ```
pub struct EnvSource {
    snapshot: Option<HashMap<String, String>>,
    priority: i32,
}

impl EnvSource {
    /// Create a source reading the live process environment.
    pub fn new() -> Self {
        Self {
            snapshot: None,
            priority: 100, // Process env has the highest priority by default
        }
    }

    /// Create a source over a fixed set of variables instead of the process
    /// environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            snapshot: Some(vars),
            ..Self::new()
        }
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    async fn load(&self) -> Result<HashMap<String, String>> {
        let vars = self.snapshot.clone().unwrap_or_else(process_vars);
        let source = Environment::default()
            .try_parsing(false)
            .source(Some(vars.into_iter().collect()));

        // collect() keeps keys flat; building a Config would parse them as paths.
        let values = source.collect().map_err(|e| {
            ConfigError::LoadError(format!("Failed to read environment variables: {}", e))
        })?;

        let mut map = HashMap::with_capacity(values.len());
        for (key, value) in values {
            let value = value.into_string().map_err(|e| {
                ConfigError::ParseError(format!("Environment variable {}: {}", key, e))
            })?;
            map.insert(key.to_uppercase(), value);
        }
        Ok(map)
    }

    fn name(&self) -> String {
        "env".to_string()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Snapshot the live process environment, skipping non-unicode entries.
pub fn process_vars() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}
