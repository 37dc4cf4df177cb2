//! Configuration loader that merges multiple sources.

use super::aliases::{self, ALIASES, Alias};
use super::store::{ConfigStore, normalize};
use crate::error::Result;
use crate::sources::ConfigSource;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Loads and merges configuration from multiple sources.
///
/// The loader handles precedence by sorting sources by priority and merging them
/// in order (lower priority first, higher priority sources override).
pub struct ConfigLoader {
    sources: Vec<Box<dyn ConfigSource>>,
    aliases: &'static [Alias],
}

impl ConfigLoader {
    /// Create a new configuration loader using the default alias table.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            aliases: ALIASES,
        }
    }

    /// Use a different alias table.
    pub fn with_aliases(mut self, aliases: &'static [Alias]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Add a configuration source.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
    }

    /// Builder-style [`add_source`](Self::add_source).
    pub fn with_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load and merge every source into a fresh map.
    ///
    /// Sources are merged in priority order (lowest to highest), so higher
    /// priority sources override values from lower priority sources. A source
    /// that fails is logged and contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns the source's error when it is fatal to the load (a malformed
    /// remote value). Nothing is merged in that case.
    pub async fn merge(&self) -> Result<HashMap<String, String>> {
        let mut sorted_sources: Vec<_> = self.sources.iter().collect();
        sorted_sources.sort_by_key(|s| s.priority());

        let mut merged = HashMap::new();
        for source in sorted_sources {
            let name = source.name();
            let values = match source.load().await {
                Ok(values) => values,
                Err(e) if e.is_fatal_to_load() => return Err(e),
                Err(e) => {
                    warn!(source = %name, error = %e, "configuration source failed, skipping");
                    continue;
                }
            };

            debug!(source = %name, count = values.len(), "merging source");
            for (key, value) in values {
                let key = normalize(&key);
                debug!(source = %name, key = %key, "contributed");
                merged.insert(key, value);
            }
        }

        Ok(merged)
    }

    /// Merge every source into `store` and apply the alias table.
    ///
    /// The store is written only after all sources loaded, so a fatal error
    /// leaves it untouched. Existing entries not contributed by any source are
    /// kept.
    ///
    /// # Errors
    ///
    /// See [`merge`](Self::merge).
    pub async fn load_into(&self, store: &ConfigStore) -> Result<()> {
        let merged = self.merge().await?;
        store.extend(merged);
        aliases::apply(store, self.aliases);
        Ok(())
    }

    /// Get the list of source names in priority order.
    pub fn source_names(&self) -> Vec<String> {
        let mut sorted_sources: Vec<_> = self.sources.iter().collect();
        sorted_sources.sort_by_key(|s| s.priority());
        sorted_sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
