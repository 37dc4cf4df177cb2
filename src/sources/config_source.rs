//! Configuration source trait.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for configuration sources.
///
/// Each source produces a flat snapshot of key-value pairs. The loader merges
/// snapshots in priority order and normalizes keys, so sources may return keys
/// in any case.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load configuration as a flat string key-value map.
    ///
    /// The returned map will be merged with other sources according to precedence rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded or parsed. Only errors
    /// for which [`is_fatal_to_load`](crate::error::ConfigError::is_fatal_to_load)
    /// holds abort the merge; anything else is logged and skipped.
    async fn load(&self) -> Result<HashMap<String, String>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Get the priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Process environment: 100
    /// - Dotenv file: 50
    /// - Remote configuration: 10
    fn priority(&self) -> i32 {
        50
    }
}
