//! Variable-name fallbacks applied after every load.

use super::ConfigStore;
use tracing::debug;

/// A one-directional fallback: when `canonical` is empty, copy `alias` into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
    /// The key commands and templates read.
    pub canonical: &'static str,
    /// The key operators may have set instead.
    pub alias: &'static str,
}

/// The fallback table, applied in order so later rows see earlier derivations.
pub const ALIASES: &[Alias] = &[
    Alias {
        canonical: "ACR_REGISTRY",
        alias: "REGISTRY",
    },
    Alias {
        canonical: "IMAGE_REGISTRY",
        alias: "ACR_REGISTRY",
    },
    Alias {
        canonical: "RESOURCE_GROUP",
        alias: "AZURE_RESOURCE_GROUP",
    },
    Alias {
        canonical: "ACR_RESOURCE_GROUP",
        alias: "RESOURCE_GROUP",
    },
];

/// Apply `table` to `store`. Returns the canonical keys that were derived.
pub fn apply(store: &ConfigStore, table: &[Alias]) -> Vec<&'static str> {
    let mut derived = Vec::new();
    for entry in table {
        if store.has(entry.canonical) {
            continue;
        }
        let value = store.get(entry.alias);
        if value.is_empty() {
            continue;
        }
        debug!(canonical = entry.canonical, alias = entry.alias, "derived from alias");
        store.set(entry.canonical, value);
        derived.push(entry.canonical);
    }
    derived
}
