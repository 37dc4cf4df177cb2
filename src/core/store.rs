//! The process-wide key-value configuration store.

use crate::error::{ConfigError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Case-insensitive key-value store shared by every command.
///
/// Keys are upper-cased on both write and read, so `get("image_name")` and
/// `get("IMAGE_NAME")` address the same entry. Reads take a shared lock and
/// writes an exclusive one.
///
/// # Examples
///
/// ```rust
/// use azctl::core::ConfigStore;
///
/// let store = ConfigStore::new();
/// store.set("registry", "myacr");
/// assert_eq!(store.get("REGISTRY"), "myacr");
/// assert_eq!(store.get("missing"), "");
/// ```
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `values` (keys are normalized).
    pub fn from_map(values: HashMap<String, String>) -> Self {
        let store = Self::new();
        store.replace_all(values);
        store
    }

    /// Look up a value. Absent keys yield an empty string.
    pub fn get(&self, key: &str) -> String {
        self.values
            .read()
            .get(&normalize(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Insert or overwrite a value.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values.write().insert(normalize(key), value.into());
    }

    /// Set `key` only when it is currently empty. Returns whether it was written.
    pub fn set_default(&self, key: &str, value: impl Into<String>) -> bool {
        let mut values = self.values.write();
        let slot = values.entry(normalize(key)).or_default();
        if slot.is_empty() {
            *slot = value.into();
            true
        } else {
            false
        }
    }

    /// A copy of every entry. Mutating the copy never affects the store.
    pub fn get_all(&self) -> HashMap<String, String> {
        self.values.read().clone()
    }

    /// Look up a value that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] when the value is absent or empty.
    pub fn require(&self, key: &str) -> Result<String> {
        let value = self.get(key);
        if value.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: normalize(key),
            });
        }
        Ok(value)
    }

    /// True iff [`get`](Self::get) would return a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.values
            .read()
            .get(&normalize(key))
            .is_some_and(|v| !v.is_empty())
    }

    /// Overlay `values` onto the store in one write.
    pub fn extend(&self, values: HashMap<String, String>) {
        let mut current = self.values.write();
        for (key, value) in values {
            current.insert(normalize(&key), value);
        }
    }

    /// Replace every entry with `values` in one write.
    pub fn replace_all(&self, values: HashMap<String, String>) {
        let normalized = values
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        *self.values.write() = normalized;
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

/// Normalize a key for storage and lookup.
pub fn normalize(key: &str) -> String {
    key.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_case_insensitive_last_write_wins() {
        let store = ConfigStore::new();
        store.set("foo", "v");
        store.set("FOO", "w");
        assert_eq!(store.get("foo"), "w");
        assert_eq!(store.get("Foo"), "w");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_is_empty() {
        let store = ConfigStore::new();
        assert_eq!(store.get("NONEXISTENT"), "");
        assert!(!store.has("NONEXISTENT"));
    }

    #[test]
    fn test_require() {
        let store = ConfigStore::new();
        let err = store.require("x").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key } if key == "X"));

        store.set("X", "1");
        assert_eq!(store.require("x").unwrap(), "1");
    }

    #[test]
    fn test_empty_value_is_not_present() {
        let store = ConfigStore::new();
        store.set("EMPTY", "");
        assert!(!store.has("EMPTY"));
        assert!(store.require("EMPTY").is_err());
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let store = ConfigStore::new();
        store.set("A", "1");

        let mut copy = store.get_all();
        copy.insert("B".to_string(), "2".to_string());
        copy.insert("A".to_string(), "changed".to_string());

        assert_eq!(store.get("A"), "1");
        assert!(!store.has("B"));
    }

    #[test]
    fn test_set_default() {
        let store = ConfigStore::new();
        store.set("LOCATION", "westeurope");
        assert!(!store.set_default("location", "eastus"));
        assert!(store.set_default("OS_TYPE", "Linux"));
        assert_eq!(store.get("LOCATION"), "westeurope");
        assert_eq!(store.get("OS_TYPE"), "Linux");
    }

    #[test]
    fn test_replace_all_normalizes() {
        let store = ConfigStore::new();
        store.set("OLD", "1");
        store.replace_all(HashMap::from([("new".to_string(), "2".to_string())]));
        assert!(!store.has("OLD"));
        assert_eq!(store.get("NEW"), "2");
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let store = Arc::new(ConfigStore::new());
        store.set("COUNTER", "0");

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000 {
                    store.set("COUNTER", i.to_string());
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        assert!(store.get("counter").parse::<u32>().is_ok());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get("COUNTER"), "999");
    }

    proptest! {
        #[test]
        fn prop_any_casing_reads_last_write(key in "[a-zA-Z_][a-zA-Z0-9_]{0,16}", v in ".*", w in ".*") {
            let store = ConfigStore::new();
            store.set(&key.to_lowercase(), v);
            store.set(&key.to_uppercase(), w.clone());
            prop_assert_eq!(store.get(&key), w.clone());
            prop_assert_eq!(store.get(&key.to_lowercase()), w);
        }
    }
}
