//! Required-key checks and per-command validation rules.

use super::ConfigStore;
use crate::error::{ConfigError, Result, ValidationError};
use regex::Regex;

/// Keys an `acr` build depends on.
pub const ACR_REQUIRED: &[&str] = &["ACR_REGISTRY", "ACR_RESOURCE_GROUP", "IMAGE_NAME", "IMAGE_TAG"];

/// Keys a `webapp` deployment depends on.
pub const WEBAPP_REQUIRED: &[&str] = &["RESOURCE_GROUP", "ACR_REGISTRY", "IMAGE_NAME", "IMAGE_TAG"];

/// Keys an `aci` deployment depends on.
pub const ACI_REQUIRED: &[&str] = &[
    "RESOURCE_GROUP",
    "CONTAINER_GROUP_NAME",
    "LOCATION",
    "OS_TYPE",
    "DNS_NAME_LABEL",
    "ACI_PORT",
    "ACI_CPU",
    "ACI_MEMORY",
    "ACR_REGISTRY",
    "IMAGE_NAME",
    "IMAGE_TAG",
    "ACR_USERNAME",
    "ACR_PASSWORD",
];

/// Check that every key in `keys` has a non-empty value.
///
/// # Errors
///
/// Returns one [`ConfigError::MissingKeys`] naming every missing key, in the
/// order given.
///
/// # Examples
///
/// ```rust
/// use azctl::core::{ConfigStore, required_keys};
///
/// let store = ConfigStore::new();
/// store.set("B", "present");
/// let err = required_keys(&store, &["A", "B", "C"]).unwrap_err();
/// assert_eq!(err.to_string(), "missing required configuration variables: A, C");
/// ```
pub fn required_keys(store: &ConfigStore, keys: &[&str]) -> Result<()> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|key| !store.has(key))
        .map(|key| key.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingKeys { keys: missing })
    }
}

/// Trait for checks that run against a populated store.
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self, store: &ConfigStore) -> std::result::Result<(), ValidationError>;
}

type Check = Box<dyn Fn(&ConfigStore) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// A named rule: required keys, value patterns and an optional custom check.
pub struct ValidationRule {
    name: String,
    required: Vec<String>,
    patterns: Vec<(String, Regex)>,
    checks: Vec<Check>,
}

impl ValidationRule {
    /// Create an empty rule.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            patterns: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// Require these keys to be non-empty.
    pub fn require(mut self, keys: &[&str]) -> Self {
        self.required.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    /// Require `key`, when set, to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `pattern` does not compile.
    pub fn pattern(mut self, key: &str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::ValidationError(format!("bad pattern for {}: {}", key, e)))?;
        self.patterns.push((key.to_string(), regex));
        Ok(self)
    }

    /// Add a custom check.
    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ConfigStore) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    /// The rule's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for ValidationRule {
    fn validate(&self, store: &ConfigStore) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        for key in &self.required {
            if !store.has(key) {
                errors.push(ValidationError::invalid_field(key, "is required"));
            }
        }

        for (key, regex) in &self.patterns {
            let value = store.get(key);
            if !value.is_empty() && !regex.is_match(&value) {
                errors.push(ValidationError::invalid_field(
                    key,
                    format!("'{}' does not match {}", value, regex.as_str()),
                ));
            }
        }

        for check in &self.checks {
            if let Err(e) = check(store) {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

/// Runs a set of rules and reports every failure together.
#[derive(Default)]
pub struct ValidationEngine {
    rules: Vec<ValidationRule>,
}

impl ValidationEngine {
    /// Create an engine with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Validate `store` against every rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing each failing rule.
    pub fn validate(&self, store: &ConfigStore) -> Result<()> {
        let mut failures: Vec<ValidationError> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.validate(store)
                    .err()
                    .map(|e| ValidationError::custom(format!("{}: {}", rule.name(), e)))
            })
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0).into()),
            _ => Err(ValidationError::Multiple(failures).into()),
        }
    }
}

const NAME_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$";

fn numeric_in_range(
    store: &ConfigStore,
    key: &str,
    max: f64,
) -> std::result::Result<(), ValidationError> {
    let value = store.get(key);
    if value.is_empty() {
        return Ok(());
    }
    match value.parse::<f64>() {
        Ok(n) if n > 0.0 && n <= max => Ok(()),
        Ok(_) => Err(ValidationError::invalid_field(
            key,
            format!("must be greater than 0 and at most {}", max),
        )),
        Err(_) => Err(ValidationError::invalid_field(key, "must be a number")),
    }
}

/// Value checks for a container instance deployment.
///
/// # Errors
///
/// Only fails if a built-in pattern does not compile.
pub fn aci_rule() -> Result<ValidationRule> {
    let rule = ValidationRule::new("aci")
        .pattern("CONTAINER_GROUP_NAME", NAME_PATTERN)?
        .pattern("DNS_NAME_LABEL", NAME_PATTERN)?
        .pattern("ACI_PORT", r"^[0-9]{1,5}$")?
        .check(|store| {
            let os = store.get("OS_TYPE");
            if os.is_empty() || os == "Linux" || os == "Windows" {
                Ok(())
            } else {
                Err(ValidationError::invalid_field("OS_TYPE", "must be Linux or Windows"))
            }
        })
        .check(|store| numeric_in_range(store, "ACI_CPU", 4.0))
        .check(|store| numeric_in_range(store, "ACI_MEMORY", 16.0));
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keys_lists_every_missing_key() {
        let store = ConfigStore::new();
        store.set("B", "present");

        let err = required_keys(&store, &["A", "B", "C"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('A'));
        assert!(msg.contains('C'));
        assert!(!msg.contains('B'));
        assert!(matches!(err, ConfigError::MissingKeys { ref keys } if keys == &["A", "C"]));
    }

    #[test]
    fn test_required_keys_all_present() {
        let store = ConfigStore::new();
        for key in ACR_REQUIRED {
            store.set(key, "x");
        }
        assert!(required_keys(&store, ACR_REQUIRED).is_ok());
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let store = ConfigStore::new();
        store.set("A", "");
        assert!(required_keys(&store, &["A"]).is_err());
    }

    fn valid_aci_store() -> ConfigStore {
        let store = ConfigStore::new();
        store.set("CONTAINER_GROUP_NAME", "api-dev");
        store.set("DNS_NAME_LABEL", "api-dev");
        store.set("ACI_PORT", "8080");
        store.set("OS_TYPE", "Linux");
        store.set("ACI_CPU", "1");
        store.set("ACI_MEMORY", "1.5");
        store
    }

    #[test]
    fn test_aci_rule_accepts_valid() {
        let rule = aci_rule().unwrap();
        assert!(rule.validate(&valid_aci_store()).is_ok());
    }

    #[test]
    fn test_aci_rule_reports_every_failure() {
        let store = valid_aci_store();
        store.set("CONTAINER_GROUP_NAME", "Bad_Name");
        store.set("OS_TYPE", "Solaris");
        store.set("ACI_CPU", "8");
        store.set("ACI_MEMORY", "lots");

        let err = aci_rule().unwrap().validate(&store).unwrap_err();
        let ValidationError::Multiple(errors) = err else {
            panic!("expected multiple errors");
        };
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_aci_rule_rejects_non_numeric_port() {
        let store = valid_aci_store();
        store.set("ACI_PORT", "http");
        let err = aci_rule().unwrap().validate(&store).unwrap_err();
        assert!(err.to_string().contains("ACI_PORT"));
    }

    #[test]
    fn test_engine_combines_rules() {
        let store = ConfigStore::new();
        let engine = ValidationEngine::new()
            .with_rule(ValidationRule::new("first").require(&["A"]))
            .with_rule(ValidationRule::new("second").require(&["B"]))
            .with_rule(ValidationRule::new("third"));

        let err = engine.validate(&store).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
        assert!(!msg.contains("third"));
    }

    #[test]
    fn test_engine_single_failure() {
        let store = ConfigStore::new();
        let engine = ValidationEngine::new().with_rule(ValidationRule::new("only").require(&["A"]));
        let err = engine.validate(&store).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("only")));
    }

    #[test]
    fn test_bad_pattern_is_an_error() {
        assert!(ValidationRule::new("r").pattern("K", "(").is_err());
    }
}
