//! Error types for azctl.

use std::fmt;
use std::sync::Arc;

/// Result type alias for azctl operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading, reading or using configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to load configuration from a source.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// A remote entry was found but its value is not a JSON object.
    ///
    /// This is the one source failure that aborts a whole load: a malformed
    /// entry must never be silently dropped.
    #[error("Malformed JSON in remote configuration key '{key}'{}: {reason}", label_suffix(.label))]
    MalformedRemoteValue {
        /// The remote key whose value failed to parse
        key: String,
        /// The label the entry was fetched with, if any
        label: Option<String>,
        /// Parser message
        reason: String,
    },

    /// A single required key is missing or empty.
    #[error("missing required configuration: {key}")]
    MissingRequired {
        /// The normalized key that was requested
        key: String,
    },

    /// One or more required keys are missing. Lists every missing key.
    #[error("missing required configuration variables: {}", .keys.join(", "))]
    MissingKeys {
        /// All missing keys, in the order they were checked
        keys: Vec<String>,
    },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// An external command could not be started or exited unsuccessfully.
    #[error("{command} command failed: {reason}")]
    CommandFailed {
        /// Program name
        command: String,
        /// Spawn error or exit status with captured stderr
        reason: String,
    },

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(String),

    /// Configuration initialization failed earlier in this process.
    ///
    /// Returned by every initialization attempt once the first one failed.
    #[error("configuration initialization failed: {0}")]
    Init(Arc<ConfigError>),

    /// Failed to parse data.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" (label '{}')", label),
        None => " (no label)".to_string(),
    }
}

impl ConfigError {
    /// Whether a source returning this error must abort the whole load.
    ///
    /// Everything else is logged and treated as an empty contribution.
    pub fn is_fatal_to_load(&self) -> bool {
        matches!(self, Self::MalformedRemoteValue { .. })
    }
}

/// Validation error for configuration rules.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific key has an invalid value.
    InvalidField {
        /// The key name
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}
