//! Output formats for exported configuration.

use crate::error::{ConfigError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Shell `export KEY='value'` lines.
    #[default]
    Env,
    /// A pretty-printed JSON object.
    Json,
    /// A YAML mapping.
    #[cfg(feature = "yaml")]
    Yaml,
    /// `KEY=value` lines for a `.env` file.
    Dotenv,
}

impl FromStr for ExportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "json" => Ok(Self::Json),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::Yaml),
            "dotenv" => Ok(Self::Dotenv),
            other => Err(ConfigError::Other(format!(
                "unsupported format: {} (supported: {})",
                other,
                Self::SUPPORTED
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Env => "env",
            Self::Json => "json",
            #[cfg(feature = "yaml")]
            Self::Yaml => "yaml",
            Self::Dotenv => "dotenv",
        };
        f.write_str(name)
    }
}

impl ExportFormat {
    #[cfg(feature = "yaml")]
    const SUPPORTED: &'static str = "env, json, yaml, dotenv";
    #[cfg(not(feature = "yaml"))]
    const SUPPORTED: &'static str = "env, json, dotenv";

    /// Format `data` with keys in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if serialization fails.
    pub fn format(self, data: &HashMap<String, String>) -> Result<String> {
        let sorted: BTreeMap<&str, &str> = data.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        match self {
            Self::Env => Ok(format_env(&sorted)),
            Self::Json => format_json(&sorted),
            #[cfg(feature = "yaml")]
            Self::Yaml => format_yaml(&sorted),
            Self::Dotenv => Ok(format_dotenv(&sorted)),
        }
    }
}

fn format_env(data: &BTreeMap<&str, &str>) -> String {
    data.iter()
        .map(|(key, value)| format!("export {}='{}'", key, value.replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_json(data: &BTreeMap<&str, &str>) -> Result<String> {
    if data.is_empty() {
        return Ok("{}".to_string());
    }
    serde_json::to_string_pretty(data)
        .map_err(|e| ConfigError::ParseError(format!("failed to format as JSON: {}", e)))
}

#[cfg(feature = "yaml")]
fn format_yaml(data: &BTreeMap<&str, &str>) -> Result<String> {
    if data.is_empty() {
        return Ok("{}".to_string());
    }
    serde_yaml::to_string(data)
        .map_err(|e| ConfigError::ParseError(format!("failed to format as YAML: {}", e)))
}

fn format_dotenv(data: &BTreeMap<&str, &str>) -> String {
    data.iter()
        .map(|(key, value)| {
            if value.contains([' ', '\t', '\n', '"', '\'', '$']) {
                format!("{}=\"{}\"", key, value.replace('"', "\\\""))
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
