//! Strict placeholder rendering for deployment manifests.
//!
//! Templates reference configuration with `{{ lookup "KEY" }}`. The older
//! `{{ env "KEY" }}` spelling is accepted too. Every placeholder must
//! resolve; there is no empty-string fallback.

use crate::core::ConfigStore;
use crate::error::{ConfigError, Result};
use regex::Regex;
use std::sync::LazyLock;

static ACTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").ok());

static LOOKUP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^(?:lookup|env)\s+"([^"]+)"$"#).ok());

fn pattern(re: &'static Option<Regex>) -> Result<&'static Regex> {
    re.as_ref()
        .ok_or_else(|| ConfigError::Template("placeholder pattern failed to compile".to_string()))
}

/// Render `template`, resolving each placeholder through `lookup`.
///
/// # Errors
///
/// Returns [`ConfigError::Template`] for an unknown action or an unclosed
/// `{{`, and passes through the first error `lookup` returns.
///
/// # Examples
///
/// ```rust
/// use azctl::template::render;
///
/// let out = render(r#"{"port": "{{ lookup "PORT" }}"}"#, |key| {
///     assert_eq!(key, "PORT");
///     Ok("8080".to_string())
/// })
/// .unwrap();
/// assert_eq!(out, r#"{"port": "8080"}"#);
/// ```
pub fn render<F>(template: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let (action_re, lookup_re) = (pattern(&ACTION)?, pattern(&LOOKUP)?);
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in action_re.captures_iter(template) {
        let (Some(whole), Some(action)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);

        let key = lookup_re
            .captures(action.as_str())
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                ConfigError::Template(format!(
                    "unsupported action '{}' at byte {}",
                    action.as_str(),
                    whole.start()
                ))
            })?;
        out.push_str(&lookup(key.as_str())?);
        last = whole.end();
    }

    let rest = &template[last..];
    if let Some(pos) = rest.find("{{") {
        return Err(ConfigError::Template(format!(
            "unclosed action at byte {}",
            last + pos
        )));
    }
    out.push_str(rest);
    Ok(out)
}

/// Render `template` against `store`. Missing keys fail.
///
/// # Errors
///
/// See [`render`]. A missing key yields [`ConfigError::MissingRequired`].
pub fn render_with_store(template: &str, store: &ConfigStore) -> Result<String> {
    render(template, |key| store.require(key))
}
