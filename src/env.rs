//! Conversion between container env lists (`KEY=VALUE`) and key/value maps.

use indexmap::IndexMap;

use crate::error::{InterceptError, Result};

/// Env entries keyed by name, in the order they first appeared.
pub type EnvMap = IndexMap<String, String>;

/// Parse a list of `KEY=VALUE` entries into a map.
///
/// Entries are split on the first `=`, so values may contain `=` themselves.
/// Later entries win on duplicate keys, matching the engine's semantics, and
/// keep the position of the first occurrence.
pub fn to_mapping<S: AsRef<str>>(entries: &[S]) -> Result<EnvMap> {
    entries
        .iter()
        .map(|entry| {
            let entry = entry.as_ref();
            entry
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| InterceptError::MalformedEnvEntry {
                    entry: entry.to_string(),
                })
        })
        .collect()
}

/// Render a map back into `KEY=VALUE` entries in map order. No escaping is
/// performed.
pub fn to_list(mapping: &EnvMap) -> Vec<String> {
    mapping
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}
