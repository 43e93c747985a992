//! `$$NAME` parameter substitution

use serde_yaml::Value;
use std::collections::BTreeMap;

use super::SecureError;

/// Pipeline sections that configure plugins
pub const PLUGIN_SECTIONS: &[&str] = &["cache", "clone", "publish", "deploy", "notify"];

/// Replaces every `$$NAME` with its value.
///
/// Longer names sharing a prefix are substituted first, so `$$TOKEN_ID`
/// is never clobbered by `$$TOKEN`.
#[must_use]
pub fn inject(raw: &str, params: &BTreeMap<String, String>) -> String {
    let mut injected = raw.to_string();
    for (key, value) in params.iter().rev() {
        injected = injected.replace(&format!("$$${key}"), value);
    }
    injected
}

/// Substitutes parameters inside plugin sections only.
///
/// Build commands and compose services are left untouched. The document
/// is decoded and re-emitted, so formatting is normalized.
pub fn inject_safe(raw: &str, params: &BTreeMap<String, String>) -> Result<String, SecureError> {
    if params.is_empty() {
        return Ok(raw.to_string());
    }

    let mut doc: Value = serde_yaml::from_str(raw)?;
    if let Value::Mapping(map) = &mut doc {
        for section in PLUGIN_SECTIONS {
            if let Some(value) = map.get_mut(*section) {
                inject_value(value, params);
            }
        }
    }
    Ok(serde_yaml::to_string(&doc)?)
}

fn inject_value(value: &mut Value, params: &BTreeMap<String, String>) {
    match value {
        Value::String(s) if s.contains("$$") => *s = inject(s, params),
        Value::Sequence(items) => items.iter_mut().for_each(|v| inject_value(v, params)),
        Value::Mapping(map) => map.values_mut().for_each(|v| inject_value(v, params)),
        Value::Tagged(tagged) => inject_value(&mut tagged.value, params),
        _ => {}
    }
}

/// Parses `KEY=VALUE` entries, skipping malformed ones
#[must_use]
pub fn parse_params(entries: &[String]) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter_map(|e| e.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
