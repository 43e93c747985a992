//! Pipeline description decoding
//!
//! Turns pipeline YAML into a [`Config`]. Sections that hold named
//! entries are decoded in declaration order.

use serde_yaml::{Mapping, Value};

use super::config::{AuthConfig, Config, Filter, Plugin, Step, Vargs};
use super::errors::ParseError;

impl Config {
    /// Decodes a pipeline description.
    ///
    /// Unknown top-level sections are ignored so that host-level
    /// sections such as `matrix` or `secure` can live in the same file.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the text is not YAML or a section has
    /// the wrong shape.
    pub fn from_yaml(text: &str) -> Result<Self, ParseError> {
        let root = match serde_yaml::from_str::<Value>(text)? {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(map) => map,
            _ => return Err(ParseError::malformed("root", "expected a mapping")),
        };

        let mut config = Self::default();
        for (key, value) in root {
            let section = scalar_string(&key).unwrap_or_default();
            match section.as_str() {
                "cache" => config.cache = decode_plugin("cache", value)?,
                "clone" => config.clone = decode_plugin("clone", value)?,
                "build" => config.build = decode_builds(value)?,
                "compose" => {
                    config.compose = decode_named("compose", value, |name, entry| {
                        let mut step = decode_step(name, entry, false)?.0;
                        if step.image.is_empty() {
                            step.image = name.to_string();
                        }
                        Ok(step)
                    })?;
                }
                "publish" | "deploy" | "notify" => {
                    let plugins = decode_named(&section, value, |name, entry| {
                        let mut plugin = decode_plugin(name, entry)?;
                        if plugin.step.image.is_empty() {
                            plugin.step.image = name.to_string();
                        }
                        Ok(plugin)
                    })?;
                    match section.as_str() {
                        "publish" => config.publish = plugins,
                        "deploy" => config.deploy = plugins,
                        _ => config.notify = plugins,
                    }
                }
                "debug" => config.debug = parse_bool(&value).unwrap_or(false),
                _ => {}
            }
        }
        Ok(config)
    }
}

fn decode_plugin(name: &str, value: Value) -> Result<Plugin, ParseError> {
    let (step, filter) = decode_step(name, value, true)?;
    Ok(Plugin { step, filter })
}

/// Decodes the build section: either one step or named steps
fn decode_builds(value: Value) -> Result<Vec<Step>, ParseError> {
    let map = as_mapping("build", value)?;
    if map.is_empty() {
        return Ok(Vec::new());
    }
    if map.contains_key("image") || map.contains_key("commands") {
        let (step, _) = decode_step("build", Value::Mapping(map), false)?;
        return Ok(vec![step]);
    }
    decode_named("build", Value::Mapping(map), |name, entry| {
        decode_step(name, entry, false).map(|(step, _)| step)
    })
}

fn decode_named<T, F>(section: &str, value: Value, mut decode: F) -> Result<Vec<T>, ParseError>
where
    F: FnMut(&str, Value) -> Result<T, ParseError>,
{
    let map = as_mapping(section, value)?;
    let mut out = Vec::with_capacity(map.len());
    for (key, entry) in map {
        let name = scalar_string(&key)
            .ok_or_else(|| ParseError::malformed(section, "entry names must be strings"))?;
        out.push(decode(&name, entry)?);
    }
    Ok(out)
}

fn decode_step(name: &str, value: Value, plugin: bool) -> Result<(Step, Filter), ParseError> {
    let map = as_mapping(name, value)?;
    let mut step = Step {
        name: name.to_string(),
        ..Step::default()
    };
    let mut filter = Filter::default();
    let mut vargs = Vargs::new();

    for (key, value) in map {
        let Some(key) = scalar_string(&key) else {
            continue;
        };
        match key.as_str() {
            "image" => step.image = scalar_string(&value).unwrap_or_default(),
            "pull" => step.pull = parse_bool(&value).unwrap_or(false),
            "privileged" => step.privileged = parse_bool(&value).unwrap_or(false),
            "disable_apt_config" => step.disable_apt_config = parse_bool(&value).unwrap_or(false),
            "environment" => step.environment = key_value_list(name, value)?,
            "entrypoint" => step.entrypoint = command_list(name, value)?,
            "command" => step.command = command_list(name, value)?,
            "commands" => step.commands = string_list(name, value)?,
            "volumes" => step.volumes = string_list(name, value)?,
            "extra_hosts" => step.extra_hosts = string_list(name, value)?,
            "net" => step.network = scalar_string(&value).unwrap_or_default(),
            "auth_config" => {
                step.auth_config = serde_yaml::from_value::<AuthConfig>(value)?;
            }
            "when" if plugin => filter = decode_filter(name, value)?,
            _ if plugin => {
                let json = serde_json::to_value(&value)
                    .map_err(|e| ParseError::malformed(name, e.to_string()))?;
                vargs.insert(key, json);
            }
            _ => {}
        }
    }
    step.vargs = vargs;
    Ok((step, filter))
}

fn decode_filter(name: &str, value: Value) -> Result<Filter, ParseError> {
    let map = as_mapping(name, value)?;
    let mut filter = Filter::default();
    for (key, value) in map {
        let Some(key) = scalar_string(&key) else {
            continue;
        };
        match key.as_str() {
            "repo" => filter.repo = scalar_string(&value).filter(|r| !r.is_empty()),
            "branch" => filter.branch = string_list(name, value)?,
            "event" => {
                filter.event = string_list(name, value)?
                    .iter()
                    .map(|e| e.parse())
                    .collect::<Result<_, _>>()?;
            }
            "matrix" => {
                for (k, v) in as_mapping(name, value)? {
                    if let (Some(k), Some(v)) = (scalar_string(&k), scalar_string(&v)) {
                        filter.matrix.insert(k, v);
                    }
                }
            }
            "success" => filter.success = parse_bool(&value),
            "failure" => filter.failure = parse_bool(&value),
            _ => {}
        }
    }
    Ok(filter)
}

fn as_mapping(section: &str, value: Value) -> Result<Mapping, ParseError> {
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        _ => Err(ParseError::malformed(section, "expected a mapping")),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accepts a single scalar or a sequence of scalars
fn string_list(section: &str, value: Value) -> Result<Vec<String>, ParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_string(item)
                    .ok_or_else(|| ParseError::malformed(section, "expected a list of strings"))
            })
            .collect(),
        other => scalar_string(&other)
            .map(|s| vec![s])
            .ok_or_else(|| ParseError::malformed(section, "expected a string or list")),
    }
}

/// Accepts `KEY=VALUE` lists or key/value mappings
fn key_value_list(section: &str, value: Value) -> Result<Vec<String>, ParseError> {
    match value {
        Value::Mapping(map) => Ok(map
            .iter()
            .filter_map(|(k, v)| {
                let k = scalar_string(k)?;
                let v = scalar_string(v).unwrap_or_default();
                Some(format!("{k}={v}"))
            })
            .collect()),
        other => string_list(section, other),
    }
}

/// Accepts a list of arguments or a shell-style command string
fn command_list(section: &str, value: Value) -> Result<Vec<String>, ParseError> {
    match value {
        Value::String(s) => shell_words::split(&s).map_err(|e| ParseError::Command {
            section: section.to_string(),
            reason: e.to_string(),
        }),
        other => string_list(section, other),
    }
}

/// Parses yes/no style booleans, `None` when unrecognised
fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "TRUE" | "True" | "on" | "On" | "ON" | "yes" | "Yes" | "YES" | "y" | "Y" => {
                Some(true)
            }
            "false" | "FALSE" | "False" | "off" | "Off" | "OFF" | "no" | "No" | "NO" | "n" | "N" => {
                Some(false)
            }
            _ => None,
        },
        _ => None,
    }
}
