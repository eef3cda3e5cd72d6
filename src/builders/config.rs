//! Builder configuration
//!
//! `BuilderConfig` carries the fields every builder understands. Builder-specific
//! knobs live in the `BuilderSettings` tagged union, one variant per builder kind.
//! Untyped input (project files, JSON) is translated at the boundary by
//! [`BuilderConfig::from_untyped`].

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_CONTEXT: &str = ".";

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_context() -> String {
    DEFAULT_CONTEXT.to_string()
}

/// Per-application, per-builder settings for one build invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub app_name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<BuilderSettings>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            tag: default_tag(),
            context: default_context(),
            build_args: BTreeMap::new(),
            env: BTreeMap::new(),
            settings: None,
        }
    }
}

impl BuilderConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.tag = if tag.is_empty() { default_tag() } else { tag };
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    pub fn with_settings(mut self, settings: BuilderSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Merges externally supplied entries (e.g. secrets) over the configured env
    pub fn merge_env(&mut self, entries: BTreeMap<String, String>) {
        self.env.extend(entries);
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.app_name.trim().is_empty() {
            return Err(BuildError::config("application name is required"));
        }
        Ok(())
    }

    /// The `PORT` env entry, when it parses as a port number
    pub fn default_port(&self) -> Option<u16> {
        self.env.get("PORT").and_then(|p| p.trim().parse().ok())
    }

    /// Builds a configuration from an untyped key/value mapping.
    ///
    /// Unknown keys are ignored. The application name (`app_name` or `name`)
    /// is required. An empty tag or context falls back to its default.
    pub fn from_untyped(map: &Map<String, Value>) -> Result<Self, BuildError> {
        let app_name = ["app_name", "name", "appName"]
            .iter()
            .find_map(|key| map.get(*key))
            .map(|v| scalar_to_string(v, "app_name"))
            .transpose()?
            .unwrap_or_default();

        if app_name.trim().is_empty() {
            return Err(BuildError::config("app_name is required"));
        }

        let mut config = BuilderConfig::new(app_name);

        if let Some(tag) = map.get("tag") {
            config = config.with_tag(scalar_to_string(tag, "tag")?);
        }

        if let Some(context) = map.get("context") {
            let context = scalar_to_string(context, "context")?;
            if !context.is_empty() {
                config.context = context;
            }
        }

        if let Some(args) = map.get("build_args").or_else(|| map.get("buildArgs")) {
            config.build_args = string_map(args, "build_args")?;
        }

        if let Some(env) = map.get("env") {
            config.env = string_map(env, "env")?;
        }

        if let Some(settings) = map.get("settings") {
            let settings: BuilderSettings = serde_json::from_value(settings.clone())
                .map_err(|e| BuildError::config(format!("invalid builder settings: {}", e)))?;
            config.settings = Some(settings);
        }

        for key in map.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!(key = %key, "Ignoring unknown builder configuration key");
            }
        }

        Ok(config)
    }

    /// Same as [`from_untyped`](Self::from_untyped) for a TOML table
    pub fn from_toml(table: &toml::Table) -> Result<Self, BuildError> {
        match serde_json::to_value(table) {
            Ok(Value::Object(map)) => Self::from_untyped(&map),
            Ok(_) => Err(BuildError::config("builder configuration must be a table")),
            Err(e) => Err(BuildError::config(format!(
                "unreadable builder configuration: {}",
                e
            ))),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "app_name",
    "name",
    "appName",
    "tag",
    "context",
    "build_args",
    "buildArgs",
    "env",
    "settings",
];

fn scalar_to_string(value: &Value, field: &str) -> Result<String, BuildError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(BuildError::config(format!(
            "field '{}' must be a scalar value",
            field
        ))),
    }
}

fn string_map(value: &Value, field: &str) -> Result<BTreeMap<String, String>, BuildError> {
    match value {
        Value::Object(entries) => entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), scalar_to_string(v, field)?)))
            .collect(),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(BuildError::config(format!(
            "field '{}' must be a key/value table",
            field
        ))),
    }
}

/// Builder-specific settings, tagged by builder kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuilderSettings {
    Railpack(RailpackSettings),
    Nixpacks(NixpacksSettings),
    Docker(DockerSettings),
    Noop,
}

impl BuilderSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            BuilderSettings::Railpack(_) => "railpack",
            BuilderSettings::Nixpacks(_) => "nixpacks",
            BuilderSettings::Docker(_) => "docker",
            BuilderSettings::Noop => "noop",
        }
    }

    /// Whether these settings can be bound to the builder registered as `builder`
    pub fn applies_to(&self, builder: &str) -> bool {
        match self {
            BuilderSettings::Docker(_) => builder == "docker" || builder == "csdocker",
            other => other.kind() == builder,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailpackSettings {
    #[serde(default)]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NixpacksSettings {
    #[serde(default)]
    pub install_cmd: Option<String>,
    #[serde(default)]
    pub build_cmd: Option<String>,
    #[serde(default)]
    pub start_cmd: Option<String>,
    #[serde(default)]
    pub no_cache: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSettings {
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub no_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::new("web");
        assert_eq!(config.tag, "latest");
        assert_eq!(config.context, ".");
        assert!(config.build_args.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_app_name_is_rejected() {
        let err = BuilderConfig::default().validate().unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn test_from_untyped_ignores_unknown_keys() {
        let map = as_map(json!({
            "name": "api",
            "tag": "v3",
            "context": "services/api",
            "env": {"PORT": 8080, "DEBUG": true},
            "build_args": {"NODE_ENV": "production"},
            "colour": "blue"
        }));

        let config = BuilderConfig::from_untyped(&map).unwrap();
        assert_eq!(config.app_name, "api");
        assert_eq!(config.tag, "v3");
        assert_eq!(config.context, "services/api");
        assert_eq!(config.env.get("PORT").unwrap(), "8080");
        assert_eq!(config.env.get("DEBUG").unwrap(), "true");
        assert_eq!(config.build_args.get("NODE_ENV").unwrap(), "production");
        assert_eq!(config.default_port(), Some(8080));
    }

    #[test]
    fn test_from_untyped_requires_app_name() {
        let map = as_map(json!({"tag": "v1"}));
        assert!(matches!(
            BuilderConfig::from_untyped(&map),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_untyped_normalizes_empty_values() {
        let map = as_map(json!({"app_name": "web", "tag": "", "context": ""}));
        let config = BuilderConfig::from_untyped(&map).unwrap();
        assert_eq!(config.tag, "latest");
        assert_eq!(config.context, ".");
    }

    #[test]
    fn test_from_untyped_settings_union() {
        let map = as_map(json!({
            "app_name": "web",
            "settings": {"kind": "docker", "dockerfile": "Dockerfile.prod", "no_cache": true}
        }));
        let config = BuilderConfig::from_untyped(&map).unwrap();
        match config.settings {
            Some(BuilderSettings::Docker(settings)) => {
                assert_eq!(settings.dockerfile.as_deref(), Some("Dockerfile.prod"));
                assert!(settings.no_cache);
            }
            other => panic!("unexpected settings {:?}", other),
        }
    }

    #[test]
    fn test_from_toml() {
        let table: toml::Table = toml::from_str(
            r#"
name = "worker"
context = "apps/worker"

[env]
QUEUE = "jobs"
"#,
        )
        .unwrap();
        let config = BuilderConfig::from_toml(&table).unwrap();
        assert_eq!(config.app_name, "worker");
        assert_eq!(config.env.get("QUEUE").unwrap(), "jobs");
    }

    #[test]
    fn test_settings_applies_to() {
        let docker = BuilderSettings::Docker(DockerSettings::default());
        assert!(docker.applies_to("docker"));
        assert!(docker.applies_to("csdocker"));
        assert!(!docker.applies_to("railpack"));
        assert!(BuilderSettings::Noop.applies_to("noop"));
    }
}
