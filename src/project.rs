//! `shipyard.toml` project files
//!
//! ```toml
//! [app]
//! name = "web"
//! builder = "railpack"
//! service = "svc-123"
//!
//! [env]
//! PORT = 8080
//!
//! [settings.nixpacks]
//! start_cmd = "node server.js"
//! ```

use crate::builders::{BuilderConfig, BuilderSettings};
use crate::error::BuildError;
use crate::lifecycle::{Application, DEFAULT_DEPLOYER};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const PROJECT_FILE: &str = "shipyard.toml";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Config(#[from] BuildError),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    pub builder: Option<String>,
    pub deployer: Option<String>,
    pub tag: Option<String>,
    pub context: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub build_args: toml::Table,
    #[serde(default)]
    pub env: toml::Table,
    /// `[settings.<builder>]` tables, keyed by settings kind
    #[serde(default)]
    pub settings: BTreeMap<String, toml::Table>,
}

impl ProjectFile {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ProjectError> {
        toml::from_str(content).map_err(|source| ProjectError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `shipyard.toml` from `dir`; a missing file is not an error
    pub fn load(dir: &Path) -> Result<Option<Self>, ProjectError> {
        let path = dir.join(PROJECT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ProjectError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded project file");
        Self::parse(&content, &path).map(Some)
    }

    /// Typed settings, one per `[settings.<kind>]` table
    pub fn builder_settings(&self) -> Result<Vec<BuilderSettings>, BuildError> {
        self.settings
            .iter()
            .map(|(kind, table)| {
                let mut table = table.clone();
                table.insert("kind".to_string(), toml::Value::String(kind.clone()));
                let value = serde_json::to_value(&table).map_err(|e| {
                    BuildError::config(format!("unreadable [settings.{}]: {}", kind, e))
                })?;
                serde_json::from_value(value).map_err(|e| {
                    BuildError::config(format!("invalid [settings.{}]: {}", kind, e))
                })
            })
            .collect()
    }
}

/// Values given on the command line; each wins over the project file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub app_name: Option<String>,
    pub builder: Option<String>,
    pub tag: Option<String>,
    pub service: Option<String>,
    pub env: BTreeMap<String, String>,
    pub build_args: BTreeMap<String, String>,
}

/// An application ready for the executor plus the project-level choices
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub application: Application,
    /// Builder named on the command line or in the project file
    pub explicit_builder: Option<String>,
    pub service: Option<String>,
}

/// Combines the project file in `dir` (if any) with `overrides`.
///
/// The application name falls back to the directory name. The build context
/// is the file's `context` resolved against `dir`.
pub fn resolve(
    dir: &Path,
    file: Option<&ProjectFile>,
    overrides: &Overrides,
) -> Result<ResolvedProject, ProjectError> {
    let default_file = ProjectFile::default();
    let file = file.unwrap_or(&default_file);

    let name = overrides
        .app_name
        .clone()
        .or_else(|| file.app.name.clone())
        .or_else(|| directory_name(dir))
        .unwrap_or_default();

    let mut table = toml::Table::new();
    table.insert("name".to_string(), toml::Value::String(name));
    table.insert(
        "context".to_string(),
        toml::Value::String(build_context(dir, file.app.context.as_deref())),
    );
    if let Some(tag) = overrides.tag.as_ref().or(file.app.tag.as_ref()) {
        table.insert("tag".to_string(), toml::Value::String(tag.clone()));
    }

    let mut build_args = file.build_args.clone();
    for (k, v) in &overrides.build_args {
        build_args.insert(k.clone(), toml::Value::String(v.clone()));
    }
    table.insert("build_args".to_string(), toml::Value::Table(build_args));

    let mut env = file.env.clone();
    for (k, v) in &overrides.env {
        env.insert(k.clone(), toml::Value::String(v.clone()));
    }
    table.insert("env".to_string(), toml::Value::Table(env));

    let config = BuilderConfig::from_toml(&table)?;

    let explicit_builder = overrides
        .builder
        .clone()
        .or_else(|| file.app.builder.clone())
        .filter(|b| !b.is_empty());

    let mut application = Application::new(explicit_builder.clone().unwrap_or_default(), config)
        .with_deployer(
            file.app
                .deployer
                .clone()
                .unwrap_or_else(|| DEFAULT_DEPLOYER.to_string()),
        );
    for settings in file.builder_settings()? {
        application = application.with_settings(settings);
    }

    Ok(ResolvedProject {
        application,
        explicit_builder,
        service: overrides.service.clone().or_else(|| file.app.service.clone()),
    })
}

fn directory_name(dir: &Path) -> Option<String> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(dir)
    };
    absolute
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .last()
        .map(str::to_string)
}

fn build_context(dir: &Path, context: Option<&str>) -> String {
    let context = context.filter(|c| !c.is_empty() && *c != ".");
    match context {
        None => dir.display().to_string(),
        Some(context) if dir == Path::new(".") || dir.as_os_str().is_empty() => {
            context.to_string()
        }
        Some(context) => dir.join(context).display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[app]
name = "web"
builder = "nixpacks"
tag = "v2"
context = "frontend"
service = "svc-42"

[build_args]
NODE_ENV = "production"

[env]
PORT = 8080

[settings.nixpacks]
start_cmd = "node server.js"

[settings.docker]
dockerfile = "Dockerfile.prod"
"#;

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectFile::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "[app\nname=").unwrap();
        let err = ProjectFile::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(PROJECT_FILE));
    }

    #[test]
    fn test_resolve_from_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), SAMPLE).unwrap();
        let file = ProjectFile::load(dir.path()).unwrap().unwrap();

        let resolved = resolve(dir.path(), Some(&file), &Overrides::default()).unwrap();
        let app = &resolved.application;

        assert_eq!(app.name, "web");
        assert_eq!(app.config.tag, "v2");
        assert_eq!(
            app.config.context,
            dir.path().join("frontend").display().to_string()
        );
        assert_eq!(app.config.env["PORT"], "8080");
        assert_eq!(app.config.build_args["NODE_ENV"], "production");
        assert_eq!(app.deployer, "noop");
        assert_eq!(app.settings.len(), 2);
        assert_eq!(resolved.explicit_builder.as_deref(), Some("nixpacks"));
        assert_eq!(resolved.service.as_deref(), Some("svc-42"));
    }

    #[test]
    fn test_overrides_win() {
        let file = ProjectFile::parse(SAMPLE, Path::new(PROJECT_FILE)).unwrap();
        let mut overrides = Overrides {
            app_name: Some("api".to_string()),
            builder: Some("railpack".to_string()),
            tag: Some("v3".to_string()),
            ..Default::default()
        };
        overrides.env.insert("PORT".to_string(), "9090".to_string());

        let resolved = resolve(Path::new("."), Some(&file), &overrides).unwrap();
        assert_eq!(resolved.application.name, "api");
        assert_eq!(resolved.application.config.tag, "v3");
        assert_eq!(resolved.application.config.env["PORT"], "9090");
        assert_eq!(resolved.application.config.context, "frontend");
        assert_eq!(resolved.explicit_builder.as_deref(), Some("railpack"));
    }

    #[test]
    fn test_name_defaults_to_directory() {
        let dir = TempDir::new().unwrap();
        let app_dir = dir.path().join("billing-api");
        std::fs::create_dir(&app_dir).unwrap();

        let resolved = resolve(&app_dir, None, &Overrides::default()).unwrap();
        assert_eq!(resolved.application.name, "billing-api");
        assert_eq!(resolved.application.config.tag, "latest");
        assert!(resolved.explicit_builder.is_none());
    }

    #[test]
    fn test_settings_become_typed() {
        let file = ProjectFile::parse(SAMPLE, Path::new(PROJECT_FILE)).unwrap();
        let settings = file.builder_settings().unwrap();
        assert!(settings
            .iter()
            .any(|s| matches!(s, BuilderSettings::Docker(d) if d.dockerfile.as_deref() == Some("Dockerfile.prod"))));
        assert!(settings.iter().any(|s| s.applies_to("nixpacks")));
    }

    #[test]
    fn test_unknown_settings_kind_is_config_error() {
        let file = ProjectFile::parse("[settings.kaniko]\ncache = true\n", Path::new(PROJECT_FILE))
            .unwrap();
        assert!(file.builder_settings().is_err());
    }
}
