//! Secret providers
//!
//! A provider supplies opaque key/value entries that are merged into a
//! build's environment. Where they come from is the provider's business.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn secrets(&self, app: &str) -> anyhow::Result<BTreeMap<String, String>>;
}

/// Fixed in-memory entries; empty by default
#[derive(Debug, Default, Clone)]
pub struct StaticSecretProvider {
    entries: BTreeMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn secrets(&self, _app: &str) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(self.entries.clone())
    }
}

/// Reads `KEY=VALUE` lines from a dotenv-style file on every request
#[derive(Debug, Clone)]
pub struct EnvFileSecretProvider {
    path: PathBuf,
}

impl EnvFileSecretProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretProvider for EnvFileSecretProvider {
    async fn secrets(&self, app: &str) -> anyhow::Result<BTreeMap<String, String>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", self.path.display(), e))?;
        let entries = parse_env_file(&content);
        debug!(app, count = entries.len(), file = %self.path.display(), "Loaded secrets");
        Ok(entries)
    }
}

/// Parses dotenv content: `#` comments, blank lines, optional `export ` prefix,
/// surrounding single or double quotes stripped. Lines without `=` are skipped.
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        entries.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    entries
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_file() {
        let entries = parse_env_file(
            r#"
# database
DATABASE_URL=postgres://localhost:5432/app
export API_KEY="abc=123"
SINGLE='quoted value'
EMPTY=
not a pair
=novalue
"#,
        );

        assert_eq!(entries.len(), 4);
        assert_eq!(entries["DATABASE_URL"], "postgres://localhost:5432/app");
        assert_eq!(entries["API_KEY"], "abc=123");
        assert_eq!(entries["SINGLE"], "quoted value");
        assert_eq!(entries["EMPTY"], "");
    }

    #[tokio::test]
    async fn test_env_file_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.env");
        std::fs::write(&path, "TOKEN=s3cret\n").unwrap();

        let provider = EnvFileSecretProvider::new(&path);
        let entries = provider.secrets("web").await.unwrap();
        assert_eq!(entries["TOKEN"], "s3cret");
    }

    #[tokio::test]
    async fn test_env_file_provider_missing_file() {
        let provider = EnvFileSecretProvider::new("/nonexistent/secrets.env");
        assert!(provider.secrets("web").await.is_err());
    }
}
