use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub populate: PopulateConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "projects".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PopulateConfig {
    #[serde(default)]
    pub instructions: Option<PathBuf>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            instructions: None,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub github: GitHubSourceConfig,
    #[serde(default)]
    pub npm: NpmSourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubSourceConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_raw_url")]
    pub raw_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitHubSourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            raw_url: default_github_raw_url(),
            branch: default_branch(),
            token_env: default_token_env(),
            history_page_size: default_history_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GitHubSourceConfig {
    /// Read the access token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_github_raw_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_branch() -> String {
    "master".to_string()
}
fn default_token_env() -> String {
    "GITHUB_ACCESS_TOKEN".to_string()
}
fn default_history_page_size() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct NpmSourceConfig {
    #[serde(default = "default_npm_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NpmSourceConfig {
    fn default() -> Self {
        Self {
            registry_url: default_npm_registry_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_npm_registry_url() -> String {
    "https://registry.npmjs.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// A config with every optional section at its default and the store at `path`.
    pub fn minimal(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                path: path.into(),
                collection: default_collection(),
            },
            populate: PopulateConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let collection = &config.store.collection;
    if collection.is_empty()
        || !collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        anyhow::bail!(
            "store.collection must be non-empty and contain only [A-Za-z0-9_-], got '{}'",
            collection
        );
    }

    if config.populate.concurrency == 0 {
        anyhow::bail!("populate.concurrency must be >= 1");
    }

    let github = &config.sources.github;
    if !(1..=100).contains(&github.history_page_size) {
        anyhow::bail!("sources.github.history_page_size must be in [1, 100]");
    }
    if github.branch.trim().is_empty() {
        anyhow::bail!("sources.github.branch must not be empty");
    }

    for (key, value) in [
        ("sources.github.api_url", &github.api_url),
        ("sources.github.raw_url", &github.raw_url),
        ("sources.npm.registry_url", &config.sources.npm.registry_url),
    ] {
        url::Url::parse(value).with_context(|| format!("{} is not a valid URL: '{}'", key, value))?;
    }

    if github.timeout_secs == 0 || config.sources.npm.timeout_secs == 0 {
        anyhow::bail!("source timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config("[store]\npath = \"./data/pop.sqlite\"\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.store.collection, "projects");
        assert_eq!(config.populate.concurrency, 4);
        assert_eq!(config.sources.github.branch, "master");
        assert_eq!(config.sources.github.token_env, "GITHUB_ACCESS_TOKEN");
        assert_eq!(config.sources.npm.registry_url, "https://registry.npmjs.com");
    }

    #[test]
    fn test_overrides_are_read() {
        let file = write_config(
            r#"
[store]
path = "./pop.sqlite"
collection = "work"

[populate]
instructions = "./instructions.json"
concurrency = 2

[sources.github]
api_url = "http://localhost:9000/graphql"
branch = "main"
history_page_size = 50

[sources.npm]
registry_url = "http://localhost:9001"
"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.store.collection, "work");
        assert_eq!(
            config.populate.instructions.as_deref(),
            Some(Path::new("./instructions.json"))
        );
        assert_eq!(config.sources.github.branch, "main");
        assert_eq!(config.sources.github.history_page_size, 50);
        assert_eq!(config.sources.npm.registry_url, "http://localhost:9001");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let file = write_config("[store]\npath = \"a.sqlite\"\n[populate]\nconcurrency = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("populate.concurrency"));
    }

    #[test]
    fn test_rejects_oversized_history_page() {
        let file = write_config(
            "[store]\npath = \"a.sqlite\"\n[sources.github]\nhistory_page_size = 101\n",
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("history_page_size"));
    }

    #[test]
    fn test_rejects_bad_collection_name() {
        let file = write_config("[store]\npath = \"a.sqlite\"\ncollection = \"my projects\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("store.collection"));
    }

    #[test]
    fn test_rejects_bad_registry_url() {
        let file = write_config(
            "[store]\npath = \"a.sqlite\"\n[sources.npm]\nregistry_url = \"not a url\"\n",
        );
        assert!(load_config(file.path()).is_err());
    }
}
