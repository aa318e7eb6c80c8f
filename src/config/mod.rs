pub mod preference;

use crate::integrations::api::ProjectContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "https://sentry.io/api/0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub org: String,
    pub slug: String,
    #[serde(default = "default_true")]
    pub has_first_event: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    3000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(100))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Cap on issues kept in memory; unbounded when unset
    #[serde(default)]
    pub collection_limit: Option<usize>,
}

fn default_page_limit() -> u32 {
    crate::data::MAX_ITEMS
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            collection_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub environments: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { environments: true }
    }
}

impl Config {
    pub fn project_context(&self) -> ProjectContext {
        ProjectContext {
            org: self.project.org.clone(),
            project: self.project.slug.clone(),
            has_first_event: self.project.has_first_event,
            environments_feature: self.features.environments,
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "issue-stream")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn preference_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("preferences.json"))
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `issue-stream --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    if config.project.org.trim().is_empty() || config.project.slug.trim().is_empty() {
        anyhow::bail!("project.org and project.slug must not be empty");
    }
    if config.stream.page_limit == 0 {
        anyhow::bail!("stream.page_limit must be at least 1");
    }
    Ok(config)
}

pub async fn init_wizard() -> Result<()> {
    use std::io::{self, Write};

    println!("issue-stream Configuration Wizard");
    println!("=================================\n");

    let config_path = default_config_path()?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let prompt = |label: &str| -> Result<String> {
        print!("{}", label);
        io::stdout().flush()?;
        let mut value = String::new();
        io::stdin().read_line(&mut value)?;
        Ok(value.trim().to_string())
    };

    let base_url = prompt(&format!("API base URL [{}]: ", default_base_url()))?;
    let token = prompt("Auth token (optional, press Enter to skip): ")?;
    let org = prompt("Organization slug: ")?;
    let slug = prompt("Project slug: ")?;

    let config = Config {
        api: ApiConfig {
            base_url: if base_url.is_empty() {
                default_base_url()
            } else {
                base_url
            },
            token: if token.is_empty() { None } else { Some(token) },
        },
        project: ProjectConfig {
            org,
            slug,
            has_first_event: true,
        },
        polling: PollingConfig::default(),
        stream: StreamConfig::default(),
        features: FeatureConfig::default(),
    };

    // Create config directory
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write config with restricted permissions
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;

    // Set file permissions to 0600 (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
    }

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `issue-stream` to follow the stream.");

    Ok(())
}
