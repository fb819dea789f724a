// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub availability_job: AvailabilityJobConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Custom Debug impl to redact client_secret
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("app_base_url", &self.app_base_url)
            .field("scope", &self.scope)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: default_api_base_url(),
            app_base_url: default_app_base_url(),
            scope: default_scope(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Public URL the provider and browsers use to reach this server
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Prefix under which all bridge routes are mounted
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Shared secret the provider echoes back on webhook callbacks
    #[serde(default)]
    pub internal_secret: String,
}

// Custom Debug impl to redact internal_secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("site_url", &self.site_url)
            .field("base_path", &self.base_path)
            .field("internal_secret", &"[REDACTED]")
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            site_url: default_site_url(),
            base_path: default_base_path(),
            internal_secret: String::new(),
        }
    }
}

impl ServerConfig {
    /// Base path without its trailing slash; empty when routes live at the root
    pub fn route_prefix(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }

    fn site_url_with(&self, route: &str) -> String {
        format!(
            "{}{}{}",
            self.site_url.trim_end_matches('/'),
            self.route_prefix(),
            route
        )
    }

    /// Absolute URL of the OAuth redirect target
    pub fn oauth_redirect_url(&self) -> String {
        self.site_url_with("/oauth/complete")
    }

    /// Path (relative to the site) of the participation endpoint
    pub fn participation_path(&self) -> String {
        format!("{}/participation", self.route_prefix())
    }

    pub fn webhook_url(&self) -> String {
        self.site_url_with("/webhook")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_path")]
    pub path: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: default_workspace_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityJobConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Chat username whose presence the job keeps in sync
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_job_interval_secs")]
    pub interval_secs: u64,
}

impl Default for AvailabilityJobConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            interval_secs: default_job_interval_secs(),
        }
    }
}

impl AvailabilityJobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Slash command trigger without the leading slash
    #[serde(default = "default_trigger")]
    pub trigger: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Outgoing webhook that receives direct messages in standalone mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn default_api_base_url() -> String {
    "https://api.cronofy.com".to_string()
}

fn default_app_base_url() -> String {
    "https://app.cronofy.com".to_string()
}

fn default_scope() -> String {
    "read_events change_participation_status".to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    13100
}

fn default_site_url() -> String {
    "http://localhost:13100".to_string()
}

fn default_base_path() -> String {
    "/plugins/cronofy".to_string()
}

fn default_workspace_path() -> String {
    "./workspace".to_string()
}

fn default_job_interval_secs() -> u64 {
    20
}

fn default_trigger() -> String {
    "cronofy".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            server: ServerConfig::default(),
            workspace: WorkspaceConfig::default(),
            availability_job: AvailabilityJobConfig::default(),
            command: CommandConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

fn env_flag(name: &str, val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean, got: {}", name, val),
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. CALBRIDGE_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/calbridge/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CALBRIDGE_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = directories::ProjectDirs::from("", "", "calbridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))?;
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Invalid configuration TOML")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("PROVIDER_CLIENT_ID") {
            self.provider.client_id = val;
        }
        if let Ok(val) = std::env::var("PROVIDER_CLIENT_SECRET") {
            self.provider.client_secret = val;
        }
        if let Ok(val) = std::env::var("PROVIDER_API_BASE_URL") {
            self.provider.api_base_url = val;
        }
        if let Ok(val) = std::env::var("PROVIDER_APP_BASE_URL") {
            self.provider.app_base_url = val;
        }
        if let Ok(val) = std::env::var("SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("SERVER_PORT") {
            self.server.port = val.parse().with_context(|| {
                format!("SERVER_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("SITE_URL") {
            self.server.site_url = val;
        }
        if let Ok(val) = std::env::var("INTERNAL_SECRET") {
            self.server.internal_secret = val;
        }
        if let Ok(val) = std::env::var("WORKSPACE_PATH") {
            self.workspace.path = val;
        }
        if let Ok(val) = std::env::var("AVAILABILITY_JOB_ENABLED") {
            self.availability_job.enabled = env_flag("AVAILABILITY_JOB_ENABLED", &val)?;
        }
        if let Ok(val) = std::env::var("AVAILABILITY_JOB_USERNAME") {
            self.availability_job.username = val;
        }
        if let Ok(val) = std::env::var("AVAILABILITY_JOB_INTERVAL_SECS") {
            self.availability_job.interval_secs = val.parse().with_context(|| {
                format!(
                    "AVAILABILITY_JOB_INTERVAL_SECS must be a valid number, got: {}",
                    val
                )
            })?;
        }
        if let Ok(val) = std::env::var("RELAY_WEBHOOK_URL") {
            self.relay.webhook_url = Some(val).filter(|v| !v.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.internal_secret.trim().is_empty() {
            anyhow::bail!(
                "server.internal_secret is required (set in config.toml or INTERNAL_SECRET env var)"
            );
        }
        if !self.server.base_path.starts_with('/') {
            anyhow::bail!(
                "server.base_path must start with '/', got: {}",
                self.server.base_path
            );
        }
        if self.availability_job.interval_secs == 0 {
            anyhow::bail!("availability_job.interval_secs must be greater than zero");
        }
        if self.availability_job.enabled && self.availability_job.username.trim().is_empty() {
            anyhow::bail!("availability_job.username is required when the job is enabled");
        }
        if self.provider.client_id.trim().is_empty() {
            tracing::warn!("provider.client_id is empty; OAuth connect will fail");
        }
        Ok(())
    }
}
