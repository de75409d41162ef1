use crate::routing::DEFAULT_ACCOUNT_ID;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub channels_config: ChannelsConfig,

    #[serde(default)]
    pub cron: CronConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_agent_list")]
    pub list: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
}

fn default_agent_list() -> Vec<AgentConfig> {
    vec![AgentConfig { id: "main".into() }]
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            list: default_agent_list(),
        }
    }
}

impl AgentsConfig {
    /// Agent that owns sessions when no explicit agent id is given.
    pub fn default_agent_id(&self) -> &str {
        self.list.first().map_or("main", |agent| agent.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub matrix: Option<MatrixConfig>,
}

/// One bot account on a channel. A channel's top-level token, when present,
/// acts as the implicit `default` account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub homeserver: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

fn list_account_ids(
    default_token: Option<&str>,
    accounts: &BTreeMap<String, AccountConfig>,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(accounts.len() + 1);
    if default_token.is_some_and(|token| !token.is_empty()) {
        ids.push(DEFAULT_ACCOUNT_ID.to_string());
    }
    ids.extend(accounts.keys().cloned());
    ids
}

fn resolve_account_token(
    default_token: Option<&str>,
    accounts: &BTreeMap<String, AccountConfig>,
    account_id: &str,
) -> String {
    if account_id == DEFAULT_ACCOUNT_ID {
        return default_token.unwrap_or_default().to_string();
    }
    accounts
        .get(account_id)
        .and_then(|account| account.token.clone())
        .unwrap_or_default()
}

impl TelegramConfig {
    pub fn list_account_ids(&self) -> Vec<String> {
        list_account_ids(self.bot_token.as_deref(), &self.accounts)
    }

    pub fn resolve_account_token(&self, account_id: &str) -> String {
        resolve_account_token(self.bot_token.as_deref(), &self.accounts, account_id)
    }
}

impl DiscordConfig {
    pub fn list_account_ids(&self) -> Vec<String> {
        list_account_ids(self.token.as_deref(), &self.accounts)
    }

    pub fn resolve_account_token(&self, account_id: &str) -> String {
        resolve_account_token(self.token.as_deref(), &self.accounts, account_id)
    }
}

impl MatrixConfig {
    pub fn list_account_ids(&self) -> Vec<String> {
        list_account_ids(self.access_token.as_deref(), &self.accounts)
    }

    pub fn resolve_account_token(&self, account_id: &str) -> String {
        resolve_account_token(self.access_token.as_deref(), &self.accounts, account_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for the job store path; `~` expands to the user's home.
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_max_concurrent_runs() -> usize {
    2
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: None,
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl CronConfig {
    /// Resolved job store path: the configured override, or
    /// `<workspace>/cron/jobs.json`.
    pub fn store_path(&self, workspace_dir: &std::path::Path) -> PathBuf {
        match self.store.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
            }
            _ => workspace_dir.join("cron").join("jobs.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Configured level, falling back to `info` on unknown values.
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        let home = UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let starling_dir = home.join(".starling");

        Self {
            workspace_dir: starling_dir.join("workspace"),
            config_path: starling_dir.join("config.toml"),
            agents: AgentsConfig::default(),
            channels_config: ChannelsConfig::default(),
            cron: CronConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let starling_dir = home.join(".starling");
        let config_path = starling_dir.join("config.toml");

        if !starling_dir.exists() {
            fs::create_dir_all(&starling_dir).context("Failed to create .starling directory")?;
            fs::create_dir_all(starling_dir.join("workspace"))
                .context("Failed to create workspace directory")?;
        }

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.workspace_dir = starling_dir.join("workspace");
            return Ok(config);
        }

        let config = Config::default();
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}
