use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::AuthSettings;
use crate::store::{EntryStore, DEFAULT_ACTIVE_SCAN_DAYS};

/// Main configuration structure for daybook
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Local entry storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outlook calendar import settings
    #[serde(default)]
    pub outlook: OutlookConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Entry storage configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root of the `YYYY/MM/DD.json` tree
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Days searched for a running timer, today included
    #[serde(default = "default_active_scan_days")]
    pub active_scan_days: u32,
}

/// Outlook / Microsoft Graph configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OutlookConfig {
    /// Azure AD tenant; "common" works for personal and most work accounts
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,

    /// Public client application id used for the device-code flow
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default = "default_authority_url")]
    pub authority_url: String,

    #[serde(default = "default_graph_url")]
    pub graph_url: String,

    /// Project assigned to imported events
    #[serde(default = "default_project")]
    pub default_project: String,

    /// IANA timezone for event times, e.g. "Europe/Berlin"; empty = UTC
    #[serde(default)]
    pub timezone: String,

    /// Token file; empty means `<data_dir>/auth/outlook_token.json`
    #[serde(default)]
    pub token_file: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_data_dir() -> String {
    "${HOME}/.daybook".to_string()
}
fn default_active_scan_days() -> u32 {
    DEFAULT_ACTIVE_SCAN_DAYS
}
fn default_tenant_id() -> String {
    "common".to_string()
}
fn default_client_id() -> String {
    "04b07795-8542-4c4a-95af-30b2c573d5ab".to_string()
}
fn default_scopes() -> Vec<String> {
    vec![
        "https://graph.microsoft.com/Calendars.Read".to_string(),
        "offline_access".to_string(),
    ]
}
fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}
fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}
fn default_project() -> String {
    "Meetings".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            active_scan_days: default_active_scan_days(),
        }
    }
}

impl Default for OutlookConfig {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant_id(),
            client_id: default_client_id(),
            scopes: default_scopes(),
            authority_url: default_authority_url(),
            graph_url: default_graph_url(),
            default_project: default_project(),
            timezone: String::new(),
            token_file: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create(&config_path)
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config = Self::default();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        config.save(config_path)?;
        tracing::info!("Created default configuration at: {:?}", config_path);

        let mut config = config;
        config.expand_paths()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // An empty file is a valid, all-defaults configuration.
        let mut config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        };

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("daybook").join("config.yml"))
    }

    /// Expand environment variables and `~` in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.storage.data_dir = shellexpand::full(&self.storage.data_dir)
            .context("Failed to expand data_dir path")?
            .into_owned();

        if !self.outlook.token_file.is_empty() {
            self.outlook.token_file = shellexpand::full(&self.outlook.token_file)
                .context("Failed to expand token_file path")?
                .into_owned();
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    /// Location of the persisted Outlook token
    pub fn token_path(&self) -> PathBuf {
        if self.outlook.token_file.is_empty() {
            self.data_dir().join("auth").join("outlook_token.json")
        } else {
            PathBuf::from(&self.outlook.token_file)
        }
    }

    /// Entry store rooted at the configured data directory
    pub fn entry_store(&self) -> EntryStore {
        EntryStore::new(self.data_dir()).with_active_scan_days(self.storage.active_scan_days)
    }

    /// Identity provider settings for the auth client
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            tenant_id: self.outlook.tenant_id.clone(),
            client_id: self.outlook.client_id.clone(),
            scopes: self.outlook.scopes.clone(),
            authority_url: self.outlook.authority_url.clone(),
            token_file: self.token_path(),
        }
    }
}
