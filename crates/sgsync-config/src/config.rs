use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: Option<CloudConfig>,
    #[serde(default)]
    pub trakt: Option<TraktConfig>,
    #[serde(default)]
    pub metadata: Option<MetadataConfig>,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub enabled: bool,
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub api_key: String,
    #[serde(default = "default_language")]
    pub language: String,
}

/// Which remote is authoritative for episode and movie flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlagSource {
    /// Cloud if enabled, otherwise trakt if configured.
    #[default]
    Auto,
    Cloud,
    Trakt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub flag_source: FlagSource,
    /// Consecutive metadata timeouts after which the show loop is abandoned.
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,
    #[serde(default = "default_backoff_base_minutes")]
    pub backoff_base_minutes: u64,
    #[serde(default = "default_backoff_max_minutes")]
    pub backoff_max_minutes: u64,
    #[serde(default = "default_warn_after_failures")]
    pub warn_after_failures: u32,
    #[serde(default = "default_show_update_interval_hours")]
    pub show_update_interval_hours: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            flag_source: FlagSource::Auto,
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            sync_interval_minutes: default_sync_interval_minutes(),
            backoff_base_minutes: default_backoff_base_minutes(),
            backoff_max_minutes: default_backoff_max_minutes(),
            warn_after_failures: default_warn_after_failures(),
            show_update_interval_hours: default_show_update_interval_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json_logging")]
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logging(),
            file: None,
        }
    }
}

fn default_cloud_base_url() -> String {
    "https://cloud.seriesgui.de".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_consecutive_timeouts() -> u32 {
    3
}

fn default_sync_interval_minutes() -> u64 {
    60
}

fn default_backoff_base_minutes() -> u64 {
    5
}

fn default_backoff_max_minutes() -> u64 {
    6 * 60
}

fn default_warn_after_failures() -> u32 {
    3
}

fn default_show_update_interval_hours() -> u64 {
    7 * 24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logging() -> bool {
    use std::io::IsTerminal;
    !std::io::stdout().is_terminal()
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sync = &self.sync;
        if sync.max_consecutive_timeouts == 0 {
            return Err(anyhow::anyhow!("max_consecutive_timeouts must be at least 1"));
        }
        if sync.sync_interval_minutes == 0 {
            return Err(anyhow::anyhow!("sync_interval_minutes must be at least 1"));
        }
        if sync.backoff_base_minutes == 0 {
            return Err(anyhow::anyhow!("backoff_base_minutes must be at least 1"));
        }
        if sync.backoff_max_minutes < sync.backoff_base_minutes {
            return Err(anyhow::anyhow!("backoff_max_minutes must not be smaller than backoff_base_minutes"));
        }

        match sync.flag_source {
            FlagSource::Cloud if !self.is_cloud_enabled() => {
                return Err(anyhow::anyhow!("flag_source is cloud but cloud is not enabled"));
            }
            FlagSource::Trakt if !self.is_trakt_configured() => {
                return Err(anyhow::anyhow!("flag_source is trakt but trakt is not configured"));
            }
            _ => {}
        }

        if let Some(ref trakt) = self.trakt {
            if trakt.enabled && !self.is_trakt_configured() {
                return Err(anyhow::anyhow!("Trakt is enabled but client_id or client_secret is not configured"));
            }
        }
        if let Some(ref metadata) = self.metadata {
            if metadata.enabled && metadata.api_key.is_empty() {
                return Err(anyhow::anyhow!("Metadata is enabled but api_key is empty"));
            }
        }

        Ok(())
    }

    pub fn is_cloud_enabled(&self) -> bool {
        self.cloud.as_ref().map(|cloud| cloud.enabled).unwrap_or(false)
    }

    pub fn is_trakt_configured(&self) -> bool {
        if let Some(ref trakt) = self.trakt {
            trakt.enabled
                && !trakt.client_id.is_empty()
                && trakt.client_id != "YOUR_CLIENT_ID"
                && !trakt.client_secret.is_empty()
                && trakt.client_secret != "YOUR_CLIENT_SECRET"
        } else {
            false
        }
    }

    pub fn is_metadata_enabled(&self) -> bool {
        self.metadata.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// Names of the configured and enabled remotes.
    pub fn get_configured_services(&self) -> Vec<String> {
        let mut services = Vec::new();
        if self.is_cloud_enabled() {
            services.push("cloud".to_string());
        }
        if self.is_trakt_configured() {
            services.push("trakt".to_string());
        }
        if self.is_metadata_enabled() {
            services.push("metadata".to_string());
        }
        services
    }
}
