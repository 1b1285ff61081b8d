use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub analysis: AnalysisConfig,
}

/// Snapshot store (drive-style object store) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Folder the processed snapshot lands in.
    #[serde(default = "default_folder_key")]
    pub folder_key: String,

    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Bearer token for the store API. Usually injected via
    /// `KSEI__STORE__AUTH_TOKEN`.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Analysis tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Series-wide percentage sum below which a category counts as
    /// perpetually inactive and is dropped from percentage views.
    #[serde(default = "default_inactive_pct_tolerance")]
    pub inactive_pct_tolerance: f64,

    /// Default screener threshold for rotation volume.
    #[serde(default = "default_min_rotation_volume")]
    pub min_rotation_volume: f64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}
fn default_folder_key() -> String {
    "1hX2jwUrAgi4Fr8xkcFWjCW6vbk6lsIlP".to_string()
}
fn default_file_name() -> String {
    "KSEI_Shareholder_Processed.csv".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "ksei-flow-engine/0.1 (shareholder flow analytics)".to_string()
}
fn default_inactive_pct_tolerance() -> f64 {
    crate::analysis::DEFAULT_INACTIVE_PCT_TOLERANCE
}
fn default_min_rotation_volume() -> f64 {
    1_000_000.0
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("KSEI").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                base_url: default_base_url(),
                folder_key: default_folder_key(),
                file_name: default_file_name(),
                auth_token: None,
                timeout_secs: default_timeout_secs(),
                request_delay_ms: default_request_delay_ms(),
                jitter_ms: default_jitter_ms(),
                max_retries: default_max_retries(),
                user_agent: default_user_agent(),
            },
            analysis: AnalysisConfig {
                inactive_pct_tolerance: default_inactive_pct_tolerance(),
                min_rotation_volume: default_min_rotation_volume(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.store.file_name, "KSEI_Shareholder_Processed.csv");
        assert_eq!(cfg.store.max_retries, 3);
        assert!(cfg.store.auth_token.is_none());
        assert_eq!(cfg.analysis.inactive_pct_tolerance, 0.01);
        assert_eq!(cfg.analysis.min_rotation_volume, 1_000_000.0);
    }
}
