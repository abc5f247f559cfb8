// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://dabmusic.xyz/api";
pub const DEFAULT_MATCH_THRESHOLD: u8 = 70;
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 1024 * 1024 * 1024;

const APP_DIR_NAME: &str = "tunebridge";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 34116,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            auth_token: None,
        }
    }
}

impl CatalogConfig {
    /// Base url with trailing slashes removed and `/api` appended to bare origins.
    pub fn normalized_base_url(&self) -> String {
        let normalized = normalize_api_base(&self.base_url);
        if normalized.is_empty() {
            DEFAULT_CATALOG_BASE_URL.to_string()
        } else {
            normalized
        }
    }

    /// The configured credential, ignoring blank values.
    pub fn credential(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum confidence score (0-100). Zero selects the default.
    pub threshold: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl MatchingConfig {
    pub fn effective_threshold(&self) -> u8 {
        match self.threshold {
            0 => DEFAULT_MATCH_THRESHOLD,
            value => value.min(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub max_concurrency: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { max_concurrency: 3 }
    }
}

impl WorkersConfig {
    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub match_delay_ms: u64,
    pub add_delay_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_add_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            match_delay_ms: 100,
            add_delay_ms: 500,
            retry_backoff_ms: 2000,
            max_add_attempts: 3,
        }
    }
}

impl TransferConfig {
    pub fn match_delay(&self) -> Duration {
        Duration::from_millis(self.match_delay_ms)
    }

    pub fn add_delay(&self) -> Duration {
        Duration::from_millis(self.add_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub download_path: PathBuf,
    pub data_dir: PathBuf,
    /// Media cache budget in bytes; non-positive values select 1 GiB.
    pub max_cache_size: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            data_dir: default_data_dir(),
            max_cache_size: 0,
        }
    }
}

impl StorageConfig {
    pub fn cache_budget_bytes(&self) -> u64 {
        cache_budget_from(self.max_cache_size)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.download_path.join(".cache")
    }

    pub fn download_history_file(&self) -> PathBuf {
        self.data_dir.join("download_history.json")
    }

    pub fn transfer_history_file(&self) -> PathBuf {
        self.data_dir.join("transfer_history.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub musicbrainz_enabled: bool,
    pub musicbrainz_base_url: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            musicbrainz_enabled: true,
            musicbrainz_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCacheConfig {
    pub ttl_secs: u64,
}

impl Default for ApiCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub catalog: CatalogConfig,
    pub matching: MatchingConfig,
    pub workers: WorkersConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub api_cache: ApiCacheConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TUNEBRIDGE_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TUNEBRIDGE_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", base_url = %config.catalog.normalized_base_url(), "configuration loaded");
    Ok(config)
}

/// Non-positive budgets fall back to 1 GiB.
pub fn cache_budget_from(bytes: i64) -> u64 {
    if bytes <= 0 {
        DEFAULT_CACHE_BUDGET_BYTES
    } else {
        bytes as u64
    }
}

pub fn normalize_api_base(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.is_empty() {
        return String::new();
    }

    let Ok(mut url) = url::Url::parse(base) else {
        return base.to_string();
    };
    if url.host_str().is_none() {
        return base.to_string();
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/api");
    }

    url.as_str().trim_end_matches('/').to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(APP_DIR_NAME))
}

fn default_download_path() -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(APP_DIR_NAME);
    };
    if cfg!(windows) {
        home.join("Music").join(APP_DIR_NAME)
    } else {
        home.join("Downloads").join(APP_DIR_NAME)
    }
}
