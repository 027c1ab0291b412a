use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard ceiling on simultaneous analyses in a batch.
pub const MAX_CONCURRENT_ANALYSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Currency receipts are expected in; others raise a currency check.
    pub default_currency: String,
    pub batch_concurrency: usize,
    /// Ask for a one-tap confirmation before saving a clean single scan.
    pub quick_confirm: bool,
    /// Allowed gap between the printed total and the item sum.
    pub total_tolerance: Decimal,
    pub database_path: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            batch_concurrency: MAX_CONCURRENT_ANALYSES,
            quick_confirm: false,
            total_tolerance: Decimal::new(1, 2),
            database_path: None,
        }
    }
}

impl ScanConfig {
    /// Batch concurrency clamped to `1..=MAX_CONCURRENT_ANALYSES`.
    pub fn effective_concurrency(&self) -> usize {
        self.batch_concurrency.clamp(1, MAX_CONCURRENT_ANALYSES)
    }
}

pub fn load_config() -> ScanConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ScanConfig {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return ScanConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Ignoring invalid config {}: {err}", path.display());
            ScanConfig::default()
        }
    }
}

pub fn save_config(config: &ScanConfig) -> Result<()> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &ScanConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("RECEIPT_SCAN_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    app_data_dir().join("config.toml")
}

pub fn app_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("RECEIPT_SCAN_DATA_HOME") {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home::home_dir() {
            return home
                .join("Library")
                .join("Application Support")
                .join("ReceiptScan");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("ReceiptScan");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("receipt-scan");
        }
        if let Some(home) = home::home_dir() {
            return home.join(".local").join("share").join("receipt-scan");
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".receipt-scan")
}
