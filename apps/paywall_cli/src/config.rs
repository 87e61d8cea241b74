use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use paywall_core::PaywallConfig;
use serde::Deserialize;
use shared::domain::OfferingId;

const APP_COOLDOWN_START_DELAY_MS: u64 = 600;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub paywall: PaywallConfig,
    pub catalog_path: Option<PathBuf>,
    pub log_filter: String,
    /// Problems found while loading, logged once tracing is up.
    pub warnings: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut paywall = PaywallConfig::default();
        paywall.cooldown.start_delay_ms = APP_COOLDOWN_START_DELAY_MS;
        Self {
            paywall,
            catalog_path: None,
            log_filter: "info".into(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    product_ids: Option<Vec<String>>,
    cooldown_enabled: Option<bool>,
    cooldown_seconds: Option<f64>,
    cooldown_start_delay_ms: Option<u64>,
    catalog_path: Option<PathBuf>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file (if present), then `APP__*` environment variables.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid settings file '{}'", path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
        .paywall
        .validate()
        .context("invalid paywall settings")?;
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.product_ids {
        settings.paywall.product_ids = v.into_iter().map(OfferingId).collect();
    }
    if let Some(v) = file_cfg.cooldown_enabled {
        settings.paywall.cooldown.enabled = v;
    }
    if let Some(v) = file_cfg.cooldown_seconds {
        settings.paywall.cooldown.duration_secs = v;
    }
    if let Some(v) = file_cfg.cooldown_start_delay_ms {
        settings.paywall.cooldown.start_delay_ms = v;
    }
    if let Some(v) = file_cfg.catalog_path {
        settings.catalog_path = Some(v);
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__PRODUCT_IDS") {
        let ids: Vec<OfferingId> = v
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(OfferingId::from)
            .collect();
        if ids.is_empty() {
            settings
                .warnings
                .push("APP__PRODUCT_IDS is empty; keeping configured products".into());
        } else {
            settings.paywall.product_ids = ids;
        }
    }

    if let Some(v) = lookup("APP__COOLDOWN_ENABLED") {
        match v.trim().parse::<bool>() {
            Ok(parsed) => settings.paywall.cooldown.enabled = parsed,
            Err(_) => settings
                .warnings
                .push(format!("ignoring APP__COOLDOWN_ENABLED={v}: expected true or false")),
        }
    }

    if let Some(v) = lookup("APP__COOLDOWN_SECONDS") {
        match v.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => {
                settings.paywall.cooldown.duration_secs = parsed;
            }
            _ => settings
                .warnings
                .push(format!("ignoring APP__COOLDOWN_SECONDS={v}: expected seconds")),
        }
    }

    if let Some(v) = lookup("APP__COOLDOWN_START_DELAY_MS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => settings.paywall.cooldown.start_delay_ms = parsed,
            Err(_) => settings.warnings.push(format!(
                "ignoring APP__COOLDOWN_START_DELAY_MS={v}: expected milliseconds"
            )),
        }
    }

    if let Some(v) = lookup("APP__CATALOG_PATH") {
        settings.catalog_path = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}
