use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use shared::domain::{BillingPeriod, Offering, OfferingId};

pub const DEFAULT_COOLDOWN_SECS: f64 = 5.0;
pub const MAX_COOLDOWN_SECS: f64 = 86_400.0;
pub const MAX_START_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub enabled: bool,
    pub duration_secs: f64,
    pub start_delay_ms: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_secs: DEFAULT_COOLDOWN_SECS,
            start_delay_ms: 0,
        }
    }
}

impl CooldownConfig {
    /// Saturates into `0..=MAX_COOLDOWN_SECS`; `validate` rejects anything outside it.
    pub fn duration(&self) -> Duration {
        let secs = if self.duration_secs.is_nan() {
            DEFAULT_COOLDOWN_SECS
        } else {
            self.duration_secs.clamp(0.0, MAX_COOLDOWN_SECS)
        };
        Duration::from_secs_f64(secs)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms.min(MAX_START_DELAY_MS))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.duration_secs.is_finite() && self.duration_secs >= 0.0,
            "cooldown duration must be a non-negative number of seconds, got {}",
            self.duration_secs
        );
        ensure!(
            self.duration_secs <= MAX_COOLDOWN_SECS,
            "cooldown duration must be at most {MAX_COOLDOWN_SECS} seconds, got {}",
            self.duration_secs
        );
        ensure!(
            self.start_delay_ms <= MAX_START_DELAY_MS,
            "cooldown start delay must be at most {MAX_START_DELAY_MS} ms, got {}",
            self.start_delay_ms
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaywallConfig {
    /// Requested from the storefront in this order; first and last back the trial toggle.
    pub product_ids: Vec<OfferingId>,
    pub placeholder_offerings: Vec<Offering>,
    pub cooldown: CooldownConfig,
}

impl Default for PaywallConfig {
    fn default() -> Self {
        Self {
            product_ids: vec![
                OfferingId::from("demo_lifetime"),
                OfferingId::from("demo_weekly"),
            ],
            placeholder_offerings: vec![
                Offering::new(
                    "demo_lifetime",
                    "$49.99",
                    BillingPeriod::Lifetime,
                    "Lifetime Plan",
                    false,
                ),
                Offering::new("demo_weekly", "$4.99", BillingPeriod::Week, "Weekly Plan", true),
            ],
            cooldown: CooldownConfig::default(),
        }
    }
}

impl PaywallConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid paywall config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.product_ids.is_empty(),
            "at least one product id must be configured"
        );
        self.cooldown.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PaywallConfig::from_toml_str(
            r#"
            product_ids = ["pro_weekly"]

            [cooldown]
            duration_secs = 3.5
            "#,
        )
        .expect("config");

        assert_eq!(config.product_ids, vec![OfferingId::from("pro_weekly")]);
        assert_eq!(config.cooldown.duration(), Duration::from_millis(3500));
        assert!(config.cooldown.enabled);
        assert_eq!(config.placeholder_offerings.len(), 2);
    }

    #[test]
    fn rejects_empty_product_ids() {
        assert!(PaywallConfig::from_toml_str("product_ids = []").is_err());
    }

    #[test]
    fn rejects_negative_cooldown() {
        let err = PaywallConfig::from_toml_str("[cooldown]\nduration_secs = -1.0")
            .expect_err("negative cooldown");
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn rejects_cooldowns_too_long_to_represent() {
        for raw in ["duration_secs = 1e20", "duration_secs = 1e19", "duration_secs = 86400.5"] {
            let err = PaywallConfig::from_toml_str(&format!("[cooldown]\n{raw}"))
                .expect_err("oversized cooldown");
            assert!(err.to_string().contains("at most"), "{raw}: {err}");
        }
    }

    #[test]
    fn rejects_oversized_start_delay() {
        let err = PaywallConfig::from_toml_str("[cooldown]\nstart_delay_ms = 600000")
            .expect_err("oversized delay");
        assert!(err.to_string().contains("start delay"));
    }

    #[test]
    fn unvalidated_oversized_cooldown_saturates_instead_of_vanishing() {
        let cooldown = CooldownConfig {
            duration_secs: 1e20,
            start_delay_ms: u64::MAX,
            ..CooldownConfig::default()
        };
        assert_eq!(cooldown.duration(), Duration::from_secs(86_400));
        assert_eq!(cooldown.start_delay(), Duration::from_secs(60));
    }
}
