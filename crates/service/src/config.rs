//! Service configuration.
//!
//! Sources, later ones winning: built-in defaults, the optional
//! `config/labstock.toml` file, then `LABSTOCK__<SECTION>__<KEY>` environment
//! variables.

use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use labstock_inventory::PageLimits;
use labstock_lending::LendingPolicy;
use labstock_observability::LogSettings;

pub const DEFAULT_CONFIG_FILE: &str = "config/labstock.toml";
pub const ENV_PREFIX: &str = "LABSTOCK";
/// Upper bound for `lending.default_loan_days` (ten years).
pub const MAX_DEFAULT_LOAN_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LabStockConfig {
    pub log: LogSettings,
    pub lending: LendingSettings,
    pub pagination: PageLimits,
    pub seed: SeedSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LendingSettings {
    pub max_quantity_per_loan: Option<i64>,
    /// Loan period in days applied when a checkout has no due date.
    pub default_loan_days: Option<i64>,
}

impl LendingSettings {
    pub fn policy(&self) -> LendingPolicy {
        LendingPolicy {
            max_quantity_per_loan: self.max_quantity_per_loan,
            default_loan_period: self.default_loan_days.and_then(Duration::try_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    /// Load the bundled sample catalog into an empty store on startup.
    pub sample_catalog: bool,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self { sample_catalog: true }
    }
}

impl LabStockConfig {
    /// Load from `config/labstock.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(settings)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;

        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self, ConfigError> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.lending.max_quantity_per_loan {
            if max <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "lending.max_quantity_per_loan must be positive (got {max})"
                )));
            }
        }
        if let Some(days) = self.lending.default_loan_days {
            if days <= 0 || days > MAX_DEFAULT_LOAN_DAYS {
                return Err(ConfigError::Invalid(format!(
                    "lending.default_loan_days must be between 1 and {MAX_DEFAULT_LOAN_DAYS} (got {days})"
                )));
            }
        }
        if self.pagination.default_per_page == 0 || self.pagination.max_per_page == 0 {
            return Err(ConfigError::Invalid("pagination sizes must be positive".to_string()));
        }
        if self.pagination.default_per_page > self.pagination.max_per_page {
            return Err(ConfigError::Invalid(format!(
                "pagination.default_per_page ({}) exceeds max_per_page ({})",
                self.pagination.default_per_page, self.pagination.max_per_page
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use labstock_observability::LogFormat;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LabStockConfig::from_toml("").unwrap();
        assert_eq!(config, LabStockConfig::default());
        assert_eq!(config.pagination.default_per_page, 20);
        assert_eq!(config.pagination.max_per_page, 100);
        assert!(config.seed.sample_catalog);
        assert_eq!(config.lending.policy(), LendingPolicy::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = LabStockConfig::from_toml(
            r#"
            [log]
            format = "pretty"
            filter = "labstock=debug"

            [lending]
            max_quantity_per_loan = 5
            default_loan_days = 14

            [seed]
            sample_catalog = false
            "#,
        )
        .unwrap();

        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.filter, "labstock=debug");
        assert!(!config.seed.sample_catalog);

        let policy = config.lending.policy();
        assert_eq!(policy.max_quantity_per_loan, Some(5));
        assert_eq!(policy.default_loan_period, Some(Duration::days(14)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = LabStockConfig::from_toml("[lending]\nmax_quantity_per_loan = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = LabStockConfig::from_toml(
            "[pagination]\ndefault_per_page = 50\nmax_per_page = 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn default_loan_days_are_capped() {
        let config = LabStockConfig::from_toml("[lending]\ndefault_loan_days = 3650\n").unwrap();
        assert_eq!(
            config.lending.policy().default_loan_period,
            Some(Duration::days(MAX_DEFAULT_LOAN_DAYS))
        );

        for days in [0i64, 3651, 1_000_000_000, 200_000_000_000_000] {
            let err = LabStockConfig::from_toml(&format!("[lending]\ndefault_loan_days = {days}\n"))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{days} days accepted");
        }
    }

    #[test]
    fn malformed_values_fail_to_load() {
        let err = LabStockConfig::from_toml("[log]\nformat = \"xml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn bundled_config_file_is_valid() {
        let config =
            LabStockConfig::from_toml(include_str!("../../../config/labstock.toml")).unwrap();
        assert_eq!(config.lending.default_loan_days, Some(14));
        assert_eq!(config.log.format, LogFormat::Json);
    }
}
