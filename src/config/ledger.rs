//! Ledger configuration loading from config.toml
//!
//! Every field has a default so a missing file, or a file that only sets a
//! couple of values, still produces a working configuration.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Tuning for the ledger, referral program and durability policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Bonus credited to a referrer's referral balance
    pub referral_bonus: f64,
    /// Deposit amount that qualifies a referral
    pub referral_min_deposit: f64,
    /// Smallest invoice accepted
    pub min_deposit: f64,
    /// Largest invoice accepted
    pub max_deposit: f64,
    /// Smallest withdrawal accepted
    pub min_withdrawal: f64,
    /// Seconds between reconciling checkpoints
    pub checkpoint_interval_secs: u64,
    /// Relaxed (non-critical) commits tolerated before an early checkpoint
    pub relaxed_batch_size: usize,
    /// Upper bound on query view latency
    pub read_timeout_ms: u64,
    /// Connections in the reader pool
    pub reader_pool_size: u32,
    /// Commands buffered in front of the writer
    pub writer_queue_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            referral_bonus: 0.3,
            referral_min_deposit: 2.0,
            min_deposit: 1.0,
            max_deposit: 10_000.0,
            min_withdrawal: 1.0,
            checkpoint_interval_secs: 30,
            relaxed_batch_size: 64,
            read_timeout_ms: 2_000,
            reader_pool_size: 4,
            writer_queue_capacity: 1_024,
        }
    }
}

impl LedgerConfig {
    /// Interval of the checkpoint timer
    #[must_use]
    pub const fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// Timeout applied to every read
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Rejects configurations that would break ledger invariants.
    pub fn validate(&self) -> Result<()> {
        let amounts = [
            self.referral_bonus,
            self.referral_min_deposit,
            self.min_deposit,
            self.max_deposit,
            self.min_withdrawal,
        ];
        if amounts.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(Error::Config {
                message: "monetary settings must be finite and non-negative".to_string(),
            });
        }
        if self.min_deposit > self.max_deposit {
            return Err(Error::Config {
                message: format!(
                    "min_deposit {} exceeds max_deposit {}",
                    self.min_deposit, self.max_deposit
                ),
            });
        }
        if self.checkpoint_interval_secs == 0 || self.writer_queue_capacity == 0 {
            return Err(Error::Config {
                message: "checkpoint interval and writer queue capacity must be non-zero"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Loads ledger configuration from a TOML file
///
/// # Errors
/// Returns an error if the file exists but cannot be read, the TOML syntax
/// is invalid, or the values fail validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LedgerConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);

    if !path_ref.exists() {
        info!("No config file at {:?}, using defaults", path_ref);
        return Ok(LedgerConfig::default());
    }

    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    let config: LedgerConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from config file {path_ref:?}: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads ledger configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<LedgerConfig> {
    load_config("config.toml")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let toml_str = r"
            referral_bonus = 0.5
            checkpoint_interval_secs = 10
        ";

        let config: LedgerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.referral_bonus, 0.5);
        assert_eq!(config.checkpoint_interval(), Duration::from_secs(10));
        assert_eq!(config.referral_min_deposit, 2.0);
        assert_eq!(config.max_deposit, 10_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_deposit_range() {
        let config = LedgerConfig {
            min_deposit: 50.0,
            max_deposit: 10.0,
            ..LedgerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_nan_bonus() {
        let config = LedgerConfig {
            referral_bonus: f64::NAN,
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("definitely/not/here.toml").unwrap();
        assert_eq!(config.referral_bonus, 0.3);
    }
}
