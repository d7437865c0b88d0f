//! Governance configuration.
//!
//! Handles loading and validation of the engine, lifecycle and timelock
//! parameters from TOML files.

use std::path::Path;

use anyhow::Context;
use civitas_types::Amount;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};
use crate::lifecycle::{MAX_VOTING_PERIOD, MIN_VOTING_PERIOD};
use crate::timelock::{MAX_DELAY, MIN_DELAY};

/// Top-level configuration for all governance components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Quadratic voting engine
    pub engine: EngineConfig,
    /// Proposal thresholds and voting periods
    pub lifecycle: LifecycleConfig,
    /// Execution delay and emergency pause
    pub timelock: TimelockConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl GovernanceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: GovernanceConfig = toml::from_str(contents).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate().context("Invalid [engine] section")?;
        self.lifecycle.validate().context("Invalid [lifecycle] section")?;
        self.timelock.validate().context("Invalid [timelock] section")?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            anyhow::bail!("Unknown log format '{}': expected pretty or json", self.logging.format);
        }

        Ok(())
    }
}

/// Quadratic voting engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest accepted commitment
    #[serde(with = "amount_string")]
    pub min_commitment: Amount,
    /// Largest accepted commitment
    #[serde(with = "amount_string")]
    pub max_commitment: Amount,
    /// Seconds between committing tokens and voting with them
    pub lock_period: u64,
    /// Chain id bound into off-chain ballot signatures
    pub chain_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_commitment: 1,
            max_commitment: 1_000_000_000 * 10u128.pow(18),
            lock_period: 3_600,
            chain_id: 1,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_commitment == 0 || self.min_commitment > self.max_commitment {
            return Err(GovernanceError::InvalidParameter(format!(
                "commitment bounds {}..={}",
                self.min_commitment, self.max_commitment
            )));
        }
        Ok(())
    }
}

/// Proposal lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Share of total supply needed to propose (basis points)
    pub threshold_bps: u16,
    /// Share of total supply needed for emergency proposals (basis points)
    pub emergency_threshold_bps: u16,
    /// Regular voting period (seconds)
    pub voting_period: u64,
    /// Emergency voting period (seconds)
    pub emergency_voting_period: u64,
    /// Batch voting period (seconds)
    pub batch_voting_period: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            threshold_bps: 100,
            emergency_threshold_bps: 50,
            voting_period: 7 * 86_400,
            emergency_voting_period: 86_400,
            batch_voting_period: 10 * 86_400,
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<()> {
        validate_thresholds(self.threshold_bps, self.emergency_threshold_bps)?;
        validate_periods(
            self.voting_period,
            self.emergency_voting_period,
            self.batch_voting_period,
        )
    }
}

/// Require `emergency < threshold <= 10000`.
pub(crate) fn validate_thresholds(threshold_bps: u16, emergency_bps: u16) -> Result<()> {
    if emergency_bps >= threshold_bps || threshold_bps > 10_000 {
        return Err(GovernanceError::InvalidThresholds {
            threshold_bps,
            emergency_bps,
        });
    }
    Ok(())
}

/// Every period within bounds, and emergency no longer than regular.
pub(crate) fn validate_periods(regular: u64, emergency: u64, batch: u64) -> Result<()> {
    for (name, value) in [
        ("voting_period", regular),
        ("emergency_voting_period", emergency),
        ("batch_voting_period", batch),
    ] {
        if !(MIN_VOTING_PERIOD..=MAX_VOTING_PERIOD).contains(&value) {
            return Err(GovernanceError::InvalidPeriod {
                name,
                value,
                min: MIN_VOTING_PERIOD,
                max: MAX_VOTING_PERIOD,
            });
        }
    }
    if emergency > regular {
        return Err(GovernanceError::InvalidPeriod {
            name: "emergency_voting_period",
            value: emergency,
            min: MIN_VOTING_PERIOD,
            max: regular,
        });
    }
    Ok(())
}

/// Timelock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelockConfig {
    /// Minimum delay between scheduling and execution (seconds)
    pub min_delay: u64,
    /// How long an emergency pause lasts before anyone may clear it (seconds)
    pub pause_duration: u64,
}

impl Default for TimelockConfig {
    fn default() -> Self {
        Self {
            min_delay: 2 * 86_400,
            pause_duration: 3 * 86_400,
        }
    }
}

impl TimelockConfig {
    pub fn validate(&self) -> Result<()> {
        validate_delay(self.min_delay)?;
        if self.pause_duration == 0 {
            return Err(GovernanceError::InvalidParameter(
                "pause_duration must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_delay(delay: u64) -> Result<()> {
    if !(MIN_DELAY..=MAX_DELAY).contains(&delay) {
        return Err(GovernanceError::InvalidPeriod {
            name: "min_delay",
            value: delay,
            min: MIN_DELAY,
            max: MAX_DELAY,
        });
    }
    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Log format (json|pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

/// TOML integers are 64-bit, so amounts travel as decimal strings.
mod amount_string {
    use civitas_types::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GovernanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lifecycle.threshold_bps, 100);
        assert_eq!(config.lifecycle.emergency_threshold_bps, 50);
        assert_eq!(config.timelock.pause_duration, 3 * 86_400);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = GovernanceConfig::from_toml_str(
            r#"
            [engine]
            max_commitment = "5000"
            chain_id = 7

            [timelock]
            min_delay = 7200
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.max_commitment, 5000);
        assert_eq!(config.engine.chain_id, 7);
        assert_eq!(config.engine.lock_period, 3_600);
        assert_eq!(config.timelock.min_delay, 7200);
        assert_eq!(config.lifecycle, LifecycleConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GovernanceConfig::default();

        config.lifecycle.emergency_threshold_bps = config.lifecycle.threshold_bps;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.timelock.min_delay = 60;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.lifecycle.emergency_voting_period = config.lifecycle.voting_period + 1;
        assert!(config.validate().is_err());

        let mut config = GovernanceConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = GovernanceConfig::from_toml_str(
            r#"
            [lifecycle]
            threshold_bps = 20000
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("governance.toml");

        let mut config = GovernanceConfig::default();
        config.engine.chain_id = 42;
        config.logging.format = "json".to_string();
        config.to_file(&path).unwrap();

        let loaded = GovernanceConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.logging.is_json());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = GovernanceConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
