// src/config.rs
// Ledger configuration: file loading, environment overrides and validation

use crate::coin::DecCoin;
use crate::error::ConfigError;
use crate::math::Dec;
use crate::rewards::types::{
    default_inflation_rewards_ratio, default_tx_fee_rebate_ratio, RewardsParams,
    DEFAULT_MAX_WITHDRAW_RECORDS, DEFAULT_REWARDS_DENOM,
};
use crate::rewards::DEFAULT_RETENTION_BLOCKS;
use crate::tracking::{TrackingParams, DEFAULT_VM_GAS_MULTIPLIER};
use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// `env_logger` filter, e.g. `info` or `gas_rewards=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub db_path: String,
    pub max_open_files: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackingConfig {
    pub gas_tracking_enabled: bool,
    /// VM gas units per SDK gas unit.
    pub vm_gas_multiplier: u64,
    /// Finalized blocks kept before pruning.
    pub retention_blocks: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RewardsConfig {
    pub inflation_rewards_ratio: Dec,
    pub tx_fee_rebate_ratio: Dec,
    pub max_withdraw_records: u64,
    pub min_price_of_gas: DecCoin,
    pub rewards_denom: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/gas_rewards".to_string(),
            max_open_files: 512,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            gas_tracking_enabled: true,
            vm_gas_multiplier: DEFAULT_VM_GAS_MULTIPLIER,
            retention_blocks: DEFAULT_RETENTION_BLOCKS,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            inflation_rewards_ratio: default_inflation_rewards_ratio(),
            tx_fee_rebate_ratio: default_tx_fee_rebate_ratio(),
            max_withdraw_records: DEFAULT_MAX_WITHDRAW_RECORDS,
            min_price_of_gas: DecCoin::new(DEFAULT_REWARDS_DENOM, Dec::zero()),
            rewards_denom: DEFAULT_REWARDS_DENOM.to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            tracking: TrackingConfig::default(),
            rewards: RewardsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl LedgerConfig {
    /// Read the config from `path`; defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `GAS_REWARDS_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = env::var("GAS_REWARDS_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Ok(raw) = env::var("GAS_REWARDS_TX_FEE_REBATE_RATIO") {
            self.rewards.tx_fee_rebate_ratio = parse_env("GAS_REWARDS_TX_FEE_REBATE_RATIO", &raw)?;
        }
        if let Ok(raw) = env::var("GAS_REWARDS_INFLATION_RATIO") {
            self.rewards.inflation_rewards_ratio = parse_env("GAS_REWARDS_INFLATION_RATIO", &raw)?;
        }
        if let Ok(raw) = env::var("GAS_REWARDS_MAX_WITHDRAW_RECORDS") {
            self.rewards.max_withdraw_records = parse_env("GAS_REWARDS_MAX_WITHDRAW_RECORDS", &raw)?;
        }
        if let Ok(level) = env::var("GAS_REWARDS_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if self.storage.db_path.trim().is_empty() {
            validation.add_error("storage.db_path is empty".to_string());
        }
        if self.storage.max_open_files < -1 || self.storage.max_open_files == 0 {
            validation.add_error(format!(
                "storage.max_open_files must be positive or -1, got {}",
                self.storage.max_open_files
            ));
        }

        if self.tracking.vm_gas_multiplier == 0 {
            validation.add_error("tracking.vm_gas_multiplier must be GT 0".to_string());
        }
        if self.tracking.retention_blocks < 1 {
            validation.add_error("tracking.retention_blocks must be GTE 1".to_string());
        }
        if !self.tracking.gas_tracking_enabled {
            validation.add_warning("gas tracking is disabled; no contract rewards will be distributed".to_string());
        }

        if let Err(e) = self.rewards_params().validate() {
            validation.add_error(format!("rewards: {}", e));
        }
        if self.rewards.tx_fee_rebate_ratio == Dec::one() {
            validation.add_warning("tx_fee_rebate_ratio is 1; the minimum consensus fee will never be set".to_string());
        }
        if self.rewards.min_price_of_gas.denom != self.rewards.rewards_denom {
            validation.add_error(format!(
                "rewards.min_price_of_gas denom {} differs from rewards_denom {}",
                self.rewards.min_price_of_gas.denom, self.rewards.rewards_denom
            ));
        }
        validation
    }

    pub fn rewards_params(&self) -> RewardsParams {
        RewardsParams {
            inflation_rewards_ratio: self.rewards.inflation_rewards_ratio.clone(),
            tx_fee_rebate_ratio: self.rewards.tx_fee_rebate_ratio.clone(),
            max_withdraw_records: self.rewards.max_withdraw_records,
            min_price_of_gas: self.rewards.min_price_of_gas.clone(),
        }
    }

    pub fn tracking_params(&self) -> TrackingParams {
        TrackingParams {
            gas_tracking_enabled: self.tracking.gas_tracking_enabled,
        }
    }
}

/// Validation result for configuration checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        if !self.warnings.is_empty() {
            warn!("Configuration warnings:");
            for w in &self.warnings {
                warn!(" - {}", w);
            }
        }

        if !self.errors.is_empty() {
            error!("Configuration errors:");
            for e in &self.errors {
                error!(" - {}", e);
            }
        }

        if self.valid && self.warnings.is_empty() {
            info!("Configuration validation passed");
        }
    }

    /// Turn collected errors into a single [`ConfigError`].
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.valid {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self.errors.join("; ")))
        }
    }
}
