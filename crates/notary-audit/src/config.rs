//! Audit engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Balance, Tick};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Chain-wide constants the audit checks notebooks against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum number of chain transfers in one notebook
    pub max_block_transfers: usize,
    /// Largest balance any account may hold
    pub max_balance: Balance,
    /// Ticks after which a channel hold may be settled
    pub channel_hold_expiration_ticks: Tick,
    /// Smallest amount a channel hold may lock
    pub minimum_channel_hold: Balance,
    /// Tax on received funds, in percent
    pub transfer_tax_percent: Balance,
    /// Most tax charged on a single received note
    pub transfer_tax_cap: Balance,
    /// Cost of leasing one data domain
    pub data_domain_lease_cost: Balance,
    /// Tax consumed per unit of block vote power
    pub block_vote_tax_ratio: Balance,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_block_transfers: 100,
            max_balance: i128::MAX as Balance,
            channel_hold_expiration_ticks: 60,
            minimum_channel_hold: 10,
            transfer_tax_percent: 20,
            transfer_tax_cap: 200,
            data_domain_lease_cost: 1_000,
            block_vote_tax_ratio: 1,
        }
    }
}

impl AuditConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AuditConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer_tax_percent > 100 {
            return Err(ConfigError::Invalid {
                field: "transfer_tax_percent",
                reason: format!("{} is above 100", self.transfer_tax_percent),
            });
        }
        if self.max_balance > i128::MAX as Balance {
            return Err(ConfigError::Invalid {
                field: "max_balance",
                reason: "must fit a signed 128-bit balance".to_string(),
            });
        }
        if self.block_vote_tax_ratio == 0 {
            return Err(ConfigError::Invalid {
                field: "block_vote_tax_ratio",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Tax owed on a received amount: `min(ceil(amount * percent / 100), cap)`.
    pub fn transfer_tax(&self, amount: Balance) -> Balance {
        let tax = amount
            .saturating_mul(self.transfer_tax_percent)
            .div_ceil(100);
        tax.min(self.transfer_tax_cap)
    }
}
