// src/rewards/types.rs
//! Rewards state types

use crate::address::Address;
use crate::coin::{Coin, Coins, DecCoin};
use crate::gas::Gas;
use crate::math::Dec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default share of minted inflation routed to contracts.
pub fn default_inflation_rewards_ratio() -> Dec {
    Dec::with_prec(2, 1)
}

/// Default share of wasm transaction fees rebated to contracts.
pub fn default_tx_fee_rebate_ratio() -> Dec {
    Dec::with_prec(5, 1)
}

pub const DEFAULT_MAX_WITHDRAW_RECORDS: u64 = 25_000;
pub const DEFAULT_REWARDS_DENOM: &str = "stake";

/// Module parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsParams {
    pub inflation_rewards_ratio: Dec,
    pub tx_fee_rebate_ratio: Dec,
    /// Upper bound for records consumed by a single withdrawal.
    pub max_withdraw_records: u64,
    /// Price-of-gas floor independent of the minimum consensus fee.
    pub min_price_of_gas: DecCoin,
}

impl Default for RewardsParams {
    fn default() -> Self {
        Self {
            inflation_rewards_ratio: default_inflation_rewards_ratio(),
            tx_fee_rebate_ratio: default_tx_fee_rebate_ratio(),
            max_withdraw_records: DEFAULT_MAX_WITHDRAW_RECORDS,
            min_price_of_gas: DecCoin::new(DEFAULT_REWARDS_DENOM, Dec::zero()),
        }
    }
}

impl RewardsParams {
    pub fn validate(&self) -> Result<(), String> {
        validate_ratio("inflation_rewards_ratio", &self.inflation_rewards_ratio)?;
        validate_ratio("tx_fee_rebate_ratio", &self.tx_fee_rebate_ratio)?;
        if self.max_withdraw_records == 0 {
            return Err("max_withdraw_records param: must be GT 0".into());
        }
        if self.min_price_of_gas.amount.is_negative() {
            return Err("min_price_of_gas param: must be GTE 0".into());
        }
        crate::coin::validate_denom(&self.min_price_of_gas.denom)
            .map_err(|e| format!("min_price_of_gas param: {}", e))
    }
}

fn validate_ratio(name: &str, v: &Dec) -> Result<(), String> {
    if v.is_negative() {
        return Err(format!("{} param: must be GTE 0.0", name));
    }
    if *v > Dec::one() {
        return Err(format!("{} param: must be LTE 1.0", name));
    }
    Ok(())
}

/// Per-contract rewards settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub contract: Address,
    pub owner: Address,
    /// Where rewards go; nothing is paid out while unset.
    pub rewards_address: Option<Address>,
}

impl ContractMetadata {
    pub fn has_rewards_address(&self) -> bool {
        self.rewards_address.is_some()
    }
}

/// Fields to change in [`ContractMetadata`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub owner: Option<Address>,
    pub rewards_address: Option<Address>,
}

/// Inflation rewards tracked for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRewards {
    pub height: i64,
    pub inflation_rewards: Coin,
    /// Block gas limit; zero when the block is unlimited.
    pub max_gas: Gas,
}

impl BlockRewards {
    pub fn has_rewards(&self) -> bool {
        !self.inflation_rewards.is_zero()
    }

    pub fn has_gas_limit(&self) -> bool {
        self.max_gas > 0
    }
}

/// Fee rebate rewards tracked for one transaction. Shares the tracking tx id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRewards {
    pub tx_id: u64,
    pub height: i64,
    pub fee_rewards: Coins,
}

impl TxRewards {
    pub fn has_rewards(&self) -> bool {
        !self.fee_rewards.is_empty()
    }
}

/// Withdrawable credit for a rewards address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsRecord {
    pub id: u64,
    pub rewards_address: Address,
    pub rewards: Coins,
    pub calculated_height: i64,
    pub calculated_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatFee {
    pub contract: Address,
    pub flat_fee: Coin,
}

/// Result of a withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    pub rewards: Coins,
    pub records_num: u64,
}
