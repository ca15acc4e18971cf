// src/mint.rs
//! Inflation split between stakers and contracts.

use crate::bank::{BankKeeper, FEE_COLLECTOR, MINT_MODULE, REWARDS_COLLECTOR};
use crate::coin::{split_coins, Coin, Coins};
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::rewards::RewardsKeeper;
use log::debug;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflationSplit {
    /// Tracked as this block's inflation rewards.
    pub dapp_rewards: Coin,
    pub staking_rewards: Coins,
}

pub struct MintSplitter {
    rewards: Arc<RewardsKeeper>,
}

impl MintSplitter {
    pub fn new(rewards: Arc<RewardsKeeper>) -> Self {
        Self { rewards }
    }

    /// Mint the block's inflation into the mint module and split it.
    pub fn mint_and_split(&self, ctx: &mut Context, minted: &Coin) -> Result<InflationSplit> {
        let coins = Coins::from_coin(minted.clone());
        let bank = self.rewards.bank();
        bank.mint(&bank.module_address(MINT_MODULE), &coins)?;
        self.split_inflation(ctx, MINT_MODULE, minted)
    }

    /// Send `inflation_rewards_ratio` of the minted coin from `source` to
    /// the rewards pool and the rest to the fee collector, then track the
    /// contracts' share and refresh the minimum consensus fee.
    pub fn split_inflation(&self, ctx: &mut Context, source: &str, minted: &Coin) -> Result<InflationSplit> {
        minted.validate().map_err(RewardsError::InvalidRequest)?;
        let bank = self.rewards.bank();
        let ratio = self.rewards.inflation_rewards_ratio()?;
        let coins = Coins::from_coin(minted.clone());

        let (dapp, staking) = split_coins(&coins, &ratio);
        if !staking.is_empty() {
            bank.send_module_to_module(source, FEE_COLLECTOR, &staking)?;
        }
        if !dapp.is_empty() {
            bank.send_module_to_module(source, REWARDS_COLLECTOR, &dapp)?;
        }

        let dapp_rewards = Coin::new(minted.denom.clone(), dapp.amount_of(&minted.denom));
        self.rewards.track_inflation_rewards(ctx, &dapp_rewards)?;
        self.rewards.update_min_consensus_fee(ctx, &dapp_rewards)?;
        debug!(
            "inflation {} split: contracts {}, stakers {}",
            minted, dapp_rewards, staking
        );

        Ok(InflationSplit {
            dapp_rewards,
            staking_rewards: staking,
        })
    }
}
