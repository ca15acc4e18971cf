// src/rewards/mod.rs
//! Contract rewards: fee rebate and inflation tracking, per-block
//! distribution into withdrawable records, withdrawals and the minimum
//! consensus fee.

pub mod distribution;
pub mod genesis;
pub mod invariants;
pub mod metadata;
pub mod min_fee;
pub mod msg;
pub mod state;
pub mod types;
pub mod withdraw;

pub use distribution::{BlockDistribution, ContractDistribution};
pub use genesis::RewardsGenesis;
pub use invariants::InvariantReport;
pub use min_fee::estimate_min_consensus_fee;
pub use msg::{MsgResponse, RewardsMsg};
pub use types::{
    BlockRewards, ContractMetadata, FlatFee, MetadataUpdate, RewardsParams, RewardsRecord,
    TxRewards, WithdrawOutcome,
};

use crate::bank::{BankKeeper, REWARDS_COLLECTOR};
use crate::coin::{Coin, Coins};
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::math::Dec;
use crate::registry::ContractRegistry;
use crate::storage::Store;
use crate::tracking::UsageLedger;
use log::debug;
use state::{BlockRewardsState, FlatFeeState, MetadataState, RewardsRecordState, TxRewardsState};
use std::sync::Arc;

/// Blocks of tracking data kept before pruning.
pub const DEFAULT_RETENTION_BLOCKS: i64 = 10;

pub struct RewardsKeeper {
    store: Store,
    bank: Arc<dyn BankKeeper>,
    registry: Arc<dyn ContractRegistry>,
    tracking: Arc<UsageLedger>,
    retention_blocks: i64,
}

impl RewardsKeeper {
    pub fn new(
        store: Store,
        bank: Arc<dyn BankKeeper>,
        registry: Arc<dyn ContractRegistry>,
        tracking: Arc<UsageLedger>,
    ) -> Self {
        Self {
            store,
            bank,
            registry,
            tracking,
            retention_blocks: DEFAULT_RETENTION_BLOCKS,
        }
    }

    pub fn with_retention(mut self, blocks: i64) -> Self {
        self.retention_blocks = blocks.max(1);
        self
    }

    pub fn retention_blocks(&self) -> i64 {
        self.retention_blocks
    }

    pub fn bank(&self) -> &Arc<dyn BankKeeper> {
        &self.bank
    }

    pub fn tracking(&self) -> &Arc<UsageLedger> {
        &self.tracking
    }

    pub(crate) fn metadata_state(&self) -> MetadataState {
        MetadataState::new(self.store.clone())
    }

    pub(crate) fn block_rewards_state(&self) -> BlockRewardsState {
        BlockRewardsState::new(self.store.clone())
    }

    pub(crate) fn tx_rewards_state(&self) -> TxRewardsState {
        TxRewardsState::new(self.store.clone())
    }

    pub(crate) fn records_state(&self) -> RewardsRecordState {
        RewardsRecordState::new(self.store.clone())
    }

    pub(crate) fn flat_fee_state(&self) -> FlatFeeState {
        FlatFeeState::new(self.store.clone())
    }

    // --- params ---

    pub fn params(&self) -> Result<RewardsParams> {
        Ok(state::get_params(&self.store)?)
    }

    pub fn set_params(&self, params: &RewardsParams) -> Result<()> {
        params.validate().map_err(RewardsError::InvalidRequest)?;
        state::set_params(&self.store, params)?;
        Ok(())
    }

    pub fn tx_fee_rebate_ratio(&self) -> Result<Dec> {
        Ok(self.params()?.tx_fee_rebate_ratio)
    }

    pub fn inflation_rewards_ratio(&self) -> Result<Dec> {
        Ok(self.params()?.inflation_rewards_ratio)
    }

    pub fn max_withdraw_records(&self) -> Result<u64> {
        Ok(self.params()?.max_withdraw_records)
    }

    // --- reward tracking ---

    /// Id of the transaction currently open in the usage ledger. Fails if
    /// none was opened yet.
    pub fn tracked_tx_id(&self) -> Result<u64> {
        match self.tracking.current_tx_id()? {
            0 => Err(RewardsError::invalid(
                "fee rebate tracked before any transaction was opened",
            )),
            tx_id => Ok(tx_id),
        }
    }

    /// Store the fee rebate share of the current tracked transaction.
    ///
    /// The transaction must already be open in the usage ledger: its id is
    /// the key of the stored record.
    pub fn track_fee_rebate_rewards(&self, ctx: &Context, rewards: &Coins) -> Result<TxRewards> {
        let tx_id = self.tracked_tx_id()?;
        self.track_fee_rebate_rewards_for(ctx, tx_id, rewards)
    }

    /// Store a fee rebate under an already resolved tracked tx id.
    pub fn track_fee_rebate_rewards_for(&self, ctx: &Context, tx_id: u64, rewards: &Coins) -> Result<TxRewards> {
        let record = TxRewards {
            tx_id,
            height: ctx.height,
            fee_rewards: rewards.clone(),
        };
        self.tx_rewards_state().set(&record)?;
        debug!("tracked fee rebate {} for tx {}", rewards, tx_id);
        Ok(record)
    }

    /// Store this block's inflation rewards along with its gas limit.
    pub fn track_inflation_rewards(&self, ctx: &Context, rewards: &Coin) -> Result<BlockRewards> {
        let record = BlockRewards {
            height: ctx.height,
            inflation_rewards: rewards.clone(),
            max_gas: ctx.gas_limit_or_zero(),
        };
        self.block_rewards_state().set(&record)?;
        debug!(
            "tracked inflation rewards {} at height {} (max gas {})",
            rewards, ctx.height, record.max_gas
        );
        Ok(record)
    }

    pub fn block_rewards(&self, height: i64) -> Result<Option<BlockRewards>> {
        Ok(self.block_rewards_state().get(height)?)
    }

    pub fn tx_rewards(&self, tx_id: u64) -> Result<Option<TxRewards>> {
        Ok(self.tx_rewards_state().get(tx_id)?)
    }

    // --- rewards records ---

    /// Append a withdrawable record for `rewards_address`.
    pub fn create_rewards_record(
        &self,
        ctx: &Context,
        rewards_address: crate::address::Address,
        rewards: Coins,
    ) -> Result<RewardsRecord> {
        Ok(self
            .records_state()
            .create(rewards_address, rewards, ctx.height, ctx.time)?)
    }

    pub fn rewards_record(&self, id: u64) -> Result<Option<RewardsRecord>> {
        Ok(self.records_state().get(id)?)
    }

    /// Records of an address, ascending ids, starting after `start_after`.
    pub fn rewards_records(
        &self,
        rewards_address: &crate::address::Address,
        start_after: u64,
        limit: usize,
    ) -> Result<Vec<RewardsRecord>> {
        Ok(self
            .records_state()
            .page_by_address(rewards_address, start_after, limit)?)
    }

    /// Current balance of the rewards collector module.
    pub fn undistributed_rewards_pool(&self) -> Result<Coins> {
        Ok(self.bank.module_balance(REWARDS_COLLECTOR)?)
    }
}
