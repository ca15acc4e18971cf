// src/ledger.rs
//! Block lifecycle facade.
//!
//! [`AccountingLedger`] owns the usage ledger and the rewards keeper and
//! drives them in the order the host's block processing expects:
//!
//! ```text
//! begin_block -> on_inflation_minted
//!   per tx: begin_transaction -> check_min_fee -> deduct_fees
//!           -> gas sessions -> ingest_sessions
//! end_block  (finalize tracking, distribute, prune)
//! ```

use crate::ante::{FeeDeduction, FeeSplit, MinFeeCheck, Tx};
use crate::address::Address;
use crate::bank::{BankKeeper, StoreBank};
use crate::coin::{Coin, DecCoin};
use crate::config::LedgerConfig;
use crate::context::Context;
use crate::error::{Result as RewardsResult, RewardsError};
use crate::events::LedgerEvent;
use crate::gas::{ContractOperation, Gas, GasSessionStack, TerminatedSessions};
use crate::mint::{InflationSplit, MintSplitter};
use crate::registry::ContractRegistry;
use crate::rewards::{
    BlockDistribution, InvariantReport, MsgResponse, RewardsGenesis, RewardsKeeper, RewardsMsg,
    WithdrawOutcome,
};
use crate::storage::{RocksStore, Store};
use crate::tracking::{ContractOpUsage, TrackingGenesis, UsageLedger};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Full exportable state of both ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerGenesis {
    pub tracking: TrackingGenesis,
    pub rewards: RewardsGenesis,
}

/// What [`AccountingLedger::end_block`] produced.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    pub height: i64,
    pub distribution: BlockDistribution,
    /// Every event emitted while the block was open, in order.
    pub events: Vec<LedgerEvent>,
}

pub struct AccountingLedger {
    tracking: Arc<UsageLedger>,
    rewards: Arc<RewardsKeeper>,
    fee_deduction: FeeDeduction,
    min_fee_check: MinFeeCheck,
    mint: MintSplitter,
    block: Option<Context>,
}

impl AccountingLedger {
    pub fn new(
        store: Store,
        bank: Arc<dyn BankKeeper>,
        registry: Arc<dyn ContractRegistry>,
        config: &LedgerConfig,
    ) -> Self {
        let tracking = Arc::new(UsageLedger::new(store.clone(), config.tracking.vm_gas_multiplier));
        let rewards = Arc::new(
            RewardsKeeper::new(store, bank, registry, tracking.clone())
                .with_retention(config.tracking.retention_blocks),
        );
        Self {
            fee_deduction: FeeDeduction::new(rewards.clone()),
            min_fee_check: MinFeeCheck::new(rewards.clone()),
            mint: MintSplitter::new(rewards.clone()),
            tracking,
            rewards,
            block: None,
        }
    }

    /// Open the RocksDB store from `config`, with balances kept in the same
    /// database.
    pub fn open(config: &LedgerConfig, registry: Arc<dyn ContractRegistry>) -> Result<Self> {
        let validation = config.validate();
        validation.print_summary();
        validation.into_result()?;

        let store: Store = Arc::new(RocksStore::open(
            &config.storage.db_path,
            config.storage.max_open_files,
        )?);
        let bank = Arc::new(StoreBank::new(store.clone()));
        Ok(Self::new(store, bank, registry, config))
    }

    /// Write the module parameters from `config`.
    pub fn init_params(&self, config: &LedgerConfig) -> Result<()> {
        self.tracking.set_params(&config.tracking_params())?;
        self.rewards.set_params(&config.rewards_params())?;
        Ok(())
    }

    pub fn tracking(&self) -> &Arc<UsageLedger> {
        &self.tracking
    }

    pub fn rewards(&self) -> &Arc<RewardsKeeper> {
        &self.rewards
    }

    /// Context of the block in progress.
    pub fn context(&self) -> Option<&Context> {
        self.block.as_ref()
    }

    fn ctx_mut(&mut self) -> Result<&mut Context> {
        self.block
            .as_mut()
            .ok_or_else(|| anyhow!("no block in progress"))
    }

    fn ctx_for_msg(&mut self) -> RewardsResult<&mut Context> {
        self.block
            .as_mut()
            .ok_or_else(|| RewardsError::invalid("no block in progress"))
    }

    // --- block lifecycle ---

    pub fn begin_block(&mut self, height: i64, time: DateTime<Utc>, block_gas_limit: Option<Gas>) -> Result<()> {
        if let Some(open) = &self.block {
            bail!(
                "cannot begin block {}: block {} is still in progress",
                height,
                open.height
            );
        }
        if height <= 0 {
            bail!("invalid block height {}", height);
        }
        self.block = Some(Context::new(height, time, block_gas_limit));
        Ok(())
    }

    /// Mint the block's inflation and route the contracts' share into the
    /// rewards pool.
    pub fn on_inflation_minted(&mut self, minted: &Coin) -> Result<InflationSplit> {
        let block = self
            .block
            .as_mut()
            .ok_or_else(|| anyhow!("no block in progress"))?;
        Ok(self.mint.mint_and_split(block, minted)?)
    }

    /// Open the tracked transaction every later fee and gas record of this
    /// transaction is attached to.
    pub fn begin_transaction(&mut self) -> Result<u64> {
        let height = self.ctx_mut()?.height;
        self.tracking.begin_transaction(height)
    }

    pub fn check_min_fee(&self, tx: &Tx, simulate: bool) -> RewardsResult<()> {
        self.min_fee_check.check(tx, simulate)
    }

    pub fn deduct_fees(&mut self, tx: &Tx) -> RewardsResult<FeeSplit> {
        let block = self
            .block
            .as_ref()
            .ok_or_else(|| RewardsError::invalid("no block in progress"))?;
        self.fee_deduction.deduct_fees(block, tx)
    }

    /// A fresh stack for one transaction or query evaluation.
    pub fn new_gas_session_stack(&self) -> GasSessionStack {
        GasSessionStack::new()
    }

    /// Record the output of a terminated session stack against the current
    /// transaction.
    pub fn ingest_sessions(&self, sessions: &TerminatedSessions) -> Result<()> {
        self.tracking.ingest_gas_records(&sessions.gas_records())
    }

    pub fn record_contract_operation(
        &self,
        tx_id: u64,
        contract: Address,
        operation: ContractOperation,
        vm_gas: Gas,
        sdk_gas: Gas,
    ) -> Result<ContractOpUsage> {
        self.tracking
            .record_contract_operation(tx_id, contract, operation, vm_gas, sdk_gas)
    }

    /// Finalize tracking, distribute the block's rewards and prune old
    /// tracking data.
    ///
    /// On error the block stays open with its events, so the call can be
    /// retried.
    pub fn end_block(&mut self) -> Result<BlockOutcome> {
        let tracking = self.tracking.clone();
        let rewards = self.rewards.clone();
        let ctx = self.ctx_mut()?;
        let height = ctx.height;

        tracking.finalize_block(height)?;
        let distribution = rewards.allocate_block_rewards(ctx, height)?;
        let events = ctx.events.drain();
        self.block = None;
        info!("block {} closed with {} event(s)", height, events.len());

        Ok(BlockOutcome {
            height,
            distribution,
            events,
        })
    }

    // --- queries and messages ---

    /// Minimum consensus fee; `None` means no floor is enforced.
    pub fn get_min_fee(&self) -> RewardsResult<Option<DecCoin>> {
        self.rewards.min_consensus_fee()
    }

    pub fn withdraw_by_limit(&mut self, rewards_address: &Address, limit: u64) -> RewardsResult<WithdrawOutcome> {
        let rewards = self.rewards.clone();
        let ctx = self.ctx_for_msg()?;
        rewards.withdraw_rewards_by_limit(ctx, rewards_address, limit)
    }

    pub fn withdraw_by_ids(&mut self, rewards_address: &Address, ids: &[u64]) -> RewardsResult<WithdrawOutcome> {
        let rewards = self.rewards.clone();
        let ctx = self.ctx_for_msg()?;
        rewards.withdraw_rewards_by_ids(ctx, rewards_address, ids)
    }

    pub fn handle_msg(&mut self, msg: RewardsMsg) -> RewardsResult<MsgResponse> {
        let rewards = self.rewards.clone();
        let ctx = self.ctx_for_msg()?;
        rewards.handle_msg(ctx, msg)
    }

    /// Panics if the rewards pool cannot cover the stored records.
    pub fn check_invariants(&self) -> Result<InvariantReport> {
        self.rewards.assert_invariants()
    }

    pub fn export_genesis(&self) -> Result<LedgerGenesis> {
        Ok(LedgerGenesis {
            tracking: self.tracking.export_genesis()?,
            rewards: self.rewards.export_genesis()?,
        })
    }

    pub fn import_genesis(&self, genesis: &LedgerGenesis) -> Result<()> {
        self.tracking.import_genesis(&genesis.tracking)?;
        self.rewards.import_genesis(&genesis.rewards)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::storage::{encode_u64, key, KvStore, MemoryStore};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn t(height: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + height * 5, 0).unwrap()
    }

    fn ledger_with_store() -> (AccountingLedger, Store) {
        let store = MemoryStore::shared();
        let bank = Arc::new(StoreBank::new(store.clone()));
        let mut config = LedgerConfig::default();
        config.tracking.vm_gas_multiplier = 1;
        let ledger = AccountingLedger::new(store.clone(), bank, Arc::new(InMemoryRegistry::new()), &config);
        (ledger, store)
    }

    fn ledger() -> AccountingLedger {
        ledger_with_store().0
    }

    #[test]
    fn test_block_must_be_open() {
        let mut l = ledger();
        assert!(l.begin_transaction().is_err());
        assert!(l.end_block().is_err());
        assert!(l.withdraw_by_limit(&Address([1; 32]), 0).is_err());

        l.begin_block(1, t(1), Some(1_000)).unwrap();
        assert!(l.begin_block(2, t(2), Some(1_000)).is_err());
        assert_eq!(l.begin_transaction().unwrap(), 1);
        let outcome = l.end_block().unwrap();
        assert_eq!(outcome.height, 1);
        assert!(l.context().is_none());
    }

    #[test]
    fn test_failed_end_block_keeps_block_open() {
        let (mut l, store) = ledger_with_store();
        l.begin_block(1, t(1), Some(1_000)).unwrap();
        l.on_inflation_minted(&Coin::new("stake", 500)).unwrap();
        assert_eq!(l.begin_transaction().unwrap(), 1);

        // tracked tx 1 under the usage ledger's object namespace
        let tx_key = key(&[&[0x00, 0x01], &encode_u64(1)]);
        let saved = store.get(&tx_key).unwrap().unwrap();
        store.put(&tx_key, b"not json").unwrap();

        assert!(l.end_block().is_err());
        let ctx = l.context().unwrap();
        assert_eq!(ctx.height, 1);
        assert_eq!(ctx.events.count_of("min_consensus_fee_set"), 1);

        store.put(&tx_key, &saved).unwrap();
        let outcome = l.end_block().unwrap();
        assert_eq!(outcome.height, 1);
        assert_eq!(
            outcome
                .events
                .iter()
                .filter(|e| e.kind() == "min_consensus_fee_set")
                .count(),
            1
        );
        assert!(l.context().is_none());
    }

    #[test]
    fn test_inflation_only_block_sets_min_fee() {
        let mut l = ledger();
        l.begin_block(1, t(1), Some(1_000)).unwrap();
        let split = l.on_inflation_minted(&Coin::new("stake", 500)).unwrap();
        assert_eq!(split.dapp_rewards.amount, 100);
        let outcome = l.end_block().unwrap();

        assert_eq!(
            outcome
                .events
                .iter()
                .filter(|e| e.kind() == "min_consensus_fee_set")
                .count(),
            1
        );
        assert!(l.get_min_fee().unwrap().is_some());
        assert!(outcome.distribution.contracts.is_empty());
        let report = l.check_invariants().unwrap();
        assert_eq!(report.pool.amount_of("stake"), 100);
    }

    #[test]
    fn test_open_rocksdb_and_genesis_roundtrip() {
        let dir = tempdir().unwrap();
        let mut config = LedgerConfig::default();
        config.storage.db_path = dir.path().join("db").display().to_string();

        let mut l = AccountingLedger::open(&config, Arc::new(InMemoryRegistry::new())).unwrap();
        l.init_params(&config).unwrap();
        l.begin_block(1, t(1), None).unwrap();
        let tx_id = l.begin_transaction().unwrap();
        l.record_contract_operation(tx_id, Address([1; 32]), ContractOperation::Execution, 5, 5)
            .unwrap();
        l.end_block().unwrap();

        let genesis = l.export_genesis().unwrap();
        assert_eq!(genesis.tracking.tx_last_id, 1);
        assert_eq!(genesis.tracking.contract_ops.len(), 1);

        let copy = ledger();
        copy.import_genesis(&genesis).unwrap();
        assert_eq!(copy.export_genesis().unwrap(), genesis);
    }
}
