// src/rewards/distribution.rs
//! Per-block reward distribution.
//!
//! Runs once per finalized height: aggregates tracked gas per contract,
//! splits the block's fee rebates and inflation rewards proportionally and
//! turns every payable share into a [`RewardsRecord`]. Whatever is not paid
//! (truncation dust, contracts without metadata or rewards address) stays in
//! the rewards pool.

use super::types::{BlockRewards, ContractMetadata, RewardsRecord};
use super::RewardsKeeper;
use crate::address::Address;
use crate::coin::{Coin, Coins};
use crate::context::Context;
use crate::events::LedgerEvent;
use crate::gas::Gas;
use crate::math::Dec;
use crate::storage::StoreBatch;
use anyhow::Result;
use log::{debug, info};
use std::collections::BTreeMap;

/// Rewards estimated for one contract over one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDistribution {
    pub contract: Address,
    pub metadata: Option<ContractMetadata>,
    /// Gas used across the whole block.
    pub block_gas_used: Gas,
    /// Gas used per transaction id.
    pub tx_gas_used: BTreeMap<u64, Gas>,
    pub fee_rewards: Coins,
    /// `None` when the block had no inflation eligible for distribution.
    pub inflation_rewards: Option<Coin>,
    /// Record created for this contract, if it was paid.
    pub record: Option<RewardsRecord>,
}

impl ContractDistribution {
    fn new(contract: Address, metadata: Option<ContractMetadata>) -> Self {
        Self {
            contract,
            metadata,
            block_gas_used: 0,
            tx_gas_used: BTreeMap::new(),
            fee_rewards: Coins::new(),
            inflation_rewards: None,
            record: None,
        }
    }

    pub fn total_rewards(&self) -> Coins {
        let mut total = self.fee_rewards.clone();
        if let Some(inflation) = &self.inflation_rewards {
            total.add_coin(inflation);
        }
        total
    }

    fn rewards_address(&self) -> Option<Address> {
        self.metadata.as_ref().and_then(|m| m.rewards_address)
    }
}

/// Outcome of distributing one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDistribution {
    pub height: i64,
    /// Total gas per tracked transaction with non-zero gas.
    pub txs: BTreeMap<u64, Gas>,
    /// Contracts ordered by address.
    pub contracts: BTreeMap<Address, ContractDistribution>,
    pub block_gas_used: Gas,
    /// Fee rebates and inflation tracked for the block.
    pub rewards_total: Coins,
    /// Sum of the records created.
    pub rewards_distributed: Coins,
}

impl BlockDistribution {
    fn new(height: i64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    /// Tracked rewards that were not turned into records.
    pub fn leftover(&self) -> Coins {
        self.rewards_total
            .checked_sub(&self.rewards_distributed)
            .unwrap_or_default()
    }
}

/// `amount * part / whole`, truncated toward zero. Zero when `whole` is zero.
fn proportional_share(amount: u128, part: Gas, whole: Gas) -> u128 {
    match Dec::from_ratio(part as u128, whole as u128) {
        Some(ratio) => ratio
            .mul_u128(amount)
            .truncate_u128()
            .unwrap_or(0)
            .min(amount),
        None => 0,
    }
}

impl RewardsKeeper {
    /// Distribute rewards for `height` and prune tracking data that fell out
    /// of the retention window.
    pub fn allocate_block_rewards(&self, ctx: &mut Context, height: i64) -> Result<BlockDistribution> {
        let distribution = self.run_distribution(ctx, height)?;
        let prune_height = height - self.retention_blocks();
        if prune_height > 0 {
            self.prune(prune_height)?;
        }
        Ok(distribution)
    }

    /// Estimate and pay out the rewards of one finalized block.
    pub fn run_distribution(&self, ctx: &mut Context, height: i64) -> Result<BlockDistribution> {
        let mut state = self.estimate_block_gas_usage(height)?;
        self.estimate_block_rewards(&mut state)?;
        self.create_block_rewards_records(ctx, &mut state)?;

        if !state.rewards_total.is_all_gte(&state.rewards_distributed) {
            panic!(
                "distribution at height {} pays {} out of {} tracked rewards",
                height, state.rewards_distributed, state.rewards_total
            );
        }
        info!(
            "distributed rewards for height {}: {} contract(s), paid {}, leftover {}",
            height,
            state.contracts.len(),
            state.rewards_distributed,
            state.leftover()
        );
        Ok(state)
    }

    /// Merge tracked operations per contract and per transaction.
    fn estimate_block_gas_usage(&self, height: i64) -> Result<BlockDistribution> {
        let mut state = BlockDistribution::new(height);
        let metadata = self.metadata_state();

        for tx in self.tracking().query_by_block(height)?.txs {
            if tx.info.total_gas == 0 {
                debug!("tx {} at height {} used no gas, skipped", tx.info.id, height);
                continue;
            }
            state.txs.insert(tx.info.id, tx.info.total_gas);

            for op in tx.operations {
                let gas = match op.gas_used() {
                    Some(gas) => gas,
                    None => continue,
                };
                if !state.contracts.contains_key(&op.contract) {
                    let meta = metadata.get(&op.contract)?;
                    state
                        .contracts
                        .insert(op.contract, ContractDistribution::new(op.contract, meta));
                }
                if let Some(contract) = state.contracts.get_mut(&op.contract) {
                    contract.block_gas_used = contract.block_gas_used.saturating_add(gas);
                    let tx_gas = contract.tx_gas_used.entry(tx.info.id).or_insert(0);
                    *tx_gas = tx_gas.saturating_add(gas);
                }
                state.block_gas_used = state.block_gas_used.saturating_add(gas);
            }
        }
        Ok(state)
    }

    /// Split fee rebates per transaction and inflation per block.
    fn estimate_block_rewards(&self, state: &mut BlockDistribution) -> Result<()> {
        let inflation = match self.block_rewards_state().get(state.height)? {
            Some(br) if br.has_rewards() => {
                state.rewards_total.add_coin(&br.inflation_rewards);
                eligible_inflation(br, state.height)
            }
            _ => {
                debug!("no inflation rewards tracked for height {}", state.height);
                None
            }
        };

        let mut tx_fees: BTreeMap<u64, Coins> = BTreeMap::new();
        let tx_rewards = self.tx_rewards_state();
        for tx_id in state.txs.keys() {
            match tx_rewards.get(*tx_id)? {
                Some(r) if r.has_rewards() => {
                    state.rewards_total = state.rewards_total.add(&r.fee_rewards);
                    tx_fees.insert(*tx_id, r.fee_rewards);
                }
                _ => {}
            }
        }

        // The denominator never drops below the gas actually used, so the
        // shares cannot add up to more than the tracked inflation.
        let inflation_denominator = inflation
            .as_ref()
            .map(|br| br.max_gas.max(state.block_gas_used))
            .unwrap_or(0);

        for contract in state.contracts.values_mut() {
            for (tx_id, gas) in contract.tx_gas_used.iter() {
                let fees = match tx_fees.get(tx_id) {
                    Some(fees) => fees,
                    None => continue,
                };
                let tx_gas = state.txs.get(tx_id).copied().unwrap_or(0);
                for coin in fees.iter() {
                    let share = proportional_share(coin.amount, *gas, tx_gas);
                    contract.fee_rewards.add_coin(&Coin::new(coin.denom, share));
                }
            }

            if let Some(br) = &inflation {
                let share = proportional_share(
                    br.inflation_rewards.amount,
                    contract.block_gas_used,
                    inflation_denominator,
                );
                contract.inflation_rewards =
                    Some(Coin::new(br.inflation_rewards.denom.clone(), share));
            }
        }
        Ok(())
    }

    /// Emit a calculation event per contract and record the payable ones.
    fn create_block_rewards_records(&self, ctx: &mut Context, state: &mut BlockDistribution) -> Result<()> {
        let records = self.records_state();

        for contract in state.contracts.values_mut() {
            ctx.events.emit(LedgerEvent::ContractRewardCalculation {
                contract: contract.contract,
                gas_consumed: contract.block_gas_used,
                inflation_rewards: contract.inflation_rewards.clone(),
                fee_rebate_rewards: contract.fee_rewards.clone(),
                metadata: contract.metadata.clone(),
            });

            let rewards = contract.total_rewards();
            if rewards.is_empty() {
                debug!("contract {} earned nothing at height {}", contract.contract, state.height);
                continue;
            }
            if contract.metadata.is_none() {
                debug!("contract {} has no metadata, rewards stay in pool", contract.contract);
                continue;
            }
            let rewards_address = match contract.rewards_address() {
                Some(addr) => addr,
                None => {
                    debug!(
                        "contract {} has no rewards address, rewards stay in pool",
                        contract.contract
                    );
                    continue;
                }
            };

            let record = records.create(rewards_address, rewards.clone(), ctx.height, ctx.time)?;
            ctx.events.emit(LedgerEvent::ContractRewardDistribution {
                contract: contract.contract,
                rewards_address,
                rewards: rewards.clone(),
                rewards_record_id: record.id,
            });
            state.rewards_distributed = state.rewards_distributed.add(&rewards);
            contract.record = Some(record);
        }
        Ok(())
    }

    /// Drop tracking and tracked rewards of `height`. Safe to repeat.
    pub fn prune(&self, height: i64) -> Result<()> {
        self.tracking().prune(height)?;

        let mut batch = StoreBatch::new();
        self.block_rewards_state().stage_delete(height, &mut batch);
        let tx_rewards = self.tx_rewards_state().stage_delete_block(height, &mut batch)?;
        self.store.write(batch)?;
        debug!("pruned rewards tracking at height {} ({} tx record(s))", height, tx_rewards);
        Ok(())
    }
}

fn eligible_inflation(br: BlockRewards, height: i64) -> Option<BlockRewards> {
    if br.has_gas_limit() {
        Some(br)
    } else {
        debug!(
            "block {} has no gas limit, inflation rewards {} stay in pool",
            height, br.inflation_rewards
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use crate::coin::Coin;
    use crate::events::LedgerEvent;
    use crate::gas::ContractOperation;

    #[test]
    fn test_single_contract_gets_fee_and_inflation() {
        let f = fixture();
        let (contract, owner, payee) = (addr(1), addr(2), addr(3));
        f.contract_with_rewards(contract, owner, Some(payee));

        let mut c = ctx(10, Some(1_000));
        let tx = f.tracking.begin_transaction(10).unwrap();
        f.keeper.track_fee_rebate_rewards(&c, &stake(500)).unwrap();
        f.keeper
            .track_inflation_rewards(&c, &Coin::new("stake", 1_000))
            .unwrap();
        f.tracking
            .record_contract_operation(tx, contract, ContractOperation::Execution, 60, 40)
            .unwrap();
        f.tracking.finalize_block(10).unwrap();

        let result = f.keeper.run_distribution(&mut c, 10).unwrap();
        let share = &result.contracts[&contract];
        assert_eq!(share.fee_rewards.amount_of("stake"), 500);
        assert_eq!(share.inflation_rewards, Some(Coin::new("stake", 100)));
        assert_eq!(result.rewards_distributed.amount_of("stake"), 600);
        assert_eq!(result.leftover().amount_of("stake"), 900);

        let records = f.keeper.rewards_records(&payee, 0, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rewards.amount_of("stake"), 600);
        assert_eq!(c.events.count_of("contract_reward_distribution"), 1);
    }

    #[test]
    fn test_truncation_dust_not_paid() {
        let f = fixture();
        let (a, b) = (addr(1), addr(2));
        f.contract_with_rewards(a, addr(9), Some(addr(11)));
        f.contract_with_rewards(b, addr(9), Some(addr(12)));

        let mut c = ctx(5, Some(1_000));
        let tx = f.tracking.begin_transaction(5).unwrap();
        f.keeper.track_fee_rebate_rewards(&c, &stake(500)).unwrap();
        f.tracking
            .record_contract_operation(tx, a, ContractOperation::Execution, 100, 50)
            .unwrap();
        f.tracking
            .record_contract_operation(tx, b, ContractOperation::Execution, 200, 100)
            .unwrap();
        f.tracking.finalize_block(5).unwrap();

        let result = f.keeper.run_distribution(&mut c, 5).unwrap();
        assert_eq!(result.contracts[&a].fee_rewards.amount_of("stake"), 166);
        assert_eq!(result.contracts[&b].fee_rewards.amount_of("stake"), 333);
        assert_eq!(result.leftover().amount_of("stake"), 1);
        assert!(result.contracts[&a].inflation_rewards.is_none());
    }

    #[test]
    fn test_contract_without_metadata_still_reported() {
        let f = fixture();
        let contract = addr(4);
        let mut c = ctx(7, Some(100));
        let tx = f.tracking.begin_transaction(7).unwrap();
        f.keeper.track_fee_rebate_rewards(&c, &stake(10)).unwrap();
        f.tracking
            .record_contract_operation(tx, contract, ContractOperation::Execution, 1, 1)
            .unwrap();
        f.tracking.finalize_block(7).unwrap();

        let result = f.keeper.run_distribution(&mut c, 7).unwrap();
        assert!(result.rewards_distributed.is_empty());
        assert_eq!(result.leftover().amount_of("stake"), 10);
        match &c.events.events()[0] {
            LedgerEvent::ContractRewardCalculation {
                contract: reported,
                metadata,
                fee_rebate_rewards,
                ..
            } => {
                assert_eq!(*reported, contract);
                assert!(metadata.is_none());
                assert_eq!(fee_rebate_rewards.amount_of("stake"), 10);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_rewards_address_keeps_share_in_pool() {
        let f = fixture();
        let contract = addr(1);
        f.contract_with_rewards(contract, addr(2), None);

        let mut c = ctx(3, Some(100));
        let tx = f.tracking.begin_transaction(3).unwrap();
        f.keeper.track_fee_rebate_rewards(&c, &stake(10)).unwrap();
        f.tracking
            .record_contract_operation(tx, contract, ContractOperation::Execution, 5, 5)
            .unwrap();
        f.tracking.finalize_block(3).unwrap();

        let result = f.keeper.run_distribution(&mut c, 3).unwrap();
        assert!(result.contracts[&contract].record.is_none());
        assert_eq!(c.events.count_of("contract_reward_calculation"), 1);
        assert_eq!(c.events.count_of("contract_reward_distribution"), 0);
    }

    #[test]
    fn test_inflation_only_block() {
        let f = fixture();
        let contract = addr(1);
        f.contract_with_rewards(contract, addr(2), Some(addr(3)));

        let mut c = ctx(8, Some(1_000));
        f.keeper
            .track_inflation_rewards(&c, &Coin::new("stake", 1_000))
            .unwrap();
        let tx = f.tracking.begin_transaction(8).unwrap();
        f.tracking
            .record_contract_operation(tx, contract, ContractOperation::Execution, 200, 50)
            .unwrap();
        f.tracking.finalize_block(8).unwrap();

        let result = f.keeper.run_distribution(&mut c, 8).unwrap();
        assert!(result.contracts[&contract].fee_rewards.is_empty());
        assert_eq!(result.rewards_distributed.amount_of("stake"), 250);
    }

    #[test]
    fn test_unlimited_block_pays_no_inflation() {
        let f = fixture();
        let contract = addr(1);
        f.contract_with_rewards(contract, addr(2), Some(addr(3)));

        let mut c = ctx(8, None);
        f.keeper
            .track_inflation_rewards(&c, &Coin::new("stake", 1_000))
            .unwrap();
        let tx = f.tracking.begin_transaction(8).unwrap();
        f.tracking
            .record_contract_operation(tx, contract, ContractOperation::Execution, 200, 50)
            .unwrap();
        f.tracking.finalize_block(8).unwrap();

        let result = f.keeper.run_distribution(&mut c, 8).unwrap();
        assert!(result.rewards_distributed.is_empty());
        assert_eq!(result.rewards_total.amount_of("stake"), 1_000);
    }

    #[test]
    fn test_prune_removes_tracked_rewards() {
        let f = fixture();
        let c = ctx(2, Some(100));
        f.tracking.begin_transaction(2).unwrap();
        let tx_rewards = f.keeper.track_fee_rebate_rewards(&c, &stake(3)).unwrap();
        f.keeper
            .track_inflation_rewards(&c, &Coin::new("stake", 9))
            .unwrap();

        f.keeper.prune(2).unwrap();
        f.keeper.prune(2).unwrap();

        assert!(f.keeper.tx_rewards(tx_rewards.tx_id).unwrap().is_none());
        assert!(f.keeper.block_rewards(2).unwrap().is_none());
        assert!(f.tracking.query_by_block(2).unwrap().txs.is_empty());
    }

    #[test]
    fn test_allocate_prunes_outside_retention() {
        let f = fixture();
        let old = ctx(1, Some(100));
        f.tracking.begin_transaction(1).unwrap();
        f.keeper.track_fee_rebate_rewards(&old, &stake(3)).unwrap();

        let retention = f.keeper.retention_blocks();
        let mut c = ctx(1 + retention, Some(100));
        f.keeper.allocate_block_rewards(&mut c, 1 + retention).unwrap();
        assert!(f.tracking.query_by_block(1).unwrap().txs.is_empty());
    }
}
