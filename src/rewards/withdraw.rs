// src/rewards/withdraw.rs
//! Rewards withdrawal, by record count or by explicit record ids.

use super::types::{RewardsRecord, WithdrawOutcome};
use super::RewardsKeeper;
use crate::address::Address;
use crate::bank::{BankKeeper, REWARDS_COLLECTOR};
use crate::coin::Coins;
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::events::LedgerEvent;
use crate::storage::StoreBatch;
use log::info;
use std::collections::BTreeSet;

impl RewardsKeeper {
    /// Withdraw the oldest `limit` records of `rewards_address`. A zero limit
    /// means the configured maximum.
    pub fn withdraw_rewards_by_limit(
        &self,
        ctx: &mut Context,
        rewards_address: &Address,
        limit: u64,
    ) -> Result<WithdrawOutcome> {
        let max = self.max_withdraw_records()?;
        let limit = if limit == 0 { max } else { limit };
        if limit > max {
            return Err(RewardsError::invalid(format!(
                "max withdraw records ({}) exceeded",
                max
            )));
        }

        let records = self
            .records_state()
            .by_address(rewards_address, Some(limit as usize))?;
        self.withdraw_records(ctx, rewards_address, records)
    }

    /// Withdraw exactly the listed records. Fails without side effects if any
    /// id is unknown, repeated, or owned by another address.
    pub fn withdraw_rewards_by_ids(
        &self,
        ctx: &mut Context,
        rewards_address: &Address,
        ids: &[u64],
    ) -> Result<WithdrawOutcome> {
        let max = self.max_withdraw_records()?;
        if ids.len() as u64 > max {
            return Err(RewardsError::invalid(format!(
                "max withdraw records ({}) exceeded",
                max
            )));
        }

        let state = self.records_state();
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(RewardsError::invalid(format!("duplicated record id {}", id)));
            }
            let record = state
                .get(*id)?
                .ok_or_else(|| RewardsError::invalid(format!("rewards record ({}) not found", id)))?;
            if record.rewards_address != *rewards_address {
                return Err(RewardsError::invalid(format!(
                    "rewards record ({}) address mismatch",
                    id
                )));
            }
            records.push(record);
        }
        self.withdraw_records(ctx, rewards_address, records)
    }

    fn withdraw_records(
        &self,
        ctx: &mut Context,
        rewards_address: &Address,
        records: Vec<RewardsRecord>,
    ) -> Result<WithdrawOutcome> {
        let total = records
            .iter()
            .fold(Coins::new(), |acc, r| acc.add(&r.rewards));

        let mut batch = StoreBatch::new();
        self.records_state().stage_delete(&records, &mut batch);
        self.store.write(batch)?;

        if !total.is_empty() {
            if let Err(e) = self
                .bank()
                .send_from_module(REWARDS_COLLECTOR, rewards_address, &total)
            {
                panic!(
                    "rewards pool cannot cover withdrawal of {} to {}: {}",
                    total, rewards_address, e
                );
            }
            ctx.events.emit(LedgerEvent::RewardsWithdraw {
                rewards_address: *rewards_address,
                rewards: total.clone(),
            });
            info!(
                "withdrew {} from {} record(s) to {}",
                total,
                records.len(),
                rewards_address
            );
        }

        Ok(WithdrawOutcome {
            rewards: total,
            records_num: records.len() as u64,
        })
    }
}
