// src/rewards/invariants.rs
//! Rewards pool invariant: the pool must cover every withdrawable record.

use super::RewardsKeeper;
use crate::coin::Coins;
use anyhow::Result;
use log::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantReport {
    pub pool: Coins,
    /// Sum of all stored rewards records.
    pub expected: Coins,
    pub records: u64,
    pub broken: bool,
}

impl InvariantReport {
    /// Rounding dust held by the pool on top of the records.
    pub fn surplus(&self) -> Option<Coins> {
        self.pool.checked_sub(&self.expected)
    }
}

impl fmt::Display for InvariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rewards pool balance: {}; {} record(s) total: {}",
            if self.pool.is_empty() { "0".to_string() } else { self.pool.to_string() },
            self.records,
            if self.expected.is_empty() { "0".to_string() } else { self.expected.to_string() }
        )
    }
}

impl RewardsKeeper {
    /// Compare the pool balance with the records it backs.
    pub fn module_account_balance_invariant(&self) -> Result<InvariantReport> {
        let records = self.records_state().all()?;
        let expected = records
            .iter()
            .fold(Coins::new(), |acc, r| acc.add(&r.rewards));
        let pool = self.bank().module_balance(crate::bank::REWARDS_COLLECTOR)?;
        let broken = !pool.is_all_gte(&expected);
        Ok(InvariantReport {
            pool,
            expected,
            records: records.len() as u64,
            broken,
        })
    }

    /// Halt if the pool cannot cover the records.
    pub fn assert_invariants(&self) -> Result<InvariantReport> {
        let report = self.module_account_balance_invariant()?;
        if report.broken {
            error!("rewards invariant broken: {}", report);
            panic!("rewards module account balance invariant broken: {}", report);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;

    #[test]
    fn test_balanced_pool_with_dust() {
        let f = fixture();
        let c = ctx(1, None);
        f.keeper.create_rewards_record(&c, addr(1), stake(10)).unwrap();
        f.fund_pool(&stake(11));

        let report = f.keeper.assert_invariants().unwrap();
        assert!(!report.broken);
        assert_eq!(report.surplus().unwrap().amount_of("stake"), 1);
    }

    #[test]
    fn test_records_with_empty_pool_are_broken() {
        let f = fixture();
        let c = ctx(1, None);
        f.keeper.create_rewards_record(&c, addr(1), stake(10)).unwrap();
        assert!(f.keeper.module_account_balance_invariant().unwrap().broken);
    }

    #[test]
    #[should_panic(expected = "invariant broken")]
    fn test_short_pool_halts() {
        let f = fixture();
        let c = ctx(1, None);
        f.keeper.create_rewards_record(&c, addr(1), stake(10)).unwrap();
        f.fund_pool(&stake(9));
        let _ = f.keeper.assert_invariants();
    }
}
