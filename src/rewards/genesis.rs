// src/rewards/genesis.rs
//! Rewards state import/export

use super::types::{BlockRewards, ContractMetadata, FlatFee, RewardsParams, RewardsRecord, TxRewards};
use super::{state, RewardsKeeper};
use crate::coin::DecCoin;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsGenesis {
    pub params: RewardsParams,
    pub contracts_metadata: Vec<ContractMetadata>,
    pub block_rewards: Vec<BlockRewards>,
    pub tx_rewards: Vec<TxRewards>,
    pub min_consensus_fee: Option<DecCoin>,
    pub rewards_record_last_id: u64,
    pub rewards_records: Vec<RewardsRecord>,
    pub flat_fees: Vec<FlatFee>,
}

impl RewardsGenesis {
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.params.validate() {
            bail!("params: {}", e);
        }

        let mut contracts = BTreeSet::new();
        for meta in self.contracts_metadata.iter() {
            if !contracts.insert(meta.contract) {
                bail!("contracts_metadata: duplicated contract {}", meta.contract);
            }
        }

        let mut heights = BTreeSet::new();
        for br in self.block_rewards.iter() {
            if br.height <= 0 {
                bail!("block_rewards: invalid height {}", br.height);
            }
            if !heights.insert(br.height) {
                bail!("block_rewards: duplicated height {}", br.height);
            }
            if let Err(e) = br.inflation_rewards.validate() {
                bail!("block_rewards ({}): {}", br.height, e);
            }
        }

        let mut tx_ids = BTreeSet::new();
        for tx in self.tx_rewards.iter() {
            if tx.tx_id == 0 {
                bail!("tx_rewards: zero tx id");
            }
            if !tx_ids.insert(tx.tx_id) {
                bail!("tx_rewards: duplicated tx id {}", tx.tx_id);
            }
            if let Err(e) = tx.fee_rewards.validate() {
                bail!("tx_rewards ({}): {}", tx.tx_id, e);
            }
        }

        if let Some(fee) = &self.min_consensus_fee {
            if fee.amount.is_negative() {
                bail!("min_consensus_fee: must be GTE 0");
            }
        }

        let mut record_ids = BTreeSet::new();
        for r in self.rewards_records.iter() {
            if r.id == 0 || r.id > self.rewards_record_last_id {
                bail!(
                    "rewards_records: id {} outside 1..={}",
                    r.id,
                    self.rewards_record_last_id
                );
            }
            if !record_ids.insert(r.id) {
                bail!("rewards_records: duplicated id {}", r.id);
            }
        }

        let mut fee_contracts = BTreeSet::new();
        for fee in self.flat_fees.iter() {
            if !contracts.contains(&fee.contract) {
                bail!("flat_fees: contract {} has no metadata", fee.contract);
            }
            if !fee_contracts.insert(fee.contract) {
                bail!("flat_fees: duplicated contract {}", fee.contract);
            }
            if let Err(e) = fee.flat_fee.validate() {
                bail!("flat_fees ({}): {}", fee.contract, e);
            }
        }
        Ok(())
    }
}

impl RewardsKeeper {
    pub fn export_genesis(&self) -> Result<RewardsGenesis> {
        let flat_fees = self
            .flat_fee_state()
            .all()?
            .into_iter()
            .map(|(contract, flat_fee)| FlatFee { contract, flat_fee })
            .collect();
        Ok(RewardsGenesis {
            params: state::get_params(&self.store)?,
            contracts_metadata: self.metadata_state().all()?,
            block_rewards: self.block_rewards_state().all()?,
            tx_rewards: self.tx_rewards_state().all()?,
            min_consensus_fee: state::get_min_consensus_fee(&self.store)?,
            rewards_record_last_id: self.records_state().last_id()?,
            rewards_records: self.records_state().all()?,
            flat_fees,
        })
    }

    pub fn import_genesis(&self, genesis: &RewardsGenesis) -> Result<()> {
        genesis.validate()?;
        state::set_params(&self.store, &genesis.params)?;

        let metadata = self.metadata_state();
        for meta in genesis.contracts_metadata.iter() {
            metadata.set(meta)?;
        }
        let block_rewards = self.block_rewards_state();
        for br in genesis.block_rewards.iter() {
            block_rewards.set(br)?;
        }
        let tx_rewards = self.tx_rewards_state();
        for tx in genesis.tx_rewards.iter() {
            tx_rewards.set(tx)?;
        }
        if let Some(fee) = &genesis.min_consensus_fee {
            state::set_min_consensus_fee(&self.store, fee)?;
        }
        self.records_state()
            .import(genesis.rewards_record_last_id, &genesis.rewards_records)?;
        let flat_fees = self.flat_fee_state();
        for fee in genesis.flat_fees.iter() {
            flat_fees.set(&fee.contract, &fee.flat_fee)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::address::Address;
    use crate::coin::Coin;
    use chrono::{TimeZone, Utc};

    fn record(id: u64, owner: Address) -> RewardsRecord {
        RewardsRecord {
            id,
            rewards_address: owner,
            rewards: stake(id as u128),
            calculated_height: 1,
            calculated_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_default_genesis_is_valid() {
        assert!(RewardsGenesis::default().validate().is_ok());
    }

    #[test]
    fn test_record_beyond_last_id_rejected() {
        let genesis = RewardsGenesis {
            rewards_record_last_id: 1,
            rewards_records: vec![record(2, addr(1))],
            ..Default::default()
        };
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_flat_fee_without_metadata_rejected() {
        let genesis = RewardsGenesis {
            flat_fees: vec![FlatFee {
                contract: addr(1),
                flat_fee: Coin::new("stake", 1),
            }],
            ..Default::default()
        };
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_import_then_export_roundtrip() {
        let genesis = RewardsGenesis {
            params: RewardsParams::default(),
            contracts_metadata: vec![ContractMetadata {
                contract: addr(1),
                owner: addr(2),
                rewards_address: Some(addr(3)),
            }],
            block_rewards: vec![BlockRewards {
                height: 4,
                inflation_rewards: Coin::new("stake", 10),
                max_gas: 100,
            }],
            tx_rewards: vec![TxRewards {
                tx_id: 7,
                height: 4,
                fee_rewards: stake(3),
            }],
            min_consensus_fee: Some(DecCoin::new("stake", crate::math::Dec::with_prec(2, 1))),
            rewards_record_last_id: 9,
            rewards_records: vec![record(2, addr(3)), record(8, addr(5))],
            flat_fees: vec![FlatFee {
                contract: addr(1),
                flat_fee: Coin::new("stake", 4),
            }],
        };

        let f = fixture();
        f.keeper.import_genesis(&genesis).unwrap();
        assert_eq!(f.keeper.export_genesis().unwrap(), genesis);

        // ids continue after the imported counter
        let next = f
            .keeper
            .create_rewards_record(&ctx(5, None), addr(3), stake(1))
            .unwrap();
        assert_eq!(next.id, 10);
    }
}
