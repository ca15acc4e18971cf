// src/tracking/genesis.rs
//! Usage ledger import/export

use super::types::{ContractOpUsage, TrackingParams, TxUsage};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingGenesis {
    pub params: TrackingParams,
    pub tx_last_id: u64,
    pub tx_infos: Vec<TxUsage>,
    pub op_last_id: u64,
    pub contract_ops: Vec<ContractOpUsage>,
}

impl TrackingGenesis {
    /// Unique non-zero ids within the last-id counters, and every operation
    /// belongs to a listed transaction.
    pub fn validate(&self) -> Result<()> {
        let mut tx_ids = BTreeSet::new();
        for tx in self.tx_infos.iter() {
            if tx.id == 0 || tx.id > self.tx_last_id {
                bail!("tx_infos: id {} outside 1..={}", tx.id, self.tx_last_id);
            }
            if !tx_ids.insert(tx.id) {
                bail!("tx_infos: duplicated id {}", tx.id);
            }
        }

        let mut op_ids = BTreeSet::new();
        for op in self.contract_ops.iter() {
            if op.id == 0 || op.id > self.op_last_id {
                bail!("contract_ops: id {} outside 1..={}", op.id, self.op_last_id);
            }
            if !op_ids.insert(op.id) {
                bail!("contract_ops: duplicated id {}", op.id);
            }
            if !tx_ids.contains(&op.tx_id) {
                bail!(
                    "contract_ops: op {} references unknown tx {}",
                    op.id,
                    op.tx_id
                );
            }
        }
        Ok(())
    }
}
