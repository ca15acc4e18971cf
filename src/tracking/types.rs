// src/tracking/types.rs
//! Usage ledger records

use crate::address::Address;
use crate::gas::{ContractOperation, Gas};
use serde::{Deserialize, Serialize};

/// One tracked transaction. `total_gas` is filled at block finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxUsage {
    pub id: u64,
    pub height: i64,
    pub total_gas: Gas,
}

/// Gas used by one contract operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOpUsage {
    pub id: u64,
    pub tx_id: u64,
    pub contract: Address,
    pub operation: ContractOperation,
    pub vm_gas: Gas,
    pub sdk_gas: Gas,
}

impl ContractOpUsage {
    /// Combined VM and SDK gas, `None` for a no-op.
    pub fn gas_used(&self) -> Option<Gas> {
        let total = self.vm_gas.saturating_add(self.sdk_gas);
        if total == 0 {
            None
        } else {
            Some(total)
        }
    }
}

/// A transaction with its operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTracking {
    pub info: TxUsage,
    pub operations: Vec<ContractOpUsage>,
}

/// Everything tracked for one block, transactions in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTracking {
    pub txs: Vec<TxTracking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingParams {
    pub gas_tracking_enabled: bool,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            gas_tracking_enabled: true,
        }
    }
}
