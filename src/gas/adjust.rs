// src/gas/adjust.rs
//! Contract operation kinds and gas adjustment policies.

use super::Gas;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of contract entry point a gas record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractOperation {
    Unspecified,
    Instantiation,
    Execution,
    Query,
    Migrate,
    Sudo,
    Reply,
    Ibc,
}

impl ContractOperation {
    /// Decode a VM operation code. Unknown codes map to `Unspecified`.
    pub fn from_vm_code(code: u64) -> Self {
        match code {
            0 => ContractOperation::Instantiation,
            1 => ContractOperation::Execution,
            2 => ContractOperation::Query,
            3 => ContractOperation::Migrate,
            4 => ContractOperation::Sudo,
            5 => ContractOperation::Reply,
            // channel open/connect/close, packet receive/ack/timeout
            6..=11 => ContractOperation::Ibc,
            _ => ContractOperation::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractOperation::Unspecified => "unspecified",
            ContractOperation::Instantiation => "instantiation",
            ContractOperation::Execution => "execution",
            ContractOperation::Query => "query",
            ContractOperation::Migrate => "migrate",
            ContractOperation::Sudo => "sudo",
            ContractOperation::Reply => "reply",
            ContractOperation::Ibc => "ibc",
        }
    }
}

impl fmt::Display for ContractOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translates requested gas into billed gas for one contract operation.
pub trait GasAdjuster: Send + Sync {
    fn adjust(&self, operation: ContractOperation, raw: Gas) -> Gas;
}

/// Bills exactly what was requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdjuster;

impl GasAdjuster for NoopAdjuster {
    fn adjust(&self, _operation: ContractOperation, raw: Gas) -> Gas {
        raw
    }
}

/// Adjustment policy backed by a closure.
pub struct FnAdjuster<F>(pub F);

impl<F> GasAdjuster for FnAdjuster<F>
where
    F: Fn(ContractOperation, Gas) -> Gas + Send + Sync,
{
    fn adjust(&self, operation: ContractOperation, raw: Gas) -> Gas {
        (self.0)(operation, raw)
    }
}
