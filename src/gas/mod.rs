// src/gas/mod.rs
//! Gas metering and nested session tracking for contract calls.

pub mod adjust;
pub mod contract_meter;
pub mod meter;
pub mod session;

/// Gas units.
pub type Gas = u64;

pub use adjust::{ContractOperation, FnAdjuster, GasAdjuster, NoopAdjuster};
pub use contract_meter::ContractGasMeter;
pub use meter::{BasicGasMeter, GasMeter, InfiniteGasMeter};
pub use session::{
    ContractGasRecord, GasSessionStack, SessionRecord, TerminatedSessions, VmUsage,
};
