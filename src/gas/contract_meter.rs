// src/gas/contract_meter.rs
//! Gas meter bound to one contract invocation.

use super::adjust::{ContractOperation, GasAdjuster};
use super::meter::GasMeter;
use super::Gas;
use crate::address::Address;
use crate::error::GasError;
use std::fmt;
use std::sync::Arc;

/// Wraps another meter and passes every consume/refund through a
/// [`GasAdjuster`]. The wrapped meter sees billed gas; this meter also keeps
/// the raw requested total so both can be reported per contract.
pub struct ContractGasMeter {
    contract: Address,
    operation: ContractOperation,
    adjuster: Arc<dyn GasAdjuster>,
    underlying: Box<dyn GasMeter>,
    requested: Gas,
    billed: Gas,
}

impl ContractGasMeter {
    pub fn new(
        contract: Address,
        operation: ContractOperation,
        underlying: Box<dyn GasMeter>,
        adjuster: Arc<dyn GasAdjuster>,
    ) -> Self {
        Self {
            contract,
            operation,
            adjuster,
            underlying,
            requested: 0,
            billed: 0,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn operation(&self) -> ContractOperation {
        self.operation
    }

    /// Raw gas requested by the contract, before adjustment.
    pub fn gas_requested(&self) -> Gas {
        self.requested
    }

    /// Gas actually billed after adjustment.
    pub fn gas_billed(&self) -> Gas {
        self.billed
    }

    /// Charge gas to the wrapped meter without adjustment and without
    /// touching this contract's own counters. Used when a nested session
    /// hands its total back to its caller.
    pub fn consume_raw(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        self.underlying.consume_gas(amount, descriptor)
    }

    /// Release the wrapped meter.
    pub fn into_inner(self) -> Box<dyn GasMeter> {
        self.underlying
    }
}

impl GasMeter for ContractGasMeter {
    /// Total seen by the wrapped meter, including nested sessions folded in.
    fn gas_consumed(&self) -> Gas {
        self.underlying.gas_consumed()
    }

    fn limit(&self) -> Gas {
        self.underlying.limit()
    }

    fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let billed = self.adjuster.adjust(self.operation, amount);
        self.requested = self.requested.saturating_add(amount);
        self.billed = self.billed.saturating_add(billed);
        self.underlying.consume_gas(billed, descriptor)
    }

    /// Only this contract's own billed gas can be refunded; gas handed back
    /// by nested sessions stays charged.
    fn refund_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        let billed = self.adjuster.adjust(self.operation, amount);
        if billed > self.billed {
            return Err(GasError::RefundExceedsConsumed {
                descriptor: descriptor.to_string(),
                refund: billed,
                consumed: self.billed,
            });
        }
        self.underlying.refund_gas(billed, descriptor)?;
        self.requested = self.requested.saturating_sub(amount);
        self.billed -= billed;
        Ok(())
    }
}

impl fmt::Debug for ContractGasMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractGasMeter")
            .field("contract", &self.contract)
            .field("operation", &self.operation)
            .field("requested", &self.requested)
            .field("billed", &self.billed)
            .field("consumed", &self.underlying.gas_consumed())
            .field("limit", &self.underlying.limit())
            .finish()
    }
}
