// src/gas/session.rs
//! Nested gas sessions for one transaction or query evaluation.
//!
//! Every contract call frame gets its own [`ContractGasMeter`]. When a frame
//! returns, everything it billed (its own gas, store gas reported by the VM
//! and whatever its nested calls handed back) is charged to the caller's
//! wrapped meter. The outermost meter wraps the root meter, so the root sees
//! the aggregate while each frame is attributed only its own usage.

use super::adjust::ContractOperation;
use super::contract_meter::ContractGasMeter;
use super::meter::GasMeter;
use super::Gas;
use crate::address::Address;
use crate::error::SessionError;
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// VM-reported usage for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmUsage {
    pub original_vm_gas: Gas,
    pub billed_vm_gas: Gas,
    pub original_store_gas: Gas,
    pub billed_store_gas: Gas,
}

/// Immutable summary of a closed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub contract: Address,
    pub operation: ContractOperation,
    /// Requested meter gas plus original store gas.
    pub original_sdk_gas: Gas,
    /// Billed meter gas plus billed store gas.
    pub billed_sdk_gas: Gas,
    pub original_vm_gas: Gas,
    pub billed_vm_gas: Gas,
}

/// VM and SDK gas attributed to one contract operation, ready for the
/// usage ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGasRecord {
    pub contract: Address,
    pub operation: ContractOperation,
    pub original_vm_gas: Gas,
    pub original_sdk_gas: Gas,
}

/// Output of [`GasSessionStack::terminate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminatedSessions {
    /// Nested call records, innermost first.
    pub sub_calls: Vec<SessionRecord>,
    /// Record of the outermost call.
    pub top_level: SessionRecord,
}

impl TerminatedSessions {
    /// Records for the usage ledger, sub-calls first.
    pub fn gas_records(&self) -> Vec<ContractGasRecord> {
        self.sub_calls
            .iter()
            .chain(std::iter::once(&self.top_level))
            .map(|r| ContractGasRecord {
                contract: r.contract,
                operation: r.operation,
                original_vm_gas: r.original_vm_gas,
                original_sdk_gas: r.original_sdk_gas,
            })
            .collect()
    }

    pub fn total_billed_sdk_gas(&self) -> Gas {
        self.sub_calls
            .iter()
            .chain(std::iter::once(&self.top_level))
            .map(|r| r.billed_sdk_gas)
            .sum()
    }
}

struct GasSession {
    meter: ContractGasMeter,
    usage: Option<VmUsage>,
    /// Gas handed back by nested sessions.
    nested_gas: Gas,
}

impl GasSession {
    fn new(meter: ContractGasMeter) -> Self {
        Self {
            meter,
            usage: None,
            nested_gas: 0,
        }
    }

    /// Everything this frame costs its caller.
    fn total_billed(&self, usage: &VmUsage) -> Gas {
        self.meter
            .gas_billed()
            .saturating_add(usage.billed_store_gas)
            .saturating_add(self.nested_gas)
    }

    fn record(&self, usage: &VmUsage) -> SessionRecord {
        SessionRecord {
            contract: self.meter.contract(),
            operation: self.meter.operation(),
            original_sdk_gas: self
                .meter
                .gas_requested()
                .saturating_add(usage.original_store_gas),
            billed_sdk_gas: self
                .meter
                .gas_billed()
                .saturating_add(usage.billed_store_gas),
            original_vm_gas: usage.original_vm_gas,
            billed_vm_gas: usage.billed_vm_gas,
        }
    }
}

/// Stack of gas sessions for one execution context.
///
/// Never share one stack between two evaluations; simulations get their own.
#[derive(Default)]
pub struct GasSessionStack {
    sessions: Vec<GasSession>,
    depth: usize,
    pending_limit: Option<Gas>,
    active: bool,
    log: Vec<SessionRecord>,
}

impl GasSessionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Re-entrancy depth: zero while only the outermost session is open.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start tracking. `wrap` receives the root meter and returns the
    /// outermost contract meter around it.
    pub fn initialize<F>(&mut self, root: Box<dyn GasMeter>, wrap: F) -> Result<(), SessionError>
    where
        F: FnOnce(Box<dyn GasMeter>) -> ContractGasMeter,
    {
        if self.active {
            return Err(SessionError::AlreadyInitialized);
        }
        let meter = wrap(root);
        debug!(
            "gas tracking initialized for contract {} ({})",
            meter.contract(),
            meter.operation()
        );
        self.sessions.push(GasSession::new(meter));
        self.depth = 0;
        self.pending_limit = None;
        self.log.clear();
        self.active = true;
        Ok(())
    }

    /// Open a nested call frame with the given gas limit. The meter is
    /// attached by [`GasSessionStack::associate_meter`].
    pub fn create_session(&mut self, gas_limit: Gas) -> Result<(), SessionError> {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        if self.depth != self.sessions.len() - 1 {
            return Err(SessionError::Corrupted {
                depth: self.depth,
                sessions: self.sessions.len(),
            });
        }
        self.depth += 1;
        self.pending_limit = Some(gas_limit);
        Ok(())
    }

    /// Build the meter for the pending session from its gas limit and make
    /// it the active meter.
    pub fn associate_meter<F>(&mut self, factory: F) -> Result<(), SessionError>
    where
        F: FnOnce(Gas) -> ContractGasMeter,
    {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        let limit = self.pending_limit.take().ok_or(SessionError::NoActiveSession)?;
        let meter = factory(limit);
        debug!(
            "gas session opened at depth {} for contract {} (limit {})",
            self.depth,
            meter.contract(),
            limit
        );
        self.sessions.push(GasSession::new(meter));
        Ok(())
    }

    /// Meter of the innermost open session.
    pub fn active_meter(&mut self) -> Result<&mut ContractGasMeter, SessionError> {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        if self.pending_limit.is_some() {
            return Err(SessionError::NoActiveSession);
        }
        self.sessions
            .last_mut()
            .map(|s| &mut s.meter)
            .ok_or(SessionError::NoActiveSession)
    }

    pub fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), SessionError> {
        self.active_meter()?.consume_gas(amount, descriptor)?;
        Ok(())
    }

    pub fn refund_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), SessionError> {
        self.active_meter()?.refund_gas(amount, descriptor)?;
        Ok(())
    }

    /// Attach VM usage to the innermost session. Allowed once per session.
    pub fn record_vm_usage(&mut self, usage: VmUsage) -> Result<(), SessionError> {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        if self.pending_limit.is_some() {
            return Err(SessionError::NoActiveSession);
        }
        let session = self
            .sessions
            .last_mut()
            .ok_or(SessionError::NoActiveSession)?;
        if session.usage.is_some() {
            return Err(SessionError::VmUsageAlreadyRecorded);
        }
        session.usage = Some(usage);
        Ok(())
    }

    /// Close the innermost nested session and charge its total to the
    /// caller's wrapped meter.
    ///
    /// Returns `Ok(None)` when the session was created but never got a meter.
    /// An out-of-gas error from the caller's meter is returned after the
    /// session is closed and logged.
    pub fn destroy_session(&mut self) -> Result<Option<SessionRecord>, SessionError> {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        if self.depth == 0 {
            return Err(SessionError::NoSessionToDestroy);
        }

        if self.pending_limit.is_some() {
            self.pending_limit = None;
            self.depth -= 1;
            debug!("gas session without meter dropped at depth {}", self.depth + 1);
            return Ok(None);
        }

        if self.depth != self.sessions.len() - 1 {
            error!(
                "gas session stack corrupted: depth {}, sessions {}",
                self.depth,
                self.sessions.len()
            );
            return Err(SessionError::Corrupted {
                depth: self.depth,
                sessions: self.sessions.len(),
            });
        }

        let usage = match self.sessions.last().and_then(|s| s.usage) {
            Some(u) => u,
            None => return Err(SessionError::VmUsageMissing),
        };
        let session = match self.sessions.pop() {
            Some(s) => s,
            None => return Err(SessionError::NoSessionToDestroy),
        };
        self.depth -= 1;

        let record = session.record(&usage);
        let handed_back = session.total_billed(&usage);
        self.log.push(record.clone());

        let caller = self
            .sessions
            .last_mut()
            .ok_or(SessionError::InitialMeterMissing)?;
        caller.nested_gas = caller.nested_gas.saturating_add(handed_back);
        caller
            .meter
            .consume_raw(handed_back, "nested contract call")?;

        debug!(
            "gas session closed for contract {}: billed {} (handed back {})",
            record.contract, record.billed_sdk_gas, handed_back
        );
        Ok(Some(record))
    }

    /// Close the outermost session and return every record plus the root
    /// meter. Only legal once all nested sessions are closed.
    ///
    /// If the outermost store gas exhausts the root meter the stack is still
    /// reset, but the records are dropped and the gas error is returned.
    pub fn terminate(&mut self) -> Result<(Box<dyn GasMeter>, TerminatedSessions), SessionError> {
        if !self.active {
            return Err(SessionError::NotInitialized);
        }
        if self.depth != 0 || self.pending_limit.is_some() {
            return Err(SessionError::SessionsInProgress { depth: self.depth });
        }
        match self.sessions.len() {
            0 => return Err(SessionError::InitialMeterMissing),
            1 => {}
            n => return Err(SessionError::MultipleActiveMeters { count: n }),
        }
        let usage = match self.sessions[0].usage {
            Some(u) => u,
            None => return Err(SessionError::VmUsageMissing),
        };

        let session = self.sessions.remove(0);
        let top_level = session.record(&usage);
        let mut root = session.meter.into_inner();

        // Store gas of the outermost frame goes straight to the root; nested
        // totals are already there through the outermost meter.
        let store_result = root.consume_gas(usage.billed_store_gas, "contract store gas");

        let sub_calls = std::mem::take(&mut self.log);
        self.active = false;
        self.depth = 0;

        if let Err(e) = store_result {
            error!("root meter exhausted while closing gas tracking: {}", e);
            return Err(SessionError::Gas(e));
        }

        debug!(
            "gas tracking terminated: {} sub-call record(s), top-level billed {}",
            sub_calls.len(),
            top_level.billed_sdk_gas
        );
        Ok((root, TerminatedSessions { sub_calls, top_level }))
    }
}
