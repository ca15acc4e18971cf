// src/context.rs
//! Per-block execution context threaded through every keeper call.

use crate::events::EventManager;
use crate::gas::Gas;
use chrono::{DateTime, Utc};

/// Height, time and gas limit of the block being processed plus its event
/// sink. One context per evaluation; simulations build their own.
#[derive(Debug, Clone)]
pub struct Context {
    pub height: i64,
    pub time: DateTime<Utc>,
    /// `None` when the block has no gas limit.
    pub block_gas_limit: Option<Gas>,
    pub events: EventManager,
}

impl Context {
    pub fn new(height: i64, time: DateTime<Utc>, block_gas_limit: Option<Gas>) -> Self {
        Self {
            height,
            time,
            block_gas_limit,
            events: EventManager::new(),
        }
    }

    /// Gas limit, with "unlimited" reported as zero.
    pub fn gas_limit_or_zero(&self) -> Gas {
        match self.block_gas_limit {
            Some(limit) if limit != Gas::MAX => limit,
            _ => 0,
        }
    }
}
