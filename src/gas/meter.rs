// src/gas/meter.rs
//! Plain gas meters.

use super::Gas;
use crate::error::GasError;

/// Gas meter interface shared by block, transaction and contract meters.
pub trait GasMeter: Send {
    /// Gas consumed so far.
    fn gas_consumed(&self) -> Gas;

    fn limit(&self) -> Gas;

    /// Add `amount`. Consumption is recorded even when the limit is
    /// exceeded, and the error is returned afterwards.
    fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError>;

    /// Give back previously consumed gas.
    fn refund_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError>;

    fn gas_remaining(&self) -> Gas {
        self.limit().saturating_sub(self.gas_consumed())
    }

    fn is_past_limit(&self) -> bool {
        self.gas_consumed() > self.limit()
    }

    fn is_out_of_gas(&self) -> bool {
        self.gas_consumed() >= self.limit()
    }
}

/// Meter with a hard limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicGasMeter {
    limit: Gas,
    consumed: Gas,
}

impl BasicGasMeter {
    pub fn new(limit: Gas) -> Self {
        Self { limit, consumed: 0 }
    }
}

impl GasMeter for BasicGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed
    }

    fn limit(&self) -> Gas {
        self.limit
    }

    fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        self.consumed = match self.consumed.checked_add(amount) {
            Some(v) => v,
            None => {
                self.consumed = Gas::MAX;
                return Err(GasError::Overflow {
                    descriptor: descriptor.to_string(),
                });
            }
        };

        if self.consumed > self.limit {
            return Err(GasError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit: self.limit,
                consumed: self.consumed,
            });
        }
        Ok(())
    }

    fn refund_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        if amount > self.consumed {
            return Err(GasError::RefundExceedsConsumed {
                descriptor: descriptor.to_string(),
                refund: amount,
                consumed: self.consumed,
            });
        }
        self.consumed -= amount;
        Ok(())
    }
}

/// Meter without a limit (genesis, queries run by the node itself).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfiniteGasMeter {
    consumed: Gas,
}

impl InfiniteGasMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GasMeter for InfiniteGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed
    }

    fn limit(&self) -> Gas {
        Gas::MAX
    }

    fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        self.consumed = self
            .consumed
            .checked_add(amount)
            .ok_or_else(|| GasError::Overflow {
                descriptor: descriptor.to_string(),
            })?;
        Ok(())
    }

    fn refund_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), GasError> {
        if amount > self.consumed {
            return Err(GasError::RefundExceedsConsumed {
                descriptor: descriptor.to_string(),
                refund: amount,
                consumed: self.consumed,
            });
        }
        self.consumed -= amount;
        Ok(())
    }

    fn is_past_limit(&self) -> bool {
        false
    }

    fn is_out_of_gas(&self) -> bool {
        false
    }
}
