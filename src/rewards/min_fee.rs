// src/rewards/min_fee.rs
//! Minimum consensus fee: the price of gas at which the fee rebate paid
//! to contracts covers the inflation they receive.

use super::state;
use super::RewardsKeeper;
use crate::coin::{Coin, DecCoin};
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::events::LedgerEvent;
use crate::gas::Gas;
use crate::math::Dec;
use log::{debug, info};

/// `-inflation / (gas_limit * (rebate_ratio - 1))`.
///
/// `None` when there is nothing to derive a floor from: zero inflation, no
/// gas limit, a rebate ratio of exactly 1, or a non-positive result.
pub fn estimate_min_consensus_fee(inflation_amount: u128, block_gas_limit: Gas, fee_rebate_ratio: &Dec) -> Option<Dec> {
    if inflation_amount == 0 || block_gas_limit == 0 {
        return None;
    }
    let ratio_minus_one = fee_rebate_ratio.clone() - Dec::one();
    if ratio_minus_one.is_zero() {
        return None;
    }
    let denominator = Dec::from_u64(block_gas_limit) * ratio_minus_one;
    let fee = -(Dec::from_u128(inflation_amount).checked_quo(&denominator)?);
    if fee.is_positive() {
        Some(fee)
    } else {
        None
    }
}

impl RewardsKeeper {
    /// Recompute the minimum consensus fee from this block's inflation
    /// rewards. Returns the new value, or `None` if the stored one was kept.
    pub fn update_min_consensus_fee(&self, ctx: &mut Context, inflation_rewards: &Coin) -> Result<Option<DecCoin>> {
        if inflation_rewards.is_zero() {
            info!("minimum consensus fee update skipped: inflation rewards are zero");
            return Ok(None);
        }
        let gas_limit = ctx.gas_limit_or_zero();
        if gas_limit == 0 {
            info!("minimum consensus fee update skipped: block gas limit is not set");
            return Ok(None);
        }

        let ratio = self.tx_fee_rebate_ratio()?;
        let amount = match estimate_min_consensus_fee(inflation_rewards.amount, gas_limit, &ratio) {
            Some(amount) => amount,
            None => {
                info!(
                    "minimum consensus fee update skipped: no positive fee for inflation {}, gas limit {}, rebate ratio {}",
                    inflation_rewards, gas_limit, ratio
                );
                return Ok(None);
            }
        };

        let fee = DecCoin::new(inflation_rewards.denom.clone(), amount);
        state::set_min_consensus_fee(&self.store, &fee)?;
        ctx.events
            .emit(LedgerEvent::MinConsensusFeeSet { fee: fee.clone() });
        debug!("minimum consensus fee set to {}", fee);
        Ok(Some(fee))
    }

    /// `None` means no floor is enforced.
    pub fn min_consensus_fee(&self) -> Result<Option<DecCoin>> {
        Ok(state::get_min_consensus_fee(&self.store)?)
    }

    pub fn set_min_consensus_fee(&self, fee: &DecCoin) -> Result<()> {
        if fee.amount.is_negative() {
            return Err(RewardsError::invalid("minimum consensus fee must be GTE 0"));
        }
        crate::coin::validate_denom(&fee.denom).map_err(RewardsError::InvalidRequest)?;
        Ok(state::set_min_consensus_fee(&self.store, fee)?)
    }

    /// Price of one unit of gas: the larger of the configured minimum price
    /// of gas and the minimum consensus fee.
    pub fn computational_price_of_gas(&self) -> Result<DecCoin> {
        let min_price = self.params()?.min_price_of_gas;
        let min_cons_fee = match self.min_consensus_fee()? {
            Some(fee) => fee,
            None => return Ok(min_price),
        };
        if min_cons_fee.denom != min_price.denom {
            return Err(RewardsError::invalid(format!(
                "minimum consensus fee denom {} differs from minimum price of gas denom {}",
                min_cons_fee.denom, min_price.denom
            )));
        }
        if min_cons_fee.amount > min_price.amount {
            Ok(min_cons_fee)
        } else {
            Ok(min_price)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::RewardsParams;
    use super::*;

    #[test]
    fn test_formula_matches_worked_example() {
        let fee = estimate_min_consensus_fee(100, 1_000, &Dec::with_prec(5, 1)).unwrap();
        assert_eq!(fee, Dec::with_prec(2, 1));
    }

    #[test]
    fn test_zero_ratio_still_gives_floor() {
        let fee = estimate_min_consensus_fee(100, 1_000, &Dec::zero()).unwrap();
        assert_eq!(fee, Dec::with_prec(1, 1));
    }

    #[test]
    fn test_skip_branches() {
        let half = Dec::with_prec(5, 1);
        assert!(estimate_min_consensus_fee(0, 1_000, &half).is_none());
        assert!(estimate_min_consensus_fee(100, 0, &half).is_none());
        assert!(estimate_min_consensus_fee(100, 1_000, &Dec::one()).is_none());
        // tiny result truncates to zero
        assert!(estimate_min_consensus_fee(1, u64::MAX - 1, &half).is_none());
    }

    #[test]
    fn test_update_stores_and_emits() {
        let f = fixture();
        let mut c = ctx(2, Some(1_000));
        let fee = f
            .keeper
            .update_min_consensus_fee(&mut c, &Coin::new("stake", 100))
            .unwrap()
            .unwrap();
        assert_eq!(fee.amount, Dec::with_prec(2, 1));
        assert_eq!(f.keeper.min_consensus_fee().unwrap(), Some(fee));
        assert_eq!(c.events.count_of("min_consensus_fee_set"), 1);
    }

    #[test]
    fn test_update_without_gas_limit_keeps_previous() {
        let f = fixture();
        let mut limited = ctx(2, Some(1_000));
        f.keeper
            .update_min_consensus_fee(&mut limited, &Coin::new("stake", 100))
            .unwrap();

        let mut unlimited = ctx(3, None);
        assert!(f
            .keeper
            .update_min_consensus_fee(&mut unlimited, &Coin::new("stake", 500))
            .unwrap()
            .is_none());
        assert_eq!(
            f.keeper.min_consensus_fee().unwrap().unwrap().amount,
            Dec::with_prec(2, 1)
        );
        assert!(unlimited.events.events().is_empty());
    }

    #[test]
    fn test_price_of_gas_takes_the_larger() {
        let f = fixture();
        assert!(f.keeper.computational_price_of_gas().unwrap().is_zero());

        f.keeper
            .set_min_consensus_fee(&DecCoin::new("stake", Dec::with_prec(2, 1)))
            .unwrap();
        assert_eq!(
            f.keeper.computational_price_of_gas().unwrap().amount,
            Dec::with_prec(2, 1)
        );

        let params = RewardsParams {
            min_price_of_gas: DecCoin::new("stake", Dec::with_prec(5, 1)),
            ..Default::default()
        };
        f.keeper.set_params(&params).unwrap();
        assert_eq!(
            f.keeper.computational_price_of_gas().unwrap().amount,
            Dec::with_prec(5, 1)
        );
    }
}
