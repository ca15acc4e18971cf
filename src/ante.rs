// src/ante.rs
//! Transaction admission: minimum fee check and fee deduction.
//!
//! Fee deduction is where transaction fees meet the usage ledger. The
//! rebate share of a contract transaction is stored under the id of the
//! tracked transaction, so the host must open that transaction
//! (`UsageLedger::begin_transaction`) before calling
//! [`FeeDeduction::deduct_fees`].

use crate::address::Address;
use crate::bank::{BankKeeper, FEE_COLLECTOR, REWARDS_COLLECTOR};
use crate::coin::{split_coins, Coin, Coins};
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::gas::Gas;
use crate::rewards::RewardsKeeper;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Messages as far as fee handling cares about them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxMsg {
    ExecuteContract {
        sender: Address,
        contract: Address,
        #[serde(default)]
        funds: Coins,
    },
    MigrateContract {
        sender: Address,
        contract: Address,
        code_id: u64,
    },
    /// Messages executed on behalf of their signers by a grantee.
    AuthzExec { grantee: Address, msgs: Vec<TxMsg> },
    Other { type_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub fee_payer: Address,
    pub fee: Coins,
    pub gas_limit: Gas,
    pub msgs: Vec<TxMsg>,
}

/// Flat fee owed to one executed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractFlatFee {
    pub contract: Address,
    pub fee: Coin,
}

/// Walk `msg` (and anything it wraps) collecting flat fees of executed
/// contracts. Returns whether a contract execute or migrate was seen.
pub fn contract_flat_fees(keeper: &RewardsKeeper, msg: &TxMsg, out: &mut Vec<ContractFlatFee>) -> Result<bool> {
    match msg {
        TxMsg::MigrateContract { .. } => Ok(true),
        TxMsg::ExecuteContract { contract, .. } => {
            if let Some(fee) = keeper.flat_fee(contract)? {
                out.push(ContractFlatFee {
                    contract: *contract,
                    fee,
                });
            }
            Ok(true)
        }
        TxMsg::AuthzExec { msgs, .. } => {
            let mut has_wasm = false;
            for inner in msgs {
                has_wasm |= contract_flat_fees(keeper, inner, out)?;
            }
            Ok(has_wasm)
        }
        TxMsg::Other { .. } => Ok(false),
    }
}

fn collect_flat_fees(keeper: &RewardsKeeper, tx: &Tx) -> Result<(Vec<ContractFlatFee>, bool)> {
    let mut fees = Vec::new();
    let mut has_wasm = false;
    for msg in tx.msgs.iter() {
        has_wasm |= contract_flat_fees(keeper, msg, &mut fees)?;
    }
    Ok((fees, has_wasm))
}

fn total_flat_fees(fees: &[ContractFlatFee]) -> Coins {
    let mut total = Coins::new();
    for f in fees {
        total.add_coin(&f.fee);
    }
    total
}

/// Where the fee of one transaction went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeSplit {
    pub fee_collector: Coins,
    pub rebate: Coins,
    pub flat_fees: Coins,
}

pub struct FeeDeduction {
    rewards: Arc<RewardsKeeper>,
}

impl FeeDeduction {
    pub fn new(rewards: Arc<RewardsKeeper>) -> Self {
        Self { rewards }
    }

    /// Take the fee from the payer.
    ///
    /// Contract transactions pay their flat fees into the rewards pool and
    /// rebate `tx_fee_rebate_ratio` of the rest to the contracts they
    /// touched; everything else goes to the fee collector.
    pub fn deduct_fees(&self, ctx: &Context, tx: &Tx) -> Result<FeeSplit> {
        if tx.fee.is_empty() {
            return Ok(FeeSplit::default());
        }
        tx.fee.validate().map_err(|e| RewardsError::InsufficientFee {
            paid: tx.fee.to_string(),
            expected: format!("valid fee ({})", e),
        })?;

        let bank = self.rewards.bank();
        let balance = bank.balance(&tx.fee_payer)?;
        if !balance.is_all_gte(&tx.fee) {
            return Err(RewardsError::InsufficientFunds(format!(
                "fee payer {} has {} but the fee is {}",
                tx.fee_payer, balance, tx.fee
            )));
        }

        let (flat_fees, has_wasm) = collect_flat_fees(&self.rewards, tx)?;
        let ratio = self.rewards.tx_fee_rebate_ratio()?;
        if ratio.is_zero() || !has_wasm {
            bank.send_to_module(&tx.fee_payer, FEE_COLLECTOR, &tx.fee)?;
            return Ok(FeeSplit {
                fee_collector: tx.fee.clone(),
                ..Default::default()
            });
        }

        // must resolve before the first transfer
        let tx_id = self.rewards.tracked_tx_id()?;
        let flat_total = total_flat_fees(&flat_fees);
        let remaining = tx
            .fee
            .checked_sub(&flat_total)
            .ok_or_else(|| RewardsError::InsufficientFee {
                paid: tx.fee.to_string(),
                expected: flat_total.to_string(),
            })?;
        if !flat_total.is_empty() {
            bank.send_to_module(&tx.fee_payer, REWARDS_COLLECTOR, &flat_total)?;
            for f in flat_fees.iter() {
                self.rewards
                    .create_flat_fee_charge(ctx, &f.contract, &Coins::from_coin(f.fee.clone()))?;
            }
        }

        let (rebate, auth) = split_coins(&remaining, &ratio);
        if !auth.is_empty() {
            bank.send_to_module(&tx.fee_payer, FEE_COLLECTOR, &auth)?;
        }
        if !rebate.is_empty() {
            bank.send_to_module(&tx.fee_payer, REWARDS_COLLECTOR, &rebate)?;
        }
        self.rewards.track_fee_rebate_rewards_for(ctx, tx_id, &rebate)?;
        debug!(
            "fee {} split: collector {}, rebate {}, flat {}",
            tx.fee, auth, rebate, flat_total
        );

        Ok(FeeSplit {
            fee_collector: auth,
            rebate,
            flat_fees: flat_total,
        })
    }
}

pub struct MinFeeCheck {
    rewards: Arc<RewardsKeeper>,
}

impl MinFeeCheck {
    pub fn new(rewards: Arc<RewardsKeeper>) -> Self {
        Self { rewards }
    }

    /// Fee the transaction has to pay: price of gas times its gas limit
    /// (rounded) plus the flat fees of executed contracts.
    pub fn expected_fee(&self, tx: &Tx) -> Result<Coins> {
        let mut expected = Coins::new();
        let price = self.rewards.computational_price_of_gas()?;
        if !price.is_zero() {
            if tx.gas_limit == 0 {
                return Err(RewardsError::invalid("tx gas limit is not set"));
            }
            let amount = price.amount.mul_u128(tx.gas_limit as u128).round_u128().unwrap_or(0);
            expected.add_coin(&Coin::new(price.denom, amount));
        }
        let (flat_fees, _) = collect_flat_fees(&self.rewards, tx)?;
        Ok(expected.add(&total_flat_fees(&flat_fees)))
    }

    /// Reject a transaction paying less than [`MinFeeCheck::expected_fee`].
    /// Simulations are not checked.
    pub fn check(&self, tx: &Tx, simulate: bool) -> Result<()> {
        if simulate {
            return Ok(());
        }
        let expected = self.expected_fee(tx)?;
        if expected.is_empty() || tx.fee.is_all_gte(&expected) {
            return Ok(());
        }
        Err(RewardsError::InsufficientFee {
            paid: tx.fee.to_string(),
            expected: expected.to_string(),
        })
    }
}
