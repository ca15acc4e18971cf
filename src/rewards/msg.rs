// src/rewards/msg.rs
//! Rewards messages and their handler.

use super::types::{ContractMetadata, MetadataUpdate, WithdrawOutcome};
use super::RewardsKeeper;
use crate::address::Address;
use crate::coin::Coin;
use crate::context::Context;
use crate::error::{Result, RewardsError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardsMsg {
    SetContractMetadata {
        sender: Address,
        contract: Address,
        #[serde(default)]
        owner: Option<Address>,
        #[serde(default)]
        rewards_address: Option<Address>,
    },
    SetFlatFee {
        sender: Address,
        contract: Address,
        flat_fee: Coin,
    },
    /// Exactly one of `records_limit` and `record_ids` must be set.
    WithdrawRewards {
        rewards_address: Address,
        #[serde(default)]
        records_limit: Option<u64>,
        #[serde(default)]
        record_ids: Option<Vec<u64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MsgResponse {
    ContractMetadata { metadata: ContractMetadata },
    FlatFee,
    Withdraw(WithdrawOutcome),
}

impl RewardsMsg {
    /// Stateless checks done before any state is read.
    pub fn validate_basic(&self) -> Result<()> {
        match self {
            RewardsMsg::SetContractMetadata {
                owner,
                rewards_address,
                ..
            } => {
                if owner.is_none() && rewards_address.is_none() {
                    return Err(RewardsError::invalid("metadata update sets nothing"));
                }
                Ok(())
            }
            RewardsMsg::SetFlatFee { flat_fee, .. } => {
                flat_fee.validate().map_err(RewardsError::InvalidRequest)
            }
            RewardsMsg::WithdrawRewards {
                records_limit,
                record_ids,
                ..
            } => match (records_limit, record_ids) {
                (Some(_), Some(_)) => Err(RewardsError::invalid(
                    "records_limit and record_ids are mutually exclusive",
                )),
                (None, None) => Err(RewardsError::invalid(
                    "one of records_limit or record_ids must be set",
                )),
                (None, Some(ids)) if ids.is_empty() => {
                    Err(RewardsError::invalid("record_ids is empty"))
                }
                (None, Some(ids)) if ids.contains(&0) => {
                    Err(RewardsError::invalid("record_ids: zero id"))
                }
                _ => Ok(()),
            },
        }
    }
}

impl RewardsKeeper {
    pub fn handle_msg(&self, ctx: &mut Context, msg: RewardsMsg) -> Result<MsgResponse> {
        msg.validate_basic()?;
        match msg {
            RewardsMsg::SetContractMetadata {
                sender,
                contract,
                owner,
                rewards_address,
            } => {
                let metadata = self.set_contract_metadata(
                    ctx,
                    &sender,
                    &contract,
                    MetadataUpdate {
                        owner,
                        rewards_address,
                    },
                )?;
                Ok(MsgResponse::ContractMetadata { metadata })
            }
            RewardsMsg::SetFlatFee {
                sender,
                contract,
                flat_fee,
            } => {
                self.set_flat_fee(ctx, &sender, &contract, flat_fee)?;
                Ok(MsgResponse::FlatFee)
            }
            RewardsMsg::WithdrawRewards {
                rewards_address,
                records_limit,
                record_ids,
            } => {
                let outcome = match (records_limit, record_ids) {
                    (Some(limit), None) => {
                        self.withdraw_rewards_by_limit(ctx, &rewards_address, limit)?
                    }
                    (None, Some(ids)) => self.withdraw_rewards_by_ids(ctx, &rewards_address, &ids)?,
                    _ => return Err(RewardsError::invalid("invalid withdraw request mode")),
                };
                Ok(MsgResponse::Withdraw(outcome))
            }
        }
    }
}
