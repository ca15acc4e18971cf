// src/events.rs
//! Events emitted during block processing.
//!
//! Event order is part of the replicated output, so events are collected in
//! emission order and never reordered.

use crate::address::Address;
use crate::coin::{Coin, Coins, DecCoin};
use crate::rewards::types::ContractMetadata;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Emitted for every contract seen during distribution, paid or not.
    ContractRewardCalculation {
        contract: Address,
        gas_consumed: u64,
        inflation_rewards: Option<Coin>,
        fee_rebate_rewards: Coins,
        metadata: Option<ContractMetadata>,
    },
    ContractRewardDistribution {
        contract: Address,
        rewards_address: Address,
        rewards: Coins,
        rewards_record_id: u64,
    },
    RewardsWithdraw {
        rewards_address: Address,
        rewards: Coins,
    },
    MinConsensusFeeSet {
        fee: DecCoin,
    },
    ContractMetadataSet {
        contract: Address,
        metadata: ContractMetadata,
    },
    ContractFlatFeeSet {
        contract: Address,
        flat_fee: Coin,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::ContractRewardCalculation { .. } => "contract_reward_calculation",
            LedgerEvent::ContractRewardDistribution { .. } => "contract_reward_distribution",
            LedgerEvent::RewardsWithdraw { .. } => "rewards_withdraw",
            LedgerEvent::MinConsensusFeeSet { .. } => "min_consensus_fee_set",
            LedgerEvent::ContractMetadataSet { .. } => "contract_metadata_set",
            LedgerEvent::ContractFlatFeeSet { .. } => "contract_flat_fee_set",
        }
    }
}

/// Ordered event sink.
#[derive(Debug, Default, Clone)]
pub struct EventManager {
    events: Vec<LedgerEvent>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: LedgerEvent) {
        debug!("event {}: {:?}", event.kind(), event);
        self.events.push(event);
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Hand the collected events to the caller and start over.
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }
}
