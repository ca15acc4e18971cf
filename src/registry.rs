// src/registry.rs
//! Contract registry lookups (deployed contracts and their admins).

use crate::address::Address;
use parking_lot::RwLock;
use std::collections::BTreeMap;

pub trait ContractRegistry: Send + Sync {
    /// `None` if no contract is deployed at `contract`.
    fn contract_info(&self, contract: &Address) -> Option<ContractInfo>;

    fn contract_admin(&self, contract: &Address) -> Option<Address> {
        self.contract_info(contract).and_then(|i| i.admin)
    }

    fn has_contract(&self, contract: &Address) -> bool {
        self.contract_info(contract).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub code_id: u64,
    pub creator: Address,
    pub admin: Option<Address>,
}

/// Registry backed by a map, filled by the host as contracts are deployed.
#[derive(Default)]
pub struct InMemoryRegistry {
    contracts: RwLock<BTreeMap<Address, ContractInfo>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, contract: Address, info: ContractInfo) {
        self.contracts.write().insert(contract, info);
    }

    pub fn set_admin(&self, contract: &Address, admin: Option<Address>) -> bool {
        match self.contracts.write().get_mut(contract) {
            Some(info) => {
                info.admin = admin;
                true
            }
            None => false,
        }
    }
}

impl ContractRegistry for InMemoryRegistry {
    fn contract_info(&self, contract: &Address) -> Option<ContractInfo> {
        self.contracts.read().get(contract).cloned()
    }
}
