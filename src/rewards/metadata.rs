// src/rewards/metadata.rs
//! Contract metadata (owner and rewards address) and per-contract flat fees.

use super::types::{ContractMetadata, MetadataUpdate, RewardsRecord};
use super::RewardsKeeper;
use crate::address::Address;
use crate::bank::BankKeeper;
use crate::coin::{Coin, Coins};
use crate::context::Context;
use crate::error::{Result, RewardsError};
use crate::events::LedgerEvent;
use crate::registry::ContractRegistry;
use log::debug;

impl RewardsKeeper {
    pub fn contract_metadata(&self, contract: &Address) -> Result<Option<ContractMetadata>> {
        Ok(self.metadata_state().get(contract)?)
    }

    /// Create or update the metadata of `contract`.
    ///
    /// The first write must come from the contract admin, who becomes the
    /// owner unless `update.owner` names another one. Later writes must come
    /// from the current owner.
    pub fn set_contract_metadata(
        &self,
        ctx: &mut Context,
        sender: &Address,
        contract: &Address,
        update: MetadataUpdate,
    ) -> Result<ContractMetadata> {
        let info = self
            .registry
            .contract_info(contract)
            .ok_or(RewardsError::ContractNotFound)?;

        if let Some(rewards_address) = &update.rewards_address {
            if self.bank().is_module_account(rewards_address) {
                return Err(RewardsError::invalid(format!(
                    "rewards address {} is a module account",
                    rewards_address
                )));
            }
        }

        let mut meta = match self.metadata_state().get(contract)? {
            Some(existing) => {
                if existing.owner != *sender {
                    return Err(RewardsError::unauthorized("metadata can only be changed by the contract owner"));
                }
                existing
            }
            None => {
                if info.admin != Some(*sender) {
                    return Err(RewardsError::unauthorized("metadata can only be created by the contract admin"));
                }
                ContractMetadata {
                    contract: *contract,
                    owner: *sender,
                    rewards_address: None,
                }
            }
        };

        if let Some(owner) = update.owner {
            meta.owner = owner;
        }
        if let Some(rewards_address) = update.rewards_address {
            meta.rewards_address = Some(rewards_address);
        }

        self.metadata_state().set(&meta)?;
        ctx.events.emit(LedgerEvent::ContractMetadataSet {
            contract: *contract,
            metadata: meta.clone(),
        });
        Ok(meta)
    }

    pub fn flat_fee(&self, contract: &Address) -> Result<Option<Coin>> {
        Ok(self.flat_fee_state().get(contract)?)
    }

    /// Set the flat fee of `contract`; a zero amount removes it.
    pub fn set_flat_fee(&self, ctx: &mut Context, sender: &Address, contract: &Address, fee: Coin) -> Result<()> {
        fee.validate().map_err(RewardsError::InvalidRequest)?;
        let meta = self
            .metadata_state()
            .get(contract)?
            .ok_or(RewardsError::MetadataNotFound)?;
        if meta.owner != *sender {
            return Err(RewardsError::unauthorized("flat fee can only be set by the contract owner"));
        }

        if fee.is_zero() {
            self.flat_fee_state().remove(contract)?;
        } else {
            self.flat_fee_state().set(contract, &fee)?;
        }
        ctx.events.emit(LedgerEvent::ContractFlatFeeSet {
            contract: *contract,
            flat_fee: fee,
        });
        Ok(())
    }

    /// Credit collected flat fees to the contract's rewards address.
    ///
    /// The fees must already sit in the rewards pool. Without metadata or a
    /// rewards address nothing is credited and the fees stay there.
    pub fn create_flat_fee_charge(&self, ctx: &Context, contract: &Address, fees: &Coins) -> Result<Option<RewardsRecord>> {
        if fees.is_empty() {
            return Ok(None);
        }
        let rewards_address = match self.metadata_state().get(contract)? {
            Some(ContractMetadata {
                rewards_address: Some(addr),
                ..
            }) => addr,
            _ => {
                debug!("flat fee {} of {} not credited: no rewards address", fees, contract);
                return Ok(None);
            }
        };
        let record = self.create_rewards_record(ctx, rewards_address, fees.clone())?;
        debug!("flat fee {} of {} credited as record {}", fees, contract, record.id);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::bank::REWARDS_COLLECTOR;
    use crate::registry::ContractInfo;

    fn deploy(f: &Fixture, contract: Address, admin: Option<Address>) {
        f.registry.register(
            contract,
            ContractInfo {
                code_id: 1,
                creator: addr(99),
                admin,
            },
        );
    }

    #[test]
    fn test_only_admin_creates_metadata() {
        let f = fixture();
        let (contract, admin, other) = (addr(1), addr(2), addr(3));
        deploy(&f, contract, Some(admin));
        let mut c = ctx(1, None);

        let err = f
            .keeper
            .set_contract_metadata(&mut c, &other, &contract, MetadataUpdate::default())
            .unwrap_err();
        assert!(matches!(err, RewardsError::Unauthorized(_)));

        let meta = f
            .keeper
            .set_contract_metadata(&mut c, &admin, &contract, MetadataUpdate::default())
            .unwrap();
        assert_eq!(meta.owner, admin);
        assert!(!meta.has_rewards_address());
        assert_eq!(c.events.count_of("contract_metadata_set"), 1);
    }

    #[test]
    fn test_unknown_contract_rejected() {
        let f = fixture();
        let mut c = ctx(1, None);
        let err = f
            .keeper
            .set_contract_metadata(&mut c, &addr(2), &addr(1), MetadataUpdate::default())
            .unwrap_err();
        assert!(matches!(err, RewardsError::ContractNotFound));
    }

    #[test]
    fn test_owner_transfer() {
        let f = fixture();
        let (contract, admin, new_owner) = (addr(1), addr(2), addr(3));
        f.contract_with_rewards(contract, admin, None);
        let mut c = ctx(1, None);

        f.keeper
            .set_contract_metadata(
                &mut c,
                &admin,
                &contract,
                MetadataUpdate {
                    owner: Some(new_owner),
                    rewards_address: None,
                },
            )
            .unwrap();

        // the admin lost control
        assert!(f
            .keeper
            .set_contract_metadata(&mut c, &admin, &contract, MetadataUpdate::default())
            .is_err());

        let meta = f
            .keeper
            .set_contract_metadata(
                &mut c,
                &new_owner,
                &contract,
                MetadataUpdate {
                    owner: None,
                    rewards_address: Some(addr(4)),
                },
            )
            .unwrap();
        assert_eq!(meta.rewards_address, Some(addr(4)));
        assert_eq!(meta.owner, new_owner);
    }

    #[test]
    fn test_module_account_cannot_receive_rewards() {
        let f = fixture();
        let (contract, admin) = (addr(1), addr(2));
        deploy(&f, contract, Some(admin));
        let mut c = ctx(1, None);
        let err = f
            .keeper
            .set_contract_metadata(
                &mut c,
                &admin,
                &contract,
                MetadataUpdate {
                    owner: None,
                    rewards_address: Some(Address::module(REWARDS_COLLECTOR)),
                },
            )
            .unwrap_err();
        assert!(matches!(err, RewardsError::InvalidRequest(_)));
    }

    #[test]
    fn test_flat_fee_set_and_remove() {
        let f = fixture();
        let (contract, owner) = (addr(1), addr(2));
        let mut c = ctx(1, None);
        assert!(matches!(
            f.keeper
                .set_flat_fee(&mut c, &owner, &contract, Coin::new("stake", 5)),
            Err(RewardsError::MetadataNotFound)
        ));

        f.contract_with_rewards(contract, owner, Some(addr(3)));
        assert!(f
            .keeper
            .set_flat_fee(&mut c, &addr(7), &contract, Coin::new("stake", 5))
            .is_err());

        f.keeper
            .set_flat_fee(&mut c, &owner, &contract, Coin::new("stake", 5))
            .unwrap();
        assert_eq!(f.keeper.flat_fee(&contract).unwrap(), Some(Coin::new("stake", 5)));

        f.keeper
            .set_flat_fee(&mut c, &owner, &contract, Coin::zero("stake"))
            .unwrap();
        assert!(f.keeper.flat_fee(&contract).unwrap().is_none());
        assert_eq!(c.events.count_of("contract_flat_fee_set"), 2);
    }

    #[test]
    fn test_flat_fee_charge_creates_record() {
        let f = fixture();
        let (contract, payee) = (addr(1), addr(3));
        f.contract_with_rewards(contract, addr(2), Some(payee));
        let c = ctx(6, None);

        let record = f
            .keeper
            .create_flat_fee_charge(&c, &contract, &stake(5))
            .unwrap()
            .unwrap();
        assert_eq!(record.rewards_address, payee);
        assert_eq!(record.calculated_height, 6);

        assert!(f
            .keeper
            .create_flat_fee_charge(&c, &addr(9), &stake(5))
            .unwrap()
            .is_none());
    }
}
