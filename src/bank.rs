// src/bank.rs
//! Account balances and module accounts.
//!
//! The ledger only needs transfers out of module accounts, minting into the
//! mint module and balance reads; [`StoreBank`] keeps balances in the same
//! store as the rest of the state.

use crate::address::Address;
use crate::coin::{Coin, Coins};
use crate::storage::{key, Store, StoreBatch};
use anyhow::{bail, Result};
use log::debug;
use std::collections::BTreeSet;

/// Module holding undistributed and not yet withdrawn contract rewards.
pub const REWARDS_COLLECTOR: &str = "rewards_collector";
/// Module receiving ordinary transaction fees.
pub const FEE_COLLECTOR: &str = "fee_collector";
/// Module new inflation is minted into.
pub const MINT_MODULE: &str = "mint";

pub trait BankKeeper: Send + Sync {
    fn balance(&self, address: &Address) -> Result<Coins>;

    /// Move coins between accounts. Fails without side effects when the
    /// sender cannot cover every denom.
    fn send(&self, from: &Address, to: &Address, coins: &Coins) -> Result<()>;

    fn mint(&self, to: &Address, coins: &Coins) -> Result<()>;

    fn is_module_account(&self, address: &Address) -> bool;

    fn module_address(&self, name: &str) -> Address {
        Address::module(name)
    }

    fn send_from_module(&self, module: &str, to: &Address, coins: &Coins) -> Result<()> {
        self.send(&self.module_address(module), to, coins)
    }

    fn send_to_module(&self, from: &Address, module: &str, coins: &Coins) -> Result<()> {
        self.send(from, &self.module_address(module), coins)
    }

    fn send_module_to_module(&self, from: &str, to: &str, coins: &Coins) -> Result<()> {
        self.send(&self.module_address(from), &self.module_address(to), coins)
    }

    fn module_balance(&self, module: &str) -> Result<Coins> {
        self.balance(&self.module_address(module))
    }
}

const BALANCE_PREFIX: u8 = 0x20;

fn balance_prefix(address: &Address) -> Vec<u8> {
    key(&[&[BALANCE_PREFIX], address.as_bytes()])
}

fn balance_key(address: &Address, denom: &str) -> Vec<u8> {
    key(&[&balance_prefix(address), denom.as_bytes()])
}

/// Balances stored as `0x20 | address | denom -> amount`.
pub struct StoreBank {
    store: Store,
    modules: BTreeSet<Address>,
}

impl StoreBank {
    pub fn new(store: Store) -> Self {
        let modules = [REWARDS_COLLECTOR, FEE_COLLECTOR, MINT_MODULE]
            .iter()
            .map(|m| Address::module(m))
            .collect();
        Self { store, modules }
    }

    pub fn register_module(&mut self, name: &str) -> Address {
        let addr = Address::module(name);
        self.modules.insert(addr);
        addr
    }

    fn amount(&self, address: &Address, denom: &str) -> Result<u128> {
        match self.store.get(&balance_key(address, denom))? {
            Some(bytes) => Ok(serde_json::from_slice::<Coin>(&bytes)?.amount),
            None => Ok(0),
        }
    }

    fn stage_amount(&self, batch: &mut StoreBatch, address: &Address, denom: &str, amount: u128) -> Result<()> {
        let k = balance_key(address, denom);
        if amount == 0 {
            batch.delete(k);
        } else {
            batch.put_json(k, &Coin::new(denom, amount))?;
        }
        Ok(())
    }
}

impl BankKeeper for StoreBank {
    fn balance(&self, address: &Address) -> Result<Coins> {
        let mut coins = Coins::new();
        for (_, v) in self.store.scan_prefix(&balance_prefix(address))? {
            coins.add_coin(&serde_json::from_slice::<Coin>(&v)?);
        }
        Ok(coins)
    }

    fn send(&self, from: &Address, to: &Address, coins: &Coins) -> Result<()> {
        if coins.is_empty() || from == to {
            return Ok(());
        }
        let mut batch = StoreBatch::new();
        for coin in coins.iter() {
            let have = self.amount(from, &coin.denom)?;
            if have < coin.amount {
                bail!(
                    "insufficient funds: {} has {}{} but {} is required",
                    from,
                    have,
                    coin.denom,
                    coin
                );
            }
            let receiver = self.amount(to, &coin.denom)?;
            self.stage_amount(&mut batch, from, &coin.denom, have - coin.amount)?;
            self.stage_amount(&mut batch, to, &coin.denom, receiver + coin.amount)?;
        }
        self.store.write(batch)?;
        debug!("bank transfer {} -> {}: {}", from, to, coins);
        Ok(())
    }

    fn mint(&self, to: &Address, coins: &Coins) -> Result<()> {
        let mut batch = StoreBatch::new();
        for coin in coins.iter() {
            let have = self.amount(to, &coin.denom)?;
            self.stage_amount(&mut batch, to, &coin.denom, have + coin.amount)?;
        }
        self.store.write(batch)?;
        debug!("minted {} to {}", coins, to);
        Ok(())
    }

    fn is_module_account(&self, address: &Address) -> bool {
        self.modules.contains(address)
    }
}
