// src/rewards/state.rs
//! Storage layout for rewards state.
//!
//! ```text
//! 0x10 | contract                 -> ContractMetadata
//! 0x11 | height                   -> BlockRewards
//! 0x12 0x01 | tx_id               -> TxRewards
//! 0x12 0x02 | height | tx_id      -> ()               block index
//! 0x13 0x00                       -> last RewardsRecord id
//! 0x13 0x01 | id                  -> RewardsRecord
//! 0x13 0x02 | address | id        -> ()               address index
//! 0x14                            -> minimum consensus fee (DecCoin)
//! 0x15 | contract                 -> flat fee (Coin)
//! 0x16                            -> RewardsParams
//! ```

use super::types::{BlockRewards, ContractMetadata, RewardsParams, RewardsRecord, TxRewards};
use crate::address::{Address, ADDRESS_LEN};
use crate::coin::{Coin, Coins, DecCoin};
use crate::storage::{
    decode_height, decode_u64, encode_height, encode_u64, get_counter, get_json, key, put_json,
    scan_json, Store, StoreBatch,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

const METADATA_PREFIX: u8 = 0x10;
const BLOCK_REWARDS_PREFIX: u8 = 0x11;
const TX_REWARDS_PREFIX: u8 = 0x12;
const RECORDS_PREFIX: u8 = 0x13;
const MIN_CONS_FEE_KEY: &[u8] = &[0x14];
const FLAT_FEE_PREFIX: u8 = 0x15;
const PARAMS_KEY: &[u8] = &[0x16];

const LAST_ID: u8 = 0x00;
const OBJECTS: u8 = 0x01;
const INDEX: u8 = 0x02;

fn trailing_id(k: &[u8], prefix_len: usize) -> Result<u64> {
    decode_u64(&k[prefix_len..])
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

pub fn get_params(store: &Store) -> Result<RewardsParams> {
    Ok(get_json(store.as_ref(), PARAMS_KEY)?.unwrap_or_default())
}

pub fn set_params(store: &Store, params: &RewardsParams) -> Result<()> {
    put_json(store.as_ref(), PARAMS_KEY, params)
}

// ---------------------------------------------------------------------------
// Contract metadata
// ---------------------------------------------------------------------------

pub struct MetadataState {
    store: Store,
}

impl MetadataState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn key(contract: &Address) -> Vec<u8> {
        key(&[&[METADATA_PREFIX], contract.as_bytes()])
    }

    pub fn get(&self, contract: &Address) -> Result<Option<ContractMetadata>> {
        get_json(self.store.as_ref(), &Self::key(contract))
    }

    pub fn set(&self, meta: &ContractMetadata) -> Result<()> {
        put_json(self.store.as_ref(), &Self::key(&meta.contract), meta)
    }

    pub fn all(&self) -> Result<Vec<ContractMetadata>> {
        scan_json(self.store.as_ref(), &[METADATA_PREFIX])
    }
}

// ---------------------------------------------------------------------------
// Block rewards
// ---------------------------------------------------------------------------

pub struct BlockRewardsState {
    store: Store,
}

impl BlockRewardsState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn key(height: i64) -> Vec<u8> {
        key(&[&[BLOCK_REWARDS_PREFIX], &encode_height(height)])
    }

    pub fn get(&self, height: i64) -> Result<Option<BlockRewards>> {
        get_json(self.store.as_ref(), &Self::key(height))
    }

    pub fn set(&self, rewards: &BlockRewards) -> Result<()> {
        put_json(self.store.as_ref(), &Self::key(rewards.height), rewards)
    }

    pub fn stage_delete(&self, height: i64, batch: &mut StoreBatch) {
        batch.delete(Self::key(height));
    }

    pub fn all(&self) -> Result<Vec<BlockRewards>> {
        scan_json(self.store.as_ref(), &[BLOCK_REWARDS_PREFIX])
    }
}

// ---------------------------------------------------------------------------
// Tx rewards
// ---------------------------------------------------------------------------

pub struct TxRewardsState {
    store: Store,
}

impl TxRewardsState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn key(tx_id: u64) -> Vec<u8> {
        key(&[&[TX_REWARDS_PREFIX, OBJECTS], &encode_u64(tx_id)])
    }

    fn block_index_prefix(height: i64) -> Vec<u8> {
        key(&[&[TX_REWARDS_PREFIX, INDEX], &encode_height(height)])
    }

    fn block_index_key(height: i64, tx_id: u64) -> Vec<u8> {
        key(&[&Self::block_index_prefix(height), &encode_u64(tx_id)])
    }

    pub fn get(&self, tx_id: u64) -> Result<Option<TxRewards>> {
        get_json(self.store.as_ref(), &Self::key(tx_id))
    }

    pub fn set(&self, rewards: &TxRewards) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put_json(Self::key(rewards.tx_id), rewards)?;
        batch.put_index(Self::block_index_key(rewards.height, rewards.tx_id));
        self.store.write(batch)
    }

    /// Tx rewards of a block in ascending tx id order.
    ///
    /// Panics if the block index points at a missing record.
    pub fn by_block(&self, height: i64) -> Result<Vec<TxRewards>> {
        let prefix = Self::block_index_prefix(height);
        let mut out = Vec::new();
        for (k, _) in self.store.scan_prefix(&prefix)? {
            let tx_id = trailing_id(&k, prefix.len())?;
            match self.get(tx_id)? {
                Some(r) => out.push(r),
                None => panic!(
                    "tx rewards block index corrupted: tx {} at height {} not found",
                    tx_id, height
                ),
            }
        }
        Ok(out)
    }

    pub fn stage_delete_block(&self, height: i64, batch: &mut StoreBatch) -> Result<usize> {
        let prefix = Self::block_index_prefix(height);
        let entries = self.store.scan_prefix(&prefix)?;
        for (k, _) in entries.iter() {
            let tx_id = trailing_id(k, prefix.len())?;
            batch.delete(Self::key(tx_id));
            batch.delete(k.clone());
        }
        Ok(entries.len())
    }

    pub fn all(&self) -> Result<Vec<TxRewards>> {
        scan_json(self.store.as_ref(), &[TX_REWARDS_PREFIX, OBJECTS])
    }
}

// ---------------------------------------------------------------------------
// Rewards records
// ---------------------------------------------------------------------------

pub struct RewardsRecordState {
    store: Store,
}

impl RewardsRecordState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn last_id_key() -> Vec<u8> {
        vec![RECORDS_PREFIX, LAST_ID]
    }

    fn key(id: u64) -> Vec<u8> {
        key(&[&[RECORDS_PREFIX, OBJECTS], &encode_u64(id)])
    }

    fn address_index_prefix(address: &Address) -> Vec<u8> {
        key(&[&[RECORDS_PREFIX, INDEX], address.as_bytes()])
    }

    fn address_index_key(address: &Address, id: u64) -> Vec<u8> {
        key(&[&Self::address_index_prefix(address), &encode_u64(id)])
    }

    pub fn last_id(&self) -> Result<u64> {
        get_counter(self.store.as_ref(), &Self::last_id_key())
    }

    pub fn create(
        &self,
        rewards_address: Address,
        rewards: Coins,
        height: i64,
        time: DateTime<Utc>,
    ) -> Result<RewardsRecord> {
        let id = self.last_id()? + 1;
        let record = RewardsRecord {
            id,
            rewards_address,
            rewards,
            calculated_height: height,
            calculated_time: time,
        };
        let mut batch = StoreBatch::new();
        batch.put_json(Self::key(id), &record)?;
        batch.put_index(Self::address_index_key(&rewards_address, id));
        batch.put_u64(Self::last_id_key(), id);
        self.store.write(batch)?;
        Ok(record)
    }

    pub fn get(&self, id: u64) -> Result<Option<RewardsRecord>> {
        get_json(self.store.as_ref(), &Self::key(id))
    }

    /// Records of one address in ascending id order, at most `limit` of them.
    ///
    /// Panics if the address index points at a missing record.
    pub fn by_address(&self, address: &Address, limit: Option<usize>) -> Result<Vec<RewardsRecord>> {
        let prefix = Self::address_index_prefix(address);
        let mut out = Vec::new();
        for (k, _) in self.store.scan(&prefix, limit)? {
            let id = trailing_id(&k, prefix.len())?;
            match self.get(id)? {
                Some(r) => out.push(r),
                None => panic!(
                    "rewards record index corrupted: record {} of {} not found",
                    id, address
                ),
            }
        }
        Ok(out)
    }

    /// Page through an address's records starting after `start_after`.
    pub fn page_by_address(
        &self,
        address: &Address,
        start_after: u64,
        limit: usize,
    ) -> Result<Vec<RewardsRecord>> {
        let prefix = Self::address_index_prefix(address);
        let mut out = Vec::new();
        for (k, _) in self.store.scan_prefix(&prefix)? {
            let id = trailing_id(&k, prefix.len())?;
            if id <= start_after {
                continue;
            }
            if out.len() >= limit {
                break;
            }
            match self.get(id)? {
                Some(r) => out.push(r),
                None => panic!(
                    "rewards record index corrupted: record {} of {} not found",
                    id, address
                ),
            }
        }
        Ok(out)
    }

    pub fn stage_delete(&self, records: &[RewardsRecord], batch: &mut StoreBatch) {
        for r in records {
            batch.delete(Self::key(r.id));
            batch.delete(Self::address_index_key(&r.rewards_address, r.id));
        }
    }

    pub fn all(&self) -> Result<Vec<RewardsRecord>> {
        scan_json(self.store.as_ref(), &[RECORDS_PREFIX, OBJECTS])
    }

    /// Addresses with at least one record, from the index.
    pub fn addresses(&self) -> Result<Vec<Address>> {
        let prefix = [RECORDS_PREFIX, INDEX];
        let mut out: Vec<Address> = Vec::new();
        for (k, _) in self.store.scan_prefix(&prefix)? {
            let raw = &k[prefix.len()..prefix.len() + ADDRESS_LEN];
            let addr = Address::from_slice(raw)
                .ok_or_else(|| anyhow!("malformed rewards record index key"))?;
            if out.last() != Some(&addr) {
                out.push(addr);
            }
        }
        Ok(out)
    }

    pub fn import(&self, last_id: u64, records: &[RewardsRecord]) -> Result<()> {
        let mut batch = StoreBatch::new();
        for r in records {
            batch.put_json(Self::key(r.id), r)?;
            batch.put_index(Self::address_index_key(&r.rewards_address, r.id));
        }
        batch.put_u64(Self::last_id_key(), last_id);
        self.store.write(batch)
    }
}

// ---------------------------------------------------------------------------
// Minimum consensus fee
// ---------------------------------------------------------------------------

pub fn get_min_consensus_fee(store: &Store) -> Result<Option<DecCoin>> {
    get_json(store.as_ref(), MIN_CONS_FEE_KEY)
}

pub fn set_min_consensus_fee(store: &Store, fee: &DecCoin) -> Result<()> {
    put_json(store.as_ref(), MIN_CONS_FEE_KEY, fee)
}

// ---------------------------------------------------------------------------
// Flat fees
// ---------------------------------------------------------------------------

pub struct FlatFeeState {
    store: Store,
}

impl FlatFeeState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn key(contract: &Address) -> Vec<u8> {
        key(&[&[FLAT_FEE_PREFIX], contract.as_bytes()])
    }

    pub fn get(&self, contract: &Address) -> Result<Option<Coin>> {
        get_json(self.store.as_ref(), &Self::key(contract))
    }

    pub fn set(&self, contract: &Address, fee: &Coin) -> Result<()> {
        put_json(self.store.as_ref(), &Self::key(contract), fee)
    }

    pub fn remove(&self, contract: &Address) -> Result<()> {
        self.store.delete(&Self::key(contract))
    }

    pub fn all(&self) -> Result<Vec<(Address, Coin)>> {
        let mut out = Vec::new();
        for (k, v) in self.store.scan_prefix(&[FLAT_FEE_PREFIX])? {
            let contract = Address::from_slice(&k[1..])
                .ok_or_else(|| anyhow!("malformed flat fee key"))?;
            out.push((contract, serde_json::from_slice::<Coin>(&v)?));
        }
        Ok(out)
    }
}

/// Heights that still have block rewards stored.
pub fn block_rewards_heights(store: &Store) -> Result<Vec<i64>> {
    store
        .scan_prefix(&[BLOCK_REWARDS_PREFIX])?
        .into_iter()
        .map(|(k, _)| decode_height(&k[1..]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn stake(amount: u128) -> Coins {
        Coins::from_coin(Coin::new("stake", amount))
    }

    #[test]
    fn test_records_indexed_by_address() {
        let store = MemoryStore::shared();
        let records = RewardsRecordState::new(store);
        let x = Address([1; 32]);
        let y = Address([2; 32]);

        records.create(x, stake(1), 1, t0()).unwrap();
        records.create(y, stake(2), 1, t0()).unwrap();
        records.create(x, stake(3), 2, t0()).unwrap();

        let of_x: Vec<u64> = records.by_address(&x, None).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(of_x, vec![1, 3]);
        assert_eq!(records.by_address(&x, Some(1)).unwrap().len(), 1);
        assert_eq!(records.page_by_address(&x, 1, 10).unwrap()[0].id, 3);
        assert_eq!(records.addresses().unwrap(), vec![x, y]);
        assert_eq!(records.last_id().unwrap(), 3);
    }

    #[test]
    fn test_tx_rewards_block_cascade() {
        let store = MemoryStore::shared();
        let state = TxRewardsState::new(store.clone());
        for (tx_id, height) in [(1u64, 5i64), (2, 5), (3, 6)] {
            state
                .set(&TxRewards {
                    tx_id,
                    height,
                    fee_rewards: stake(10),
                })
                .unwrap();
        }
        assert_eq!(state.by_block(5).unwrap().len(), 2);

        let mut batch = StoreBatch::new();
        assert_eq!(state.stage_delete_block(5, &mut batch).unwrap(), 2);
        store.write(batch).unwrap();

        assert!(state.by_block(5).unwrap().is_empty());
        assert!(state.get(1).unwrap().is_none());
        assert!(state.get(3).unwrap().is_some());
    }

    #[test]
    fn test_flat_fee_roundtrip() {
        let state = FlatFeeState::new(MemoryStore::shared());
        let contract = Address([4; 32]);
        state.set(&contract, &Coin::new("stake", 7)).unwrap();
        assert_eq!(state.all().unwrap(), vec![(contract, Coin::new("stake", 7))]);
        state.remove(&contract).unwrap();
        assert!(state.get(&contract).unwrap().is_none());
    }

    #[test]
    fn test_block_rewards_heights() {
        let store = MemoryStore::shared();
        let state = BlockRewardsState::new(store.clone());
        for h in [3i64, 1, 2] {
            state
                .set(&BlockRewards {
                    height: h,
                    inflation_rewards: Coin::new("stake", 1),
                    max_gas: 10,
                })
                .unwrap();
        }
        assert_eq!(block_rewards_heights(&store).unwrap(), vec![1, 2, 3]);
    }
}
