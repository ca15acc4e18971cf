// src/tracking/state.rs
//! Storage layout for tracked transactions and contract operations.
//!
//! ```text
//! 0x00 0x00                 -> last TxUsage id
//! 0x00 0x01 | id            -> TxUsage
//! 0x00 0x02 | height | id   -> ()            block index
//! 0x01 0x00                 -> last ContractOpUsage id
//! 0x01 0x01 | id            -> ContractOpUsage
//! 0x01 0x02 | tx_id | id    -> ()            tx index
//! 0x02                      -> TrackingParams
//! ```

use super::types::{ContractOpUsage, TrackingParams, TxUsage};
use crate::address::Address;
use crate::gas::{ContractOperation, Gas};
use crate::storage::{
    decode_u64, encode_height, encode_u64, get_counter, get_json, key, Store, StoreBatch,
};
use anyhow::Result;

const TX_PREFIX: u8 = 0x00;
const OP_PREFIX: u8 = 0x01;
const PARAMS_KEY: &[u8] = &[0x02];

const LAST_ID: u8 = 0x00;
const OBJECTS: u8 = 0x01;
const INDEX: u8 = 0x02;

fn tx_last_id_key() -> Vec<u8> {
    vec![TX_PREFIX, LAST_ID]
}

fn tx_key(id: u64) -> Vec<u8> {
    key(&[&[TX_PREFIX, OBJECTS], &encode_u64(id)])
}

fn tx_block_index_prefix(height: i64) -> Vec<u8> {
    key(&[&[TX_PREFIX, INDEX], &encode_height(height)])
}

fn tx_block_index_key(height: i64, id: u64) -> Vec<u8> {
    key(&[&tx_block_index_prefix(height), &encode_u64(id)])
}

fn op_last_id_key() -> Vec<u8> {
    vec![OP_PREFIX, LAST_ID]
}

fn op_key(id: u64) -> Vec<u8> {
    key(&[&[OP_PREFIX, OBJECTS], &encode_u64(id)])
}

fn op_tx_index_prefix(tx_id: u64) -> Vec<u8> {
    key(&[&[OP_PREFIX, INDEX], &encode_u64(tx_id)])
}

fn op_tx_index_key(tx_id: u64, id: u64) -> Vec<u8> {
    key(&[&op_tx_index_prefix(tx_id), &encode_u64(id)])
}

/// Ids stored as the trailing 8 bytes of index keys.
fn ids_from_index(store: &Store, prefix: &[u8]) -> Result<Vec<u64>> {
    store
        .scan_prefix(prefix)?
        .into_iter()
        .map(|(k, _)| decode_u64(&k[prefix.len()..]))
        .collect()
}

/// Transaction usage records.
pub struct TxUsageState {
    store: Store,
}

impl TxUsageState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn last_id(&self) -> Result<u64> {
        get_counter(self.store.as_ref(), &tx_last_id_key())
    }

    /// Allocate the next id and store an empty record for `height`.
    pub fn create_empty(&self, height: i64) -> Result<TxUsage> {
        let id = self.last_id()? + 1;
        let tx = TxUsage {
            id,
            height,
            total_gas: 0,
        };
        let mut batch = StoreBatch::new();
        batch.put_json(tx_key(id), &tx)?;
        batch.put_index(tx_block_index_key(height, id));
        batch.put_u64(tx_last_id_key(), id);
        self.store.write(batch)?;
        Ok(tx)
    }

    pub fn get(&self, id: u64) -> Result<Option<TxUsage>> {
        get_json(self.store.as_ref(), &tx_key(id))
    }

    /// Overwrite an existing record; the height (and so the index) is fixed.
    pub fn set(&self, tx: &TxUsage) -> Result<()> {
        let mut batch = StoreBatch::new();
        batch.put_json(tx_key(tx.id), tx)?;
        self.store.write(batch)
    }

    /// All transactions for a height in ascending id order.
    ///
    /// Panics if the block index points at a missing record.
    pub fn by_block(&self, height: i64) -> Result<Vec<TxUsage>> {
        let ids = ids_from_index(&self.store, &tx_block_index_prefix(height))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id)? {
                Some(tx) => out.push(tx),
                None => panic!(
                    "tracking block index corrupted: tx {} at height {} not found",
                    id, height
                ),
            }
        }
        Ok(out)
    }

    /// Stage deletion of every transaction at `height`; returns the ids.
    pub fn stage_delete_block(&self, height: i64, batch: &mut StoreBatch) -> Result<Vec<u64>> {
        let ids = ids_from_index(&self.store, &tx_block_index_prefix(height))?;
        for id in ids.iter() {
            batch.delete(tx_key(*id));
            batch.delete(tx_block_index_key(height, *id));
        }
        Ok(ids)
    }

    pub fn all(&self) -> Result<Vec<TxUsage>> {
        crate::storage::scan_json(self.store.as_ref(), &[TX_PREFIX, OBJECTS])
    }

    /// Bulk load preserving ids.
    pub fn import(&self, last_id: u64, txs: &[TxUsage]) -> Result<()> {
        let mut batch = StoreBatch::new();
        for tx in txs {
            batch.put_json(tx_key(tx.id), tx)?;
            batch.put_index(tx_block_index_key(tx.height, tx.id));
        }
        batch.put_u64(tx_last_id_key(), last_id);
        self.store.write(batch)
    }
}

/// Contract operation records.
pub struct ContractOpState {
    store: Store,
}

impl ContractOpState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn last_id(&self) -> Result<u64> {
        get_counter(self.store.as_ref(), &op_last_id_key())
    }

    pub fn create(
        &self,
        tx_id: u64,
        contract: Address,
        operation: ContractOperation,
        vm_gas: Gas,
        sdk_gas: Gas,
    ) -> Result<ContractOpUsage> {
        let id = self.last_id()? + 1;
        let op = ContractOpUsage {
            id,
            tx_id,
            contract,
            operation,
            vm_gas,
            sdk_gas,
        };
        let mut batch = StoreBatch::new();
        batch.put_json(op_key(id), &op)?;
        batch.put_index(op_tx_index_key(tx_id, id));
        batch.put_u64(op_last_id_key(), id);
        self.store.write(batch)?;
        Ok(op)
    }

    pub fn get(&self, id: u64) -> Result<Option<ContractOpUsage>> {
        get_json(self.store.as_ref(), &op_key(id))
    }

    /// Operations of one transaction in ascending id order.
    ///
    /// Panics if the tx index points at a missing record.
    pub fn by_tx(&self, tx_id: u64) -> Result<Vec<ContractOpUsage>> {
        let ids = ids_from_index(&self.store, &op_tx_index_prefix(tx_id))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id)? {
                Some(op) => out.push(op),
                None => panic!(
                    "tracking tx index corrupted: contract op {} of tx {} not found",
                    id, tx_id
                ),
            }
        }
        Ok(out)
    }

    pub fn stage_delete_tx(&self, tx_id: u64, batch: &mut StoreBatch) -> Result<()> {
        for id in ids_from_index(&self.store, &op_tx_index_prefix(tx_id))? {
            batch.delete(op_key(id));
            batch.delete(op_tx_index_key(tx_id, id));
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<ContractOpUsage>> {
        crate::storage::scan_json(self.store.as_ref(), &[OP_PREFIX, OBJECTS])
    }

    pub fn import(&self, last_id: u64, ops: &[ContractOpUsage]) -> Result<()> {
        let mut batch = StoreBatch::new();
        for op in ops {
            batch.put_json(op_key(op.id), op)?;
            batch.put_index(op_tx_index_key(op.tx_id, op.id));
        }
        batch.put_u64(op_last_id_key(), last_id);
        self.store.write(batch)
    }
}

pub fn get_params(store: &Store) -> Result<TrackingParams> {
    Ok(get_json(store.as_ref(), PARAMS_KEY)?.unwrap_or_default())
}

pub fn set_params(store: &Store, params: &TrackingParams) -> Result<()> {
    crate::storage::put_json(store.as_ref(), PARAMS_KEY, params)
}
