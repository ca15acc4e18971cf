// src/tracking/mod.rs
//! Usage ledger: per-transaction and per-contract gas records for recent
//! blocks, indexed by block height and by transaction id.

pub mod genesis;
pub mod state;
pub mod types;

pub use genesis::TrackingGenesis;
pub use types::{BlockTracking, ContractOpUsage, TrackingParams, TxTracking, TxUsage};

use crate::address::Address;
use crate::gas::{ContractGasRecord, ContractOperation, Gas};
use crate::storage::{Store, StoreBatch};
use anyhow::{bail, Result};
use log::debug;
use state::{ContractOpState, TxUsageState};

/// Default VM gas units per SDK gas unit.
pub const DEFAULT_VM_GAS_MULTIPLIER: u64 = 140_000_000;

pub struct UsageLedger {
    store: Store,
    txs: TxUsageState,
    ops: ContractOpState,
    vm_gas_multiplier: u64,
}

impl UsageLedger {
    pub fn new(store: Store, vm_gas_multiplier: u64) -> Self {
        Self {
            txs: TxUsageState::new(store.clone()),
            ops: ContractOpState::new(store.clone()),
            store,
            vm_gas_multiplier: vm_gas_multiplier.max(1),
        }
    }

    pub fn params(&self) -> Result<TrackingParams> {
        state::get_params(&self.store)
    }

    pub fn set_params(&self, params: &TrackingParams) -> Result<()> {
        state::set_params(&self.store, params)
    }

    /// Open a record for a new transaction at `height` and return its id.
    /// The id names "the current transaction" until the next call.
    pub fn begin_transaction(&self, height: i64) -> Result<u64> {
        let tx = self.txs.create_empty(height)?;
        debug!("tracking tx {} opened at height {}", tx.id, height);
        Ok(tx.id)
    }

    /// Id of the transaction opened last (0 before the first one).
    pub fn current_tx_id(&self) -> Result<u64> {
        self.txs.last_id()
    }

    pub fn record_contract_operation(
        &self,
        tx_id: u64,
        contract: Address,
        operation: ContractOperation,
        vm_gas: Gas,
        sdk_gas: Gas,
    ) -> Result<ContractOpUsage> {
        if tx_id == 0 {
            bail!("no transaction opened for contract operation on {}", contract);
        }
        let op = self.ops.create(tx_id, contract, operation, vm_gas, sdk_gas)?;
        debug!(
            "tracked {} on {} in tx {}: vm {} sdk {}",
            operation, contract, tx_id, vm_gas, sdk_gas
        );
        Ok(op)
    }

    /// Convert VM gas to SDK units and record one operation per entry for
    /// the current transaction. No-op while tracking is disabled.
    pub fn ingest_gas_records(&self, records: &[ContractGasRecord]) -> Result<()> {
        if !self.params()?.gas_tracking_enabled {
            debug!("gas tracking disabled, dropping {} record(s)", records.len());
            return Ok(());
        }
        let tx_id = self.current_tx_id()?;
        for record in records {
            self.record_contract_operation(
                tx_id,
                record.contract,
                record.operation,
                self.vm_to_sdk_gas(record.original_vm_gas),
                record.original_sdk_gas,
            )?;
        }
        Ok(())
    }

    pub fn vm_to_sdk_gas(&self, vm_gas: Gas) -> Gas {
        vm_gas / self.vm_gas_multiplier
    }

    /// Sum VM and SDK gas of every operation into its transaction.
    pub fn finalize_block(&self, height: i64) -> Result<()> {
        for mut tx in self.txs.by_block(height)? {
            let total = self
                .ops
                .by_tx(tx.id)?
                .iter()
                .fold(0u64, |acc, op| {
                    acc.saturating_add(op.vm_gas).saturating_add(op.sdk_gas)
                });
            tx.total_gas = total;
            self.txs.set(&tx)?;
        }
        Ok(())
    }

    /// Transactions of a block with their operations, ascending ids.
    pub fn query_by_block(&self, height: i64) -> Result<BlockTracking> {
        let infos = self.txs.by_block(height)?;
        let mut txs = Vec::with_capacity(infos.len());
        for info in infos {
            let operations = self.ops.by_tx(info.id)?;
            txs.push(TxTracking { info, operations });
        }
        Ok(BlockTracking { txs })
    }

    pub fn tx_usage(&self, id: u64) -> Result<Option<TxUsage>> {
        self.txs.get(id)
    }

    pub fn contract_op(&self, id: u64) -> Result<Option<ContractOpUsage>> {
        self.ops.get(id)
    }

    /// Delete every transaction and operation at `height` in one batch.
    /// Safe to repeat.
    pub fn prune(&self, height: i64) -> Result<()> {
        let mut batch = StoreBatch::new();
        let tx_ids = self.txs.stage_delete_block(height, &mut batch)?;
        for tx_id in tx_ids.iter() {
            self.ops.stage_delete_tx(*tx_id, &mut batch)?;
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.store.write(batch)?;
        debug!("pruned {} tracked tx(s) at height {}", tx_ids.len(), height);
        Ok(())
    }

    pub fn export_genesis(&self) -> Result<TrackingGenesis> {
        Ok(TrackingGenesis {
            params: self.params()?,
            tx_last_id: self.txs.last_id()?,
            tx_infos: self.txs.all()?,
            op_last_id: self.ops.last_id()?,
            contract_ops: self.ops.all()?,
        })
    }

    pub fn import_genesis(&self, genesis: &TrackingGenesis) -> Result<()> {
        genesis.validate()?;
        self.set_params(&genesis.params)?;
        self.txs.import(genesis.tx_last_id, &genesis.tx_infos)?;
        self.ops.import(genesis.op_last_id, &genesis.contract_ops)?;
        Ok(())
    }
}
