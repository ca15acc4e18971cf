//! Shared harness for integration tests: an in-memory chain driving the
//! accounting ledger through real blocks.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use gas_rewards::ante::{FeeSplit, Tx, TxMsg};
use gas_rewards::bank::{BankKeeper, StoreBank, REWARDS_COLLECTOR};
use gas_rewards::gas::{BasicGasMeter, GasMeter, NoopAdjuster, VmUsage};
use gas_rewards::registry::{ContractInfo, InMemoryRegistry};
use gas_rewards::rewards::{MsgResponse, RewardsMsg};
use gas_rewards::storage::MemoryStore;
use gas_rewards::{
    AccountingLedger, Address, BlockOutcome, Coin, Coins, ContractGasMeter, ContractOperation,
    Gas, LedgerConfig,
};
use std::sync::Arc;

pub const DENOM: &str = "stake";

pub fn addr(b: u8) -> Address {
    Address([b; 32])
}

pub fn stake(amount: u128) -> Coins {
    Coins::from_coin(Coin::new(DENOM, amount))
}

pub fn block_time(height: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + height * 5, 0).unwrap()
}

pub struct Chain {
    pub ledger: AccountingLedger,
    pub bank: Arc<StoreBank>,
    pub registry: Arc<InMemoryRegistry>,
    pub height: i64,
}

impl Chain {
    pub fn new() -> Self {
        let mut config = LedgerConfig::default();
        config.tracking.vm_gas_multiplier = 1;
        Self::with_config(&config)
    }

    pub fn with_config(config: &LedgerConfig) -> Self {
        let store = MemoryStore::shared();
        let bank = Arc::new(StoreBank::new(store.clone()));
        let registry = Arc::new(InMemoryRegistry::new());
        let ledger = AccountingLedger::new(store, bank.clone(), registry.clone(), config);
        ledger.init_params(config).unwrap();
        Self {
            ledger,
            bank,
            registry,
            height: 0,
        }
    }

    pub fn begin_block(&mut self, gas_limit: Option<Gas>) {
        self.height += 1;
        self.ledger
            .begin_block(self.height, block_time(self.height), gas_limit)
            .unwrap();
    }

    pub fn end_block(&mut self) -> BlockOutcome {
        self.ledger.end_block().unwrap()
    }

    /// Register `contract` with `admin` and point its rewards at
    /// `rewards_address`. Needs an open block.
    pub fn deploy(&mut self, contract: Address, admin: Address, rewards_address: Option<Address>) {
        self.registry.register(
            contract,
            ContractInfo {
                code_id: 1,
                creator: admin,
                admin: Some(admin),
            },
        );
        let response = self
            .ledger
            .handle_msg(RewardsMsg::SetContractMetadata {
                sender: admin,
                contract,
                owner: Some(admin),
                rewards_address,
            })
            .unwrap();
        assert!(matches!(response, MsgResponse::ContractMetadata { .. }));
    }

    pub fn fund(&self, account: &Address, amount: u128) {
        self.bank.mint(account, &stake(amount)).unwrap();
    }

    pub fn bank_balance(&self, account: &Address) -> Coins {
        self.bank.balance(account).unwrap()
    }

    pub fn pool(&self) -> Coins {
        self.bank.module_balance(REWARDS_COLLECTOR).unwrap()
    }

    /// Run one contract transaction: open it, deduct `fee`, then execute
    /// `calls` as one outermost call with every further call nested inside
    /// it. Each call consumes the given gas.
    pub fn execute(&mut self, payer: Address, fee: u128, gas_limit: Gas, calls: &[(Address, Gas)]) -> FeeSplit {
        let tx = contract_tx(payer, fee, gas_limit, calls);
        self.ledger.begin_transaction().unwrap();
        let split = self.ledger.deduct_fees(&tx).unwrap();
        let consumed = self.run_sessions(gas_limit, calls);
        assert_eq!(consumed, calls.iter().map(|(_, g)| *g).sum::<Gas>());
        split
    }

    /// Meter `calls` through a session stack and hand the records to the
    /// usage ledger. Returns what the root meter consumed.
    pub fn run_sessions(&self, gas_limit: Gas, calls: &[(Address, Gas)]) -> Gas {
        let (first, nested) = calls.split_first().expect("at least one call");
        let mut stack = self.ledger.new_gas_session_stack();
        let first_contract = first.0;
        stack
            .initialize(Box::new(BasicGasMeter::new(gas_limit)), |root| {
                ContractGasMeter::new(first_contract, ContractOperation::Execution, root, Arc::new(NoopAdjuster))
            })
            .unwrap();
        stack.consume_gas(first.1, "execute").unwrap();

        for (contract, gas) in nested {
            let contract = *contract;
            stack.create_session(gas_limit).unwrap();
            stack
                .associate_meter(|limit| {
                    ContractGasMeter::new(
                        contract,
                        ContractOperation::Execution,
                        Box::new(BasicGasMeter::new(limit)),
                        Arc::new(NoopAdjuster),
                    )
                })
                .unwrap();
            stack.consume_gas(*gas, "execute").unwrap();
            stack.record_vm_usage(VmUsage::default()).unwrap();
            stack.destroy_session().unwrap();
        }
        stack.record_vm_usage(VmUsage::default()).unwrap();

        let (root, sessions) = stack.terminate().unwrap();
        self.ledger.ingest_sessions(&sessions).unwrap();
        root.gas_consumed()
    }
}

pub fn contract_tx(payer: Address, fee: u128, gas_limit: Gas, calls: &[(Address, Gas)]) -> Tx {
    Tx {
        fee_payer: payer,
        fee: if fee == 0 { Coins::new() } else { stake(fee) },
        gas_limit,
        msgs: calls
            .iter()
            .take(1)
            .map(|(contract, _)| TxMsg::ExecuteContract {
                sender: payer,
                contract: *contract,
                funds: Coins::new(),
            })
            .collect(),
    }
}
