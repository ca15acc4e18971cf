// src/lib.rs
//! Gas tracking and contract rewards accounting.
//!
//! Contract executions are metered through nested gas sessions, recorded
//! per transaction in the usage ledger, and turned into withdrawable
//! rewards records at the end of every block. Transaction fee rebates and
//! a share of inflation fund the rewards pool; the inflation share also
//! derives the minimum consensus fee.

pub mod address;
pub mod ante;
pub mod bank;
pub mod coin;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gas;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod mint;
pub mod registry;
pub mod rewards;
pub mod storage;
pub mod tracking;

pub use address::Address;
pub use coin::{Coin, Coins, DecCoin};
pub use config::LedgerConfig;
pub use context::Context;
pub use error::{ConfigError, GasError, RewardsError, SessionError};
pub use gas::{ContractGasMeter, ContractOperation, Gas, GasSessionStack, TerminatedSessions};
pub use ledger::{AccountingLedger, BlockOutcome, LedgerGenesis};
pub use math::Dec;
pub use rewards::RewardsKeeper;
pub use tracking::UsageLedger;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
