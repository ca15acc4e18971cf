// src/error.rs
//! Error types

use crate::gas::Gas;
use thiserror::Error;

/// Gas meter errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GasError {
    #[error("out of gas in location: {descriptor}; gasLimit: {limit}, gasUsed: {consumed}")]
    OutOfGas {
        descriptor: String,
        limit: Gas,
        consumed: Gas,
    },

    #[error("gas overflow in location: {descriptor}")]
    Overflow { descriptor: String },

    #[error("refund of {refund} exceeds consumed gas {consumed} in location: {descriptor}")]
    RefundExceedsConsumed {
        descriptor: String,
        refund: Gas,
        consumed: Gas,
    },
}

/// Gas session stack errors.
///
/// Everything except [`SessionError::Gas`] is a call-order violation by the
/// host and must abort block processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("gas tracking is already initialized for this context")]
    AlreadyInitialized,

    #[error("gas tracking is not initialized for this context")]
    NotInitialized,

    #[error("no active gas session")]
    NoActiveSession,

    #[error("no session to destroy")]
    NoSessionToDestroy,

    #[error("vm usage already recorded for the current session")]
    VmUsageAlreadyRecorded,

    #[error("vm usage was never recorded for the session being closed")]
    VmUsageMissing,

    #[error("cannot terminate: {depth} session(s) still in progress")]
    SessionsInProgress { depth: usize },

    #[error("cannot terminate: initial meter is missing")]
    InitialMeterMissing,

    #[error("cannot terminate: {count} meters still active")]
    MultipleActiveMeters { count: usize },

    #[error("session stack corrupted: depth {depth}, sessions {sessions}")]
    Corrupted { depth: usize, sessions: usize },

    #[error(transparent)]
    Gas(#[from] GasError),
}

/// Recoverable rewards errors surfaced to the message handler.
#[derive(Debug, Error)]
pub enum RewardsError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("contract not found")]
    ContractNotFound,

    #[error("contract metadata not found")]
    MetadataNotFound,

    #[error("insufficient fee: got {paid}, required {expected}")]
    InsufficientFee { paid: String, expected: String },

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RewardsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RewardsError::InvalidRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        RewardsError::Unauthorized(msg.into())
    }
}

/// Result alias for rewards operations
pub type Result<T> = std::result::Result<T, RewardsError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("config validation failed: {0}")]
    Invalid(String),
}
