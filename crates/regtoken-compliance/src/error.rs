//! # Compliance Error Types
//!
//! Errors here are structural: malformed input, zero timestamps, bad lock
//! indices, counter underflow. Business-rule rejections are not errors; they
//! are [`ComplianceCode`](regtoken_core::ComplianceCode) values.

use std::path::PathBuf;

use regtoken_core::{PartitionId, ValidationError, WalletAddress};
use thiserror::Error;

/// Errors arising from configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("failed to parse YAML config at {path}: {source}")]
    YamlParse {
        /// Source file.
        path: PathBuf,
        /// Parser error.
        source: serde_yaml::Error,
    },

    /// JSON parsing failed.
    #[error("failed to parse JSON config at {path}: {source}")]
    JsonParse {
        /// Source file.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },

    /// YAML string parsing failed.
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON string parsing failed.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The file could not be found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The missing file.
        path: PathBuf,
    },

    /// The file extension is neither YAML nor JSON.
    #[error("unsupported config format for {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat {
        /// The rejected file.
        path: PathBuf,
    },

    /// A value is outside its permitted range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Field name.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors arising from compliance state operations.
#[derive(Error, Debug)]
pub enum ComplianceError {
    /// A timestamp of zero was supplied.
    #[error("invalid time: timestamp must be greater than zero")]
    InvalidTime,

    /// Malformed input rejected before any rule evaluation.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] ValidationError),

    /// Lock index beyond the wallet's lock records.
    #[error("lock index {index} out of range for {wallet} ({count} records)")]
    LockIndexOutOfRange {
        /// The wallet.
        wallet: WalletAddress,
        /// The requested index.
        index: usize,
        /// Records present.
        count: usize,
    },

    /// A counter adjustment would drive a counter below zero.
    #[error("counter {counter} would underflow: {current} + ({delta})")]
    CounterUnderflow {
        /// Counter name.
        counter: String,
        /// Current value.
        current: u64,
        /// Rejected delta.
        delta: i64,
    },

    /// A counter adjustment would exceed a configured category limit.
    #[error("{category} limit exceeded: {projected} > {limit}")]
    LimitExceeded {
        /// Category name.
        category: String,
        /// Value after the adjustment.
        projected: u64,
        /// Configured limit.
        limit: u64,
    },

    /// A partition id not present in the arena.
    #[error("unknown partition {partition}")]
    UnknownPartition {
        /// The missing partition.
        partition: PartitionId,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
