//! # Error Hierarchy
//!
//! Structured error types shared by the whole stack, built with `thiserror`.
//!
//! Rule rejections are NOT errors at this level: the decision engine returns
//! a [`ComplianceCode`](crate::ComplianceCode) for every evaluation. Errors
//! here describe malformed input that never reaches rule evaluation.

use thiserror::Error;

/// Top-level error type for the regulated token stack.
#[derive(Error, Debug)]
pub enum RegTokenError {
    /// Domain primitive or structural input validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation errors for domain primitives and structural preconditions.
///
/// Each variant carries the offending input so operators can diagnose the
/// rejection without inspecting logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Wallet address is empty or contains whitespace.
    #[error("invalid wallet address: \"{0}\" (expected non-empty, no whitespace)")]
    InvalidWalletAddress(String),

    /// Investor identifier is empty.
    #[error("invalid investor ID: must be non-empty")]
    InvalidInvestorId,

    /// Country code is not 2-3 ASCII letters.
    #[error("invalid country code: \"{0}\" (expected 2-3 ASCII letters)")]
    InvalidCountryCode(String),

    /// A timestamp of zero was supplied where a real instant is required.
    #[error("invalid time: timestamp must be greater than zero")]
    ZeroTimestamp,

    /// Two parallel input arrays have different lengths.
    #[error("{what}: lengths do not match ({left} vs {right})")]
    LengthMismatch {
        /// Which arrays were compared.
        what: String,
        /// Length of the first array.
        left: usize,
        /// Length of the second array.
        right: usize,
    },

    /// A numeric input is outside its permitted range.
    #[error("{field} out of range: {value} ({reason})")]
    OutOfRange {
        /// The input field name.
        field: String,
        /// The rejected value, rendered as a string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An unknown enumeration literal.
    #[error("unknown {kind}: \"{value}\"")]
    UnknownVariant {
        /// The enumeration name.
        kind: String,
        /// The rejected literal.
        value: String,
    },
}
