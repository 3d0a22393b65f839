//! # Token Error Types
//!
//! Every mutating token operation returns `Result<_, TokenError>`. A rule
//! rejection surfaces as [`TokenError::Rejected`] carrying the compliance
//! code; structural problems (bad arrays, unknown partitions, zero times)
//! surface before any rule runs.

use regtoken_compliance::ComplianceError;
use regtoken_core::{Amount, ComplianceCode, Role, ValidationError, WalletAddress};
use regtoken_registry::RegistryError;
use thiserror::Error;

/// Errors from token operations.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The compliance pipeline rejected the operation. No state changed.
    #[error("rejected by compliance: {code}")]
    Rejected {
        /// The rejecting rule.
        code: ComplianceCode,
        /// Human-readable reason of the code.
        reason: &'static str,
    },

    /// The operator wallet lacks the required role.
    #[error("unauthorized: {wallet} has role {actual}, requires {required}")]
    Unauthorized {
        /// Operator wallet.
        wallet: WalletAddress,
        /// Role required by the operation.
        required: Role,
        /// Role actually held.
        actual: Role,
    },

    /// Structural precondition failure (array lengths, ranges, zero amounts).
    #[error("malformed input: {0}")]
    MalformedInput(ValidationError),

    /// The omnibus wallet cannot cover a bulk burn or distribution.
    #[error("omnibus wallet {wallet} holds {balance}, operation needs {required}")]
    InsufficientOmnibusBalance {
        /// The omnibus wallet.
        wallet: WalletAddress,
        /// Its balance.
        balance: Amount,
        /// Amount the operation needs.
        required: Amount,
    },

    /// A wallet that still holds tokens cannot be unbound or re-typed.
    #[error("wallet {wallet} still holds {balance}")]
    WalletNotEmpty {
        /// The wallet.
        wallet: WalletAddress,
        /// Its balance.
        balance: Amount,
    },

    /// The operation needs a feature the token was created without.
    #[error("feature not enabled: {feature}")]
    FeatureDisabled {
        /// Feature name.
        feature: &'static str,
    },

    /// Registry error other than authorization.
    #[error(transparent)]
    Registry(RegistryError),

    /// Compliance bookkeeping error.
    #[error(transparent)]
    Compliance(ComplianceError),
}

impl TokenError {
    /// Wrap a non-`Valid` compliance code.
    pub fn rejected(code: ComplianceCode) -> Self {
        Self::Rejected {
            code,
            reason: code.reason(),
        }
    }

    /// The compliance code, for rule rejections.
    pub fn code(&self) -> Option<ComplianceCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ValidationError> for TokenError {
    fn from(err: ValidationError) -> Self {
        Self::MalformedInput(err)
    }
}

/// Role failures get their own variant; everything else is wrapped.
impl From<RegistryError> for TokenError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unauthorized {
                wallet,
                required,
                actual,
            } => Self::Unauthorized {
                wallet,
                required,
                actual,
            },
            RegistryError::Validation(v) => Self::MalformedInput(v),
            other => Self::Registry(other),
        }
    }
}

/// Malformed input keeps its own variant; everything else is wrapped.
impl From<ComplianceError> for TokenError {
    fn from(err: ComplianceError) -> Self {
        match err {
            ComplianceError::MalformedInput(v) => Self::MalformedInput(v),
            other => Self::Compliance(other),
        }
    }
}
