//! # Registry Error Types

use regtoken_core::{InvestorId, Role, ValidationError, WalletAddress, WalletKind};
use thiserror::Error;

/// Errors arising from registry, wallet-kind and role mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The investor id is not registered.
    #[error("investor {investor} is not registered")]
    UnknownInvestor {
        /// The missing investor.
        investor: InvestorId,
    },

    /// The investor id is already registered.
    #[error("investor {investor} is already registered")]
    DuplicateInvestor {
        /// The existing investor.
        investor: InvestorId,
    },

    /// Another investor already registered with the same collision hash.
    #[error("collision hash already registered to investor {existing}")]
    DuplicateCollisionHash {
        /// The investor that owns the hash.
        existing: InvestorId,
    },

    /// The wallet is already bound to an investor.
    #[error("wallet {wallet} is already bound to investor {investor}")]
    WalletAlreadyBound {
        /// The wallet.
        wallet: WalletAddress,
        /// Its current owner.
        investor: InvestorId,
    },

    /// The wallet is not bound to any investor.
    #[error("wallet {wallet} is not bound to an investor")]
    UnknownWallet {
        /// The wallet.
        wallet: WalletAddress,
    },

    /// The wallet already has a special kind and cannot be re-registered.
    #[error("wallet {wallet} is already registered as {kind}")]
    WalletKindConflict {
        /// The wallet.
        wallet: WalletAddress,
        /// Its current kind.
        kind: WalletKind,
    },

    /// The caller lacks the role required for the operation.
    #[error("wallet {wallet} has role {actual}, operation requires {required}")]
    Unauthorized {
        /// The caller.
        wallet: WalletAddress,
        /// Role required.
        required: Role,
        /// Role held.
        actual: Role,
    },

    /// Malformed identifier input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
