#![deny(missing_docs)]

//! # regtoken-core — Foundational Types for the Regulated Token Stack
//!
//! This crate defines the types that every other crate in the workspace
//! depends on. It has no internal crate dependencies, only `serde`,
//! `serde_json`, `thiserror`, `chrono`, `sha2`, and `tracing` from the
//! external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A [`WalletAddress`] cannot
//!    be passed where an [`InvestorId`] is expected, and a [`CountryCode`] is
//!    normalized once at construction.
//!
//! 2. **Single [`ComplianceCode`] enum.** Every outcome the decision engine
//!    can produce is one variant with a fixed integer code and reason string.
//!    Front-ends match on the enum; wire formats use [`ComplianceCode::code`].
//!
//! 3. **Epoch-second [`Timestamp`].** Rule windows (lock periods, flowback,
//!    release times) are integer arithmetic over seconds. Zero is reserved
//!    as "no time" and rejected where a real instant is required.
//!
//! 4. **[`RegTokenError`] hierarchy.** Structured errors with `thiserror`,
//!    no `.unwrap()` outside tests.

pub mod audit;
pub mod classification;
pub mod code;
pub mod counters;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use audit::{AuditEntry, AuditEvent, AuditTrail, OmnibusAction};
pub use classification::{
    AttributeKind, AttributeStatus, Classification, Operation, Role, WalletKind,
};
pub use code::{CodeFamily, ComplianceCode};
pub use counters::{CounterDeltas, CounterSnapshot};
pub use digest::{sha256_digest, ContentDigest};
pub use error::{RegTokenError, ValidationError};
pub use identity::{CountryCode, InvestorId, PartitionId, WalletAddress};
pub use temporal::{Timestamp, ONE_YEAR_SECS};

/// Token amounts in the smallest indivisible unit.
pub type Amount = u64;
