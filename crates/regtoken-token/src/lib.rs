#![deny(missing_docs)]

//! # regtoken-token — Regulated Security Token
//!
//! [`SecurityToken`] owns one token's ledger, investor and wallet
//! registries, operator roles, compliance state and audit trail, and runs
//! every mutation through the compliance engine under a single write lock.
//!
//! [`OmnibusTbeController`] adds the bulk operations of an omnibus TBE
//! wallet, whose off-chain investors are counted through explicit deltas.
//!
//! ## Time
//!
//! Decisions are taken at the instant reported by the token's [`Clock`].
//! Tokens default to [`SystemClock`]; tests install a [`ManualClock`].

pub mod clock;
pub mod error;
pub mod ledger;
pub mod omnibus;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TokenError;
pub use ledger::TokenLedger;
pub use omnibus::OmnibusTbeController;
pub use token::{SecurityToken, TokenFeatures};
