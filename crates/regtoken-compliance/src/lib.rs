#![deny(missing_docs)]

//! # regtoken-compliance — Compliance Decision Engine
//!
//! Decides whether an issuance, transfer, burn or seize of a security token
//! is permitted, and keeps the bookkeeping the decision depends on.
//!
//! ## Modules
//!
//! - [`config`]: the compliance configuration (uint limits, boolean
//!   toggles, country classification), loadable from YAML or JSON.
//! - [`counters`]: the investor counter ledger and category limits.
//! - [`locks`]: time-windowed lock records and transferable amounts.
//! - [`issuance`]: issuance lots backing the hold-up periods.
//! - [`partition`]: the partition arena and oldest-first draw planning.
//! - [`engine`]: the ordered rule pipeline.
//!
//! ## Security Invariant
//!
//! A decision other than `Valid` leaves every piece of compliance state
//! exactly as it was. Query forms never mutate.

pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod issuance;
pub mod locks;
pub mod partition;
pub mod view;

pub use config::{BoolParam, ComplianceConfig, ConfigChange, UintParam};
pub use counters::{combine, Category, InvestorCounters, InvestorProfile, LimitBreach};
pub use engine::{ComplianceEngine, ComplianceState, EngineVariant, IssuanceOutcome};
pub use error::{ComplianceError, ConfigError};
pub use issuance::{IssuanceLot, IssuanceRecords};
pub use locks::{LockManager, LockRecord};
pub use partition::{draw_in_order, validate_explicit, Partition, PartitionManager};
pub use view::{LedgerView, Views};
