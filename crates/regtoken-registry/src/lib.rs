#![deny(missing_docs)]

//! # regtoken-registry — Investor, Wallet and Role Registries
//!
//! The compliance engine never owns identity data. It reads it through three
//! narrow traits defined here:
//!
//! - [`RegistryView`]: which investor owns a wallet, the investor's country
//!   and attributes, and whether a wallet is an omnibus wallet.
//! - [`WalletKindView`]: the kind of a wallet (regular, issuer, exchange,
//!   platform, omnibus TBE).
//! - [`RoleView`]: the operator role of a wallet.
//!
//! In-memory implementations ([`InvestorRegistry`], [`WalletManager`],
//! [`TrustService`]) let the stack run standalone. They are injected into the
//! engine by reference; nothing in this crate reads the engine back.

pub mod error;
pub mod investor;
pub mod trust;
pub mod view;
pub mod wallet;

pub use error::RegistryError;
pub use investor::{Attribute, Investor, InvestorRegistry};
pub use trust::TrustService;
pub use view::{RegistryView, RoleView, WalletKindView};
pub use wallet::WalletManager;
