//! # Read-Only Views
//!
//! The interfaces the compliance engine consumes. Implementations must be
//! side-effect free: the engine calls them from pure pre-flight checks.

use regtoken_core::{
    AttributeKind, AttributeStatus, CountryCode, InvestorId, Role, WalletAddress, WalletKind,
};

/// Investor identity lookups.
pub trait RegistryView {
    /// The investor a wallet is bound to, if any.
    fn investor_of(&self, wallet: &WalletAddress) -> Option<InvestorId>;

    /// The investor's country, if registered and set.
    fn country_of(&self, investor: &InvestorId) -> Option<CountryCode>;

    /// Current status of an attribute. Unset attributes are `Pending`.
    fn attribute_value(&self, investor: &InvestorId, kind: AttributeKind) -> AttributeStatus;

    /// Whether the wallet is registered as an omnibus wallet.
    fn is_omnibus_wallet(&self, wallet: &WalletAddress) -> bool;

    /// Every wallet bound to the investor, including omnibus wallets.
    fn wallets_of(&self, investor: &InvestorId) -> Vec<WalletAddress>;
}

/// Wallet kind lookups.
pub trait WalletKindView {
    /// The kind of a wallet. Unknown wallets are `Regular`.
    fn kind_of(&self, wallet: &WalletAddress) -> WalletKind;
}

/// Operator role lookups.
pub trait RoleView {
    /// The role of an operator wallet. Unknown wallets have `Role::None`.
    fn role_of(&self, wallet: &WalletAddress) -> Role;
}
