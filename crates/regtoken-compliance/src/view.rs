//! # Engine Inputs
//!
//! The engine reads the token ledger through [`LedgerView`] and the
//! registries through the traits in `regtoken-registry`. [`Views`] bundles
//! the three borrowed collaborators for one decision.

use regtoken_core::{Amount, PartitionId, WalletAddress};
use regtoken_registry::{RegistryView, WalletKindView};

/// Read-only balance store.
pub trait LedgerView {
    /// Wallet balance across all partitions.
    fn balance_of(&self, wallet: &WalletAddress) -> Amount;

    /// Wallet balance in one partition.
    fn balance_of_partition(&self, wallet: &WalletAddress, partition: &PartitionId) -> Amount;

    /// Partitions in which the wallet holds a positive balance.
    fn partitions_of(&self, wallet: &WalletAddress) -> Vec<PartitionId>;

    /// Total supply.
    fn total_issued(&self) -> Amount;

    /// Whether ordinary transfers are paused.
    fn is_paused(&self) -> bool;
}

/// Borrowed collaborators for one decision.
#[derive(Clone, Copy)]
pub struct Views<'a> {
    /// Investor registry.
    pub registry: &'a dyn RegistryView,
    /// Wallet-kind registry.
    pub wallets: &'a dyn WalletKindView,
    /// Token ledger.
    pub ledger: &'a dyn LedgerView,
}

impl std::fmt::Debug for Views<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Views").finish_non_exhaustive()
    }
}
