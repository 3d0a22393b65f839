//! # Wallet Manager
//!
//! Records wallets with a non-regular kind. Any wallet not recorded here is
//! a regular investor wallet.

use std::collections::BTreeMap;

use regtoken_core::{WalletAddress, WalletKind};

use crate::error::RegistryError;
use crate::view::WalletKindView;

/// In-memory wallet-kind registry.
#[derive(Debug, Clone, Default)]
pub struct WalletManager {
    kinds: BTreeMap<WalletAddress, WalletKind>,
}

impl WalletManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_special(&mut self, wallet: WalletAddress, kind: WalletKind) -> Result<(), RegistryError> {
        if let Some(existing) = self.kinds.get(&wallet) {
            return Err(RegistryError::WalletKindConflict {
                wallet,
                kind: *existing,
            });
        }
        tracing::info!(wallet = %wallet, kind = %kind, "special wallet added");
        self.kinds.insert(wallet, kind);
        Ok(())
    }

    /// Register an issuer wallet.
    ///
    /// # Errors
    ///
    /// Fails if the wallet already has a special kind.
    pub fn add_issuer_wallet(&mut self, wallet: WalletAddress) -> Result<(), RegistryError> {
        self.add_special(wallet, WalletKind::Issuer)
    }

    /// Register a platform wallet.
    ///
    /// # Errors
    ///
    /// Fails if the wallet already has a special kind.
    pub fn add_platform_wallet(&mut self, wallet: WalletAddress) -> Result<(), RegistryError> {
        self.add_special(wallet, WalletKind::Platform)
    }

    /// Register an exchange wallet.
    ///
    /// # Errors
    ///
    /// Fails if the wallet already has a special kind.
    pub fn add_exchange_wallet(&mut self, wallet: WalletAddress) -> Result<(), RegistryError> {
        self.add_special(wallet, WalletKind::Exchange)
    }

    /// Register the omnibus TBE wallet.
    ///
    /// # Errors
    ///
    /// Fails if the wallet already has a special kind.
    pub fn add_omnibus_tbe_wallet(&mut self, wallet: WalletAddress) -> Result<(), RegistryError> {
        self.add_special(wallet, WalletKind::OmnibusTbe)
    }

    /// Return a wallet to the regular kind, returning the kind it had.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::UnknownWallet`] if the wallet is regular.
    pub fn remove_special_wallet(
        &mut self,
        wallet: &WalletAddress,
    ) -> Result<WalletKind, RegistryError> {
        let kind = self
            .kinds
            .remove(wallet)
            .ok_or_else(|| RegistryError::UnknownWallet {
                wallet: wallet.clone(),
            })?;
        tracing::info!(wallet = %wallet, kind = %kind, "special wallet removed");
        Ok(kind)
    }

    /// Wallets of one kind.
    pub fn wallets_of_kind(&self, kind: WalletKind) -> Vec<WalletAddress> {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(w, _)| w.clone())
            .collect()
    }
}

impl WalletKindView for WalletManager {
    fn kind_of(&self, wallet: &WalletAddress) -> WalletKind {
        self.kinds.get(wallet).copied().unwrap_or_default()
    }
}
