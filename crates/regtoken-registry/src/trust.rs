//! # Trust Service
//!
//! Maps operator wallets to a [`Role`]. Only a master may assign roles, and
//! a master cannot change its own role, so the token always keeps at least
//! the master it was created with.

use std::collections::BTreeMap;

use regtoken_core::{Role, WalletAddress};

use crate::error::RegistryError;
use crate::view::RoleView;

/// In-memory role registry.
#[derive(Debug, Clone)]
pub struct TrustService {
    roles: BTreeMap<WalletAddress, Role>,
}

impl TrustService {
    /// Create a trust service with one master operator.
    pub fn new(master: WalletAddress) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(master, Role::Master);
        Self { roles }
    }

    /// Check that `wallet` holds at least `required`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unauthorized`] otherwise.
    pub fn require(&self, wallet: &WalletAddress, required: Role) -> Result<(), RegistryError> {
        let actual = self.role_of(wallet);
        if !actual.at_least(required) {
            tracing::warn!(wallet = %wallet, required = %required, actual = %actual, "operator not authorized");
            return Err(RegistryError::Unauthorized {
                wallet: wallet.clone(),
                required,
                actual,
            });
        }
        Ok(())
    }

    /// Assign `role` to `wallet`, returning the previous role.
    ///
    /// `Role::None` revokes.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is a master other than `wallet`.
    pub fn set_role(
        &mut self,
        caller: &WalletAddress,
        wallet: WalletAddress,
        role: Role,
    ) -> Result<Role, RegistryError> {
        self.require(caller, Role::Master)?;
        if caller == &wallet {
            return Err(RegistryError::Unauthorized {
                wallet,
                required: Role::Master,
                actual: Role::Master,
            });
        }
        tracing::info!(wallet = %wallet, role = %role, "role assigned");
        let previous = if role == Role::None {
            self.roles.remove(&wallet)
        } else {
            self.roles.insert(wallet, role)
        };
        Ok(previous.unwrap_or_default())
    }
}

impl RoleView for TrustService {
    fn role_of(&self, wallet: &WalletAddress) -> Role {
        self.roles.get(wallet).copied().unwrap_or_default()
    }
}
