//! # Investor Registry
//!
//! In-memory registry of investors, their country, their attributes, and the
//! wallets bound to them.
//!
//! Investors are never deleted. A collision hash (an opaque digest of the
//! investor's identifying documents) guards against the same legal person
//! being registered twice under different ids.
//!
//! Attribute expiry and proof hash are recorded for operators but are not
//! consulted by [`RegistryView::attribute_value`]: status alone decides.

use std::collections::{BTreeMap, BTreeSet};

use regtoken_core::{
    AttributeKind, AttributeStatus, CountryCode, InvestorId, Timestamp, WalletAddress,
};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::view::RegistryView;

/// One attribute of an investor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Review status.
    pub status: AttributeStatus,
    /// Expiry time recorded by the reviewer.
    pub expiry: Option<Timestamp>,
    /// Hash of the supporting proof document.
    pub proof_hash: Option<String>,
}

/// A registered investor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investor {
    /// Investor id.
    pub id: InvestorId,
    /// Deduplication hash supplied at registration.
    pub collision_hash: String,
    /// Country of residence.
    pub country: Option<CountryCode>,
    /// Attributes by kind.
    pub attributes: BTreeMap<AttributeKind, Attribute>,
    /// Wallets bound to this investor.
    pub wallets: BTreeSet<WalletAddress>,
}

/// In-memory investor registry.
#[derive(Debug, Clone, Default)]
pub struct InvestorRegistry {
    investors: BTreeMap<InvestorId, Investor>,
    wallet_owner: BTreeMap<WalletAddress, InvestorId>,
    collision_hashes: BTreeMap<String, InvestorId>,
    omnibus_wallets: BTreeSet<WalletAddress>,
}

impl InvestorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new investor.
    ///
    /// # Errors
    ///
    /// Fails if the id or the collision hash is already registered.
    pub fn register_investor(
        &mut self,
        id: InvestorId,
        collision_hash: impl Into<String>,
        country: Option<CountryCode>,
    ) -> Result<(), RegistryError> {
        if self.investors.contains_key(&id) {
            return Err(RegistryError::DuplicateInvestor { investor: id });
        }
        let collision_hash = collision_hash.into();
        if let Some(existing) = self.collision_hashes.get(&collision_hash) {
            return Err(RegistryError::DuplicateCollisionHash {
                existing: existing.clone(),
            });
        }
        tracing::info!(investor = %id, country = ?country.as_ref().map(CountryCode::as_str), "investor registered");
        self.collision_hashes
            .insert(collision_hash.clone(), id.clone());
        self.investors.insert(
            id.clone(),
            Investor {
                id,
                collision_hash,
                country,
                attributes: BTreeMap::new(),
                wallets: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Look up an investor record.
    pub fn investor(&self, id: &InvestorId) -> Option<&Investor> {
        self.investors.get(id)
    }

    /// Whether the id is registered.
    pub fn is_investor(&self, id: &InvestorId) -> bool {
        self.investors.contains_key(id)
    }

    /// Number of registered investors.
    pub fn investor_count(&self) -> usize {
        self.investors.len()
    }

    fn investor_mut(&mut self, id: &InvestorId) -> Result<&mut Investor, RegistryError> {
        self.investors
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownInvestor {
                investor: id.clone(),
            })
    }

    /// Set the investor's country, returning the previous one.
    ///
    /// # Errors
    ///
    /// Fails if the investor is not registered.
    pub fn set_country(
        &mut self,
        id: &InvestorId,
        country: CountryCode,
    ) -> Result<Option<CountryCode>, RegistryError> {
        let investor = self.investor_mut(id)?;
        let previous = investor.country.replace(country);
        tracing::info!(investor = %id, country = ?investor.country.as_ref().map(CountryCode::as_str), "investor country set");
        Ok(previous)
    }

    /// Set an attribute, returning the previous status.
    ///
    /// # Errors
    ///
    /// Fails if the investor is not registered.
    pub fn set_attribute(
        &mut self,
        id: &InvestorId,
        kind: AttributeKind,
        status: AttributeStatus,
        expiry: Option<Timestamp>,
        proof_hash: Option<String>,
    ) -> Result<AttributeStatus, RegistryError> {
        let investor = self.investor_mut(id)?;
        let previous = investor
            .attributes
            .insert(
                kind,
                Attribute {
                    status,
                    expiry,
                    proof_hash,
                },
            )
            .map(|a| a.status)
            .unwrap_or_default();
        tracing::info!(investor = %id, attribute = %kind, status = %status, "investor attribute set");
        Ok(previous)
    }

    /// Bind a wallet to an investor.
    ///
    /// # Errors
    ///
    /// Fails if the investor is unknown or the wallet is already bound.
    pub fn add_wallet(
        &mut self,
        wallet: WalletAddress,
        id: &InvestorId,
    ) -> Result<(), RegistryError> {
        if let Some(owner) = self.wallet_owner.get(&wallet) {
            return Err(RegistryError::WalletAlreadyBound {
                wallet,
                investor: owner.clone(),
            });
        }
        self.investor_mut(id)?.wallets.insert(wallet.clone());
        tracing::info!(investor = %id, wallet = %wallet, "wallet bound");
        self.wallet_owner.insert(wallet, id.clone());
        Ok(())
    }

    /// Bind a wallet to an investor and mark it as an omnibus wallet.
    ///
    /// # Errors
    ///
    /// Same as [`InvestorRegistry::add_wallet`].
    pub fn add_omnibus_wallet(
        &mut self,
        wallet: WalletAddress,
        id: &InvestorId,
    ) -> Result<(), RegistryError> {
        self.add_wallet(wallet.clone(), id)?;
        self.omnibus_wallets.insert(wallet);
        Ok(())
    }

    /// Unbind a wallet, returning its former owner.
    ///
    /// Callers holding balances must check the wallet is empty first.
    ///
    /// # Errors
    ///
    /// Fails if the wallet is not bound.
    pub fn remove_wallet(&mut self, wallet: &WalletAddress) -> Result<InvestorId, RegistryError> {
        let owner = self
            .wallet_owner
            .remove(wallet)
            .ok_or_else(|| RegistryError::UnknownWallet {
                wallet: wallet.clone(),
            })?;
        if let Some(investor) = self.investors.get_mut(&owner) {
            investor.wallets.remove(wallet);
        }
        self.omnibus_wallets.remove(wallet);
        tracing::info!(investor = %owner, wallet = %wallet, "wallet unbound");
        Ok(owner)
    }
}

impl RegistryView for InvestorRegistry {
    fn investor_of(&self, wallet: &WalletAddress) -> Option<InvestorId> {
        self.wallet_owner.get(wallet).cloned()
    }

    fn country_of(&self, investor: &InvestorId) -> Option<CountryCode> {
        self.investors.get(investor).and_then(|i| i.country.clone())
    }

    fn attribute_value(&self, investor: &InvestorId, kind: AttributeKind) -> AttributeStatus {
        self.investors
            .get(investor)
            .and_then(|i| i.attributes.get(&kind))
            .map(|a| a.status)
            .unwrap_or_default()
    }

    fn is_omnibus_wallet(&self, wallet: &WalletAddress) -> bool {
        self.omnibus_wallets.contains(wallet)
    }

    fn wallets_of(&self, investor: &InvestorId) -> Vec<WalletAddress> {
        self.investors
            .get(investor)
            .map(|i| i.wallets.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> InvestorId {
        InvestorId::new(s).unwrap()
    }

    fn wallet(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn country(s: &str) -> CountryCode {
        CountryCode::new(s).unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("alice"), "h1", Some(country("US")))
            .unwrap();
        reg.add_wallet(wallet("w1"), &id("alice")).unwrap();
        assert_eq!(reg.investor_of(&wallet("w1")), Some(id("alice")));
        assert_eq!(reg.country_of(&id("alice")), Some(country("US")));
        assert_eq!(reg.wallets_of(&id("alice")), vec![wallet("w1")]);
        assert_eq!(reg.investor_count(), 1);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("alice"), "h1", None).unwrap();
        assert!(matches!(
            reg.register_investor(id("alice"), "h2", None),
            Err(RegistryError::DuplicateInvestor { .. })
        ));
        assert!(matches!(
            reg.register_investor(id("bob"), "h1", None),
            Err(RegistryError::DuplicateCollisionHash { .. })
        ));
    }

    #[test]
    fn wallet_binds_once() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("alice"), "h1", None).unwrap();
        reg.register_investor(id("bob"), "h2", None).unwrap();
        reg.add_wallet(wallet("w1"), &id("alice")).unwrap();
        assert!(matches!(
            reg.add_wallet(wallet("w1"), &id("bob")),
            Err(RegistryError::WalletAlreadyBound { .. })
        ));
        assert!(matches!(
            reg.add_wallet(wallet("w2"), &id("carol")),
            Err(RegistryError::UnknownInvestor { .. })
        ));
    }

    #[test]
    fn attributes_default_to_pending() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("alice"), "h1", None).unwrap();
        assert_eq!(
            reg.attribute_value(&id("alice"), AttributeKind::Accredited),
            AttributeStatus::Pending
        );
        let prev = reg
            .set_attribute(
                &id("alice"),
                AttributeKind::Accredited,
                AttributeStatus::Approved,
                Some(Timestamp::from_epoch_secs(10)),
                Some("proof".into()),
            )
            .unwrap();
        assert_eq!(prev, AttributeStatus::Pending);
        assert!(reg
            .attribute_value(&id("alice"), AttributeKind::Accredited)
            .is_approved());
    }

    #[test]
    fn omnibus_wallet_flag_follows_binding() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("custodian"), "h1", None).unwrap();
        reg.add_omnibus_wallet(wallet("omni"), &id("custodian"))
            .unwrap();
        assert!(reg.is_omnibus_wallet(&wallet("omni")));
        assert_eq!(reg.remove_wallet(&wallet("omni")).unwrap(), id("custodian"));
        assert!(!reg.is_omnibus_wallet(&wallet("omni")));
        assert!(reg.investor_of(&wallet("omni")).is_none());
        assert!(reg.remove_wallet(&wallet("omni")).is_err());
    }

    #[test]
    fn set_country_returns_previous() {
        let mut reg = InvestorRegistry::new();
        reg.register_investor(id("alice"), "h1", Some(country("FR")))
            .unwrap();
        let prev = reg.set_country(&id("alice"), country("US")).unwrap();
        assert_eq!(prev, Some(country("FR")));
        assert_eq!(
            serde_json::to_value(reg.investor(&id("alice")).unwrap()).unwrap()["country"],
            "US"
        );
    }
}
