//! # Security Token
//!
//! The façade that ties the ledger, the registries and the compliance engine
//! into one serialized state machine.
//!
//! ## Concurrency
//!
//! All state lives behind one `parking_lot::RwLock`. Every mutating
//! operation takes the write lock once, evaluates the rule pipeline, applies
//! the counter transition and moves the balances before releasing it, so a
//! balance update and its counter delta are never observed apart. Queries
//! take the read lock and never mutate. `SecurityToken` is cheap to clone;
//! clones share the same state.
//!
//! ## Authorization
//!
//! Operator operations take the caller's wallet as their first argument and
//! check it against the [`TrustService`]:
//!
//! - investor registry changes require `Exchange` or above;
//! - issuance, burn, seize, pause, configuration, locks and special wallets
//!   require `Issuer` or above;
//! - role assignment requires `Master`.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use regtoken_compliance::{
    combine, BoolParam, ComplianceConfig, ComplianceEngine, ComplianceError, ComplianceState,
    EngineVariant, InvestorProfile, IssuanceOutcome, LedgerView, LockRecord, Partition,
    UintParam, Views,
};
use regtoken_core::{
    Amount, AttributeKind, AttributeStatus, AuditEntry, AuditEvent, AuditTrail, Classification,
    ComplianceCode, CounterDeltas, CounterSnapshot, CountryCode, InvestorId, PartitionId, Role,
    Timestamp, ValidationError, WalletAddress, WalletKind,
};
use regtoken_registry::{
    InvestorRegistry, RegistryError, RegistryView, RoleView, TrustService, WalletKindView,
    WalletManager,
};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;
use crate::ledger::TokenLedger;

// ---------------------------------------------------------------------------
// TokenFeatures
// ---------------------------------------------------------------------------

/// Optional capabilities fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFeatures {
    /// Balances and locks are partition-scoped.
    pub partitioned: bool,
    /// Omnibus TBE wallets and bulk operations are available.
    pub omnibus_tbe: bool,
}

impl TokenFeatures {
    /// The engine variant matching these features.
    pub fn variant(&self) -> EngineVariant {
        if self.partitioned {
            EngineVariant::Partitioned
        } else {
            EngineVariant::Plain
        }
    }
}

// ---------------------------------------------------------------------------
// TokenState
// ---------------------------------------------------------------------------

/// Everything the write lock protects.
pub(crate) struct TokenState {
    pub(crate) ledger: TokenLedger,
    pub(crate) registry: InvestorRegistry,
    pub(crate) wallets: WalletManager,
    pub(crate) trust: TrustService,
    pub(crate) engine: ComplianceEngine,
    pub(crate) compliance: ComplianceState,
    pub(crate) audit: AuditTrail,
}

impl TokenState {
    pub(crate) fn views(&self) -> Views<'_> {
        Views {
            registry: &self.registry,
            wallets: &self.wallets,
            ledger: &self.ledger,
        }
    }

    /// Borrow the read-only collaborators and the compliance state apart.
    pub(crate) fn split(&mut self) -> (Views<'_>, &ComplianceEngine, &mut ComplianceState) {
        (
            Views {
                registry: &self.registry,
                wallets: &self.wallets,
                ledger: &self.ledger,
            },
            &self.engine,
            &mut self.compliance,
        )
    }

    pub(crate) fn require(&self, caller: &WalletAddress, role: Role) -> Result<(), TokenError> {
        self.trust.require(caller, role)?;
        Ok(())
    }

    fn require_empty(&self, wallet: &WalletAddress) -> Result<(), TokenError> {
        let balance = self.ledger.balance_of(wallet);
        if balance > 0 {
            return Err(TokenError::WalletNotEmpty {
                wallet: wallet.clone(),
                balance,
            });
        }
        Ok(())
    }

    /// Investors with a positive counted balance.
    fn holders(&self) -> BTreeSet<InvestorId> {
        let views = self.views();
        self.ledger
            .holders()
            .filter_map(|(wallet, _)| self.registry.investor_of(wallet))
            .filter(|investor| self.engine.investor_balance(views, investor) > 0)
            .collect()
    }

    /// Plan a debit of `value` from `wallet`'s partitions, oldest first.
    pub(crate) fn plan(
        &self,
        wallet: &WalletAddress,
        value: Amount,
        respect_locks: bool,
        as_of: Timestamp,
    ) -> Option<Vec<(PartitionId, Amount)>> {
        self.engine.plan_partitions(
            self.views(),
            &self.compliance,
            wallet,
            value,
            respect_locks,
            as_of,
        )
    }
}

pub(crate) fn reject(operation: &'static str, code: ComplianceCode) -> TokenError {
    tracing::warn!(operation, code = code.code(), reason = code.reason(), "operation rejected");
    TokenError::rejected(code)
}

fn malformed(field: &str, value: impl ToString, reason: &str) -> TokenError {
    TokenError::MalformedInput(ValidationError::OutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ---------------------------------------------------------------------------
// SecurityToken
// ---------------------------------------------------------------------------

/// A regulated security token.
#[derive(Clone)]
pub struct SecurityToken {
    name: String,
    pub(crate) features: TokenFeatures,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: Arc<RwLock<TokenState>>,
}

impl std::fmt::Debug for SecurityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SecurityToken")
            .field("name", &self.name)
            .field("features", &self.features)
            .field("total_issued", &state.ledger.total_issued())
            .field("investors", &state.registry.investor_count())
            .field("partitions", &state.compliance.partitions.len())
            .field("audit_entries", &state.audit.len())
            .finish()
    }
}

impl SecurityToken {
    /// Create a token whose only operator is `master`.
    ///
    /// # Errors
    ///
    /// Rejects an invalid configuration.
    pub fn new(
        name: impl Into<String>,
        master: WalletAddress,
        config: ComplianceConfig,
        features: TokenFeatures,
    ) -> Result<Self, TokenError> {
        config.validate().map_err(ComplianceError::Config)?;
        let name = name.into();
        tracing::info!(token = %name, master = %master, partitioned = features.partitioned, omnibus_tbe = features.omnibus_tbe, "token created");
        Ok(Self {
            name,
            features,
            clock: Arc::new(SystemClock),
            state: Arc::new(RwLock::new(TokenState {
                ledger: TokenLedger::new(),
                registry: InvestorRegistry::new(),
                wallets: WalletManager::new(),
                trust: TrustService::new(master),
                engine: ComplianceEngine::new(config, features.variant()),
                compliance: ComplianceState::default(),
                audit: AuditTrail::default(),
            })),
        })
    }

    /// Replace the decision clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the audit trail with an empty one of the given capacity.
    pub fn with_audit_capacity(self, max_entries: usize) -> Self {
        self.state.write().audit = AuditTrail::new(max_entries);
        self
    }

    /// Token name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enabled features.
    pub fn features(&self) -> TokenFeatures {
        self.features
    }

    /// Current decision time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -- Roles -------------------------------------------------------------

    /// Assign an operator role. Master only.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is a master other than `wallet`.
    pub fn set_role(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
        role: Role,
    ) -> Result<Role, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let previous = state.trust.set_role(caller, wallet.clone(), role)?;
        state.audit.record(
            now,
            AuditEvent::RoleAssigned {
                wallet: wallet.clone(),
                role,
            },
        );
        Ok(previous)
    }

    /// Role of an operator wallet.
    pub fn role_of(&self, wallet: &WalletAddress) -> Role {
        self.state.read().trust.role_of(wallet)
    }

    // -- Investor registry -------------------------------------------------

    /// Register an investor.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate id or collision hash.
    pub fn register_investor(
        &self,
        caller: &WalletAddress,
        id: InvestorId,
        collision_hash: impl Into<String>,
        country: Option<CountryCode>,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Exchange)?;
        if let Some(c) = &country {
            warn_unclassified(&state.engine, c);
        }
        state.registry.register_investor(id, collision_hash, country)?;
        Ok(())
    }

    /// Change an investor's country, re-bucketing their counters if they
    /// hold tokens.
    ///
    /// # Errors
    ///
    /// Fails for an unknown investor.
    pub fn set_country(
        &self,
        caller: &WalletAddress,
        id: &InvestorId,
        country: CountryCode,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Exchange)?;
        require_investor(&state.registry, id)?;
        warn_unclassified(&state.engine, &country);
        let before = state.engine.profile(&state.registry, id);
        let after = InvestorProfile {
            region: state.engine.config().region_of(Some(&country)),
            country: Some(country.clone()),
            ..before.clone()
        };
        let (views, engine, compliance) = state.split();
        let moved = engine.rebucket(views, compliance, id, &before, &after)?;
        state.registry.set_country(id, country)?;
        if moved {
            record_rebucket(state, now, id, "country");
        }
        Ok(())
    }

    /// Set an investor attribute. Accredited and qualified changes
    /// re-bucket the counters of a holding investor.
    ///
    /// # Errors
    ///
    /// Fails for an unknown investor.
    #[allow(clippy::too_many_arguments)]
    pub fn set_attribute(
        &self,
        caller: &WalletAddress,
        id: &InvestorId,
        kind: AttributeKind,
        status: AttributeStatus,
        expiry: Option<Timestamp>,
        proof_hash: Option<String>,
    ) -> Result<AttributeStatus, TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Exchange)?;
        require_investor(&state.registry, id)?;
        let before = state.engine.profile(&state.registry, id);
        let mut after = before.clone();
        match kind {
            AttributeKind::Accredited => after.accredited = status.is_approved(),
            AttributeKind::Qualified => after.qualified = status.is_approved(),
            AttributeKind::Kyc | AttributeKind::Professional => {}
        }
        let (views, engine, compliance) = state.split();
        let moved = engine.rebucket(views, compliance, id, &before, &after)?;
        let previous = state
            .registry
            .set_attribute(id, kind, status, expiry, proof_hash)?;
        if moved {
            record_rebucket(state, now, id, kind.as_str());
        }
        Ok(previous)
    }

    /// Bind a regular wallet to an investor.
    ///
    /// # Errors
    ///
    /// Fails for special or non-empty wallets and for wallets already bound.
    pub fn add_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
        id: &InvestorId,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Exchange)?;
        require_regular(&state.wallets, &wallet)?;
        state.require_empty(&wallet)?;
        state.registry.add_wallet(wallet, id)?;
        Ok(())
    }

    /// Bind an omnibus wallet to an investor. Its balance is never counted
    /// toward the investor.
    ///
    /// # Errors
    ///
    /// Same as [`SecurityToken::add_wallet`].
    pub fn add_omnibus_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
        id: &InvestorId,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Exchange)?;
        require_regular(&state.wallets, &wallet)?;
        state.require_empty(&wallet)?;
        state.registry.add_omnibus_wallet(wallet, id)?;
        Ok(())
    }

    /// Unbind an empty wallet, returning its former owner.
    ///
    /// # Errors
    ///
    /// Fails for unbound or non-empty wallets.
    pub fn remove_wallet(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
    ) -> Result<InvestorId, TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Exchange)?;
        state.require_empty(wallet)?;
        Ok(state.registry.remove_wallet(wallet)?)
    }

    /// The investor a wallet is bound to.
    pub fn investor_of(&self, wallet: &WalletAddress) -> Option<InvestorId> {
        self.state.read().registry.investor_of(wallet)
    }

    // -- Special wallets ---------------------------------------------------

    /// Register an issuer wallet (seize destination).
    ///
    /// # Errors
    ///
    /// Fails for bound, typed or non-empty wallets.
    pub fn add_issuer_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
    ) -> Result<(), TokenError> {
        self.add_special(caller, wallet, WalletKind::Issuer)
    }

    /// Register a platform wallet.
    ///
    /// # Errors
    ///
    /// Same as [`SecurityToken::add_issuer_wallet`].
    pub fn add_platform_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
    ) -> Result<(), TokenError> {
        self.add_special(caller, wallet, WalletKind::Platform)
    }

    /// Register an exchange wallet.
    ///
    /// # Errors
    ///
    /// Same as [`SecurityToken::add_issuer_wallet`].
    pub fn add_exchange_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
    ) -> Result<(), TokenError> {
        self.add_special(caller, wallet, WalletKind::Exchange)
    }

    /// Register the omnibus TBE wallet.
    ///
    /// # Errors
    ///
    /// Fails unless the token was created with `omnibus_tbe`, and as
    /// [`SecurityToken::add_issuer_wallet`].
    pub fn add_omnibus_tbe_wallet(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
    ) -> Result<(), TokenError> {
        if !self.features.omnibus_tbe {
            return Err(TokenError::FeatureDisabled {
                feature: "omnibus_tbe",
            });
        }
        self.add_special(caller, wallet, WalletKind::OmnibusTbe)
    }

    fn add_special(
        &self,
        caller: &WalletAddress,
        wallet: WalletAddress,
        kind: WalletKind,
    ) -> Result<(), TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        if let Some(investor) = state.registry.investor_of(&wallet) {
            return Err(RegistryError::WalletAlreadyBound { wallet, investor }.into());
        }
        state.require_empty(&wallet)?;
        match kind {
            WalletKind::Issuer => state.wallets.add_issuer_wallet(wallet)?,
            WalletKind::Platform => state.wallets.add_platform_wallet(wallet)?,
            WalletKind::Exchange => state.wallets.add_exchange_wallet(wallet)?,
            WalletKind::OmnibusTbe => state.wallets.add_omnibus_tbe_wallet(wallet)?,
            WalletKind::Regular => {
                return Err(malformed("wallet kind", kind, "not a special kind"));
            }
        }
        Ok(())
    }

    /// Remove an empty special wallet, returning its kind.
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-empty wallets.
    pub fn remove_special_wallet(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
    ) -> Result<WalletKind, TokenError> {
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        state.require_empty(wallet)?;
        Ok(state.wallets.remove_special_wallet(wallet)?)
    }

    /// Kind of a wallet.
    pub fn wallet_kind(&self, wallet: &WalletAddress) -> WalletKind {
        self.state.read().wallets.kind_of(wallet)
    }

    // -- Issuance ----------------------------------------------------------

    /// Mint `value` tokens into `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::Rejected`] for a non-zero compliance code,
    /// `InvalidTime` for a zero effective issuance time.
    pub fn issue(
        &self,
        caller: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        issuance_time: Timestamp,
    ) -> Result<IssuanceOutcome, TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        if state.ledger.total_issued().checked_add(value).is_none() {
            return Err(malformed("value", value, "total supply would overflow"));
        }
        let outcome = {
            let (views, engine, compliance) = state.split();
            engine.validate_issuance(views, compliance, to, value, issuance_time, now)?
        };
        if !outcome.code.is_valid() {
            return Err(reject("issue", outcome.code));
        }
        state.ledger.mint(to, value, outcome.partition.as_ref())?;
        if let (true, Some(partition)) = (outcome.partition_created, &outcome.partition) {
            let region = state
                .compliance
                .partitions
                .get(partition)
                .map(|p| p.region)
                .unwrap_or_default();
            state.audit.record(
                now,
                AuditEvent::PartitionCreated {
                    partition: partition.clone(),
                    issuance_time: outcome.issuance_time,
                    region,
                },
            );
        }
        state.audit.record(
            now,
            AuditEvent::Issued {
                to: to.clone(),
                value,
                issuance_time: outcome.issuance_time,
                partition: outcome.partition.clone(),
            },
        );
        tracing::info!(token = %self.name, to = %to, value, issuance_time = %outcome.issuance_time, "tokens issued");
        Ok(outcome)
    }

    /// Pure pre-flight check of an issuance.
    pub fn pre_issuance_check(&self, to: &WalletAddress, value: Amount) -> ComplianceCode {
        let state = self.state.read();
        state
            .engine
            .pre_issuance_check(state.views(), &state.compliance, to, value)
    }

    // -- Transfer ----------------------------------------------------------

    /// Move `value` tokens from `from` to `to`. The sender authorizes its
    /// own transfer. Partitioned tokens draw oldest partitions first.
    ///
    /// # Errors
    ///
    /// [`TokenError::Rejected`] for a non-zero compliance code.
    pub fn transfer(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let plan = if self.features.partitioned {
            let code = state.engine.pre_transfer_check(
                state.views(),
                &state.compliance,
                from,
                to,
                value,
                now,
            );
            if !code.is_valid() {
                return Err(reject("transfer", code));
            }
            // Self-transfers, Platform destinations and TBE senders skip locks.
            let respect_locks = from != to
                && state.wallets.kind_of(from) != WalletKind::OmnibusTbe
                && state.wallets.kind_of(to) != WalletKind::Platform;
            match state.plan(from, value, respect_locks, now) {
                Some(plan) => Some(plan),
                None => return Err(reject("transfer", ComplianceCode::TokensLocked)),
            }
        } else {
            None
        };
        self.commit_transfer(state, from, to, value, plan, now)
    }

    /// Move tokens out of explicit partitions.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for mismatched, duplicated, zero or
    /// unknown partitions; [`TokenError::Rejected`] for a non-zero code.
    pub fn transfer_by_partitions(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        partitions: &[PartitionId],
        amounts: &[Amount],
    ) -> Result<(), TokenError> {
        if !self.features.partitioned {
            return Err(TokenError::FeatureDisabled {
                feature: "partitioned",
            });
        }
        let value = amounts
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(*a))
            .ok_or_else(|| malformed("amounts", "overflow", "sum overflows"))?;
        regtoken_compliance::validate_explicit(partitions, amounts, value)?;
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let views = state.views();
        let code = state
            .engine
            .pre_transfer_check(views, &state.compliance, from, to, value, now);
        if !code.is_valid() {
            return Err(reject("transfer_by_partitions", code));
        }
        let code = state.engine.check_explicit_partitions(
            views,
            &state.compliance,
            from,
            partitions,
            amounts,
            value,
            now,
        )?;
        if !code.is_valid() {
            return Err(reject("transfer_by_partitions", code));
        }
        let plan = partitions.iter().cloned().zip(amounts.iter().copied()).collect();
        self.commit_transfer(state, from, to, value, Some(plan), now)
    }

    fn commit_transfer(
        &self,
        state: &mut TokenState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        plan: Option<Vec<(PartitionId, Amount)>>,
        now: Timestamp,
    ) -> Result<(), TokenError> {
        let code = {
            let (views, engine, compliance) = state.split();
            engine.validate_transfer(views, compliance, from, to, value, now)?
        };
        if !code.is_valid() {
            return Err(reject("transfer", code));
        }
        state.ledger.transfer(from, to, value, plan.as_deref())?;
        state.audit.record(
            now,
            AuditEvent::Transferred {
                from: from.clone(),
                to: to.clone(),
                value,
            },
        );
        tracing::info!(token = %self.name, from = %from, to = %to, value, "tokens transferred");
        Ok(())
    }

    /// Pure pre-flight check of a transfer at the current time.
    pub fn pre_transfer_check(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
    ) -> ComplianceCode {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .engine
            .pre_transfer_check(state.views(), &state.compliance, from, to, value, now)
    }

    /// Pure pre-flight check of a transfer at `as_of`.
    ///
    /// # Errors
    ///
    /// `InvalidTime` when `as_of` is zero.
    pub fn pre_transfer_check_at(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        as_of: Timestamp,
    ) -> Result<ComplianceCode, TokenError> {
        if as_of.is_zero() {
            return Err(ComplianceError::InvalidTime.into());
        }
        let state = self.state.read();
        Ok(state
            .engine
            .pre_transfer_check(state.views(), &state.compliance, from, to, value, as_of))
    }

    /// Pure check of a reallocation between two investors inside omnibus
    /// wallet `via`.
    pub fn pre_internal_transfer_check(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        via: &WalletAddress,
    ) -> ComplianceCode {
        let now = self.clock.now();
        let state = self.state.read();
        state.engine.pre_internal_transfer_check(
            state.views(),
            &state.compliance,
            from,
            to,
            value,
            via,
            now,
        )
    }

    // -- Burn / seize ------------------------------------------------------

    /// Destroy `value` tokens held by `wallet`. Locks do not apply.
    ///
    /// # Errors
    ///
    /// [`TokenError::Rejected`] with code 15 for an insufficient balance.
    pub fn burn(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
        value: Amount,
        reason: impl Into<String>,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        let plan = self.plan_forced(state, "burn", wallet, value, now)?;
        let code = {
            let (views, engine, compliance) = state.split();
            engine.validate_burn(views, compliance, wallet, value)?
        };
        if !code.is_valid() {
            return Err(reject("burn", code));
        }
        state.ledger.burn(wallet, value, plan.as_deref())?;
        let reason = reason.into();
        tracing::info!(token = %self.name, wallet = %wallet, value, reason = %reason, "tokens burned");
        state.audit.record(
            now,
            AuditEvent::Burned {
                wallet: wallet.clone(),
                value,
                reason,
            },
        );
        Ok(())
    }

    /// Move `value` tokens from `from` to issuer wallet `to`. Locks do not
    /// apply.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] unless `to` is an issuer wallet;
    /// [`TokenError::Rejected`] with code 15 for an insufficient balance.
    pub fn seize(
        &self,
        caller: &WalletAddress,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        reason: impl Into<String>,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        let plan = self.plan_forced(state, "seize", from, value, now)?;
        let code = {
            let (views, engine, compliance) = state.split();
            engine.validate_seize(views, compliance, from, to, value)?
        };
        if !code.is_valid() {
            return Err(reject("seize", code));
        }
        state.ledger.transfer(from, to, value, plan.as_deref())?;
        let reason = reason.into();
        tracing::info!(token = %self.name, from = %from, to = %to, value, reason = %reason, "tokens seized");
        state.audit.record(
            now,
            AuditEvent::Seized {
                from: from.clone(),
                to: to.clone(),
                value,
                reason,
            },
        );
        Ok(())
    }

    /// Partition plan for a lock-ignoring debit; `None` for plain tokens.
    fn plan_forced(
        &self,
        state: &TokenState,
        operation: &'static str,
        wallet: &WalletAddress,
        value: Amount,
        now: Timestamp,
    ) -> Result<Option<Vec<(PartitionId, Amount)>>, TokenError> {
        if !self.features.partitioned {
            return Ok(None);
        }
        state
            .plan(wallet, value, false, now)
            .map(Some)
            .ok_or_else(|| reject(operation, ComplianceCode::NotEnoughTokens))
    }

    // -- Pause -------------------------------------------------------------

    /// Block ordinary transfers. Returns `false` if already paused.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is an issuer.
    pub fn pause(&self, caller: &WalletAddress) -> Result<bool, TokenError> {
        self.set_paused(caller, true)
    }

    /// Resume ordinary transfers. Returns `false` if not paused.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is an issuer.
    pub fn unpause(&self, caller: &WalletAddress) -> Result<bool, TokenError> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &WalletAddress, paused: bool) -> Result<bool, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        if state.ledger.set_paused(paused) == paused {
            return Ok(false);
        }
        let event = if paused {
            AuditEvent::Paused
        } else {
            AuditEvent::Unpaused
        };
        tracing::info!(token = %self.name, paused, "pause state changed");
        state.audit.record(now, event);
        Ok(true)
    }

    /// Whether ordinary transfers are paused.
    pub fn is_paused(&self) -> bool {
        self.state.read().ledger.is_paused()
    }

    // -- Configuration -----------------------------------------------------

    /// Set one numeric parameter.
    ///
    /// # Errors
    ///
    /// Rejects out-of-range values.
    pub fn set_uint(
        &self,
        caller: &WalletAddress,
        param: UintParam,
        value: u64,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        let change = state.engine.config_mut().set_uint(param, value)?;
        if let Some(change) = change {
            record_config_change(&mut state, now, change);
        }
        Ok(())
    }

    /// Set one boolean parameter.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is an issuer.
    pub fn set_flag(
        &self,
        caller: &WalletAddress,
        param: BoolParam,
        value: bool,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        if let Some(change) = state.engine.config_mut().set_flag(param, value) {
            record_config_change(&mut state, now, change);
        }
        Ok(())
    }

    /// Replace all 16 numeric and 5 boolean parameters at once.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for wrong array lengths; nothing
    /// changes on any error.
    pub fn set_all(
        &self,
        caller: &WalletAddress,
        uints: &[u64],
        bools: &[bool],
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        let changes = state.engine.config_mut().set_all(uints, bools)?;
        for change in changes {
            record_config_change(&mut state, now, change);
        }
        Ok(())
    }

    /// Reclassify a country. Holders from that country are re-bucketed in
    /// the same step.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is an issuer, or if the counter ledger has
    /// drifted below the holders being moved.
    pub fn set_country_compliance(
        &self,
        caller: &WalletAddress,
        country: CountryCode,
        classification: Classification,
    ) -> Result<(), TokenError> {
        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        let before_class = state.engine.config().classification_of(&country);
        if before_class == classification {
            return Ok(());
        }
        let mut deltas = CounterDeltas::default();
        let mut moved = Vec::new();
        for investor in state.holders() {
            if state.registry.country_of(&investor).as_ref() != Some(&country) {
                continue;
            }
            let before = state.engine.profile(&state.registry, &investor);
            let after = InvestorProfile {
                region: classification,
                ..before.clone()
            };
            if before != after {
                deltas = combine(deltas, &before.deltas(-1));
                deltas = combine(deltas, &after.deltas(1));
                moved.push(investor);
            }
        }
        state.compliance.counters.apply(&deltas)?;
        state
            .engine
            .config_mut()
            .set_country_compliance(country.clone(), classification);
        tracing::info!(country = %country, before = %before_class, after = %classification, holders = moved.len(), "country reclassified");
        state.audit.record(
            now,
            AuditEvent::CountryComplianceChanged {
                country,
                before: before_class,
                after: classification,
            },
        );
        for investor in moved {
            record_rebucket(state, now, &investor, "country_compliance");
        }
        Ok(())
    }

    /// Snapshot of the configuration.
    pub fn config(&self) -> ComplianceConfig {
        self.state.read().engine.config().clone()
    }

    // -- Locks -------------------------------------------------------------

    /// Append a lock record to `wallet`, returning its index.
    ///
    /// Partitioned tokens require a partition scope; plain tokens reject
    /// one.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for zero amounts, past release times
    /// and a wrong partition scope.
    pub fn add_manual_lock_record(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
        record: LockRecord,
    ) -> Result<usize, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        self.check_lock_scope(&state, record.partition.as_ref())?;
        let event = AuditEvent::LockAdded {
            wallet: wallet.clone(),
            value: record.value,
            reason_code: record.reason_code,
            reason: record.reason.clone(),
            release_time: record.release_time,
            partition: record.partition.clone(),
        };
        let index = state
            .compliance
            .locks
            .add_manual_lock_record(wallet, record, now)?;
        tracing::info!(wallet = %wallet, index, "lock added");
        state.audit.record(now, event);
        Ok(index)
    }

    fn check_lock_scope(
        &self,
        state: &TokenState,
        partition: Option<&PartitionId>,
    ) -> Result<(), TokenError> {
        match (self.features.partitioned, partition) {
            (false, Some(p)) => Err(malformed("partition", p, "token is not partitioned")),
            (true, None) => Err(malformed(
                "partition",
                "none",
                "partitioned tokens lock per partition",
            )),
            (true, Some(p)) => {
                state.compliance.partitions.require(p)?;
                Ok(())
            }
            (false, None) => Ok(()),
        }
    }

    /// Remove the lock record at `index`, returning it.
    ///
    /// # Errors
    ///
    /// Fails for a bad index.
    pub fn remove_lock_record(
        &self,
        caller: &WalletAddress,
        wallet: &WalletAddress,
        partition: Option<&PartitionId>,
        index: usize,
    ) -> Result<LockRecord, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        let removed = state
            .compliance
            .locks
            .remove_lock_record(wallet, partition, index)?;
        tracing::info!(wallet = %wallet, index, "lock removed");
        state.audit.record(
            now,
            AuditEvent::LockRemoved {
                wallet: wallet.clone(),
                value: removed.value,
                reason: removed.reason.clone(),
                partition: removed.partition.clone(),
            },
        );
        Ok(removed)
    }

    /// Number of lock records on a wallet (in a partition scope).
    pub fn lock_count(&self, wallet: &WalletAddress, partition: Option<&PartitionId>) -> usize {
        self.state.read().compliance.locks.lock_count(wallet, partition)
    }

    /// The lock record at `index`.
    pub fn lock_info(
        &self,
        wallet: &WalletAddress,
        partition: Option<&PartitionId>,
        index: usize,
    ) -> Option<LockRecord> {
        self.state
            .read()
            .compliance
            .locks
            .lock_info(wallet, partition, index)
            .cloned()
    }

    /// Lock-available balance of a wallet at `as_of`, summed over
    /// partitions for partitioned tokens.
    ///
    /// # Errors
    ///
    /// `InvalidTime` when `as_of` is zero.
    pub fn transferable_tokens(
        &self,
        wallet: &WalletAddress,
        as_of: Timestamp,
    ) -> Result<Amount, TokenError> {
        if as_of.is_zero() {
            return Err(ComplianceError::InvalidTime.into());
        }
        let state = self.state.read();
        Ok(state
            .engine
            .lock_available(state.views(), &state.compliance, wallet, as_of))
    }

    /// Lock-available balance of one partition of a wallet at `as_of`.
    ///
    /// # Errors
    ///
    /// `InvalidTime` when `as_of` is zero.
    pub fn transferable_tokens_by_partition(
        &self,
        wallet: &WalletAddress,
        partition: &PartitionId,
        as_of: Timestamp,
    ) -> Result<Amount, TokenError> {
        let state = self.state.read();
        let investor = state.registry.investor_of(wallet);
        Ok(state.compliance.locks.transferable(
            wallet,
            investor.as_ref(),
            Some(partition),
            state.ledger.balance_of_partition(wallet, partition),
            as_of,
        )?)
    }

    /// Lock every wallet of an investor. Returns `false` if already locked.
    ///
    /// # Errors
    ///
    /// Fails for an unknown investor.
    pub fn lock_investor(
        &self,
        caller: &WalletAddress,
        investor: &InvestorId,
    ) -> Result<bool, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        require_investor(&state.registry, investor)?;
        let changed = state.compliance.locks.lock_investor(investor.clone());
        if changed {
            tracing::info!(investor = %investor, "investor locked");
            state.audit.record(
                now,
                AuditEvent::InvestorLocked {
                    investor: investor.clone(),
                },
            );
        }
        Ok(changed)
    }

    /// Clear the investor-wide lock. Returns `false` if not locked.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is an issuer.
    pub fn unlock_investor(
        &self,
        caller: &WalletAddress,
        investor: &InvestorId,
    ) -> Result<bool, TokenError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.require(caller, Role::Issuer)?;
        let changed = state.compliance.locks.unlock_investor(investor);
        if changed {
            tracing::info!(investor = %investor, "investor unlocked");
            state.audit.record(
                now,
                AuditEvent::InvestorUnlocked {
                    investor: investor.clone(),
                },
            );
        }
        Ok(changed)
    }

    /// Whether the investor is fully locked.
    pub fn is_investor_locked(&self, investor: &InvestorId) -> bool {
        self.state
            .read()
            .compliance
            .locks
            .is_investor_locked(investor)
    }

    // -- Queries -----------------------------------------------------------

    /// Balance of a wallet.
    pub fn balance_of(&self, wallet: &WalletAddress) -> Amount {
        self.state.read().ledger.balance_of(wallet)
    }

    /// Aggregate balance of an investor over its counted wallets.
    pub fn balance_of_investor(&self, investor: &InvestorId) -> Amount {
        let state = self.state.read();
        state.engine.investor_balance(state.views(), investor)
    }

    /// Balance of a wallet in one partition.
    pub fn balance_of_by_partition(&self, wallet: &WalletAddress, partition: &PartitionId) -> Amount {
        self.state
            .read()
            .ledger
            .balance_of_partition(wallet, partition)
    }

    /// Partitions in which the wallet holds tokens, oldest first.
    pub fn partitions_of(&self, wallet: &WalletAddress) -> Vec<PartitionId> {
        let state = self.state.read();
        let mut ids = state.ledger.partitions_of(wallet);
        state.compliance.partitions.sort_oldest_first(&mut ids);
        ids
    }

    /// Metadata of a partition.
    pub fn partition(&self, id: &PartitionId) -> Option<Partition> {
        self.state.read().compliance.partitions.get(id).cloned()
    }

    /// Total supply.
    pub fn total_issued(&self) -> Amount {
        self.state.read().ledger.total_issued()
    }

    /// Snapshot of the investor counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.state.read().compliance.counters.snapshot()
    }

    /// Copy of the retained audit entries, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().audit.entries().to_vec()
    }

    /// Number of retained audit entries.
    pub fn audit_len(&self) -> usize {
        self.state.read().audit.len()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_investor(registry: &InvestorRegistry, id: &InvestorId) -> Result<(), TokenError> {
    if !registry.is_investor(id) {
        return Err(RegistryError::UnknownInvestor {
            investor: id.clone(),
        }
        .into());
    }
    Ok(())
}

fn require_regular(wallets: &WalletManager, wallet: &WalletAddress) -> Result<(), TokenError> {
    let kind = wallets.kind_of(wallet);
    if kind != WalletKind::Regular {
        return Err(RegistryError::WalletKindConflict {
            wallet: wallet.clone(),
            kind,
        }
        .into());
    }
    Ok(())
}

fn warn_unclassified(engine: &ComplianceEngine, country: &CountryCode) {
    if engine.config().classification_of(country) == Classification::None {
        tracing::warn!(country = %country, "country has no compliance classification");
    }
}

fn record_rebucket(state: &mut TokenState, now: Timestamp, investor: &InvestorId, cause: &str) {
    tracing::info!(investor = %investor, cause, "investor counters re-bucketed");
    state.audit.record(
        now,
        AuditEvent::CountersRebucketed {
            investor: investor.clone(),
            cause: cause.to_string(),
        },
    );
}

fn record_config_change(
    state: &mut TokenState,
    now: Timestamp,
    change: regtoken_compliance::ConfigChange,
) {
    tracing::info!(field = %change.field, before = %change.before, after = %change.after, "configuration changed");
    state.audit.record(
        now,
        AuditEvent::ConfigChanged {
            field: change.field,
            before: change.before,
            after: change.after,
        },
    );
}
