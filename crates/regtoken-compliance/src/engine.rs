//! # Compliance Decision Engine
//!
//! Classifies every issuance, transfer, burn and seize into exactly one
//! [`ComplianceCode`], and on success applies the matching counter ledger
//! update.
//!
//! ## Query and mutating forms
//!
//! `pre_*_check` methods borrow the state immutably and always return a
//! code. `validate_*` methods evaluate the same pipeline and, only when the
//! code is [`ComplianceCode::Valid`], apply counter deltas, issuance lots and
//! partitions. A non-zero code leaves every piece of state untouched.
//!
//! ## Transfer pipeline
//!
//! Rules run in a fixed order and the first failure wins:
//!
//! 1. Preamble: paused (10), balance (15), self-transfer (0). The
//!    [`EngineVariant`] fixes the relative order of the first two.
//! 2. Omnibus to omnibus (81), registry membership (20).
//! 3. Platform destination: full-transfer rule only (50).
//! 4. Omnibus TBE source: valid.
//! 5. Locks (16), same investor (0), forbidden destination (26).
//! 6. Hold-up (32 US / 33 non-US), flowback (25), full transfer (50).
//! 7. Accreditation (61, 62), category capacity (40), minimum total
//!    investors (71), minimum (51) and maximum (52) holdings.
//!
//! ## Dependency direction
//!
//! The engine reads the registries and the ledger through [`Views`] and
//! reads/writes [`ComplianceState`]. Nothing it reads holds a reference
//! back to the engine.

use regtoken_core::{
    Amount, AttributeKind, Classification, ComplianceCode, CounterDeltas, CounterSnapshot,
    InvestorId, PartitionId, Timestamp, ValidationError, WalletAddress, WalletKind,
};
use regtoken_registry::RegistryView;

use crate::config::ComplianceConfig;
use crate::counters::{combine, InvestorCounters, InvestorProfile};
use crate::error::ComplianceError;
use crate::issuance::IssuanceRecords;
use crate::locks::LockManager;
use crate::partition::{draw_in_order, validate_explicit, PartitionManager};
use crate::view::Views;

// ---------------------------------------------------------------------------
// EngineVariant / ComplianceState
// ---------------------------------------------------------------------------

/// Which flavor of the pipeline a token runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineVariant {
    /// Wallet-level balances and locks. Preamble: paused, balance, self.
    Plain,
    /// Partition-scoped balances and locks. Preamble: balance, paused, self.
    Partitioned,
}

/// Compliance-owned mutable state of one token.
#[derive(Debug, Clone, Default)]
pub struct ComplianceState {
    /// Investor counter ledger.
    pub counters: InvestorCounters,
    /// Lock records.
    pub locks: LockManager,
    /// Issuance lots for hold-up periods.
    pub issuances: IssuanceRecords,
    /// Partition arena.
    pub partitions: PartitionManager,
}

/// Result of a committed issuance decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceOutcome {
    /// Decision.
    pub code: ComplianceCode,
    /// Issuance time actually used.
    pub issuance_time: Timestamp,
    /// Partition credited, for partitioned tokens.
    pub partition: Option<PartitionId>,
    /// Whether the partition was created by this issuance.
    pub partition_created: bool,
}

// ---------------------------------------------------------------------------
// Party
// ---------------------------------------------------------------------------

/// A wallet resolved against the registries.
#[derive(Debug, Clone)]
struct Party<'w> {
    wallet: &'w WalletAddress,
    kind: WalletKind,
    omnibus: bool,
    investor: Option<InvestorId>,
    profile: Option<InvestorProfile>,
}

impl Party<'_> {
    /// Counted toward the investor ledger: a regular, non-omnibus wallet
    /// bound to an investor.
    fn counted(&self) -> bool {
        self.kind == WalletKind::Regular && !self.omnibus && self.investor.is_some()
    }

    fn known_as_sender(&self) -> bool {
        self.kind != WalletKind::Regular || self.investor.is_some()
    }

    fn known_as_receiver(&self) -> bool {
        matches!(self.kind, WalletKind::Platform | WalletKind::OmnibusTbe)
            || self.investor.is_some()
    }

    fn region(&self) -> Option<Classification> {
        self.profile.as_ref().map(|p| p.region)
    }

    fn is_us(&self) -> bool {
        self.region() == Some(Classification::Us)
    }
}

// ---------------------------------------------------------------------------
// ComplianceEngine
// ---------------------------------------------------------------------------

/// The rule pipeline and its configuration.
#[derive(Debug, Clone)]
pub struct ComplianceEngine {
    config: ComplianceConfig,
    variant: EngineVariant,
}

impl ComplianceEngine {
    /// Create an engine.
    pub fn new(config: ComplianceConfig, variant: EngineVariant) -> Self {
        Self { config, variant }
    }

    /// Current configuration.
    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Mutable configuration. Callers holding tokens' counters must
    /// re-bucket holders whose classification changes.
    pub fn config_mut(&mut self) -> &mut ComplianceConfig {
        &mut self.config
    }

    /// Pipeline flavor.
    pub fn variant(&self) -> EngineVariant {
        self.variant
    }

    // -- Investor helpers ------------------------------------------------

    /// Category memberships of an investor under the current configuration.
    pub fn profile(&self, registry: &dyn RegistryView, investor: &InvestorId) -> InvestorProfile {
        let country = registry.country_of(investor);
        InvestorProfile {
            region: self.config.region_of(country.as_ref()),
            country,
            accredited: registry
                .attribute_value(investor, AttributeKind::Accredited)
                .is_approved(),
            qualified: registry
                .attribute_value(investor, AttributeKind::Qualified)
                .is_approved(),
        }
    }

    /// Aggregate balance over the investor's counted wallets.
    pub fn investor_balance(&self, views: Views<'_>, investor: &InvestorId) -> Amount {
        views
            .registry
            .wallets_of(investor)
            .iter()
            .filter(|w| {
                !views.registry.is_omnibus_wallet(w)
                    && views.wallets.kind_of(w) == WalletKind::Regular
            })
            .fold(0u64, |acc, w| acc.saturating_add(views.ledger.balance_of(w)))
    }

    /// Whether a wallet is an omnibus wallet of either flavor.
    pub fn is_omnibus(&self, views: Views<'_>, wallet: &WalletAddress) -> bool {
        views.wallets.kind_of(wallet) == WalletKind::OmnibusTbe
            || views.registry.is_omnibus_wallet(wallet)
    }

    fn resolve<'w>(&self, views: Views<'_>, wallet: &'w WalletAddress) -> Party<'w> {
        let investor = views.registry.investor_of(wallet);
        let profile = investor
            .as_ref()
            .map(|i| self.profile(views.registry, i));
        Party {
            wallet,
            kind: views.wallets.kind_of(wallet),
            omnibus: self.is_omnibus(views, wallet),
            investor,
            profile,
        }
    }

    fn required_minimum(&self, profile: &InvestorProfile) -> Amount {
        let regional = match profile.region {
            Classification::Us => self.config.min_us_tokens,
            Classification::Eu => self.config.min_eu_tokens,
            _ => 0,
        };
        self.config.minimum_holdings_per_investor.max(regional)
    }

    fn party_balance(&self, views: Views<'_>, party: &Party<'_>) -> Amount {
        party
            .investor
            .as_ref()
            .map_or(0, |i| self.investor_balance(views, i))
    }

    // -- Availability ------------------------------------------------------

    /// Lock-available amount of a wallet: wallet-level for the plain
    /// variant, summed over partitions for the partitioned variant.
    pub fn lock_available(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        wallet: &WalletAddress,
        as_of: Timestamp,
    ) -> Amount {
        let investor = views.registry.investor_of(wallet);
        match self.variant {
            EngineVariant::Plain => state.locks.available(
                wallet,
                investor.as_ref(),
                None,
                views.ledger.balance_of(wallet),
                as_of,
            ),
            EngineVariant::Partitioned => views
                .ledger
                .partitions_of(wallet)
                .iter()
                .map(|p| {
                    state.locks.available(
                        wallet,
                        investor.as_ref(),
                        Some(p),
                        views.ledger.balance_of_partition(wallet, p),
                        as_of,
                    )
                })
                .fold(0u64, u64::saturating_add),
        }
    }

    fn hold_up_available(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        party: &Party<'_>,
        lock_period: u64,
        as_of: Timestamp,
    ) -> Amount {
        match self.variant {
            EngineVariant::Plain => {
                let available = self.lock_available(views, state, party.wallet, as_of);
                let held = party
                    .investor
                    .as_ref()
                    .map_or(0, |i| state.issuances.held(i, lock_period, as_of));
                available.saturating_sub(held)
            }
            EngineVariant::Partitioned => views
                .ledger
                .partitions_of(party.wallet)
                .iter()
                .filter(|p| {
                    state
                        .partitions
                        .get(p)
                        .is_some_and(|meta| meta.issuance_time.has_elapsed(lock_period, as_of))
                })
                .map(|p| {
                    state.locks.available(
                        party.wallet,
                        party.investor.as_ref(),
                        Some(p),
                        views.ledger.balance_of_partition(party.wallet, p),
                        as_of,
                    )
                })
                .fold(0u64, u64::saturating_add),
        }
    }

    fn hold_up_rule(&self, party: &Party<'_>) -> Option<(u64, ComplianceCode)> {
        party.profile.as_ref()?;
        let (period, code) = if party.is_us() {
            (self.config.us_lock_period, ComplianceCode::HoldUp1y)
        } else {
            (self.config.non_us_lock_period, ComplianceCode::HoldUp)
        };
        (period > 0).then_some((period, code))
    }

    fn full_transfer_required(&self, views: Views<'_>, src: &Party<'_>, value: Amount) -> bool {
        if src.profile.is_none() {
            return false;
        }
        let forced = (self.config.force_full_transfer && src.is_us())
            || self.config.world_wide_force_full_transfer;
        forced && value < self.party_balance(views, src)
    }

    fn flowback_blocked(&self, src: &Party<'_>, dst: &Party<'_>, as_of: Timestamp) -> bool {
        let end = self.config.block_flowback_end_time;
        !end.is_zero()
            && as_of < end
            && dst.is_us()
            && src.profile.is_some()
            && !src.is_us()
    }

    fn accreditation_code(&self, parties: &[&Party<'_>]) -> Option<ComplianceCode> {
        let profiles = parties.iter().filter_map(|p| p.profile.as_ref());
        if self.config.force_accredited && profiles.clone().any(|p| !p.accredited) {
            return Some(ComplianceCode::OnlyAccredited);
        }
        if self.config.force_accredited_us
            && profiles
                .filter(|p| p.region == Classification::Us)
                .any(|p| !p.accredited)
        {
            return Some(ComplianceCode::OnlyUsAccredited);
        }
        None
    }

    fn breaches_capacity(&self, state: &ComplianceState, deltas: &CounterDeltas) -> bool {
        match state.counters.first_breach(deltas, &self.config) {
            Ok(breach) => breach.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "counter projection failed during capacity check");
                false
            }
        }
    }

    // -- Counter transitions ----------------------------------------------

    /// Whether moving `value` out of `party` empties its investor.
    fn leaves(&self, views: Views<'_>, party: &Party<'_>, value: Amount) -> bool {
        party.counted() && value > 0 && self.party_balance(views, party) == value
    }

    /// Whether moving `value` into `party` makes its investor a holder.
    fn enters(&self, views: Views<'_>, party: &Party<'_>, value: Amount) -> bool {
        party.counted() && value > 0 && self.party_balance(views, party) == 0
    }

    fn transfer_deltas(
        &self,
        views: Views<'_>,
        src: &Party<'_>,
        dst: &Party<'_>,
        value: Amount,
    ) -> CounterDeltas {
        if src.investor.is_some() && src.investor == dst.investor {
            return CounterDeltas::default();
        }
        let mut deltas = CounterDeltas::default();
        if let Some(p) = src.profile.as_ref().filter(|_| self.leaves(views, src, value)) {
            deltas = combine(deltas, &p.deltas(-1));
        }
        if let Some(p) = dst.profile.as_ref().filter(|_| self.enters(views, dst, value)) {
            deltas = combine(deltas, &p.deltas(1));
        }
        deltas
    }

    // -- Transfer ----------------------------------------------------------

    /// Pure pre-flight check of a transfer.
    pub fn pre_transfer_check(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        as_of: Timestamp,
    ) -> ComplianceCode {
        let code = self.transfer_code(views, state, from, to, value, as_of);
        tracing::debug!(
            operation = "transfer",
            from = %from,
            to = %to,
            value,
            code = code.code(),
            reason = code.reason(),
            "compliance decision"
        );
        code
    }

    fn transfer_code(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        as_of: Timestamp,
    ) -> ComplianceCode {
        let paused =
            views.ledger.is_paused() && views.wallets.kind_of(from) != WalletKind::OmnibusTbe;
        let short = views.ledger.balance_of(from) < value;
        match self.variant {
            EngineVariant::Plain => {
                if paused {
                    return ComplianceCode::TokenPaused;
                }
                if short {
                    return ComplianceCode::NotEnoughTokens;
                }
            }
            EngineVariant::Partitioned => {
                if short {
                    return ComplianceCode::NotEnoughTokens;
                }
                if paused {
                    return ComplianceCode::TokenPaused;
                }
            }
        }
        if from == to {
            return ComplianceCode::Valid;
        }

        let src = self.resolve(views, from);
        let dst = self.resolve(views, to);
        if src.omnibus && dst.omnibus {
            return ComplianceCode::OmnibusToOmnibus;
        }
        if !src.known_as_sender() || !dst.known_as_receiver() {
            return ComplianceCode::WalletNotInRegistry;
        }
        if dst.kind == WalletKind::Platform {
            return if self.full_transfer_required(views, &src, value) {
                ComplianceCode::OnlyFullTransfer
            } else {
                ComplianceCode::Valid
            };
        }
        if src.kind == WalletKind::OmnibusTbe {
            return ComplianceCode::Valid;
        }
        if self.lock_available(views, state, from, as_of) < value {
            return ComplianceCode::TokensLocked;
        }
        if src.investor.is_some() && src.investor == dst.investor {
            return ComplianceCode::Valid;
        }
        if dst.region() == Some(Classification::Forbidden) {
            return ComplianceCode::DestinationRestricted;
        }
        if let Some((period, code)) = self.hold_up_rule(&src) {
            if self.hold_up_available(views, state, &src, period, as_of) < value {
                return code;
            }
        }
        if self.flowback_blocked(&src, &dst, as_of) {
            return ComplianceCode::Flowback;
        }
        if self.full_transfer_required(views, &src, value) {
            return ComplianceCode::OnlyFullTransfer;
        }
        if let Some(code) = self.accreditation_code(&[&src, &dst]) {
            return code;
        }
        self.capacity_and_holdings_code(views, state, &src, &dst, value)
    }

    fn capacity_and_holdings_code(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        src: &Party<'_>,
        dst: &Party<'_>,
        value: Amount,
    ) -> ComplianceCode {
        let deltas = self.transfer_deltas(views, src, dst, value);
        if self.breaches_capacity(state, &deltas) {
            return ComplianceCode::MaxInvestorsInCategory;
        }
        let minimum_total = self.config.minimum_total_investors;
        if minimum_total > 0
            && self.leaves(views, src, value)
            && !self.enters(views, dst, value)
            && state.counters.total_investors_count() <= minimum_total
        {
            return ComplianceCode::NotEnoughInvestors;
        }
        if let Some(profile) = &src.profile {
            let remaining = self.party_balance(views, src).saturating_sub(value);
            if remaining > 0 && remaining < self.required_minimum(profile) {
                return ComplianceCode::AmountUnderMin;
            }
        }
        if let Some(profile) = &dst.profile {
            let resulting = self.party_balance(views, dst).saturating_add(value);
            if resulting < self.required_minimum(profile) {
                return ComplianceCode::AmountUnderMin;
            }
            let max = self.config.maximum_holdings_per_investor;
            if max > 0 && resulting > max {
                return ComplianceCode::AmountAboveMax;
            }
        }
        ComplianceCode::Valid
    }

    /// Evaluate a transfer and, if valid, apply its counter transition.
    ///
    /// The caller moves the balances afterwards under the same write lock.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::CounterUnderflow`] if the ledger has
    /// drifted below the per-wallet holder count (possible only after
    /// omnibus corrections). Nothing is applied in that case.
    pub fn validate_transfer(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        as_of: Timestamp,
    ) -> Result<ComplianceCode, ComplianceError> {
        let code = self.pre_transfer_check(views, state, from, to, value, as_of);
        if !code.is_valid() || from == to {
            return Ok(code);
        }
        let src = self.resolve(views, from);
        let dst = self.resolve(views, to);
        let deltas = self.transfer_deltas(views, &src, &dst, value);
        state.counters.apply(&deltas)?;
        if let Some(investor) = &src.investor {
            state
                .issuances
                .prune(investor, self.config.max_lock_period(), as_of);
        }
        Ok(code)
    }

    /// Check an explicit `(partition, amount)` vector for a partitioned
    /// transfer out of `from`.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::MalformedInput`] for a bad vector and
    /// [`ComplianceError::UnknownPartition`] for ids not in the arena.
    #[allow(clippy::too_many_arguments)]
    pub fn check_explicit_partitions(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        partitions: &[PartitionId],
        amounts: &[Amount],
        value: Amount,
        as_of: Timestamp,
    ) -> Result<ComplianceCode, ComplianceError> {
        validate_explicit(partitions, amounts, value)?;
        let src = self.resolve(views, from);
        let hold_up = self.hold_up_rule(&src);
        for (partition, amount) in partitions.iter().zip(amounts) {
            let meta = state.partitions.require(partition)?;
            let balance = views.ledger.balance_of_partition(from, partition);
            if balance < *amount {
                return Ok(ComplianceCode::NotEnoughTokens);
            }
            if src.kind == WalletKind::OmnibusTbe {
                continue;
            }
            let available = state.locks.available(
                from,
                src.investor.as_ref(),
                Some(partition),
                balance,
                as_of,
            );
            if available < *amount {
                return Ok(ComplianceCode::TokensLocked);
            }
            if let Some((period, code)) = hold_up {
                if !meta.issuance_time.has_elapsed(period, as_of) {
                    return Ok(code);
                }
            }
        }
        Ok(ComplianceCode::Valid)
    }

    /// Decompose `value` over the wallet's partitions, oldest first.
    ///
    /// With `respect_locks`, each partition contributes only its
    /// lock-available amount. Returns `None` if the partitions cannot
    /// cover `value`.
    pub fn plan_partitions(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        value: Amount,
        respect_locks: bool,
        as_of: Timestamp,
    ) -> Option<Vec<(PartitionId, Amount)>> {
        let mut ids = views.ledger.partitions_of(from);
        state.partitions.sort_oldest_first(&mut ids);
        let investor = views.registry.investor_of(from);
        let available: Vec<(PartitionId, Amount)> = ids
            .into_iter()
            .map(|p| {
                let balance = views.ledger.balance_of_partition(from, &p);
                let amount = if respect_locks {
                    state
                        .locks
                        .available(from, investor.as_ref(), Some(&p), balance, as_of)
                } else {
                    balance
                };
                (p, amount)
            })
            .collect();
        draw_in_order(&available, value)
    }

    // -- Internal omnibus reallocation ------------------------------------

    /// Pure check of a reallocation between two investors inside omnibus
    /// wallet `via`. Runs the regulatory subset of the transfer pipeline;
    /// pause does not apply.
    #[allow(clippy::too_many_arguments)]
    pub fn pre_internal_transfer_check(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        via: &WalletAddress,
        as_of: Timestamp,
    ) -> ComplianceCode {
        let code = self.internal_transfer_code(views, state, from, to, value, via, as_of);
        tracing::debug!(
            operation = "internal_transfer",
            from = %from,
            to = %to,
            via = %via,
            value,
            code = code.code(),
            reason = code.reason(),
            "compliance decision"
        );
        code
    }

    #[allow(clippy::too_many_arguments)]
    fn internal_transfer_code(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        via: &WalletAddress,
        as_of: Timestamp,
    ) -> ComplianceCode {
        // Reallocation inside an omnibus wallet is exempt from pause.
        if !self.is_omnibus(views, via) {
            return ComplianceCode::WalletNotInRegistry;
        }
        let src = self.resolve(views, from);
        let dst = self.resolve(views, to);
        if src.investor.is_none() || dst.investor.is_none() {
            return ComplianceCode::WalletNotInRegistry;
        }
        if src.investor == dst.investor {
            return ComplianceCode::Valid;
        }
        if dst.region() == Some(Classification::Forbidden) {
            return ComplianceCode::DestinationRestricted;
        }
        if self.flowback_blocked(&src, &dst, as_of) {
            return ComplianceCode::Flowback;
        }
        if let Some(code) = self.accreditation_code(&[&src, &dst]) {
            return code;
        }
        if let Some(profile) = dst.profile.as_ref().filter(|_| self.enters(views, &dst, value)) {
            if self.breaches_capacity(state, &profile.deltas(1)) {
                return ComplianceCode::MaxInvestorsInCategory;
            }
        }
        ComplianceCode::Valid
    }

    // -- Issuance ----------------------------------------------------------

    /// Pure pre-flight check of an issuance.
    pub fn pre_issuance_check(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        to: &WalletAddress,
        value: Amount,
    ) -> ComplianceCode {
        let code = self.issuance_code(views, state, to, value);
        tracing::debug!(
            operation = "issuance",
            to = %to,
            value,
            code = code.code(),
            reason = code.reason(),
            "compliance decision"
        );
        code
    }

    fn issuance_code(
        &self,
        views: Views<'_>,
        state: &ComplianceState,
        to: &WalletAddress,
        value: Amount,
    ) -> ComplianceCode {
        let dst = self.resolve(views, to);
        if dst.kind.is_special() {
            return ComplianceCode::WalletNotInRegistry;
        }
        if dst.kind != WalletKind::OmnibusTbe {
            let Some(profile) = dst.profile.as_ref() else {
                return ComplianceCode::WalletNotInRegistry;
            };
            if profile.region == Classification::Forbidden {
                return ComplianceCode::DestinationRestricted;
            }
            if self.enters(views, &dst, value) && self.breaches_capacity(state, &profile.deltas(1))
            {
                return ComplianceCode::MaxInvestorsInCategory;
            }
            if let Some(code) = self.accreditation_code(&[&dst]) {
                return code;
            }
            let resulting = self.party_balance(views, &dst).saturating_add(value);
            if resulting < self.required_minimum(profile) {
                return ComplianceCode::AmountUnderMin;
            }
            let max = self.config.maximum_holdings_per_investor;
            if max > 0 && resulting > max {
                return ComplianceCode::AmountAboveMax;
            }
        }
        let authorized = self.config.authorized_securities;
        if authorized > 0 && views.ledger.total_issued().saturating_add(value) > authorized {
            return ComplianceCode::MaxAuthorizedSecuritiesExceeded;
        }
        ComplianceCode::Valid
    }

    /// Evaluate an issuance and, if valid, apply its counter transition,
    /// record the hold-up lot and create the partition.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::InvalidTime`] if the effective issuance
    /// time is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_issuance(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        to: &WalletAddress,
        value: Amount,
        issuance_time: Timestamp,
        as_of: Timestamp,
    ) -> Result<IssuanceOutcome, ComplianceError> {
        let effective = if self.config.disallow_back_dating {
            as_of
        } else {
            issuance_time
        };
        if effective.is_zero() {
            return Err(ComplianceError::InvalidTime);
        }
        let code = self.pre_issuance_check(views, state, to, value);
        let mut outcome = IssuanceOutcome {
            code,
            issuance_time: effective,
            partition: None,
            partition_created: false,
        };
        if !code.is_valid() {
            return Ok(outcome);
        }
        let dst = self.resolve(views, to);
        if let Some(profile) = dst.profile.as_ref().filter(|_| self.enters(views, &dst, value)) {
            state.counters.apply(&profile.deltas(1))?;
        }
        match self.variant {
            EngineVariant::Plain => {
                if let Some(investor) = dst.investor {
                    state.issuances.record(investor, value, effective);
                }
            }
            EngineVariant::Partitioned => {
                let region = dst.region().unwrap_or_default();
                let (id, created) = state.partitions.ensure(effective, region);
                outcome.partition = Some(id);
                outcome.partition_created = created;
            }
        }
        Ok(outcome)
    }

    // -- Burn / seize ------------------------------------------------------

    /// Pure check of a burn: only the balance rule applies.
    pub fn pre_burn_check(
        &self,
        views: Views<'_>,
        wallet: &WalletAddress,
        value: Amount,
    ) -> ComplianceCode {
        if views.ledger.balance_of(wallet) < value {
            ComplianceCode::NotEnoughTokens
        } else {
            ComplianceCode::Valid
        }
    }

    /// Evaluate a burn and, if valid, apply its counter transition.
    ///
    /// # Errors
    ///
    /// Same as [`ComplianceEngine::validate_transfer`].
    pub fn validate_burn(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        wallet: &WalletAddress,
        value: Amount,
    ) -> Result<ComplianceCode, ComplianceError> {
        let code = self.pre_burn_check(views, wallet, value);
        tracing::debug!(operation = "burn", wallet = %wallet, value, code = code.code(), reason = code.reason(), "compliance decision");
        if code.is_valid() {
            self.apply_leave(views, state, wallet, value)?;
        }
        Ok(code)
    }

    /// Evaluate a seize and, if valid, apply its counter transition.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::MalformedInput`] unless `to` is an issuer
    /// wallet; otherwise as [`ComplianceEngine::validate_transfer`].
    pub fn validate_seize(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
    ) -> Result<ComplianceCode, ComplianceError> {
        if views.wallets.kind_of(to) != WalletKind::Issuer {
            return Err(ValidationError::OutOfRange {
                field: "seize destination".to_string(),
                value: to.to_string(),
                reason: "must be an issuer wallet".to_string(),
            }
            .into());
        }
        let code = self.pre_burn_check(views, from, value);
        tracing::debug!(operation = "seize", from = %from, to = %to, value, code = code.code(), reason = code.reason(), "compliance decision");
        if code.is_valid() {
            self.apply_leave(views, state, from, value)?;
        }
        Ok(code)
    }

    fn apply_leave(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        wallet: &WalletAddress,
        value: Amount,
    ) -> Result<(), ComplianceError> {
        let party = self.resolve(views, wallet);
        if let Some(profile) = party.profile.as_ref().filter(|_| self.leaves(views, &party, value)) {
            state.counters.apply(&profile.deltas(-1))?;
        }
        Ok(())
    }

    // -- Re-bucketing --------------------------------------------------------

    /// Move a holder's counters from `before` to `after` categories.
    ///
    /// Returns `true` if anything changed. Investors with a zero aggregate
    /// balance are not counted and are left alone.
    ///
    /// # Errors
    ///
    /// Same as [`InvestorCounters::apply`].
    pub fn rebucket(
        &self,
        views: Views<'_>,
        state: &mut ComplianceState,
        investor: &InvestorId,
        before: &InvestorProfile,
        after: &InvestorProfile,
    ) -> Result<bool, ComplianceError> {
        if before == after || self.investor_balance(views, investor) == 0 {
            return Ok(false);
        }
        let deltas = combine(before.deltas(-1), &after.deltas(1));
        state.counters.apply(&deltas)?;
        Ok(true)
    }

    /// Snapshot of the counter ledger.
    pub fn counters(&self, state: &ComplianceState) -> CounterSnapshot {
        state.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use regtoken_core::{AttributeStatus, CountryCode, ONE_YEAR_SECS};
    use regtoken_registry::{InvestorRegistry, WalletManager};

    use super::*;
    use crate::view::LedgerView;
    use crate::locks::LockRecord;

    #[derive(Default)]
    struct TestLedger {
        balances: BTreeMap<WalletAddress, Amount>,
        partitions: BTreeMap<(WalletAddress, PartitionId), Amount>,
        paused: bool,
    }

    impl LedgerView for TestLedger {
        fn balance_of(&self, wallet: &WalletAddress) -> Amount {
            self.balances.get(wallet).copied().unwrap_or(0)
        }
        fn balance_of_partition(&self, wallet: &WalletAddress, partition: &PartitionId) -> Amount {
            self.partitions
                .get(&(wallet.clone(), partition.clone()))
                .copied()
                .unwrap_or(0)
        }
        fn partitions_of(&self, wallet: &WalletAddress) -> Vec<PartitionId> {
            self.partitions
                .iter()
                .filter(|((w, _), v)| w == wallet && **v > 0)
                .map(|((_, p), _)| p.clone())
                .collect()
        }
        fn total_issued(&self) -> Amount {
            self.balances.values().sum()
        }
        fn is_paused(&self) -> bool {
            self.paused
        }
    }

    struct Fixture {
        registry: InvestorRegistry,
        wallets: WalletManager,
        ledger: TestLedger,
        state: ComplianceState,
        engine: ComplianceEngine,
    }

    fn w(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_epoch_secs(secs)
    }

    impl Fixture {
        fn new(config: ComplianceConfig) -> Self {
            let mut config = config;
            for (c, cls) in [
                ("US", Classification::Us),
                ("FR", Classification::Eu),
                ("JP", Classification::Jp),
                ("CN", Classification::Forbidden),
            ] {
                config.set_country_compliance(CountryCode::new(c).unwrap(), cls);
            }
            Self {
                registry: InvestorRegistry::new(),
                wallets: WalletManager::new(),
                ledger: TestLedger::default(),
                state: ComplianceState::default(),
                engine: ComplianceEngine::new(config, EngineVariant::Plain),
            }
        }

        fn investor(&mut self, id: &str, country: &str, wallet: &str) {
            let inv = InvestorId::new(id).unwrap();
            self.registry
                .register_investor(inv.clone(), format!("hash-{id}"), Some(CountryCode::new(country).unwrap()))
                .unwrap();
            self.registry.add_wallet(w(wallet), &inv).unwrap();
        }

        fn accredit(&mut self, id: &str) {
            self.registry
                .set_attribute(
                    &InvestorId::new(id).unwrap(),
                    AttributeKind::Accredited,
                    AttributeStatus::Approved,
                    None,
                    None,
                )
                .unwrap();
        }

        fn views(&self) -> Views<'_> {
            Views {
                registry: &self.registry,
                wallets: &self.wallets,
                ledger: &self.ledger,
            }
        }

        fn issue(&mut self, to: &str, value: Amount, at: u64) -> ComplianceCode {
            let views = Views {
                registry: &self.registry,
                wallets: &self.wallets,
                ledger: &self.ledger,
            };
            let outcome = self
                .engine
                .validate_issuance(views, &mut self.state, &w(to), value, ts(at), ts(at))
                .unwrap();
            if outcome.code.is_valid() {
                *self.ledger.balances.entry(w(to)).or_default() += value;
            }
            outcome.code
        }

        fn transfer(&mut self, from: &str, to: &str, value: Amount, at: u64) -> ComplianceCode {
            let views = Views {
                registry: &self.registry,
                wallets: &self.wallets,
                ledger: &self.ledger,
            };
            let code = self
                .engine
                .validate_transfer(views, &mut self.state, &w(from), &w(to), value, ts(at))
                .unwrap();
            if code.is_valid() {
                *self.ledger.balances.entry(w(from)).or_default() -= value;
                *self.ledger.balances.entry(w(to)).or_default() += value;
            }
            code
        }

        fn check(&self, from: &str, to: &str, value: Amount, at: u64) -> ComplianceCode {
            self.engine
                .pre_transfer_check(self.views(), &self.state, &w(from), &w(to), value, ts(at))
        }
    }

    #[test]
    fn us_hold_up_blocks_until_one_year() {
        let mut f = Fixture::new(ComplianceConfig {
            us_lock_period: ONE_YEAR_SECS,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "US", "a");
        f.investor("bob", "US", "b");
        assert_eq!(f.issue("a", 100, 1_000), ComplianceCode::Valid);
        assert_eq!(f.check("a", "b", 10, 1_000 + ONE_YEAR_SECS - 1), ComplianceCode::HoldUp1y);
        assert_eq!(f.check("a", "b", 10, 1_000 + ONE_YEAR_SECS), ComplianceCode::Valid);
    }

    #[test]
    fn non_us_hold_up_uses_its_own_period() {
        let mut f = Fixture::new(ComplianceConfig {
            non_us_lock_period: 100,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 100, 1_000);
        assert_eq!(f.check("a", "b", 10, 1_050), ComplianceCode::HoldUp);
        assert_eq!(f.check("a", "b", 10, 1_100), ComplianceCode::Valid);
    }

    #[test]
    fn preamble_order_differs_by_variant() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 10, 1);
        f.ledger.paused = true;
        assert_eq!(f.check("a", "b", 50, 10), ComplianceCode::TokenPaused);
        f.engine = ComplianceEngine::new(f.engine.config().clone(), EngineVariant::Partitioned);
        assert_eq!(f.check("a", "b", 50, 10), ComplianceCode::NotEnoughTokens);
        assert_eq!(f.check("a", "a", 5, 10), ComplianceCode::TokenPaused);
    }

    #[test]
    fn unregistered_parties_are_rejected() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.issue("a", 10, 1);
        assert_eq!(f.check("a", "stranger", 5, 10), ComplianceCode::WalletNotInRegistry);
        f.wallets.add_exchange_wallet(w("exchange")).unwrap();
        assert_eq!(f.check("a", "exchange", 5, 10), ComplianceCode::WalletNotInRegistry);
        f.wallets.add_platform_wallet(w("platform")).unwrap();
        assert_eq!(f.check("a", "platform", 5, 10), ComplianceCode::Valid);
    }

    #[test]
    fn forbidden_destination_and_issuance() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.investor("chen", "CN", "c");
        assert_eq!(f.issue("c", 10, 1), ComplianceCode::DestinationRestricted);
        assert_eq!(f.state.counters.total_investors_count(), 0);
        f.issue("a", 10, 1);
        assert_eq!(f.check("a", "c", 5, 10), ComplianceCode::DestinationRestricted);
    }

    #[test]
    fn minimum_holdings_exempts_full_balance() {
        let mut f = Fixture::new(ComplianceConfig {
            minimum_holdings_per_investor: 50,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 100, 1);
        assert_eq!(f.check("a", "b", 99, 10), ComplianceCode::AmountUnderMin);
        assert_eq!(f.check("a", "b", 100, 10), ComplianceCode::Valid);
    }

    #[test]
    fn maximum_holdings_caps_receiver() {
        let mut f = Fixture::new(ComplianceConfig {
            maximum_holdings_per_investor: 100,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 100, 1);
        f.issue("b", 50, 1);
        assert_eq!(f.check("a", "b", 51, 10), ComplianceCode::AmountAboveMax);
        assert_eq!(f.issue("b", 51, 10), ComplianceCode::AmountAboveMax);
    }

    #[test]
    fn full_transfer_rule_for_us_senders() {
        let mut f = Fixture::new(ComplianceConfig {
            force_full_transfer: true,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "US", "a");
        f.investor("bob", "US", "b");
        f.investor("eve", "FR", "e");
        f.issue("a", 100, 1);
        f.issue("e", 100, 1);
        assert_eq!(f.check("a", "b", 40, 10), ComplianceCode::OnlyFullTransfer);
        assert_eq!(f.check("a", "b", 100, 10), ComplianceCode::Valid);
        assert_eq!(f.check("e", "b", 40, 10), ComplianceCode::Valid);
    }

    #[test]
    fn flowback_blocks_non_us_to_us() {
        let mut f = Fixture::new(ComplianceConfig {
            block_flowback_end_time: ts(500),
            ..ComplianceConfig::default()
        });
        f.investor("alice", "US", "a");
        f.investor("eve", "FR", "e");
        f.issue("e", 100, 1);
        assert_eq!(f.check("e", "a", 10, 499), ComplianceCode::Flowback);
        assert_eq!(f.check("e", "a", 10, 500), ComplianceCode::Valid);
    }

    #[test]
    fn accreditation_rules() {
        let mut f = Fixture::new(ComplianceConfig {
            force_accredited_us: true,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "US", "a");
        f.investor("eve", "FR", "e");
        assert_eq!(f.issue("a", 10, 1), ComplianceCode::OnlyUsAccredited);
        assert_eq!(f.issue("e", 10, 1), ComplianceCode::Valid);
        f.accredit("alice");
        assert_eq!(f.issue("a", 10, 1), ComplianceCode::Valid);
        f.engine.config_mut().force_accredited = true;
        assert_eq!(f.check("a", "e", 5, 10), ComplianceCode::OnlyAccredited);
    }

    #[test]
    fn category_limits_and_minimum_total() {
        let mut f = Fixture::new(ComplianceConfig {
            total_investors_limit: 2,
            minimum_total_investors: 2,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.investor("carol", "FR", "c");
        f.issue("a", 100, 1);
        f.issue("b", 100, 1);
        assert_eq!(f.issue("c", 100, 1), ComplianceCode::MaxInvestorsInCategory);
        assert_eq!(f.check("a", "c", 50, 10), ComplianceCode::MaxInvestorsInCategory);
        // Alice leaving, Carol entering keeps the total constant.
        assert_eq!(f.check("a", "c", 100, 10), ComplianceCode::Valid);
        // Alice leaving into an existing holder drops below the floor.
        assert_eq!(f.check("a", "b", 100, 10), ComplianceCode::NotEnoughInvestors);
    }

    #[test]
    fn counters_follow_balances() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "US", "a");
        f.investor("bob", "FR", "b");
        f.accredit("alice");
        f.issue("a", 100, 1);
        assert_eq!(f.state.counters.us_accredited_investors_count(), 1);
        assert_eq!(f.transfer("a", "b", 40, 10), ComplianceCode::Valid);
        assert_eq!(f.state.counters.total_investors_count(), 2);
        assert_eq!(
            f.state
                .counters
                .eu_retail_investors_count(&CountryCode::new("FR").unwrap()),
            1
        );
        assert_eq!(f.transfer("a", "b", 60, 10), ComplianceCode::Valid);
        assert_eq!(f.state.counters.total_investors_count(), 1);
        assert_eq!(f.state.counters.us_investors_count(), 0);
    }

    #[test]
    fn locks_block_transfer() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 100, 1);
        f.state
            .locks
            .add_manual_lock_record(
                &w("a"),
                LockRecord {
                    value: 95,
                    reason_code: 0,
                    reason: "Test".into(),
                    release_time: Some(ts(1_000)),
                    partition: None,
                },
                ts(1),
            )
            .unwrap();
        assert_eq!(f.check("a", "b", 6, 10), ComplianceCode::TokensLocked);
        assert_eq!(f.check("a", "b", 5, 10), ComplianceCode::Valid);
        assert_eq!(f.check("a", "b", 100, 1_000), ComplianceCode::Valid);
    }

    #[test]
    fn omnibus_rules() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.wallets.add_omnibus_tbe_wallet(w("tbe")).unwrap();
        f.investor("custodian", "FR", "custody");
        f.registry.remove_wallet(&w("custody")).unwrap();
        f.registry
            .add_omnibus_wallet(w("omni"), &InvestorId::new("custodian").unwrap())
            .unwrap();
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.ledger.balances.insert(w("tbe"), 100);
        f.ledger.paused = true;
        assert_eq!(f.check("tbe", "omni", 10, 5), ComplianceCode::OmnibusToOmnibus);
        assert_eq!(f.check("tbe", "b", 10, 5), ComplianceCode::Valid);
        assert_eq!(f.check("b", "a", 0, 5), ComplianceCode::TokenPaused);
        assert_eq!(
            f.engine.pre_internal_transfer_check(
                f.views(),
                &f.state,
                &w("a"),
                &w("b"),
                10,
                &w("omni"),
                ts(5)
            ),
            ComplianceCode::Valid
        );
        assert_eq!(
            f.engine.pre_internal_transfer_check(
                f.views(),
                &f.state,
                &w("b"),
                &w("b"),
                1,
                &w("b"),
                ts(5)
            ),
            ComplianceCode::WalletNotInRegistry
        );
    }

    #[test]
    fn authorized_securities_cap() {
        let mut f = Fixture::new(ComplianceConfig {
            authorized_securities: 150,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        assert_eq!(f.issue("a", 100, 1), ComplianceCode::Valid);
        assert_eq!(f.issue("a", 51, 1), ComplianceCode::MaxAuthorizedSecuritiesExceeded);
        assert_eq!(f.issue("a", 50, 1), ComplianceCode::Valid);
    }

    #[test]
    fn issuance_to_special_wallets_is_rejected() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.wallets.add_issuer_wallet(w("issuer")).unwrap();
        assert_eq!(f.issue("issuer", 10, 1), ComplianceCode::WalletNotInRegistry);
    }

    #[test]
    fn seize_requires_issuer_destination() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.issue("a", 10, 1);
        let views = Views {
            registry: &f.registry,
            wallets: &f.wallets,
            ledger: &f.ledger,
        };
        assert!(matches!(
            f.engine.validate_seize(views, &mut f.state, &w("a"), &w("x"), 5),
            Err(ComplianceError::MalformedInput(_))
        ));
        f.wallets.add_issuer_wallet(w("issuer")).unwrap();
        let views = Views {
            registry: &f.registry,
            wallets: &f.wallets,
            ledger: &f.ledger,
        };
        assert_eq!(
            f.engine
                .validate_seize(views, &mut f.state, &w("a"), &w("issuer"), 10)
                .unwrap(),
            ComplianceCode::Valid
        );
        assert_eq!(f.state.counters.total_investors_count(), 0);
    }

    #[test]
    fn pre_check_is_pure() {
        let mut f = Fixture::new(ComplianceConfig::default());
        f.investor("alice", "FR", "a");
        f.investor("bob", "FR", "b");
        f.issue("a", 100, 1);
        let before = f.state.counters.snapshot();
        let first = f.check("a", "b", 100, 10);
        let second = f.check("a", "b", 100, 10);
        assert_eq!(first, second);
        assert_eq!(f.state.counters.snapshot(), before);
    }

    #[test]
    fn disallow_back_dating_uses_decision_time() {
        let mut f = Fixture::new(ComplianceConfig {
            disallow_back_dating: true,
            ..ComplianceConfig::default()
        });
        f.investor("alice", "FR", "a");
        let views = Views {
            registry: &f.registry,
            wallets: &f.wallets,
            ledger: &f.ledger,
        };
        let outcome = f
            .engine
            .validate_issuance(views, &mut f.state, &w("a"), 10, ts(5), ts(900))
            .unwrap();
        assert_eq!(outcome.issuance_time, ts(900));
        assert_eq!(
            f.state.issuances.lots_of(&InvestorId::new("alice").unwrap())[0].issuance_time,
            ts(900)
        );
    }
}
