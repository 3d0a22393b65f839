//! # Omnibus TBE Controller
//!
//! An omnibus TBE ("to be evaluated") wallet holds tokens on behalf of
//! investors tracked in an off-chain ledger. The on-chain counters cannot
//! see those investors, so the operator reports each change as explicit
//! [`CounterDeltas`] applied in the same step as the balance movement.
//!
//! ## Operations
//!
//! | Operation | Balance | Counters |
//! |---|---|---|
//! | [`bulk_issuance`](OmnibusTbeController::bulk_issuance) | mint into omnibus | `+deltas`, limits enforced |
//! | [`bulk_burn`](OmnibusTbeController::bulk_burn) | burn from omnibus | `-deltas` |
//! | [`bulk_transfer`](OmnibusTbeController::bulk_transfer) | omnibus → wallets | unchanged |
//! | [`adjust_counters`](OmnibusTbeController::adjust_counters) | unchanged | `+deltas` |
//! | [`internal_tbe_transfer`](OmnibusTbeController::internal_tbe_transfer) | unchanged | `+deltas`, limits enforced |
//!
//! Each operation is atomic: on any error neither balances nor counters
//! change.

use regtoken_compliance::{ComplianceError, IssuanceOutcome, LedgerView};
use regtoken_core::{
    Amount, AuditEvent, CounterDeltas, OmnibusAction, PartitionId, Role, Timestamp,
    ValidationError, WalletAddress, WalletKind,
};

use crate::error::TokenError;
use crate::token::{reject, SecurityToken, TokenState};

/// Bulk operator for one omnibus TBE wallet.
#[derive(Debug, Clone)]
pub struct OmnibusTbeController {
    token: SecurityToken,
    omnibus: WalletAddress,
}

impl OmnibusTbeController {
    /// Attach to the omnibus TBE wallet of `token`.
    ///
    /// # Errors
    ///
    /// Fails unless the token has the `omnibus_tbe` feature and `omnibus`
    /// is registered as its omnibus TBE wallet.
    pub fn new(token: SecurityToken, omnibus: WalletAddress) -> Result<Self, TokenError> {
        if !token.features().omnibus_tbe {
            return Err(TokenError::FeatureDisabled {
                feature: "omnibus_tbe",
            });
        }
        let kind = token.wallet_kind(&omnibus);
        if kind != WalletKind::OmnibusTbe {
            return Err(TokenError::MalformedInput(ValidationError::OutOfRange {
                field: "omnibus wallet".to_string(),
                value: omnibus.to_string(),
                reason: format!("registered as {kind}, expected an omnibus TBE wallet"),
            }));
        }
        Ok(Self { token, omnibus })
    }

    /// The omnibus wallet.
    pub fn omnibus(&self) -> &WalletAddress {
        &self.omnibus
    }

    /// Mint `value` into the omnibus wallet and add `deltas` for the
    /// off-chain investors who received it.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for mismatched arrays or negative
    /// deltas; `LimitExceeded` if a category would pass its limit;
    /// [`TokenError::Rejected`] with code 73 past the authorized supply.
    pub fn bulk_issuance(
        &self,
        caller: &WalletAddress,
        value: Amount,
        issuance_time: Timestamp,
        deltas: &CounterDeltas,
    ) -> Result<IssuanceOutcome, TokenError> {
        require_non_negative(deltas)?;
        let now = self.token.now();
        let mut guard = self.token.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        check_limits(state, deltas)?;
        if state.ledger.total_issued().checked_add(value).is_none() {
            return Err(TokenError::MalformedInput(ValidationError::OutOfRange {
                field: "value".to_string(),
                value: value.to_string(),
                reason: "total supply would overflow".to_string(),
            }));
        }
        let outcome = {
            let (views, engine, compliance) = state.split();
            engine.validate_issuance(views, compliance, &self.omnibus, value, issuance_time, now)?
        };
        if !outcome.code.is_valid() {
            return Err(reject("bulk_issuance", outcome.code));
        }
        state.compliance.counters.apply(deltas)?;
        state
            .ledger
            .mint(&self.omnibus, value, outcome.partition.as_ref())?;
        self.record(state, now, OmnibusAction::BulkIssuance, value, deltas);
        Ok(outcome)
    }

    /// Burn `value` from the omnibus wallet and remove `deltas` for the
    /// off-chain investors who left.
    ///
    /// `deltas` are given as positive leave counts.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientOmnibusBalance`] if the wallet cannot
    /// cover `value`; `CounterUnderflow` if a counter would go negative.
    pub fn bulk_burn(
        &self,
        caller: &WalletAddress,
        value: Amount,
        deltas: &CounterDeltas,
    ) -> Result<(), TokenError> {
        require_non_negative(deltas)?;
        let now = self.token.now();
        let mut guard = self.token.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        self.require_balance(state, value)?;
        let negated = deltas.negated();
        state.compliance.counters.project(&negated)?;
        let plan = self.plan(state, value, now)?;
        state.ledger.burn(&self.omnibus, value, plan.as_deref())?;
        state.compliance.counters.apply(&negated)?;
        self.record(state, now, OmnibusAction::BulkBurn, value, &negated);
        Ok(())
    }

    /// Distribute tokens from the omnibus wallet to investor wallets. The
    /// investors are already counted, so no rule runs and no counter
    /// changes.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for mismatched arrays;
    /// [`TokenError::InsufficientOmnibusBalance`] if the wallet cannot cover
    /// the sum.
    pub fn bulk_transfer(
        &self,
        caller: &WalletAddress,
        wallets: &[WalletAddress],
        values: &[Amount],
    ) -> Result<(), TokenError> {
        if wallets.len() != values.len() {
            return Err(ValidationError::LengthMismatch {
                what: "wallets and values".to_string(),
                left: wallets.len(),
                right: values.len(),
            }
            .into());
        }
        let total = values
            .iter()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "values".to_string(),
                value: "overflow".to_string(),
                reason: "sum overflows".to_string(),
            })?;
        let now = self.token.now();
        let mut guard = self.token.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        self.require_balance(state, total)?;
        for (to, value) in wallets.iter().zip(values) {
            let plan = self.plan(state, *value, now)?;
            state
                .ledger
                .transfer(&self.omnibus, to, *value, plan.as_deref())?;
            state.audit.record(
                now,
                AuditEvent::OmnibusTransfer {
                    omnibus: self.omnibus.clone(),
                    to: to.clone(),
                    value: *value,
                },
            );
        }
        self.record(
            state,
            now,
            OmnibusAction::BulkTransfer,
            total,
            &CounterDeltas::default(),
        );
        Ok(())
    }

    /// Apply a counter correction with no balance movement. Limits are not
    /// enforced: the correction reports what already happened off-chain.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for mismatched arrays;
    /// `CounterUnderflow` if a counter would go negative.
    pub fn adjust_counters(
        &self,
        caller: &WalletAddress,
        deltas: &CounterDeltas,
    ) -> Result<(), TokenError> {
        deltas.validate()?;
        let now = self.token.now();
        let mut guard = self.token.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        state.compliance.counters.apply(deltas)?;
        self.record(state, now, OmnibusAction::AdjustCounters, 0, deltas);
        Ok(())
    }

    /// Record an off-chain movement between investors inside the omnibus
    /// wallet, identified by `external_id`.
    ///
    /// # Errors
    ///
    /// [`TokenError::MalformedInput`] for mismatched arrays;
    /// `LimitExceeded` if a growing category would pass its limit;
    /// `CounterUnderflow` if a counter would go negative.
    pub fn internal_tbe_transfer(
        &self,
        caller: &WalletAddress,
        external_id: impl Into<String>,
        deltas: &CounterDeltas,
    ) -> Result<(), TokenError> {
        deltas.validate()?;
        let external_id = external_id.into();
        let now = self.token.now();
        let mut guard = self.token.state.write();
        let state = &mut *guard;
        state.require(caller, Role::Issuer)?;
        check_limits(state, deltas)?;
        state.compliance.counters.apply(deltas)?;
        tracing::info!(omnibus = %self.omnibus, external_id = %external_id, "internal TBE transfer recorded");
        state.audit.record(
            now,
            AuditEvent::InternalTbeTransfer {
                external_id,
                deltas: deltas.clone(),
            },
        );
        Ok(())
    }

    fn require_balance(&self, state: &TokenState, required: Amount) -> Result<(), TokenError> {
        let balance = state.ledger.balance_of(&self.omnibus);
        if balance < required {
            tracing::warn!(omnibus = %self.omnibus, balance, required, "omnibus balance insufficient");
            return Err(TokenError::InsufficientOmnibusBalance {
                wallet: self.omnibus.clone(),
                balance,
                required,
            });
        }
        Ok(())
    }

    /// Oldest-first partition plan ignoring locks; `None` for plain tokens.
    fn plan(
        &self,
        state: &TokenState,
        value: Amount,
        now: Timestamp,
    ) -> Result<Option<Vec<(PartitionId, Amount)>>, TokenError> {
        if !self.token.features().partitioned {
            return Ok(None);
        }
        match state.plan(&self.omnibus, value, false, now) {
            Some(plan) => Ok(Some(plan)),
            None => Err(TokenError::InsufficientOmnibusBalance {
                wallet: self.omnibus.clone(),
                balance: state.ledger.balance_of(&self.omnibus),
                required: value,
            }),
        }
    }

    fn record(
        &self,
        state: &mut TokenState,
        now: Timestamp,
        action: OmnibusAction,
        value: Amount,
        deltas: &CounterDeltas,
    ) {
        tracing::info!(omnibus = %self.omnibus, action = %action, value, total_delta = deltas.total, "omnibus operation applied");
        state.audit.record(
            now,
            AuditEvent::OmnibusOperation {
                action,
                omnibus: self.omnibus.clone(),
                value,
                deltas: deltas.clone(),
            },
        );
    }
}

fn require_non_negative(deltas: &CounterDeltas) -> Result<(), TokenError> {
    deltas.validate()?;
    if !deltas.is_non_negative() {
        return Err(ValidationError::OutOfRange {
            field: "deltas".to_string(),
            value: format!("{deltas:?}"),
            reason: "bulk deltas must be zero or positive".to_string(),
        }
        .into());
    }
    Ok(())
}

fn check_limits(state: &TokenState, deltas: &CounterDeltas) -> Result<(), TokenError> {
    let breach = state
        .compliance
        .counters
        .first_breach(deltas, state.engine.config())?;
    match breach {
        Some(breach) => {
            tracing::warn!(category = %breach.category, projected = breach.projected, limit = breach.limit, "omnibus adjustment exceeds limit");
            Err(ComplianceError::from(breach).into())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use regtoken_compliance::ComplianceConfig;
    use regtoken_core::{Classification, CountryCode, InvestorId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::token::TokenFeatures;

    fn w(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn setup(config: ComplianceConfig) -> (SecurityToken, OmnibusTbeController) {
        let token = SecurityToken::new(
            "TBE",
            w("master"),
            config,
            TokenFeatures {
                partitioned: false,
                omnibus_tbe: true,
            },
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(Timestamp::from_epoch_secs(1_000))));
        token.add_omnibus_tbe_wallet(&w("master"), w("tbe")).unwrap();
        let controller = OmnibusTbeController::new(token.clone(), w("tbe")).unwrap();
        (token, controller)
    }

    #[test]
    fn bulk_issuance_then_burn_round_trips() {
        let (token, omnibus) = setup(ComplianceConfig::default());
        let deltas = CounterDeltas {
            us_total: 2,
            ..CounterDeltas::totals(3, 1)
        };
        let before = token.counters();
        omnibus
            .bulk_issuance(&w("master"), 500, Timestamp::from_epoch_secs(900), &deltas)
            .unwrap();
        assert_eq!(token.counters().total, 3);
        assert_eq!(token.counters().us, 2);
        assert_eq!(token.balance_of(&w("tbe")), 500);
        omnibus.bulk_burn(&w("master"), 500, &deltas).unwrap();
        assert_eq!(token.counters(), before);
        assert_eq!(token.total_issued(), 0);
    }

    #[test]
    fn bulk_issuance_enforces_limits_atomically() {
        let (token, omnibus) = setup(ComplianceConfig {
            total_investors_limit: 2,
            ..ComplianceConfig::default()
        });
        let err = omnibus
            .bulk_issuance(
                &w("master"),
                100,
                Timestamp::from_epoch_secs(900),
                &CounterDeltas::totals(3, 0),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TokenError::Compliance(ComplianceError::LimitExceeded { projected: 3, limit: 2, .. })
        ));
        assert_eq!(token.total_issued(), 0);
        assert_eq!(token.counters().total, 0);
    }

    #[test]
    fn mismatched_country_arrays_are_malformed() {
        let (_, omnibus) = setup(ComplianceConfig::default());
        let deltas = CounterDeltas {
            eu_retail_countries: vec![CountryCode::new("FR").unwrap()],
            eu_retail_deltas: vec![],
            ..CounterDeltas::default()
        };
        assert!(matches!(
            omnibus.adjust_counters(&w("master"), &deltas),
            Err(TokenError::MalformedInput(ValidationError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn bulk_burn_checks_balance_and_underflow() {
        let (token, omnibus) = setup(ComplianceConfig::default());
        assert!(matches!(
            omnibus.bulk_burn(&w("master"), 1, &CounterDeltas::default()),
            Err(TokenError::InsufficientOmnibusBalance { .. })
        ));
        omnibus
            .bulk_issuance(
                &w("master"),
                10,
                Timestamp::from_epoch_secs(900),
                &CounterDeltas::totals(1, 0),
            )
            .unwrap();
        assert!(matches!(
            omnibus.bulk_burn(&w("master"), 10, &CounterDeltas::totals(2, 0)),
            Err(TokenError::Compliance(ComplianceError::CounterUnderflow { .. }))
        ));
        assert_eq!(token.balance_of(&w("tbe")), 10);
        assert_eq!(token.counters().total, 1);
    }

    #[test]
    fn bulk_transfer_leaves_counters_alone() {
        let (token, omnibus) = setup(ComplianceConfig::default());
        token
            .set_country_compliance(&w("master"), CountryCode::new("US").unwrap(), Classification::Us)
            .unwrap();
        let alice = InvestorId::new("alice").unwrap();
        token
            .register_investor(&w("master"), alice.clone(), "h-alice", Some(CountryCode::new("US").unwrap()))
            .unwrap();
        token.add_wallet(&w("master"), w("a"), &alice).unwrap();
        omnibus
            .bulk_issuance(
                &w("master"),
                100,
                Timestamp::from_epoch_secs(900),
                &CounterDeltas::totals(1, 0),
            )
            .unwrap();
        let before = token.counters();
        omnibus
            .bulk_transfer(&w("master"), &[w("a")], &[60])
            .unwrap();
        assert_eq!(token.counters(), before);
        assert_eq!(token.balance_of(&w("a")), 60);
        assert!(matches!(
            omnibus.bulk_transfer(&w("master"), &[w("a")], &[1, 2]),
            Err(TokenError::MalformedInput(_))
        ));
        assert!(matches!(
            omnibus.bulk_transfer(&w("master"), &[w("a")], &[41]),
            Err(TokenError::InsufficientOmnibusBalance { .. })
        ));
    }

    #[test]
    fn internal_transfer_is_audited_with_deltas() {
        let (token, omnibus) = setup(ComplianceConfig::default());
        omnibus
            .internal_tbe_transfer(&w("master"), "ext-42", &CounterDeltas::totals(1, 1))
            .unwrap();
        let last = token.audit_entries().pop().unwrap();
        assert_eq!(last.event.kind(), "internal_tbe_transfer");
        assert_eq!(token.counters().accredited, 1);
    }
}
