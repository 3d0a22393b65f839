//! # Issuance Lots
//!
//! Each issuance is remembered as a lot `(value, issuance_time)` against the
//! receiving investor. Lots younger than the investor's hold-up period are
//! not transferable, regardless of which of the investor's wallets holds
//! the tokens.

use std::collections::BTreeMap;

use regtoken_core::{Amount, InvestorId, Timestamp};
use serde::{Deserialize, Serialize};

/// One issuance to an investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceLot {
    /// Amount issued.
    pub value: Amount,
    /// Effective issuance time.
    pub issuance_time: Timestamp,
}

/// Issuance lots by investor.
#[derive(Debug, Clone, Default)]
pub struct IssuanceRecords {
    lots: BTreeMap<InvestorId, Vec<IssuanceLot>>,
}

impl IssuanceRecords {
    /// Create an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issuance.
    pub fn record(&mut self, investor: InvestorId, value: Amount, issuance_time: Timestamp) {
        self.lots.entry(investor).or_default().push(IssuanceLot {
            value,
            issuance_time,
        });
    }

    /// Lots of one investor, oldest recorded first.
    pub fn lots_of(&self, investor: &InvestorId) -> &[IssuanceLot] {
        self.lots.get(investor).map_or(&[], Vec::as_slice)
    }

    /// Amount issued to the investor that is still inside `lock_period`
    /// at `as_of`.
    pub fn held(&self, investor: &InvestorId, lock_period: u64, as_of: Timestamp) -> Amount {
        if lock_period == 0 {
            return 0;
        }
        self.lots_of(investor)
            .iter()
            .filter(|lot| !lot.issuance_time.has_elapsed(lock_period, as_of))
            .fold(0u64, |acc, lot| acc.saturating_add(lot.value))
    }

    /// Drop lots that can no longer hold anything back.
    pub fn prune(&mut self, investor: &InvestorId, max_lock_period: u64, as_of: Timestamp) {
        if let Some(lots) = self.lots.get_mut(investor) {
            lots.retain(|lot| !lot.issuance_time.has_elapsed(max_lock_period, as_of));
            if lots.is_empty() {
                self.lots.remove(investor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regtoken_core::ONE_YEAR_SECS;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_epoch_secs(secs)
    }

    #[test]
    fn held_counts_only_young_lots() {
        let mut records = IssuanceRecords::new();
        let inv = InvestorId::new("alice").unwrap();
        records.record(inv.clone(), 100, ts(1_000));
        records.record(inv.clone(), 50, ts(1_000 + ONE_YEAR_SECS / 2));
        assert_eq!(records.held(&inv, ONE_YEAR_SECS, ts(1_001)), 150);
        assert_eq!(records.held(&inv, ONE_YEAR_SECS, ts(1_000 + ONE_YEAR_SECS)), 50);
        assert_eq!(records.held(&inv, 0, ts(1_001)), 0);
    }

    #[test]
    fn prune_removes_expired_lots() {
        let mut records = IssuanceRecords::new();
        let inv = InvestorId::new("alice").unwrap();
        records.record(inv.clone(), 100, ts(10));
        records.record(inv.clone(), 5, ts(500));
        records.prune(&inv, 100, ts(200));
        assert_eq!(records.lots_of(&inv).len(), 1);
        records.prune(&inv, 100, ts(1_000));
        assert!(records.lots_of(&inv).is_empty());
    }
}
