//! # Counter Snapshots and Deltas
//!
//! [`CounterSnapshot`] is an owned copy of the investor counter ledger.
//! [`CounterDeltas`] is the signed adjustment vector supplied by omnibus
//! callers, whose off-chain ledger is the source of truth for how many
//! beneficiaries entered or left each category.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::CountryCode;

/// Owned copy of every investor counter at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Investors holding a positive balance.
    pub total: u64,
    /// US-classified holders.
    pub us: u64,
    /// Accredited holders.
    pub accredited: u64,
    /// US-classified accredited holders.
    pub us_accredited: u64,
    /// JP-classified holders.
    pub jp: u64,
    /// Non-qualified EU holders per country. Zero entries are omitted.
    pub eu_retail: BTreeMap<CountryCode, u64>,
}

impl CounterSnapshot {
    /// EU retail count for one country.
    pub fn eu_retail_of(&self, country: &CountryCode) -> u64 {
        self.eu_retail.get(country).copied().unwrap_or(0)
    }

    /// Holders that are not accredited.
    pub fn non_accredited(&self) -> u64 {
        self.total.saturating_sub(self.accredited)
    }
}

/// Signed counter adjustments supplied by an omnibus operator.
///
/// `eu_retail_countries` and `eu_retail_deltas` are parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDeltas {
    /// Change to the total investor count.
    pub total: i64,
    /// Change to the accredited count.
    pub accredited: i64,
    /// Change to the US accredited count.
    pub us_accredited: i64,
    /// Change to the US count.
    pub us_total: i64,
    /// Change to the JP count.
    pub jp_total: i64,
    /// Countries whose EU retail counts change.
    pub eu_retail_countries: Vec<CountryCode>,
    /// Per-country EU retail change, index-aligned with the countries.
    pub eu_retail_deltas: Vec<i64>,
}

impl CounterDeltas {
    /// Deltas that change only the total and accredited counts.
    pub fn totals(total: i64, accredited: i64) -> Self {
        Self {
            total,
            accredited,
            ..Self::default()
        }
    }

    /// Reject mismatched country/delta arrays.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LengthMismatch`] if the parallel arrays
    /// differ in length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.eu_retail_countries.len() != self.eu_retail_deltas.len() {
            return Err(ValidationError::LengthMismatch {
                what: "EU retail countries and deltas".to_string(),
                left: self.eu_retail_countries.len(),
                right: self.eu_retail_deltas.len(),
            });
        }
        Ok(())
    }

    /// Whether every component is zero or positive.
    pub fn is_non_negative(&self) -> bool {
        [
            self.total,
            self.accredited,
            self.us_accredited,
            self.us_total,
            self.jp_total,
        ]
        .iter()
        .chain(self.eu_retail_deltas.iter())
        .all(|d| *d >= 0)
    }

    /// The same adjustment with every sign flipped.
    pub fn negated(&self) -> Self {
        Self {
            total: -self.total,
            accredited: -self.accredited,
            us_accredited: -self.us_accredited,
            us_total: -self.us_total,
            jp_total: -self.jp_total,
            eu_retail_countries: self.eu_retail_countries.clone(),
            eu_retail_deltas: self.eu_retail_deltas.iter().map(|d| -d).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_arrays_are_malformed() {
        let deltas = CounterDeltas {
            eu_retail_countries: vec![CountryCode::new("FR").unwrap()],
            eu_retail_deltas: vec![],
            ..CounterDeltas::default()
        };
        assert!(matches!(
            deltas.validate(),
            Err(ValidationError::LengthMismatch { left: 1, right: 0, .. })
        ));
    }

    #[test]
    fn negation_flips_every_component() {
        let deltas = CounterDeltas {
            total: 2,
            us_total: 1,
            eu_retail_countries: vec![CountryCode::new("DE").unwrap()],
            eu_retail_deltas: vec![3],
            ..CounterDeltas::default()
        };
        assert!(deltas.is_non_negative());
        let neg = deltas.negated();
        assert_eq!(neg.total, -2);
        assert_eq!(neg.us_total, -1);
        assert_eq!(neg.eu_retail_deltas, vec![-3]);
        assert!(!neg.is_non_negative());
        assert_eq!(neg.negated(), deltas);
    }

    #[test]
    fn snapshot_non_accredited() {
        let snap = CounterSnapshot {
            total: 5,
            accredited: 2,
            ..CounterSnapshot::default()
        };
        assert_eq!(snap.non_accredited(), 3);
        assert_eq!(snap.eu_retail_of(&CountryCode::new("FR").unwrap()), 0);
    }
}
