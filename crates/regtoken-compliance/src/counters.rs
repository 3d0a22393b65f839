//! # Investor Counter Ledger
//!
//! Aggregate counts of investors holding a positive balance, per category.
//!
//! ## Mutation paths
//!
//! 1. **Per-wallet.** The engine derives an enter/leave transition from the
//!    investor's aggregate balance and converts it into a unit
//!    [`CounterDeltas`] via [`InvestorProfile::deltas`].
//! 2. **Omnibus.** Callers supply [`CounterDeltas`] directly.
//!
//! Both paths go through [`InvestorCounters::apply`], which is all-or-nothing:
//! an underflow in any component leaves every counter unchanged.
//!
//! ## Invariant (per-wallet path)
//!
//! `counter[c] == |{ investor : aggregate_balance(investor) > 0 ∧ investor ∈ c }|`

use std::collections::BTreeSet;

use regtoken_core::{Classification, CounterDeltas, CounterSnapshot, CountryCode};

use crate::config::ComplianceConfig;
use crate::error::ComplianceError;

// ---------------------------------------------------------------------------
// InvestorProfile
// ---------------------------------------------------------------------------

/// The category memberships of one investor at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestorProfile {
    /// Country of residence.
    pub country: Option<CountryCode>,
    /// Region of the country under the current configuration.
    pub region: Classification,
    /// Accredited attribute approved.
    pub accredited: bool,
    /// Qualified attribute approved.
    pub qualified: bool,
}

impl InvestorProfile {
    /// Counted as an EU retail investor of its country.
    pub fn is_eu_retail(&self) -> bool {
        self.region == Classification::Eu && !self.qualified && self.country.is_some()
    }

    /// Unit deltas for this investor entering (`sign = 1`) or leaving
    /// (`sign = -1`) the holder set.
    pub fn deltas(&self, sign: i64) -> CounterDeltas {
        let us = self.region == Classification::Us;
        let mut deltas = CounterDeltas {
            total: sign,
            accredited: if self.accredited { sign } else { 0 },
            us_accredited: if us && self.accredited { sign } else { 0 },
            us_total: if us { sign } else { 0 },
            jp_total: if self.region == Classification::Jp { sign } else { 0 },
            ..CounterDeltas::default()
        };
        if self.is_eu_retail() {
            if let Some(country) = &self.country {
                deltas.eu_retail_countries.push(country.clone());
                deltas.eu_retail_deltas.push(sign);
            }
        }
        deltas
    }
}

/// Sum two delta vectors.
pub fn combine(mut left: CounterDeltas, right: &CounterDeltas) -> CounterDeltas {
    left.total += right.total;
    left.accredited += right.accredited;
    left.us_accredited += right.us_accredited;
    left.us_total += right.us_total;
    left.jp_total += right.jp_total;
    left.eu_retail_countries
        .extend(right.eu_retail_countries.iter().cloned());
    left.eu_retail_deltas
        .extend(right.eu_retail_deltas.iter().copied());
    left
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A capped investor category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// All holders.
    Total,
    /// US holders.
    Us,
    /// US accredited holders.
    UsAccredited,
    /// Holders that are not accredited.
    NonAccredited,
    /// JP holders.
    Jp,
    /// EU retail holders of one country.
    EuRetail(CountryCode),
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Total => f.write_str("total investors"),
            Self::Us => f.write_str("US investors"),
            Self::UsAccredited => f.write_str("US accredited investors"),
            Self::NonAccredited => f.write_str("non-accredited investors"),
            Self::Jp => f.write_str("JP investors"),
            Self::EuRetail(c) => write!(f, "EU retail investors ({c})"),
        }
    }
}

/// A category whose projected count exceeds its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitBreach {
    /// The category.
    pub category: Category,
    /// Count after the adjustment.
    pub projected: u64,
    /// Configured limit.
    pub limit: u64,
}

impl From<LimitBreach> for ComplianceError {
    fn from(b: LimitBreach) -> Self {
        ComplianceError::LimitExceeded {
            category: b.category.to_string(),
            projected: b.projected,
            limit: b.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// InvestorCounters
// ---------------------------------------------------------------------------

/// The counter ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvestorCounters {
    counts: CounterSnapshot,
}

impl InvestorCounters {
    /// Create a ledger with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Investors holding a positive balance.
    pub fn total_investors_count(&self) -> u64 {
        self.counts.total
    }

    /// US holders.
    pub fn us_investors_count(&self) -> u64 {
        self.counts.us
    }

    /// Accredited holders.
    pub fn accredited_investors_count(&self) -> u64 {
        self.counts.accredited
    }

    /// US accredited holders.
    pub fn us_accredited_investors_count(&self) -> u64 {
        self.counts.us_accredited
    }

    /// JP holders.
    pub fn jp_investors_count(&self) -> u64 {
        self.counts.jp
    }

    /// Holders that are not accredited.
    pub fn non_accredited_investors_count(&self) -> u64 {
        self.counts.non_accredited()
    }

    /// EU retail holders of a country.
    pub fn eu_retail_investors_count(&self, country: &CountryCode) -> u64 {
        self.counts.eu_retail_of(country)
    }

    /// Owned copy of every counter.
    pub fn snapshot(&self) -> CounterSnapshot {
        self.counts.clone()
    }

    /// Counters after applying `deltas`, without committing.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::MalformedInput`] for mismatched arrays and
    /// [`ComplianceError::CounterUnderflow`] if any counter would go negative.
    pub fn project(&self, deltas: &CounterDeltas) -> Result<CounterSnapshot, ComplianceError> {
        deltas.validate()?;
        let mut next = self.counts.clone();
        next.total = shift("total", next.total, deltas.total)?;
        next.accredited = shift("accredited", next.accredited, deltas.accredited)?;
        next.us_accredited = shift("us_accredited", next.us_accredited, deltas.us_accredited)?;
        next.us = shift("us", next.us, deltas.us_total)?;
        next.jp = shift("jp", next.jp, deltas.jp_total)?;
        for (country, delta) in deltas
            .eu_retail_countries
            .iter()
            .zip(&deltas.eu_retail_deltas)
        {
            let current = next.eu_retail.get(country).copied().unwrap_or(0);
            let updated = shift(&format!("eu_retail[{country}]"), current, *delta)?;
            if updated == 0 {
                next.eu_retail.remove(country);
            } else {
                next.eu_retail.insert(country.clone(), updated);
            }
        }
        Ok(next)
    }

    /// Apply `deltas` atomically.
    ///
    /// # Errors
    ///
    /// Same as [`InvestorCounters::project`]; nothing changes on error.
    pub fn apply(&mut self, deltas: &CounterDeltas) -> Result<(), ComplianceError> {
        self.counts = self.project(deltas)?;
        Ok(())
    }

    /// First category that `deltas` would push above its configured limit.
    ///
    /// Only categories whose count increases are checked, so a limit lowered
    /// below the current count never blocks unrelated movements.
    ///
    /// # Errors
    ///
    /// Same as [`InvestorCounters::project`].
    pub fn first_breach(
        &self,
        deltas: &CounterDeltas,
        config: &ComplianceConfig,
    ) -> Result<Option<LimitBreach>, ComplianceError> {
        let next = self.project(deltas)?;
        Ok(first_breach_between(&self.counts, &next, config))
    }
}

fn first_breach_between(
    current: &CounterSnapshot,
    next: &CounterSnapshot,
    config: &ComplianceConfig,
) -> Option<LimitBreach> {
    let mut checks: Vec<(Category, u64, u64, u64)> = vec![
        (Category::Total, current.total, next.total, config.total_investors_limit),
        (
            Category::Us,
            current.us,
            next.us,
            config.effective_us_limit(next.total),
        ),
        (
            Category::UsAccredited,
            current.us_accredited,
            next.us_accredited,
            config.us_accredited_investors_limit,
        ),
        (
            Category::NonAccredited,
            current.non_accredited(),
            next.non_accredited(),
            config.non_accredited_investors_limit,
        ),
        (Category::Jp, current.jp, next.jp, config.jp_investors_limit),
    ];
    let countries: BTreeSet<&CountryCode> = next
        .eu_retail
        .keys()
        .chain(current.eu_retail.keys())
        .collect();
    for country in countries {
        checks.push((
            Category::EuRetail(country.clone()),
            current.eu_retail_of(country),
            next.eu_retail_of(country),
            config.eu_retail_investors_limit,
        ));
    }
    checks
        .into_iter()
        .find(|(_, before, after, limit)| *limit != 0 && after > before && after > limit)
        .map(|(category, _, projected, limit)| LimitBreach {
            category,
            projected,
            limit,
        })
}

fn shift(name: &str, current: u64, delta: i64) -> Result<u64, ComplianceError> {
    let result = if delta >= 0 {
        current.checked_add(delta.unsigned_abs())
    } else {
        current.checked_sub(delta.unsigned_abs())
    };
    result.ok_or_else(|| ComplianceError::CounterUnderflow {
        counter: name.to_string(),
        current,
        delta,
    })
}
