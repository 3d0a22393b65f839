//! # Compliance Configuration
//!
//! Sixteen numeric limits, five boolean switches, and the country →
//! classification map. Zero means "disabled" for every numeric limit.
//!
//! ## Loading
//!
//! A configuration can be loaded from YAML or JSON, as a string or from a
//! file whose extension selects the format. Every field is optional and
//! defaults to zero / false / empty.
//!
//! ```yaml
//! us_lock_period: 31536000
//! minimum_holdings_per_investor: 50
//! force_full_transfer: true
//! countries:
//!   US: US
//!   CN: FORBIDDEN
//! ```
//!
//! ## Audit
//!
//! Mutators return one [`ConfigChange`] per field whose value actually
//! changed, carrying before/after values for the audit trail.

use std::collections::BTreeMap;
use std::path::Path;

use regtoken_core::{Classification, CountryCode, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, ConfigError};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Numeric parameters, in positional `set_all` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UintParam {
    /// Cap on investors holding a positive balance.
    TotalInvestorsLimit,
    /// Minimum holding for US investors.
    MinUsTokens,
    /// Minimum holding for EU investors.
    MinEuTokens,
    /// Cap on US investors.
    UsInvestorsLimit,
    /// Cap on US accredited investors.
    UsAccreditedInvestorsLimit,
    /// Cap on non-accredited investors.
    NonAccreditedInvestorsLimit,
    /// Cap on US investors as a percentage of all investors.
    MaxUsInvestorsPercentage,
    /// End of the flowback window (epoch seconds).
    BlockFlowbackEndTime,
    /// Hold-up period for non-US investors (seconds).
    NonUsLockPeriod,
    /// Floor on the total investor count.
    MinimumTotalInvestors,
    /// Minimum non-zero holding per investor.
    MinimumHoldingsPerInvestor,
    /// Maximum holding per investor.
    MaximumHoldingsPerInvestor,
    /// Per-country cap on EU retail investors.
    EuRetailInvestorsLimit,
    /// Hold-up period for US investors (seconds).
    UsLockPeriod,
    /// Cap on JP investors.
    JpInvestorsLimit,
    /// Cap on total issued supply.
    AuthorizedSecurities,
}

impl UintParam {
    /// All parameters in `set_all` order.
    pub const ALL: [UintParam; 16] = [
        Self::TotalInvestorsLimit,
        Self::MinUsTokens,
        Self::MinEuTokens,
        Self::UsInvestorsLimit,
        Self::UsAccreditedInvestorsLimit,
        Self::NonAccreditedInvestorsLimit,
        Self::MaxUsInvestorsPercentage,
        Self::BlockFlowbackEndTime,
        Self::NonUsLockPeriod,
        Self::MinimumTotalInvestors,
        Self::MinimumHoldingsPerInvestor,
        Self::MaximumHoldingsPerInvestor,
        Self::EuRetailInvestorsLimit,
        Self::UsLockPeriod,
        Self::JpInvestorsLimit,
        Self::AuthorizedSecurities,
    ];

    /// Field name, as used in config files and audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalInvestorsLimit => "total_investors_limit",
            Self::MinUsTokens => "min_us_tokens",
            Self::MinEuTokens => "min_eu_tokens",
            Self::UsInvestorsLimit => "us_investors_limit",
            Self::UsAccreditedInvestorsLimit => "us_accredited_investors_limit",
            Self::NonAccreditedInvestorsLimit => "non_accredited_investors_limit",
            Self::MaxUsInvestorsPercentage => "max_us_investors_percentage",
            Self::BlockFlowbackEndTime => "block_flowback_end_time",
            Self::NonUsLockPeriod => "non_us_lock_period",
            Self::MinimumTotalInvestors => "minimum_total_investors",
            Self::MinimumHoldingsPerInvestor => "minimum_holdings_per_investor",
            Self::MaximumHoldingsPerInvestor => "maximum_holdings_per_investor",
            Self::EuRetailInvestorsLimit => "eu_retail_investors_limit",
            Self::UsLockPeriod => "us_lock_period",
            Self::JpInvestorsLimit => "jp_investors_limit",
            Self::AuthorizedSecurities => "authorized_securities",
        }
    }
}

impl std::fmt::Display for UintParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean parameters, in positional `set_all` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolParam {
    /// US senders may only transfer their full balance.
    ForceFullTransfer,
    /// Both parties must be accredited.
    ForceAccredited,
    /// US parties must be accredited.
    ForceAccreditedUs,
    /// Every sender may only transfer their full balance.
    WorldWideForceFullTransfer,
    /// Issuance time is always the decision time.
    DisallowBackDating,
}

impl BoolParam {
    /// All parameters in `set_all` order.
    pub const ALL: [BoolParam; 5] = [
        Self::ForceFullTransfer,
        Self::ForceAccredited,
        Self::ForceAccreditedUs,
        Self::WorldWideForceFullTransfer,
        Self::DisallowBackDating,
    ];

    /// Field name, as used in config files and audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForceFullTransfer => "force_full_transfer",
            Self::ForceAccredited => "force_accredited",
            Self::ForceAccreditedUs => "force_accredited_us",
            Self::WorldWideForceFullTransfer => "world_wide_force_full_transfer",
            Self::DisallowBackDating => "disallow_back_dating",
        }
    }
}

impl std::fmt::Display for BoolParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Field name.
    pub field: String,
    /// Previous value.
    pub before: String,
    /// New value.
    pub after: String,
}

// ---------------------------------------------------------------------------
// ComplianceConfig
// ---------------------------------------------------------------------------

/// The full compliance configuration of a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComplianceConfig {
    /// Cap on investors holding a positive balance.
    pub total_investors_limit: u64,
    /// Minimum holding for US investors.
    pub min_us_tokens: u64,
    /// Minimum holding for EU investors.
    pub min_eu_tokens: u64,
    /// Cap on US investors.
    pub us_investors_limit: u64,
    /// Cap on US accredited investors.
    pub us_accredited_investors_limit: u64,
    /// Cap on non-accredited investors.
    pub non_accredited_investors_limit: u64,
    /// Cap on US investors as a percentage (0-100) of all investors.
    pub max_us_investors_percentage: u64,
    /// Non-US → US movements are blocked until this time.
    pub block_flowback_end_time: Timestamp,
    /// Hold-up period for non-US investors (seconds).
    pub non_us_lock_period: u64,
    /// Floor on the total investor count.
    pub minimum_total_investors: u64,
    /// Minimum non-zero holding per investor.
    pub minimum_holdings_per_investor: u64,
    /// Maximum holding per investor.
    pub maximum_holdings_per_investor: u64,
    /// Per-country cap on EU retail investors.
    pub eu_retail_investors_limit: u64,
    /// Hold-up period for US investors (seconds).
    pub us_lock_period: u64,
    /// Cap on JP investors.
    pub jp_investors_limit: u64,
    /// Cap on total issued supply.
    pub authorized_securities: u64,
    /// US senders may only transfer their full balance.
    pub force_full_transfer: bool,
    /// Both parties must be accredited.
    pub force_accredited: bool,
    /// US parties must be accredited.
    pub force_accredited_us: bool,
    /// Every sender may only transfer their full balance.
    pub world_wide_force_full_transfer: bool,
    /// Issuance time is always the decision time.
    pub disallow_back_dating: bool,
    /// Country → classification. Unlisted countries are `NONE`.
    pub countries: BTreeMap<CountryCode, Classification>,
}

impl ComplianceConfig {
    /// Parse a configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Fails on parse errors and on out-of-range values.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Fails on parse errors and on out-of-range values.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, selecting the format by extension.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, has an unsupported extension, does not
    /// parse, or holds out-of-range values.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config: Self = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::JsonParse {
                path: path.to_path_buf(),
                source: e,
            })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        config.validate()?;
        tracing::info!(path = %path.display(), countries = config.countries.len(), "compliance config loaded");
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a percentage above 100 or a
    /// non-zero maximum holding below the minimum holding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_uint(UintParam::MaxUsInvestorsPercentage, self.max_us_investors_percentage)?;
        if self.maximum_holdings_per_investor != 0
            && self.maximum_holdings_per_investor < self.minimum_holdings_per_investor
        {
            return Err(ConfigError::Invalid {
                field: UintParam::MaximumHoldingsPerInvestor.as_str().to_string(),
                reason: format!(
                    "{} is below minimum_holdings_per_investor {}",
                    self.maximum_holdings_per_investor, self.minimum_holdings_per_investor
                ),
            });
        }
        Ok(())
    }

    // -- Parameter access ------------------------------------------------

    /// Read a numeric parameter.
    pub fn uint(&self, param: UintParam) -> u64 {
        match param {
            UintParam::TotalInvestorsLimit => self.total_investors_limit,
            UintParam::MinUsTokens => self.min_us_tokens,
            UintParam::MinEuTokens => self.min_eu_tokens,
            UintParam::UsInvestorsLimit => self.us_investors_limit,
            UintParam::UsAccreditedInvestorsLimit => self.us_accredited_investors_limit,
            UintParam::NonAccreditedInvestorsLimit => self.non_accredited_investors_limit,
            UintParam::MaxUsInvestorsPercentage => self.max_us_investors_percentage,
            UintParam::BlockFlowbackEndTime => self.block_flowback_end_time.epoch_secs(),
            UintParam::NonUsLockPeriod => self.non_us_lock_period,
            UintParam::MinimumTotalInvestors => self.minimum_total_investors,
            UintParam::MinimumHoldingsPerInvestor => self.minimum_holdings_per_investor,
            UintParam::MaximumHoldingsPerInvestor => self.maximum_holdings_per_investor,
            UintParam::EuRetailInvestorsLimit => self.eu_retail_investors_limit,
            UintParam::UsLockPeriod => self.us_lock_period,
            UintParam::JpInvestorsLimit => self.jp_investors_limit,
            UintParam::AuthorizedSecurities => self.authorized_securities,
        }
    }

    fn uint_mut(&mut self, param: UintParam, value: u64) {
        match param {
            UintParam::TotalInvestorsLimit => self.total_investors_limit = value,
            UintParam::MinUsTokens => self.min_us_tokens = value,
            UintParam::MinEuTokens => self.min_eu_tokens = value,
            UintParam::UsInvestorsLimit => self.us_investors_limit = value,
            UintParam::UsAccreditedInvestorsLimit => self.us_accredited_investors_limit = value,
            UintParam::NonAccreditedInvestorsLimit => self.non_accredited_investors_limit = value,
            UintParam::MaxUsInvestorsPercentage => self.max_us_investors_percentage = value,
            UintParam::BlockFlowbackEndTime => {
                self.block_flowback_end_time = Timestamp::from_epoch_secs(value)
            }
            UintParam::NonUsLockPeriod => self.non_us_lock_period = value,
            UintParam::MinimumTotalInvestors => self.minimum_total_investors = value,
            UintParam::MinimumHoldingsPerInvestor => self.minimum_holdings_per_investor = value,
            UintParam::MaximumHoldingsPerInvestor => self.maximum_holdings_per_investor = value,
            UintParam::EuRetailInvestorsLimit => self.eu_retail_investors_limit = value,
            UintParam::UsLockPeriod => self.us_lock_period = value,
            UintParam::JpInvestorsLimit => self.jp_investors_limit = value,
            UintParam::AuthorizedSecurities => self.authorized_securities = value,
        }
    }

    /// Read a boolean parameter.
    pub fn flag(&self, param: BoolParam) -> bool {
        match param {
            BoolParam::ForceFullTransfer => self.force_full_transfer,
            BoolParam::ForceAccredited => self.force_accredited,
            BoolParam::ForceAccreditedUs => self.force_accredited_us,
            BoolParam::WorldWideForceFullTransfer => self.world_wide_force_full_transfer,
            BoolParam::DisallowBackDating => self.disallow_back_dating,
        }
    }

    fn flag_mut(&mut self, param: BoolParam) -> &mut bool {
        match param {
            BoolParam::ForceFullTransfer => &mut self.force_full_transfer,
            BoolParam::ForceAccredited => &mut self.force_accredited,
            BoolParam::ForceAccreditedUs => &mut self.force_accredited_us,
            BoolParam::WorldWideForceFullTransfer => &mut self.world_wide_force_full_transfer,
            BoolParam::DisallowBackDating => &mut self.disallow_back_dating,
        }
    }

    // -- Mutators ----------------------------------------------------------

    /// Set one numeric parameter.
    ///
    /// # Errors
    ///
    /// Rejects a percentage above 100.
    pub fn set_uint(
        &mut self,
        param: UintParam,
        value: u64,
    ) -> Result<Option<ConfigChange>, ComplianceError> {
        check_uint(param, value).map_err(ComplianceError::Config)?;
        let before = self.uint(param);
        if before == value {
            return Ok(None);
        }
        self.uint_mut(param, value);
        Ok(Some(ConfigChange {
            field: param.as_str().to_string(),
            before: before.to_string(),
            after: value.to_string(),
        }))
    }

    /// Set one boolean parameter.
    pub fn set_flag(&mut self, param: BoolParam, value: bool) -> Option<ConfigChange> {
        let slot = self.flag_mut(param);
        if *slot == value {
            return None;
        }
        let before = std::mem::replace(slot, value);
        Some(ConfigChange {
            field: param.as_str().to_string(),
            before: before.to_string(),
            after: value.to_string(),
        })
    }

    /// Replace every numeric and boolean parameter at once.
    ///
    /// The whole input is validated before anything changes.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::MalformedInput`] unless exactly 16 numeric
    /// and 5 boolean values are supplied, and a config error for
    /// out-of-range values.
    pub fn set_all(
        &mut self,
        uints: &[u64],
        bools: &[bool],
    ) -> Result<Vec<ConfigChange>, ComplianceError> {
        if uints.len() != UintParam::ALL.len() {
            return Err(ValidationError::LengthMismatch {
                what: "numeric parameters".to_string(),
                left: uints.len(),
                right: UintParam::ALL.len(),
            }
            .into());
        }
        if bools.len() != BoolParam::ALL.len() {
            return Err(ValidationError::LengthMismatch {
                what: "boolean parameters".to_string(),
                left: bools.len(),
                right: BoolParam::ALL.len(),
            }
            .into());
        }
        let mut next = self.clone();
        for (param, value) in UintParam::ALL.iter().zip(uints) {
            next.uint_mut(*param, *value);
        }
        for (param, value) in BoolParam::ALL.iter().zip(bools) {
            *next.flag_mut(*param) = *value;
        }
        next.validate()?;

        let mut changes = Vec::new();
        for (param, value) in UintParam::ALL.iter().zip(uints) {
            if let Some(change) = self.set_uint(*param, *value)? {
                changes.push(change);
            }
        }
        for (param, value) in BoolParam::ALL.iter().zip(bools) {
            if let Some(change) = self.set_flag(*param, *value) {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Classify a country, returning the previous classification.
    pub fn set_country_compliance(
        &mut self,
        country: CountryCode,
        classification: Classification,
    ) -> Classification {
        let previous = if classification == Classification::None {
            self.countries.remove(&country)
        } else {
            self.countries.insert(country, classification)
        };
        previous.unwrap_or_default()
    }

    /// Classification of a country. Unlisted countries are `NONE`.
    pub fn classification_of(&self, country: &CountryCode) -> Classification {
        self.countries.get(country).copied().unwrap_or_default()
    }

    /// Classification of an optional country.
    pub fn region_of(&self, country: Option<&CountryCode>) -> Classification {
        country
            .map(|c| self.classification_of(c))
            .unwrap_or_default()
    }

    /// Effective cap on US investors given the total investor count.
    ///
    /// Combines the absolute limit and the percentage limit, taking the
    /// stricter when both are set. Zero means unlimited.
    pub fn effective_us_limit(&self, total_investors: u64) -> u64 {
        let by_pct = (self.max_us_investors_percentage != 0).then(|| {
            let scaled =
                u128::from(total_investors) * u128::from(self.max_us_investors_percentage) / 100;
            u64::try_from(scaled).unwrap_or(u64::MAX)
        });
        match (self.us_investors_limit, by_pct) {
            (0, None) => 0,
            (abs, None) => abs,
            (0, Some(pct)) => pct.max(1),
            (abs, Some(pct)) => abs.min(pct.max(1)),
        }
    }

    /// Longest configured hold-up period.
    pub fn max_lock_period(&self) -> u64 {
        self.us_lock_period.max(self.non_us_lock_period)
    }
}

fn check_uint(param: UintParam, value: u64) -> Result<(), ConfigError> {
    if param == UintParam::MaxUsInvestorsPercentage && value > 100 {
        return Err(ConfigError::Invalid {
            field: param.as_str().to_string(),
            reason: format!("{value} exceeds 100"),
        });
    }
    Ok(())
}
