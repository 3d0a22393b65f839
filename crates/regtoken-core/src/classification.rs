//! # Classification Enums
//!
//! Closed enumerations for the regulatory region of a country, the kind of a
//! wallet, the authorization role of an operator, the kind of balance
//! movement, and the investor attributes tracked by the registry.
//!
//! Every enum has an `as_str()` used by its `Display` impl and a stable
//! numeric form for configuration files that carry integer codes.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Regulatory region assigned to a country by the compliance configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// No regional rules apply.
    #[default]
    None,
    /// United States: US limits, hold-up and flowback rules.
    Us,
    /// European Union: EU minimums and per-country retail caps.
    Eu,
    /// Japan: JP investor cap.
    Jp,
    /// Holders from this country may not receive tokens.
    Forbidden,
}

impl Classification {
    /// All variants.
    pub const ALL: [Classification; 5] = [
        Self::None,
        Self::Us,
        Self::Eu,
        Self::Jp,
        Self::Forbidden,
    ];

    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Us => "US",
            Self::Eu => "EU",
            Self::Jp => "JP",
            Self::Forbidden => "FORBIDDEN",
        }
    }

    /// Numeric region code (0 none, 1 US, 2 EU, 4 forbidden, 8 JP).
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Us => 1,
            Self::Eu => 2,
            Self::Forbidden => 4,
            Self::Jp => 8,
        }
    }

    /// Inverse of [`Classification::as_u8`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownVariant`] for any other value.
    pub fn from_u8(value: u8) -> Result<Self, ValidationError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Us),
            2 => Ok(Self::Eu),
            4 => Ok(Self::Forbidden),
            8 => Ok(Self::Jp),
            other => Err(ValidationError::UnknownVariant {
                kind: "classification".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Classification {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "classification".to_string(),
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// WalletKind
// ---------------------------------------------------------------------------

/// The kind of a wallet, as recorded by the wallet manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// An ordinary investor wallet.
    #[default]
    Regular,
    /// Issuer treasury wallet; the only valid seize destination.
    Issuer,
    /// Exchange hot wallet.
    Exchange,
    /// Platform wallet; bypasses registry, lock and category checks.
    Platform,
    /// Omnibus wallet holding positions of off-chain beneficiaries.
    OmnibusTbe,
}

impl WalletKind {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Issuer => "issuer",
            Self::Exchange => "exchange",
            Self::Platform => "platform",
            Self::OmnibusTbe => "omnibus_tbe",
        }
    }

    /// Issuer, exchange and platform wallets. These never count as investors.
    pub fn is_special(&self) -> bool {
        matches!(self, Self::Issuer | Self::Exchange | Self::Platform)
    }
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Operator authorization level, ordered by privilege.
///
/// `Role::Master >= Role::Issuer >= Role::Exchange >= Role::None`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No privileges.
    #[default]
    None,
    /// Exchange operator.
    Exchange,
    /// Issuer operator: issuance, burn, seize, configuration, locks, omnibus.
    Issuer,
    /// Master operator: everything an issuer can do, plus role assignment.
    Master,
}

impl Role {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Exchange => "exchange",
            Self::Issuer => "issuer",
            Self::Master => "master",
        }
    }

    /// Whether this role grants at least the privileges of `required`.
    pub fn at_least(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The kind of balance movement under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Minting new tokens to a wallet.
    Issuance,
    /// Wallet-to-wallet movement.
    Transfer,
    /// Destroying tokens held by a wallet.
    Burn,
    /// Forced movement to an issuer wallet.
    Seize,
}

impl Operation {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issuance => "issuance",
            Self::Transfer => "transfer",
            Self::Burn => "burn",
            Self::Seize => "seize",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Investor attributes
// ---------------------------------------------------------------------------

/// An investor attribute tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Know-your-customer verification.
    Kyc,
    /// Accredited investor status.
    Accredited,
    /// Qualified investor status; exempts EU investors from the retail cap.
    Qualified,
    /// Professional investor status.
    Professional,
}

impl AttributeKind {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kyc => "kyc",
            Self::Accredited => "accredited",
            Self::Qualified => "qualified",
            Self::Professional => "professional",
        }
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of an investor attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStatus {
    /// Not yet reviewed. Also the status of an attribute never set.
    #[default]
    Pending,
    /// Attribute granted.
    Approved,
    /// Attribute denied.
    Rejected,
}

impl AttributeStatus {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether the attribute is granted.
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for AttributeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_numeric_roundtrip() {
        for c in Classification::ALL {
            assert_eq!(Classification::from_u8(c.as_u8()).unwrap(), c);
        }
        assert!(Classification::from_u8(3).is_err());
    }

    #[test]
    fn classification_parses_case_insensitively() {
        assert_eq!("forbidden".parse::<Classification>().unwrap(), Classification::Forbidden);
        assert_eq!("US".parse::<Classification>().unwrap(), Classification::Us);
        assert!("mars".parse::<Classification>().is_err());
    }

    #[test]
    fn classification_serde_uses_upper_case() {
        let json = serde_json::to_string(&Classification::Forbidden).unwrap();
        assert_eq!(json, "\"FORBIDDEN\"");
    }

    #[test]
    fn role_ordering_follows_privilege() {
        assert!(Role::Master.at_least(Role::Issuer));
        assert!(Role::Issuer.at_least(Role::Issuer));
        assert!(!Role::Exchange.at_least(Role::Issuer));
        assert!(!Role::None.at_least(Role::Exchange));
    }

    #[test]
    fn special_wallets() {
        assert!(WalletKind::Issuer.is_special());
        assert!(WalletKind::Platform.is_special());
        assert!(!WalletKind::Regular.is_special());
        assert!(!WalletKind::OmnibusTbe.is_special());
    }
}
