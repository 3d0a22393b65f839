//! # Compliance Outcome Codes
//!
//! Every decision produces exactly one [`ComplianceCode`]. The integer code
//! and reason string of each variant are part of the external contract:
//! front-ends key on them and they must never be renumbered.
//!
//! Codes group into families (see [`CodeFamily`]) that tell an operator what
//! kind of remedy applies: waiting for a window, topping up a balance,
//! obtaining an attribute, or freeing category capacity.

use serde::{Deserialize, Serialize};

/// The family a non-zero code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFamily {
    /// Token-wide administrative state.
    Administrative,
    /// Insufficient, under-minimum or over-maximum balances.
    Liquidity,
    /// Locks, flowback, hold-up periods and full-transfer requirements.
    RegulatoryHold,
    /// Registry membership, destination and accreditation gates.
    Authorization,
    /// Investor-count and supply capacity.
    Capacity,
}

impl CodeFamily {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrative => "administrative",
            Self::Liquidity => "liquidity",
            Self::RegulatoryHold => "regulatory_hold",
            Self::Authorization => "authorization",
            Self::Capacity => "capacity",
        }
    }
}

impl std::fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a compliance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCode {
    /// 0: the movement is permitted.
    Valid,
    /// 10: the token is paused.
    TokenPaused,
    /// 15: sender balance is below the amount.
    NotEnoughTokens,
    /// 16: locked balance prevents the movement.
    TokensLocked,
    /// 20: a party is not known to the registry.
    WalletNotInRegistry,
    /// 25: non-US to US movement inside the flowback window.
    Flowback,
    /// 26: receiver's country is forbidden.
    DestinationRestricted,
    /// 32: US hold-up period has not elapsed.
    HoldUp1y,
    /// 33: non-US hold-up period has not elapsed.
    HoldUp,
    /// 40: a category investor cap would be exceeded.
    MaxInvestorsInCategory,
    /// 50: only the full balance may be transferred.
    OnlyFullTransfer,
    /// 51: a resulting non-zero balance would fall under the minimum.
    AmountUnderMin,
    /// 52: the receiver's resulting balance would exceed the maximum.
    AmountAboveMax,
    /// 61: both parties must be accredited.
    OnlyAccredited,
    /// 62: US parties must be accredited.
    OnlyUsAccredited,
    /// 71: the movement would drop the investor count under the minimum.
    NotEnoughInvestors,
    /// 73: issuance would exceed the authorized securities.
    MaxAuthorizedSecuritiesExceeded,
    /// 81: omnibus-to-omnibus movement.
    OmnibusToOmnibus,
}

impl ComplianceCode {
    /// All variants in ascending code order.
    pub const ALL: [ComplianceCode; 18] = [
        Self::Valid,
        Self::TokenPaused,
        Self::NotEnoughTokens,
        Self::TokensLocked,
        Self::WalletNotInRegistry,
        Self::Flowback,
        Self::DestinationRestricted,
        Self::HoldUp1y,
        Self::HoldUp,
        Self::MaxInvestorsInCategory,
        Self::OnlyFullTransfer,
        Self::AmountUnderMin,
        Self::AmountAboveMax,
        Self::OnlyAccredited,
        Self::OnlyUsAccredited,
        Self::NotEnoughInvestors,
        Self::MaxAuthorizedSecuritiesExceeded,
        Self::OmnibusToOmnibus,
    ];

    /// The stable integer code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Valid => 0,
            Self::TokenPaused => 10,
            Self::NotEnoughTokens => 15,
            Self::TokensLocked => 16,
            Self::WalletNotInRegistry => 20,
            Self::Flowback => 25,
            Self::DestinationRestricted => 26,
            Self::HoldUp1y => 32,
            Self::HoldUp => 33,
            Self::MaxInvestorsInCategory => 40,
            Self::OnlyFullTransfer => 50,
            Self::AmountUnderMin => 51,
            Self::AmountAboveMax => 52,
            Self::OnlyAccredited => 61,
            Self::OnlyUsAccredited => 62,
            Self::NotEnoughInvestors => 71,
            Self::MaxAuthorizedSecuritiesExceeded => 73,
            Self::OmnibusToOmnibus => 81,
        }
    }

    /// The stable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::TokenPaused => "Token paused",
            Self::NotEnoughTokens => "Not enough tokens",
            Self::TokensLocked => "Tokens locked",
            Self::WalletNotInRegistry => "Wallet not in registry service",
            Self::Flowback => "Flowback",
            Self::DestinationRestricted => "Destination restricted",
            Self::HoldUp1y => "Hold-up 1y",
            Self::HoldUp => "Hold-up",
            Self::MaxInvestorsInCategory => "Max investors in category",
            Self::OnlyFullTransfer => "Only full transfer",
            Self::AmountUnderMin => "Amount of tokens under min",
            Self::AmountAboveMax => "Amount of tokens above max",
            Self::OnlyAccredited => "Only accredited",
            Self::OnlyUsAccredited => "Only us accredited",
            Self::NotEnoughInvestors => "Not enough investors",
            Self::MaxAuthorizedSecuritiesExceeded => "Max authorized securities exceeded",
            Self::OmnibusToOmnibus => "Omnibus to omnibus transfer",
        }
    }

    /// The family of a rejection; `None` for [`ComplianceCode::Valid`].
    pub fn family(&self) -> Option<CodeFamily> {
        match self {
            Self::Valid => None,
            Self::TokenPaused => Some(CodeFamily::Administrative),
            Self::NotEnoughTokens | Self::AmountUnderMin | Self::AmountAboveMax => {
                Some(CodeFamily::Liquidity)
            }
            Self::TokensLocked
            | Self::Flowback
            | Self::HoldUp1y
            | Self::HoldUp
            | Self::OnlyFullTransfer => Some(CodeFamily::RegulatoryHold),
            Self::WalletNotInRegistry
            | Self::DestinationRestricted
            | Self::OnlyAccredited
            | Self::OnlyUsAccredited
            | Self::OmnibusToOmnibus => Some(CodeFamily::Authorization),
            Self::MaxInvestorsInCategory
            | Self::NotEnoughInvestors
            | Self::MaxAuthorizedSecuritiesExceeded => Some(CodeFamily::Capacity),
        }
    }

    /// Whether this is the success code.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Look up a variant by its integer code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl std::fmt::Display for ComplianceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.reason())
    }
}
