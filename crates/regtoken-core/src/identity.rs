//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the identifiers the compliance stack
//! passes around. Each identifier is a distinct type: a [`WalletAddress`]
//! is never confused with the [`InvestorId`] that owns it.
//!
//! ## Validation
//!
//! All string identifiers validate at construction. [`CountryCode`] is
//! additionally normalized to upper case so that `"us"` and `"US"` select
//! the same classification and the same EU-retail bucket.
//!
//! [`PartitionId`] is content-addressed: it is derived from the partition's
//! issuance time and region and is used only as an opaque map key.

use serde::{Deserialize, Serialize};

use crate::classification::Classification;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::ValidationError;
use crate::temporal::Timestamp;

// ---------------------------------------------------------------------------
// WalletAddress
// ---------------------------------------------------------------------------

/// An account address that can hold token balances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create a wallet address, rejecting empty strings and whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidWalletAddress`] for malformed input.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidWalletAddress(s));
        }
        Ok(Self(s))
    }

    /// Access the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// InvestorId
// ---------------------------------------------------------------------------

/// Opaque identifier of a registered investor (a legal person or entity),
/// independent of any wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvestorId(String);

impl InvestorId {
    /// Create an investor identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidInvestorId`] if the trimmed value
    /// is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(ValidationError::InvalidInvestorId);
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InvestorId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InvestorId> for String {
    fn from(value: InvestorId) -> Self {
        value.0
    }
}

impl std::fmt::Display for InvestorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CountryCode
// ---------------------------------------------------------------------------

/// An ISO 3166 country code, stored upper case.
///
/// Accepts alpha-2 and alpha-3 forms. The registry and the configuration's
/// country map both key on this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Create a country code, normalizing to upper case.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCountryCode`] unless the input is
    /// 2 or 3 ASCII letters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let trimmed = s.trim();
        if !(2..=3).contains(&trimmed.len()) || !trimmed.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ValidationError::InvalidCountryCode(s));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Access the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PartitionId
// ---------------------------------------------------------------------------

/// Content-addressed partition identifier: SHA-256 over the issuance time
/// and region.
///
/// The id is only ever used as a key into the partition arena; the metadata
/// it names is looked up, never recomputed from the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(ContentDigest);

impl PartitionId {
    /// Derive the partition id for an (issuance time, region) pair.
    pub fn derive(issuance_time: Timestamp, region: Classification) -> Self {
        let mut preimage = Vec::with_capacity(8 + 16);
        preimage.extend_from_slice(&issuance_time.epoch_secs().to_be_bytes());
        preimage.extend_from_slice(region.as_str().as_bytes());
        Self(sha256_digest(&preimage))
    }

    /// The underlying digest.
    pub fn digest(&self) -> &ContentDigest {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "partition:{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_address_rejects_empty_and_whitespace() {
        assert!(WalletAddress::new("").is_err());
        assert!(WalletAddress::new("0xab cd").is_err());
        assert_eq!(WalletAddress::new("0xabcd").unwrap().as_str(), "0xabcd");
    }

    #[test]
    fn investor_id_rejects_blank() {
        assert!(InvestorId::new("   ").is_err());
        assert_eq!(InvestorId::new("inv-1").unwrap().to_string(), "inv-1");
    }

    #[test]
    fn country_code_normalizes_case() {
        let a = CountryCode::new("us").unwrap();
        let b = CountryCode::new("US").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "US");
    }

    #[test]
    fn country_code_rejects_bad_shapes() {
        assert!(CountryCode::new("U").is_err());
        assert!(CountryCode::new("USAA").is_err());
        assert!(CountryCode::new("U1").is_err());
    }

    #[test]
    fn country_code_serde_goes_through_validation() {
        let parsed: CountryCode = serde_json::from_str("\"fr\"").unwrap();
        assert_eq!(parsed.as_str(), "FR");
        assert!(serde_json::from_str::<CountryCode>("\"france\"").is_err());
    }

    #[test]
    fn partition_id_is_content_addressed() {
        let t = Timestamp::from_epoch_secs(1_700_000_000);
        let a = PartitionId::derive(t, Classification::Us);
        let b = PartitionId::derive(t, Classification::Us);
        let c = PartitionId::derive(t, Classification::Eu);
        let d = PartitionId::derive(Timestamp::from_epoch_secs(1_700_000_001), Classification::Us);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.to_hex().len(), 64);
    }
}
