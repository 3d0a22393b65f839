//! # Temporal Types — Epoch-Second Timestamps
//!
//! Defines [`Timestamp`], the single time type used by every rule window in
//! the stack: lock release times, hold-up periods, flowback end time,
//! issuance times, and the `as_of` instant of each decision.
//!
//! ## Invariant
//!
//! Timestamps are whole seconds since the Unix epoch. Zero is a sentinel
//! meaning "unset" (e.g. `block_flowback_end_time = 0` disables flowback);
//! operations that need a real instant reject it with
//! [`ValidationError::ZeroTimestamp`].
//!
//! Window arithmetic saturates instead of wrapping, so a lock period longer
//! than the elapsed epoch can never underflow into "already released".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC instant with seconds precision, stored as epoch seconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero sentinel.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a timestamp from epoch seconds.
    pub const fn from_epoch_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// Convert from a `chrono` UTC datetime. Pre-epoch instants clamp to zero.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(u64::try_from(dt.timestamp()).unwrap_or(0))
    }

    /// Parse an RFC 3339 string, converting any offset to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] if the string is not RFC 3339.
    pub fn parse_rfc3339(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| ValidationError::OutOfRange {
            field: "timestamp".to_string(),
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// Epoch seconds.
    pub const fn epoch_secs(&self) -> u64 {
        self.0
    }

    /// Whether this is the zero sentinel.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Reject the zero sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroTimestamp`] when `self` is zero.
    pub fn require_nonzero(self) -> Result<Self, ValidationError> {
        if self.is_zero() {
            return Err(ValidationError::ZeroTimestamp);
        }
        Ok(self)
    }

    /// `self + secs`, saturating at `u64::MAX`.
    pub const fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// `self - secs`, saturating at zero.
    pub const fn saturating_sub_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Whether at least `period_secs` have elapsed from `self` to `now`.
    pub fn has_elapsed(self, period_secs: u64, now: Timestamp) -> bool {
        self.saturating_add_secs(period_secs) <= now
    }

    /// Render as ISO 8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        let secs = i64::try_from(self.0).unwrap_or(i64::MAX);
        match DateTime::<Utc>::from_timestamp(secs, 0) {
            Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            None => format!("@{}", self.0),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Seconds in a (non-leap) year; the default US hold-up period.
pub const ONE_YEAR_SECS: u64 = 365 * 24 * 60 * 60;
