//! # Audit Trail
//!
//! Records every committed state change of a token: balance movements, lock
//! changes, configuration changes and omnibus counter adjustments.
//!
//! ## Security Invariant
//!
//! Every entry carries a monotonically increasing sequence number and is
//! individually digestable (SHA-256 over its JSON serialization). The trail
//! trims the oldest 10% of entries when its capacity is exceeded; sequence
//! numbers are never reused, so a gap at the head of the trail is always
//! visible to a reader.

use serde::{Deserialize, Serialize};

use crate::classification::{Classification, Role};
use crate::counters::CounterDeltas;
use crate::digest::{sha256_digest, ContentDigest};
use crate::identity::{CountryCode, InvestorId, PartitionId, WalletAddress};
use crate::temporal::Timestamp;
use crate::Amount;

// ---------------------------------------------------------------------------
// OmnibusAction
// ---------------------------------------------------------------------------

/// The omnibus bulk operation that produced an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmnibusAction {
    /// Mint into the omnibus wallet with positive deltas.
    BulkIssuance,
    /// Burn from the omnibus wallet with negative deltas.
    BulkBurn,
    /// Distribute from the omnibus wallet to investor wallets.
    BulkTransfer,
    /// Counter correction with no balance movement.
    AdjustCounters,
}

impl OmnibusAction {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BulkIssuance => "bulk_issuance",
            Self::BulkBurn => "bulk_burn",
            Self::BulkTransfer => "bulk_transfer",
            Self::AdjustCounters => "adjust_counters",
        }
    }
}

impl std::fmt::Display for OmnibusAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEvent
// ---------------------------------------------------------------------------

/// Typed payload of an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Tokens minted.
    Issued {
        /// Receiving wallet.
        to: WalletAddress,
        /// Amount minted.
        value: Amount,
        /// Effective issuance time.
        issuance_time: Timestamp,
        /// Partition credited, for partitioned tokens.
        partition: Option<PartitionId>,
    },
    /// Tokens moved between wallets.
    Transferred {
        /// Sending wallet.
        from: WalletAddress,
        /// Receiving wallet.
        to: WalletAddress,
        /// Amount moved.
        value: Amount,
    },
    /// Tokens destroyed.
    Burned {
        /// Debited wallet.
        wallet: WalletAddress,
        /// Amount destroyed.
        value: Amount,
        /// Operator-supplied reason.
        reason: String,
    },
    /// Tokens forcibly moved to an issuer wallet.
    Seized {
        /// Debited wallet.
        from: WalletAddress,
        /// Issuer wallet credited.
        to: WalletAddress,
        /// Amount seized.
        value: Amount,
        /// Operator-supplied reason.
        reason: String,
    },
    /// A lock record was appended.
    LockAdded {
        /// Locked wallet.
        wallet: WalletAddress,
        /// Amount locked.
        value: Amount,
        /// Numeric reason code.
        reason_code: u32,
        /// Reason text.
        reason: String,
        /// Release time; `None` locks indefinitely.
        release_time: Option<Timestamp>,
        /// Partition scope, for partitioned locks.
        partition: Option<PartitionId>,
    },
    /// A lock record was removed.
    LockRemoved {
        /// Wallet whose lock was removed.
        wallet: WalletAddress,
        /// Amount the removed record locked.
        value: Amount,
        /// Reason text of the removed record.
        reason: String,
        /// Partition scope, for partitioned locks.
        partition: Option<PartitionId>,
    },
    /// Investor-wide lock set.
    InvestorLocked {
        /// The investor.
        investor: InvestorId,
    },
    /// Investor-wide lock cleared.
    InvestorUnlocked {
        /// The investor.
        investor: InvestorId,
    },
    /// A numeric or boolean configuration field changed.
    ConfigChanged {
        /// Field name.
        field: String,
        /// Previous value.
        before: String,
        /// New value.
        after: String,
    },
    /// A country was reclassified.
    CountryComplianceChanged {
        /// The country.
        country: CountryCode,
        /// Previous classification.
        before: Classification,
        /// New classification.
        after: Classification,
    },
    /// An omnibus bulk operation applied counter deltas.
    OmnibusOperation {
        /// Which bulk operation.
        action: OmnibusAction,
        /// The omnibus wallet.
        omnibus: WalletAddress,
        /// Balance moved (zero for counter-only corrections).
        value: Amount,
        /// Deltas applied to the counter ledger.
        deltas: CounterDeltas,
    },
    /// One leg of a bulk distribution out of an omnibus wallet.
    OmnibusTransfer {
        /// The omnibus wallet.
        omnibus: WalletAddress,
        /// Receiving wallet.
        to: WalletAddress,
        /// Amount moved.
        value: Amount,
    },
    /// Off-chain movement inside an omnibus wallet.
    InternalTbeTransfer {
        /// Reference into the off-chain ledger.
        external_id: String,
        /// Deltas applied to the counter ledger.
        deltas: CounterDeltas,
    },
    /// A partition was created by an issuance.
    PartitionCreated {
        /// Content-addressed id.
        partition: PartitionId,
        /// Issuance time of the partition.
        issuance_time: Timestamp,
        /// Region of the partition.
        region: Classification,
    },
    /// A holder's counters moved between categories.
    CountersRebucketed {
        /// The investor.
        investor: InvestorId,
        /// Why the categories changed (e.g. `country`, `accredited`).
        cause: String,
    },
    /// The token was paused.
    Paused,
    /// The token was unpaused.
    Unpaused,
    /// A role was assigned to an operator wallet.
    RoleAssigned {
        /// Operator wallet.
        wallet: WalletAddress,
        /// Role granted.
        role: Role,
    },
}

impl AuditEvent {
    /// Stable event kind string (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Issued { .. } => "issued",
            Self::Transferred { .. } => "transferred",
            Self::Burned { .. } => "burned",
            Self::Seized { .. } => "seized",
            Self::LockAdded { .. } => "lock_added",
            Self::LockRemoved { .. } => "lock_removed",
            Self::InvestorLocked { .. } => "investor_locked",
            Self::InvestorUnlocked { .. } => "investor_unlocked",
            Self::ConfigChanged { .. } => "config_changed",
            Self::CountryComplianceChanged { .. } => "country_compliance_changed",
            Self::OmnibusOperation { .. } => "omnibus_operation",
            Self::OmnibusTransfer { .. } => "omnibus_transfer",
            Self::InternalTbeTransfer { .. } => "internal_tbe_transfer",
            Self::PartitionCreated { .. } => "partition_created",
            Self::CountersRebucketed { .. } => "counters_rebucketed",
            Self::Paused => "paused",
            Self::Unpaused => "unpaused",
            Self::RoleAssigned { .. } => "role_assigned",
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// A single entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail; never reused after trimming.
    pub sequence: u64,
    /// Time the change was committed.
    pub recorded_at: Timestamp,
    /// The change.
    pub event: AuditEvent,
}

impl AuditEntry {
    /// Compute the content-addressed digest of this entry.
    ///
    /// Returns `None` if serialization fails.
    pub fn digest(&self) -> Option<ContentDigest> {
        match serde_json::to_vec(self) {
            Ok(bytes) => Some(sha256_digest(&bytes)),
            Err(e) => {
                tracing::warn!(sequence = self.sequence, error = %e, "audit entry serialization failed, digest unavailable");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// An append-only audit trail with a configurable capacity.
///
/// When the trail exceeds its maximum capacity, the oldest 10% of entries
/// are trimmed.
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
    max_entries: usize,
    next_sequence: u64,
}

impl AuditTrail {
    /// Create a new audit trail with the given maximum capacity.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            next_sequence: 0,
        }
    }

    /// Append an event, returning its sequence number.
    pub fn record(&mut self, recorded_at: Timestamp, event: AuditEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(AuditEntry {
            sequence,
            recorded_at,
            event,
        });
        if self.entries.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            self.entries.drain(..trim_count.min(self.entries.len()));
        }
        sequence
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number the next entry will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Entries whose event kind matches.
    pub fn entries_of_kind(&self, kind: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.event.kind() == kind)
            .collect()
    }

    /// Return the last N entries (or all entries if fewer than N exist).
    pub fn last_n(&self, n: usize) -> &[AuditEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Compute `(sequence, digest)` for every retained entry.
    pub fn compute_digests(&self) -> Vec<(u64, ContentDigest)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.digest().map(|d| (entry.sequence, d)))
            .collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}
