//! # Partition Arena
//!
//! Partitions are immutable buckets of tokens sharing an issuance time and a
//! region. Their id is a content hash of both, but the id is only ever a key
//! into this arena: metadata is looked up, never recomputed.
//!
//! Partitions are created lazily by the first issuance with a novel
//! `(issuance_time, region)` pair. The arena assigns each a creation
//! sequence number so that ordering is total even when two partitions share
//! an issuance time.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regtoken_core::{Amount, Classification, PartitionId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};

use crate::error::ComplianceError;

/// Partition metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Content-addressed id.
    pub id: PartitionId,
    /// Issuance time shared by every token in the partition.
    pub issuance_time: Timestamp,
    /// Region of the investors the partition was issued to.
    pub region: Classification,
    /// Creation order within the arena.
    pub sequence: u64,
}

/// Arena of partitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PartitionManager {
    partitions: BTreeMap<PartitionId, Partition>,
}

impl PartitionManager {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the partition for `(issuance_time, region)`, if it exists.
    pub fn find(&self, issuance_time: Timestamp, region: Classification) -> Option<&Partition> {
        self.partitions
            .get(&PartitionId::derive(issuance_time, region))
    }

    /// Return the partition for `(issuance_time, region)`, creating it if
    /// needed. The flag reports whether it was created.
    pub fn ensure(&mut self, issuance_time: Timestamp, region: Classification) -> (PartitionId, bool) {
        let id = PartitionId::derive(issuance_time, region);
        if self.partitions.contains_key(&id) {
            return (id, false);
        }
        let sequence = self.partitions.len() as u64;
        tracing::info!(partition = %id, issuance_time = %issuance_time, region = %region, "partition created");
        self.partitions.insert(
            id.clone(),
            Partition {
                id: id.clone(),
                issuance_time,
                region,
                sequence,
            },
        );
        (id, true)
    }

    /// Metadata of a partition.
    pub fn get(&self, id: &PartitionId) -> Option<&Partition> {
        self.partitions.get(id)
    }

    /// Metadata of a partition, or an error for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::UnknownPartition`].
    pub fn require(&self, id: &PartitionId) -> Result<&Partition, ComplianceError> {
        self.partitions
            .get(id)
            .ok_or_else(|| ComplianceError::UnknownPartition {
                partition: id.clone(),
            })
    }

    /// Number of partitions in the arena.
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Sort partition ids oldest first: by issuance time, then creation order.
    /// Unknown ids sort last.
    pub fn sort_oldest_first(&self, ids: &mut [PartitionId]) {
        ids.sort_by(|a, b| match (self.partitions.get(a), self.partitions.get(b)) {
            (Some(pa), Some(pb)) => pa
                .issuance_time
                .cmp(&pb.issuance_time)
                .then(pa.sequence.cmp(&pb.sequence)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        });
    }
}

/// Draw `value` from `available` partitions in order.
///
/// Returns the `(partition, amount)` pairs drawn, or `None` if the
/// partitions together cannot cover `value`.
pub fn draw_in_order(
    available: &[(PartitionId, Amount)],
    value: Amount,
) -> Option<Vec<(PartitionId, Amount)>> {
    let mut remaining = value;
    let mut plan = Vec::new();
    for (id, amount) in available {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(*amount);
        if take > 0 {
            plan.push((id.clone(), take));
            remaining -= take;
        }
    }
    (remaining == 0).then_some(plan)
}

/// Check an explicit partition vector: equal lengths, non-zero amounts,
/// no repeated partition, and a sum equal to `value`.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation.
pub fn validate_explicit(
    partitions: &[PartitionId],
    amounts: &[Amount],
    value: Amount,
) -> Result<(), ValidationError> {
    if partitions.len() != amounts.len() {
        return Err(ValidationError::LengthMismatch {
            what: "partitions and amounts".to_string(),
            left: partitions.len(),
            right: amounts.len(),
        });
    }
    let mut seen = std::collections::BTreeSet::new();
    for id in partitions {
        if !seen.insert(id) {
            return Err(ValidationError::OutOfRange {
                field: "partitions".to_string(),
                value: id.to_string(),
                reason: "partition listed twice".to_string(),
            });
        }
    }
    if amounts.iter().any(|a| *a == 0) {
        return Err(ValidationError::OutOfRange {
            field: "amounts".to_string(),
            value: "0".to_string(),
            reason: "partition amounts must be positive".to_string(),
        });
    }
    let sum = amounts
        .iter()
        .try_fold(0u64, |acc, a| acc.checked_add(*a))
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "amounts".to_string(),
            value: "overflow".to_string(),
            reason: "sum overflows".to_string(),
        })?;
    if sum != value {
        return Err(ValidationError::OutOfRange {
            field: "amounts".to_string(),
            value: sum.to_string(),
            reason: format!("must sum to transfer value {value}"),
        });
    }
    Ok(())
}
