//! # Lock Availability Calculator
//!
//! Time-windowed locks on wallet balances, optionally scoped to a partition,
//! plus an investor-wide kill switch.
//!
//! ## Semantics
//!
//! - Records are appended, never merged. Removal is by index and moves the
//!   last record into the freed slot.
//! - A record with `release_time = None` never releases.
//! - `transferable = max(0, balance − Σ{amount : release_time > as_of})`,
//!   or zero while the owning investor is fully locked.
//! - For fixed records, `transferable` is non-decreasing in `as_of`.

use std::collections::{BTreeMap, BTreeSet};

use regtoken_core::{Amount, InvestorId, PartitionId, Timestamp, ValidationError, WalletAddress};
use serde::{Deserialize, Serialize};

use crate::error::ComplianceError;

/// One lock on a wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Amount held back.
    pub value: Amount,
    /// Numeric reason code supplied by the operator.
    pub reason_code: u32,
    /// Reason text supplied by the operator.
    pub reason: String,
    /// Release time; `None` never releases.
    pub release_time: Option<Timestamp>,
    /// Partition scope.
    pub partition: Option<PartitionId>,
}

impl LockRecord {
    /// Whether the record still holds tokens at `as_of`.
    pub fn is_active(&self, as_of: Timestamp) -> bool {
        match self.release_time {
            None => true,
            Some(release) => release > as_of,
        }
    }
}

type LockKey = (WalletAddress, Option<PartitionId>);

/// Lock records for every wallet, plus the set of fully locked investors.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    records: BTreeMap<LockKey, Vec<LockRecord>>,
    locked_investors: BTreeSet<InvestorId>,
}

impl LockManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lock record, returning its index.
    ///
    /// # Errors
    ///
    /// Rejects a zero amount and a release time not after `now`.
    pub fn add_manual_lock_record(
        &mut self,
        wallet: &WalletAddress,
        record: LockRecord,
        now: Timestamp,
    ) -> Result<usize, ComplianceError> {
        if record.value == 0 {
            return Err(ValidationError::OutOfRange {
                field: "lock value".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if let Some(release) = record.release_time {
            if release <= now {
                return Err(ValidationError::OutOfRange {
                    field: "release time".to_string(),
                    value: release.to_string(),
                    reason: format!("must be after {now}"),
                }
                .into());
            }
        }
        let list = self
            .records
            .entry((wallet.clone(), record.partition.clone()))
            .or_default();
        list.push(record);
        Ok(list.len() - 1)
    }

    /// Remove the record at `index`, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::LockIndexOutOfRange`] for a bad index.
    pub fn remove_lock_record(
        &mut self,
        wallet: &WalletAddress,
        partition: Option<&PartitionId>,
        index: usize,
    ) -> Result<LockRecord, ComplianceError> {
        let key = (wallet.clone(), partition.cloned());
        let count = self.records.get(&key).map_or(0, Vec::len);
        let Some(list) = self.records.get_mut(&key).filter(|l| index < l.len()) else {
            return Err(ComplianceError::LockIndexOutOfRange {
                wallet: wallet.clone(),
                index,
                count,
            });
        };
        let removed = list.swap_remove(index);
        if list.is_empty() {
            self.records.remove(&key);
        }
        Ok(removed)
    }

    /// Number of records on a wallet (in a partition scope).
    pub fn lock_count(&self, wallet: &WalletAddress, partition: Option<&PartitionId>) -> usize {
        self.records
            .get(&(wallet.clone(), partition.cloned()))
            .map_or(0, Vec::len)
    }

    /// The record at `index`.
    pub fn lock_info(
        &self,
        wallet: &WalletAddress,
        partition: Option<&PartitionId>,
        index: usize,
    ) -> Option<&LockRecord> {
        self.records
            .get(&(wallet.clone(), partition.cloned()))
            .and_then(|list| list.get(index))
    }

    /// Amount still locked at `as_of`.
    pub fn locked_amount(
        &self,
        wallet: &WalletAddress,
        partition: Option<&PartitionId>,
        as_of: Timestamp,
    ) -> Amount {
        self.records
            .get(&(wallet.clone(), partition.cloned()))
            .map(|list| {
                list.iter()
                    .filter(|r| r.is_active(as_of))
                    .fold(0u64, |acc, r| acc.saturating_add(r.value))
            })
            .unwrap_or(0)
    }

    /// Balance available after locks.
    ///
    /// # Errors
    ///
    /// Returns [`ComplianceError::InvalidTime`] when `as_of` is zero.
    pub fn transferable(
        &self,
        wallet: &WalletAddress,
        investor: Option<&InvestorId>,
        partition: Option<&PartitionId>,
        balance: Amount,
        as_of: Timestamp,
    ) -> Result<Amount, ComplianceError> {
        if as_of.is_zero() {
            return Err(ComplianceError::InvalidTime);
        }
        Ok(self.available(wallet, investor, partition, balance, as_of))
    }

    /// [`LockManager::transferable`] for callers that already hold a
    /// non-zero `as_of`.
    pub(crate) fn available(
        &self,
        wallet: &WalletAddress,
        investor: Option<&InvestorId>,
        partition: Option<&PartitionId>,
        balance: Amount,
        as_of: Timestamp,
    ) -> Amount {
        if investor.is_some_and(|i| self.locked_investors.contains(i)) {
            return 0;
        }
        balance.saturating_sub(self.locked_amount(wallet, partition, as_of))
    }

    /// Lock every wallet of an investor. Returns `false` if already locked.
    pub fn lock_investor(&mut self, investor: InvestorId) -> bool {
        self.locked_investors.insert(investor)
    }

    /// Clear the investor-wide lock. Returns `false` if not locked.
    pub fn unlock_investor(&mut self, investor: &InvestorId) -> bool {
        self.locked_investors.remove(investor)
    }

    /// Whether the investor is fully locked.
    pub fn is_investor_locked(&self, investor: &InvestorId) -> bool {
        self.locked_investors.contains(investor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_epoch_secs(secs)
    }

    fn lock(value: Amount, release: Option<u64>) -> LockRecord {
        LockRecord {
            value,
            reason_code: 0,
            reason: "Test".into(),
            release_time: release.map(ts),
            partition: None,
        }
    }

    #[test]
    fn manual_lock_reduces_transferable_until_release() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        locks
            .add_manual_lock_record(&w, lock(95, Some(2_000)), ts(1_000))
            .unwrap();
        assert_eq!(locks.transferable(&w, None, None, 100, ts(1_000)).unwrap(), 5);
        assert_eq!(locks.transferable(&w, None, None, 100, ts(1_999)).unwrap(), 5);
        assert_eq!(locks.transferable(&w, None, None, 100, ts(2_000)).unwrap(), 100);
    }

    #[test]
    fn zero_time_is_invalid() {
        let locks = LockManager::new();
        assert!(matches!(
            locks.transferable(&wallet("w"), None, None, 10, Timestamp::ZERO),
            Err(ComplianceError::InvalidTime)
        ));
    }

    #[test]
    fn invalid_records_are_rejected() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        assert!(locks.add_manual_lock_record(&w, lock(0, Some(10)), ts(1)).is_err());
        assert!(locks.add_manual_lock_record(&w, lock(5, Some(1)), ts(1)).is_err());
        assert_eq!(locks.lock_count(&w, None), 0);
    }

    #[test]
    fn indefinite_locks_never_release_and_floor_at_zero() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        locks.add_manual_lock_record(&w, lock(500, None), ts(1)).unwrap();
        assert_eq!(locks.transferable(&w, None, None, 100, ts(u64::MAX)).unwrap(), 0);
    }

    #[test]
    fn removal_swaps_last_into_slot() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        for v in [10, 20, 30] {
            locks.add_manual_lock_record(&w, lock(v, Some(100)), ts(1)).unwrap();
        }
        let removed = locks.remove_lock_record(&w, None, 0).unwrap();
        assert_eq!(removed.value, 10);
        assert_eq!(locks.lock_count(&w, None), 2);
        assert_eq!(locks.lock_info(&w, None, 0).unwrap().value, 30);
        assert_eq!(locks.locked_amount(&w, None, ts(50)), 50);
        assert!(matches!(
            locks.remove_lock_record(&w, None, 2),
            Err(ComplianceError::LockIndexOutOfRange { index: 2, count: 2, .. })
        ));
    }

    #[test]
    fn investor_lock_overrides_records() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        let inv = InvestorId::new("alice").unwrap();
        assert!(locks.lock_investor(inv.clone()));
        assert!(!locks.lock_investor(inv.clone()));
        assert_eq!(locks.transferable(&w, Some(&inv), None, 100, ts(5)).unwrap(), 0);
        assert!(locks.unlock_investor(&inv));
        assert_eq!(locks.transferable(&w, Some(&inv), None, 100, ts(5)).unwrap(), 100);
    }

    #[test]
    fn partition_scopes_are_separate() {
        let mut locks = LockManager::new();
        let w = wallet("w");
        let p = PartitionId::derive(ts(10), regtoken_core::Classification::Us);
        let mut rec = lock(40, Some(100));
        rec.partition = Some(p.clone());
        locks.add_manual_lock_record(&w, rec, ts(1)).unwrap();
        assert_eq!(locks.locked_amount(&w, Some(&p), ts(50)), 40);
        assert_eq!(locks.locked_amount(&w, None, ts(50)), 0);
        assert_eq!(locks.lock_count(&w, Some(&p)), 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For fixed records, transferable never decreases as time advances.
        #[test]
        fn transferable_is_monotonic_in_time(
            locks in proptest::collection::vec((1u64..1_000, proptest::option::of(2u64..10_000)), 0..8),
            balance in 0u64..5_000,
            t1 in 1u64..20_000,
            t2 in 1u64..20_000,
        ) {
            let mut mgr = LockManager::new();
            let w = WalletAddress::new("w").unwrap();
            for (value, release) in locks {
                let record = LockRecord {
                    value,
                    reason_code: 0,
                    reason: String::new(),
                    release_time: release.map(Timestamp::from_epoch_secs),
                    partition: None,
                };
                mgr.add_manual_lock_record(&w, record, Timestamp::from_epoch_secs(1)).unwrap();
            }
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let a = mgr.transferable(&w, None, None, balance, Timestamp::from_epoch_secs(lo)).unwrap();
            let b = mgr.transferable(&w, None, None, balance, Timestamp::from_epoch_secs(hi)).unwrap();
            prop_assert!(a <= b);
        }
    }
}
