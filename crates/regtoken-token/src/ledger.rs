//! # Token Ledger
//!
//! Wallet balances, per-partition balances and total supply.
//!
//! For partitioned tokens every movement names its partitions and the
//! wallet balance always equals the sum of its partition balances. Zero
//! entries are removed, so a partition drained to zero leaves the wallet's
//! active set.

use std::collections::BTreeMap;

use regtoken_compliance::LedgerView;
use regtoken_core::{Amount, PartitionId, ValidationError, WalletAddress};

/// Balances of one token.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    balances: BTreeMap<WalletAddress, Amount>,
    partitions: BTreeMap<WalletAddress, BTreeMap<PartitionId, Amount>>,
    total_issued: Amount,
    paused: bool,
}

fn overflow(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        value: "overflow".to_string(),
        reason: "exceeds the largest representable amount".to_string(),
    }
}

fn short(wallet: &WalletAddress, have: Amount, need: Amount) -> ValidationError {
    ValidationError::OutOfRange {
        field: format!("balance of {wallet}"),
        value: have.to_string(),
        reason: format!("cannot debit {need}"),
    }
}

impl TokenLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause flag, returning the previous value.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        std::mem::replace(&mut self.paused, paused)
    }

    /// Wallets with a positive balance.
    pub fn holders(&self) -> impl Iterator<Item = (&WalletAddress, Amount)> + '_ {
        self.balances.iter().map(|(w, v)| (w, *v))
    }

    /// Create `value` new tokens in `wallet`.
    ///
    /// # Errors
    ///
    /// Fails on supply or balance overflow. Nothing changes in that case.
    pub fn mint(
        &mut self,
        wallet: &WalletAddress,
        value: Amount,
        partition: Option<&PartitionId>,
    ) -> Result<(), ValidationError> {
        let total = self
            .total_issued
            .checked_add(value)
            .ok_or_else(|| overflow("total issued"))?;
        self.credit(wallet, value, partition)?;
        self.total_issued = total;
        Ok(())
    }

    /// Destroy tokens drawn from `plan` (or from the wallet balance for
    /// plain tokens).
    ///
    /// # Errors
    ///
    /// Fails if the wallet or a partition cannot cover the amount.
    pub fn burn(
        &mut self,
        wallet: &WalletAddress,
        value: Amount,
        plan: Option<&[(PartitionId, Amount)]>,
    ) -> Result<(), ValidationError> {
        self.debit(wallet, value, plan)?;
        self.total_issued = self.total_issued.saturating_sub(value);
        Ok(())
    }

    /// Move tokens between wallets. Partition plans are applied leg by leg
    /// and keep their partition on the receiving side.
    ///
    /// # Errors
    ///
    /// Fails if the sender cannot cover the plan. Nothing changes in that
    /// case.
    pub fn transfer(
        &mut self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Amount,
        plan: Option<&[(PartitionId, Amount)]>,
    ) -> Result<(), ValidationError> {
        if from == to {
            return Ok(());
        }
        let receiver = self.balance_of(to);
        if receiver.checked_add(value).is_none() {
            return Err(overflow("receiver balance"));
        }
        self.debit(from, value, plan)?;
        match plan {
            Some(legs) => {
                for (partition, amount) in legs {
                    self.credit(to, *amount, Some(partition))?;
                }
            }
            None => self.credit(to, value, None)?,
        }
        Ok(())
    }

    fn credit(
        &mut self,
        wallet: &WalletAddress,
        value: Amount,
        partition: Option<&PartitionId>,
    ) -> Result<(), ValidationError> {
        if value == 0 {
            return Ok(());
        }
        let balance = self
            .balance_of(wallet)
            .checked_add(value)
            .ok_or_else(|| overflow("wallet balance"))?;
        if let Some(partition) = partition {
            let slot = self
                .partitions
                .entry(wallet.clone())
                .or_default()
                .entry(partition.clone())
                .or_default();
            *slot = slot.saturating_add(value);
        }
        self.balances.insert(wallet.clone(), balance);
        Ok(())
    }

    fn debit(
        &mut self,
        wallet: &WalletAddress,
        value: Amount,
        plan: Option<&[(PartitionId, Amount)]>,
    ) -> Result<(), ValidationError> {
        let balance = self.balance_of(wallet);
        if balance < value {
            return Err(short(wallet, balance, value));
        }
        if let Some(legs) = plan {
            let planned = legs
                .iter()
                .try_fold(0u64, |acc, (_, a)| acc.checked_add(*a))
                .ok_or_else(|| overflow("partition plan"))?;
            if planned != value {
                return Err(ValidationError::OutOfRange {
                    field: "partition plan".to_string(),
                    value: planned.to_string(),
                    reason: format!("must sum to {value}"),
                });
            }
            for (partition, amount) in legs {
                let have = self.balance_of_partition(wallet, partition);
                if have < *amount {
                    return Err(short(wallet, have, *amount));
                }
            }
            if let Some(buckets) = self.partitions.get_mut(wallet) {
                for (partition, amount) in legs {
                    if let Some(slot) = buckets.get_mut(partition) {
                        *slot -= amount;
                        if *slot == 0 {
                            buckets.remove(partition);
                        }
                    }
                }
                if buckets.is_empty() {
                    self.partitions.remove(wallet);
                }
            }
        }
        let remaining = balance - value;
        if remaining == 0 {
            self.balances.remove(wallet);
        } else {
            self.balances.insert(wallet.clone(), remaining);
        }
        Ok(())
    }
}

impl LedgerView for TokenLedger {
    fn balance_of(&self, wallet: &WalletAddress) -> Amount {
        self.balances.get(wallet).copied().unwrap_or(0)
    }

    fn balance_of_partition(&self, wallet: &WalletAddress, partition: &PartitionId) -> Amount {
        self.partitions
            .get(wallet)
            .and_then(|b| b.get(partition))
            .copied()
            .unwrap_or(0)
    }

    fn partitions_of(&self, wallet: &WalletAddress) -> Vec<PartitionId> {
        self.partitions
            .get(wallet)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn total_issued(&self) -> Amount {
        self.total_issued
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regtoken_core::{Classification, Timestamp};

    fn w(s: &str) -> WalletAddress {
        WalletAddress::new(s).unwrap()
    }

    fn p(secs: u64) -> PartitionId {
        PartitionId::derive(Timestamp::from_epoch_secs(secs), Classification::Us)
    }

    #[test]
    fn mint_transfer_burn_plain() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&w("a"), 100, None).unwrap();
        ledger.transfer(&w("a"), &w("b"), 40, None).unwrap();
        assert_eq!(ledger.balance_of(&w("a")), 60);
        assert_eq!(ledger.balance_of(&w("b")), 40);
        ledger.burn(&w("b"), 40, None).unwrap();
        assert_eq!(ledger.total_issued(), 60);
        assert_eq!(ledger.holders().count(), 1);
    }

    #[test]
    fn short_debit_changes_nothing() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&w("a"), 10, None).unwrap();
        assert!(ledger.transfer(&w("a"), &w("b"), 11, None).is_err());
        assert_eq!(ledger.balance_of(&w("a")), 10);
        assert_eq!(ledger.balance_of(&w("b")), 0);
    }

    #[test]
    fn partitions_move_with_tokens_and_drop_at_zero() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&w("a"), 30, Some(&p(1))).unwrap();
        ledger.mint(&w("a"), 50, Some(&p(2))).unwrap();
        let plan = vec![(p(1), 30), (p(2), 10)];
        ledger.transfer(&w("a"), &w("b"), 40, Some(&plan)).unwrap();
        assert_eq!(ledger.partitions_of(&w("a")), vec![p(2)]);
        assert_eq!(ledger.balance_of_partition(&w("a"), &p(2)), 40);
        assert_eq!(ledger.balance_of_partition(&w("b"), &p(1)), 30);
        assert_eq!(ledger.balance_of(&w("b")), 40);
    }

    #[test]
    fn plan_must_match_value() {
        let mut ledger = TokenLedger::new();
        ledger.mint(&w("a"), 30, Some(&p(1))).unwrap();
        let plan = vec![(p(1), 20)];
        assert!(ledger.transfer(&w("a"), &w("b"), 30, Some(&plan)).is_err());
        assert_eq!(ledger.balance_of(&w("a")), 30);
    }

    #[test]
    fn pause_flag_round_trips() {
        let mut ledger = TokenLedger::new();
        assert!(!ledger.set_paused(true));
        assert!(ledger.is_paused());
    }
}
