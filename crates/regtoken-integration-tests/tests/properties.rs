//! # Ledger Properties
//!
//! Randomized operation sequences checked against a recount of the
//! holders: counters always match the investors that actually hold tokens,
//! partitions always sum to wallet balances, queries never mutate and
//! unlocking only ever moves forward in time.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use regtoken_compliance::{BoolParam, ComplianceConfig, LockRecord};
use regtoken_core::{
    AttributeKind, AttributeStatus, Classification, ComplianceCode, CounterDeltas,
    CounterSnapshot, CountryCode, InvestorId, Timestamp, WalletAddress,
};
use regtoken_token::{ManualClock, OmnibusTbeController, SecurityToken, TokenFeatures};

const T0: u64 = 1_700_000_000;

const COUNTRIES: [&str; 4] = ["US", "FR", "DE", "JP"];

/// Investor id, starting country, wallets.
const INVESTORS: [(&str, &str, &[&str]); 4] = [
    ("alice", "US", &["a1", "a2"]),
    ("bob", "FR", &["b1"]),
    ("carol", "JP", &["c1"]),
    ("dave", "DE", &["d1", "d2"]),
];

fn w(s: &str) -> WalletAddress {
    WalletAddress::new(s).expect("test wallet")
}

fn ts(secs: u64) -> Timestamp {
    Timestamp::from_epoch_secs(secs)
}

fn master() -> WalletAddress {
    w("master")
}

/// Two US investors `alice` (wallet `a`) and `bob` (wallet `b`).
fn us_pair(config: ComplianceConfig, features: TokenFeatures) -> SecurityToken {
    let token = SecurityToken::new("PAIR", master(), config, features)
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(ts(T0))));
    token
        .set_country_compliance(&master(), CountryCode::new("US").unwrap(), Classification::Us)
        .unwrap();
    for (id, wallet) in [("alice", "a"), ("bob", "b")] {
        let investor = InvestorId::new(id).unwrap();
        token
            .register_investor(&master(), investor.clone(), id, Some(CountryCode::new("US").unwrap()))
            .unwrap();
        token.add_wallet(&master(), w(wallet), &investor).unwrap();
    }
    token
}

fn all_wallets() -> Vec<WalletAddress> {
    INVESTORS
        .iter()
        .flat_map(|(_, _, wallets)| wallets.iter().map(|s| w(s)))
        .collect()
}

fn classify(country: &str) -> Classification {
    match country {
        "US" => Classification::Us,
        "JP" => Classification::Jp,
        _ => Classification::Eu,
    }
}

/// Token plus the investor attributes the test has set.
struct Harness {
    token: SecurityToken,
    countries: BTreeMap<&'static str, &'static str>,
    accredited: BTreeMap<&'static str, bool>,
}

impl Harness {
    fn new(features: TokenFeatures) -> Self {
        let token = SecurityToken::new("PROP", master(), ComplianceConfig::default(), features)
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(ts(T0))));
        for country in COUNTRIES {
            token
                .set_country_compliance(&master(), CountryCode::new(country).unwrap(), classify(country))
                .unwrap();
        }
        let mut countries = BTreeMap::new();
        let mut accredited = BTreeMap::new();
        for (id, country, wallets) in INVESTORS {
            let investor = InvestorId::new(id).unwrap();
            token
                .register_investor(&master(), investor.clone(), id, Some(CountryCode::new(country).unwrap()))
                .unwrap();
            for wallet in wallets {
                token.add_wallet(&master(), w(wallet), &investor).unwrap();
            }
            countries.insert(id, country);
            accredited.insert(id, false);
        }
        Self {
            token,
            countries,
            accredited,
        }
    }

    fn apply(&mut self, op: &Op) {
        let wallets = all_wallets();
        match *op {
            Op::Issue { to, value, age } => {
                let _ = self
                    .token
                    .issue(&master(), &wallets[to], value, ts(T0 - age));
            }
            Op::Transfer { from, to, value } => {
                let _ = self.token.transfer(&wallets[from], &wallets[to], value);
            }
            Op::Burn { from, value } => {
                let _ = self.token.burn(&master(), &wallets[from], value, "property");
            }
            Op::Accredit { investor, approved } => {
                let (id, _, _) = INVESTORS[investor];
                let status = if approved {
                    AttributeStatus::Approved
                } else {
                    AttributeStatus::Rejected
                };
                let result = self.token.set_attribute(
                    &master(),
                    &InvestorId::new(id).unwrap(),
                    AttributeKind::Accredited,
                    status,
                    None,
                    None,
                );
                if result.is_ok() {
                    self.accredited.insert(id, approved);
                }
            }
            Op::Relocate { investor, country } => {
                let (id, _, _) = INVESTORS[investor];
                let result = self.token.set_country(
                    &master(),
                    &InvestorId::new(id).unwrap(),
                    CountryCode::new(COUNTRIES[country]).unwrap(),
                );
                if result.is_ok() {
                    self.countries.insert(id, COUNTRIES[country]);
                }
            }
        }
    }

    /// Counters rebuilt from balances and the attributes set so far.
    fn recount(&self) -> CounterSnapshot {
        let mut expected = CounterSnapshot::default();
        for (id, _, _) in INVESTORS {
            if self.token.balance_of_investor(&InvestorId::new(id).unwrap()) == 0 {
                continue;
            }
            let country = self.countries[id];
            let accredited = self.accredited[id];
            expected.total += 1;
            if accredited {
                expected.accredited += 1;
            }
            match classify(country) {
                Classification::Us => {
                    expected.us += 1;
                    if accredited {
                        expected.us_accredited += 1;
                    }
                }
                Classification::Jp => expected.jp += 1,
                Classification::Eu => {
                    *expected
                        .eu_retail
                        .entry(CountryCode::new(country).unwrap())
                        .or_default() += 1;
                }
                _ => {}
            }
        }
        expected
    }
}

#[derive(Debug, Clone)]
enum Op {
    Issue { to: usize, value: u64, age: u64 },
    Transfer { from: usize, to: usize, value: u64 },
    Burn { from: usize, value: u64 },
    Accredit { investor: usize, approved: bool },
    Relocate { investor: usize, country: usize },
}

fn op() -> impl Strategy<Value = Op> {
    let wallet = 0..6usize;
    prop_oneof![
        4 => (wallet.clone(), 1u64..500, 1u64..5).prop_map(|(to, value, age)| Op::Issue {
            to,
            value,
            age: age * 100,
        }),
        4 => (wallet.clone(), wallet.clone(), 0u64..400)
            .prop_map(|(from, to, value)| Op::Transfer { from, to, value }),
        2 => (wallet, 1u64..300).prop_map(|(from, value)| Op::Burn { from, value }),
        1 => (0..4usize, any::<bool>())
            .prop_map(|(investor, approved)| Op::Accredit { investor, approved }),
        1 => (0..4usize, 0..4usize)
            .prop_map(|(investor, country)| Op::Relocate { investor, country }),
    ]
}

proptest! {
    #[test]
    fn counters_match_holder_recount(ops in prop::collection::vec(op(), 1..60)) {
        let mut harness = Harness::new(TokenFeatures::default());
        for op in &ops {
            harness.apply(op);
            prop_assert_eq!(harness.token.counters(), harness.recount(), "after {:?}", op);
        }
    }

    #[test]
    fn partitioned_counters_match_and_partitions_conserve(
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut harness = Harness::new(TokenFeatures { partitioned: true, omnibus_tbe: false });
        for op in &ops {
            harness.apply(op);
            prop_assert_eq!(harness.token.counters(), harness.recount(), "after {:?}", op);
        }
        let mut supply = 0u64;
        for wallet in all_wallets() {
            let by_partition: u64 = harness
                .token
                .partitions_of(&wallet)
                .iter()
                .map(|p| harness.token.balance_of_by_partition(&wallet, p))
                .sum();
            prop_assert_eq!(by_partition, harness.token.balance_of(&wallet));
            supply += by_partition;
        }
        prop_assert_eq!(supply, harness.token.total_issued());
    }

    #[test]
    fn pre_checks_do_not_mutate(
        ops in prop::collection::vec(op(), 1..30),
        from in 0..6usize,
        to in 0..6usize,
        value in 0u64..1_000,
    ) {
        let mut harness = Harness::new(TokenFeatures::default());
        for op in &ops {
            harness.apply(op);
        }
        let wallets = all_wallets();
        let counters = harness.token.counters();
        let audit = harness.token.audit_len();
        let balances: Vec<u64> = wallets.iter().map(|w| harness.token.balance_of(w)).collect();

        let first = harness.token.pre_transfer_check(&wallets[from], &wallets[to], value);
        let _ = harness.token.pre_issuance_check(&wallets[to], value);
        let second = harness.token.pre_transfer_check(&wallets[from], &wallets[to], value);

        prop_assert_eq!(first, second);
        prop_assert_eq!(harness.token.counters(), counters);
        prop_assert_eq!(harness.token.audit_len(), audit);
        let after: Vec<u64> = wallets.iter().map(|w| harness.token.balance_of(w)).collect();
        prop_assert_eq!(after, balances);
    }

    #[test]
    fn hold_up_release_is_monotonic(
        period in 1u64..10_000,
        issued_ago in 0u64..20_000,
        a in 0u64..30_000,
        b in 0u64..30_000,
    ) {
        let token = us_pair(
            ComplianceConfig { us_lock_period: period, ..ComplianceConfig::default() },
            TokenFeatures::default(),
        );
        token.issue(&master(), &w("a"), 100, ts(T0 - issued_ago)).unwrap();

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let at = |offset: u64| {
            token
                .pre_transfer_check_at(&w("a"), &w("b"), 100, ts(T0 + offset))
                .unwrap()
        };
        if at(lo) == ComplianceCode::Valid {
            prop_assert_eq!(at(hi), ComplianceCode::Valid);
        }
    }

    #[test]
    fn timed_locks_only_release(
        release_in in 1u64..10_000,
        a in 0u64..20_000,
        b in 0u64..20_000,
    ) {
        let token = SecurityToken::new("LOCK", master(), ComplianceConfig::default(), TokenFeatures::default())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(ts(T0))));
        let investor = InvestorId::new("alice").unwrap();
        token.register_investor(&master(), investor.clone(), "alice", None).unwrap();
        token.add_wallet(&master(), w("a"), &investor).unwrap();
        token.issue(&master(), &w("a"), 100, ts(T0)).unwrap();
        token
            .add_manual_lock_record(
                &master(),
                &w("a"),
                LockRecord {
                    value: 60,
                    reason_code: 1,
                    reason: "vesting".to_string(),
                    release_time: Some(ts(T0 + release_in)),
                    partition: None,
                },
            )
            .unwrap();

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let early = token.transferable_tokens(&w("a"), ts(T0 + lo)).unwrap();
        let late = token.transferable_tokens(&w("a"), ts(T0 + hi)).unwrap();
        prop_assert!(early <= late);
        prop_assert!(early >= 40);
    }

    #[test]
    fn omnibus_issue_then_burn_restores_counters(
        value in 1u64..10_000,
        total in 0i64..20,
        accredited_share in 0i64..20,
        eu in 0i64..10,
    ) {
        let token = SecurityToken::new(
            "OMNI",
            master(),
            ComplianceConfig::default(),
            TokenFeatures { partitioned: false, omnibus_tbe: true },
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(ts(T0))));
        token.add_omnibus_tbe_wallet(&master(), w("tbe")).unwrap();
        let omnibus = OmnibusTbeController::new(token.clone(), w("tbe")).unwrap();
        let deltas = CounterDeltas {
            total,
            accredited: accredited_share.min(total),
            eu_retail_countries: vec![CountryCode::new("FR").unwrap()],
            eu_retail_deltas: vec![eu],
            ..CounterDeltas::default()
        };
        let before = token.counters();

        omnibus.bulk_issuance(&master(), value, ts(T0), &deltas).unwrap();
        omnibus.bulk_burn(&master(), value, &deltas).unwrap();

        prop_assert_eq!(token.counters(), before);
        prop_assert_eq!(token.total_issued(), 0);
        prop_assert_eq!(token.balance_of(&w("tbe")), 0);
    }

    #[test]
    fn explicit_partition_transfer_conserves(
        issued in prop::collection::vec(1u64..1_000, 1..5),
        shares in prop::collection::vec(0u64..=100, 5),
    ) {
        let token = us_pair(
            ComplianceConfig::default(),
            TokenFeatures { partitioned: true, omnibus_tbe: false },
        );
        let mut drawn = Vec::new();
        for (i, value) in issued.iter().enumerate() {
            let age = 1_000 * (i as u64 + 1);
            let partition = token
                .issue(&master(), &w("a"), *value, ts(T0 - age))
                .unwrap()
                .partition
                .unwrap();
            let take = value * shares[i] / 100;
            if take > 0 {
                drawn.push((partition, take, take == *value));
            }
        }
        prop_assume!(!drawn.is_empty());
        let partitions: Vec<_> = drawn.iter().map(|(p, _, _)| p.clone()).collect();
        let amounts: Vec<u64> = drawn.iter().map(|(_, a, _)| *a).collect();
        let total: u64 = amounts.iter().sum();

        token.transfer_by_partitions(&w("a"), &w("b"), &partitions, &amounts).unwrap();

        let received: u64 = partitions
            .iter()
            .map(|p| token.balance_of_by_partition(&w("b"), p))
            .sum();
        prop_assert_eq!(received, total);
        let remaining = token.partitions_of(&w("a"));
        for (partition, _, drained) in &drawn {
            prop_assert_eq!(remaining.contains(partition), !drained);
        }
    }

    #[test]
    fn full_transfer_exemption(balance in 2u64..10_000, partial in 1u64..10_000) {
        prop_assume!(partial < balance);
        let token = us_pair(ComplianceConfig::default(), TokenFeatures::default());
        token.set_flag(&master(), BoolParam::ForceFullTransfer, true).unwrap();
        token.issue(&master(), &w("a"), balance, ts(T0)).unwrap();

        prop_assert_eq!(
            token.pre_transfer_check(&w("a"), &w("b"), partial),
            ComplianceCode::OnlyFullTransfer
        );
        prop_assert_eq!(
            token.pre_transfer_check(&w("a"), &w("b"), balance),
            ComplianceCode::Valid
        );

        // The flag binds US senders only.
        let fr = CountryCode::new("FR").unwrap();
        token
            .set_country_compliance(&master(), fr.clone(), Classification::Eu)
            .unwrap();
        let eve = InvestorId::new("eve").unwrap();
        token.register_investor(&master(), eve.clone(), "eve", Some(fr)).unwrap();
        token.add_wallet(&master(), w("e"), &eve).unwrap();
        token.issue(&master(), &w("e"), balance, ts(T0)).unwrap();
        prop_assert_eq!(
            token.pre_transfer_check(&w("e"), &w("b"), partial),
            ComplianceCode::Valid
        );
    }
}
