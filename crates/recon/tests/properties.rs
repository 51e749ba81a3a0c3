// Property-based tests for reconciliation.
// CI: 128 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use drg_recon::parser::{ParsedRow, RowResult};
use drg_recon::{ImportMode, MemberKey, MemberSnapshot, MemoryStore, Rank, Reconciler, RosterRead};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Keys come from a small pool so imports overlap and repeat.
fn arb_snapshot() -> impl Strategy<Value = MemberSnapshot> {
    (0u8..8, 0usize..5, 0u32..60, 0u64..5_000_000).prop_map(|(k, rank, level, power)| MemberSnapshot {
        key: MemberKey::new(&format!("m{k}")).unwrap(),
        display_name: format!("Member {k}"),
        rank: Rank::ALL[rank],
        level,
        power,
    })
}

fn arb_import() -> impl Strategy<Value = Vec<MemberSnapshot>> {
    prop::collection::vec(arb_snapshot(), 0..12)
}

fn arb_mode() -> impl Strategy<Value = ImportMode> {
    prop_oneof![Just(ImportMode::Merge), Just(ImportMode::Authoritative)]
}

fn rows(import: &[MemberSnapshot]) -> Vec<RowResult> {
    import
        .iter()
        .enumerate()
        .map(|(i, snapshot)| {
            Ok(ParsedRow {
                line: i as u64 + 1,
                snapshot: snapshot.clone(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn authoritative_reconcile_is_idempotent(
        history in prop::collection::vec((arb_import(), arb_mode()), 0..4),
        last in arb_import(),
    ) {
        let store = MemoryStore::new();
        let engine = Reconciler::new(&store);
        for (import, mode) in &history {
            engine.reconcile(rows(import), *mode).unwrap();
        }

        engine.reconcile(rows(&last), ImportMode::Authoritative).unwrap();
        let once = store.list_all().unwrap();
        let second = engine.reconcile(rows(&last), ImportMode::Authoritative).unwrap();

        prop_assert_eq!(second.inserted, 0);
        prop_assert_eq!(second.deleted, 0);
        prop_assert_eq!(second.updated, second.unchanged);
        prop_assert!(second.changes.iter().all(|c| c.level_delta == 0 && c.power_delta == 0));
        prop_assert_eq!(store.list_all().unwrap(), once);
    }

    #[test]
    fn keys_stay_unique_and_baselines_fixed(
        imports in prop::collection::vec((arb_import(), arb_mode()), 1..6),
    ) {
        let store = MemoryStore::new();
        let engine = Reconciler::new(&store);
        // key -> (level_start, power_start) as first observed
        let mut baselines: BTreeMap<MemberKey, (u32, u64)> = BTreeMap::new();

        for (import, mode) in &imports {
            let present: HashSet<&MemberKey> = import.iter().map(|s| &s.key).collect();
            if *mode == ImportMode::Authoritative {
                baselines.retain(|k, _| present.contains(k));
            }
            // a key new to the roster is created from its last row in the import
            let mut winners: BTreeMap<&MemberKey, &MemberSnapshot> = BTreeMap::new();
            for s in import {
                winners.insert(&s.key, s);
            }
            for (k, s) in winners {
                baselines.entry(k.clone()).or_insert((s.level, s.power));
            }

            engine.reconcile(rows(import), *mode).unwrap();

            let all = store.list_all().unwrap();
            let keys: HashSet<&MemberKey> = all.iter().map(|r| r.key()).collect();
            prop_assert_eq!(keys.len(), all.len());
            prop_assert_eq!(all.len(), baselines.len());

            for r in &all {
                let expected = baselines.get(r.key()).copied();
                prop_assert_eq!(Some((r.level_start(), r.power_start())), expected);
            }
        }
    }

    #[test]
    fn last_row_for_a_key_wins(import in arb_import()) {
        let store = MemoryStore::new();
        Reconciler::new(&store).reconcile(rows(&import), ImportMode::Merge).unwrap();

        let mut last: BTreeMap<&MemberKey, &MemberSnapshot> = BTreeMap::new();
        for s in &import {
            last.insert(&s.key, s);
        }
        for (key, s) in last {
            let r = store.get(key).unwrap();
            prop_assert_eq!(r.level_current(), s.level);
            prop_assert_eq!(r.power_current(), s.power);
            prop_assert_eq!(r.rank(), s.rank);
        }
    }
}
