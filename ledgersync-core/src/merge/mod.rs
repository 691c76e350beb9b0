//! Merge Engine: deterministic, non-destructive reconciliation of two
//! snapshots.
//!
//! No entity present on either side is ever dropped. Merging performs no I/O
//! and depends only on its inputs.

pub mod conflict;
pub mod strategy;

pub use conflict::{ConflictResolver, Resolution};
pub use strategy::{merge_by_id, merge_emergency_fund, merge_fieldwise, ProfileMergePolicy};

use crate::snapshot::Snapshot;

/// Result of merging a remote snapshot into the local one.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub snapshot: Snapshot,
    /// One line per addition or update, in the order they were applied.
    pub change_log: Vec<String>,
}

impl MergeOutcome {
    pub fn has_changes(&self) -> bool {
        !self.change_log.is_empty()
    }
}

/// Merge `remote` into `local`.
pub fn merge_snapshots(
    local: &Snapshot,
    remote: &Snapshot,
    profile_policy: ProfileMergePolicy,
) -> MergeOutcome {
    let mut change_log = Vec::new();

    let transactions = merge_by_id(&local.transactions, &remote.transactions, &mut change_log);
    let budgets = merge_by_id(&local.budgets, &remote.budgets, &mut change_log);
    let goals = merge_by_id(&local.goals, &remote.goals, &mut change_log);
    let debt_accounts = merge_by_id(&local.debt_accounts, &remote.debt_accounts, &mut change_log);
    let credit_accounts =
        merge_by_id(&local.credit_accounts, &remote.credit_accounts, &mut change_log);
    let categories = merge_by_id(&local.categories, &remote.categories, &mut change_log);

    let emergency_fund =
        merge_emergency_fund(local.emergency_fund, remote.emergency_fund, &mut change_log);
    let user_profile = merge_fieldwise(
        local.user_profile.as_ref(),
        remote.user_profile.as_ref(),
        profile_policy,
        &mut change_log,
    );

    MergeOutcome {
        snapshot: Snapshot {
            user_profile,
            transactions,
            budgets,
            goals,
            debt_accounts,
            credit_accounts,
            categories,
            emergency_fund,
            exported_at: local.exported_at.max(remote.exported_at),
        },
        change_log,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Category, SyncEntity, TimeValue, Transaction};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::{json, Map};
    use std::collections::HashSet;

    fn tx(id: &str, amount: f64, last_modified: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount: Some(amount),
            description: String::new(),
            category: None,
            transaction_type: None,
            date: None,
            created_at: None,
            last_modified: Some(last_modified),
            extra: Map::new(),
        }
    }

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            user_profile: None,
            transactions: Vec::new(),
            budgets: Vec::new(),
            goals: Vec::new(),
            debt_accounts: Vec::new(),
            credit_accounts: Vec::new(),
            categories: Vec::new(),
            emergency_fund: 0.0,
            exported_at: 0,
        }
    }

    fn random_snapshot(rng: &mut StdRng) -> Snapshot {
        let mut snapshot = empty_snapshot();
        let count = rng.gen_range(0..8);
        let mut used = HashSet::new();
        for _ in 0..count {
            let id = format!("t{}", rng.gen_range(0..10));
            if used.insert(id.clone()) {
                let amount = f64::from(rng.gen_range(1..500_i32));
                snapshot.transactions.push(tx(&id, amount, rng.gen_range(0..5)));
            }
        }
        let mut used_categories = HashSet::new();
        for _ in 0..rng.gen_range(0..3) {
            let id = format!("c{}", rng.gen_range(0..4));
            if !used_categories.insert(id.clone()) {
                continue;
            }
            snapshot.categories.push(Category {
                id,
                name: "Custom".to_string(),
                category_type: None,
                is_default: false,
                created_at: Some(TimeValue::from(rng.gen_range(0..5_i64))),
                last_modified: None,
                extra: Map::new(),
            });
        }
        snapshot.emergency_fund = f64::from(rng.gen_range(0..1000_i32));
        snapshot.exported_at = rng.gen_range(0..10_000);
        if rng.gen_bool(0.5) {
            snapshot.user_profile = Some(
                serde_json::from_value(json!({
                    "currency": if rng.gen_bool(0.5) { "EUR" } else { "USD" },
                    "lastModified": rng.gen_range(0..100),
                }))
                .unwrap(),
            );
        }
        snapshot
    }

    #[test]
    fn scenario_a_update_and_add() {
        let mut local = empty_snapshot();
        local.transactions = vec![tx("t1", 50.0, 100)];
        let mut remote = empty_snapshot();
        remote.transactions = vec![tx("t1", 75.0, 200), tx("t2", 10.0, 50)];

        let outcome = merge_snapshots(&local, &remote, ProfileMergePolicy::RemoteWins);

        assert_eq!(
            outcome.snapshot.transactions,
            vec![tx("t1", 75.0, 200), tx("t2", 10.0, 50)]
        );
        let updated = outcome
            .change_log
            .iter()
            .filter(|line| line.starts_with("Updated transaction"))
            .count();
        let added = outcome
            .change_log
            .iter()
            .filter(|line| line.starts_with("Added transaction"))
            .count();
        assert_eq!((updated, added), (1, 1));
    }

    #[test]
    fn union_preserves_every_id() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let local = random_snapshot(&mut rng);
            let remote = random_snapshot(&mut rng);
            let merged = merge_snapshots(&local, &remote, ProfileMergePolicy::RemoteWins).snapshot;

            let merged_ids: HashSet<&str> =
                merged.transactions.iter().map(|t| t.id.as_str()).collect();
            for t in local.transactions.iter().chain(remote.transactions.iter()) {
                assert!(merged_ids.contains(t.id.as_str()), "dropped {}", t.id);
            }
            let merged_categories: HashSet<&str> =
                merged.categories.iter().map(|c| c.id.as_str()).collect();
            for c in local.categories.iter().chain(remote.categories.iter()) {
                assert!(merged_categories.contains(c.id.as_str()));
            }
        }
    }

    #[test]
    fn merging_with_itself_is_identity() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let snapshot = random_snapshot(&mut rng);
            for policy in [ProfileMergePolicy::RemoteWins, ProfileMergePolicy::NewestWins] {
                let outcome = merge_snapshots(&snapshot, &snapshot, policy);
                assert_eq!(outcome.snapshot, snapshot);
                assert!(!outcome.has_changes());
            }
        }
    }

    #[test]
    fn timestamps_decide_each_entity() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..200 {
            let local = random_snapshot(&mut rng);
            let remote = random_snapshot(&mut rng);
            let merged = merge_snapshots(&local, &remote, ProfileMergePolicy::RemoteWins).snapshot;

            for l in &local.transactions {
                let Some(r) = remote.transactions.iter().find(|r| r.id == l.id) else {
                    continue;
                };
                let m = merged.transactions.iter().find(|m| m.id == l.id).unwrap();
                if r.resolved_timestamp() > l.resolved_timestamp() {
                    assert_eq!(m, r);
                } else {
                    assert_eq!(m, l);
                }
            }
        }
    }

    #[test]
    fn emergency_fund_is_maximum() {
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..100 {
            let local = random_snapshot(&mut rng);
            let remote = random_snapshot(&mut rng);
            let merged = merge_snapshots(&local, &remote, ProfileMergePolicy::RemoteWins).snapshot;
            assert_eq!(
                merged.emergency_fund,
                local.emergency_fund.max(remote.emergency_fund)
            );
        }
    }

    #[test]
    fn exported_at_is_latest_of_inputs() {
        let mut local = empty_snapshot();
        local.exported_at = 10;
        let mut remote = empty_snapshot();
        remote.exported_at = 20;
        let outcome = merge_snapshots(&local, &remote, ProfileMergePolicy::RemoteWins);
        assert_eq!(outcome.snapshot.exported_at, 20);
    }
}
