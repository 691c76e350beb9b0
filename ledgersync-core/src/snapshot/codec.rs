//! Building snapshots from local collections and parsing them back.

use crate::snapshot::models::{
    Budget, Category, CreditAccount, DebtAccount, Goal, Snapshot, Transaction, UserProfile,
};
use crate::snapshot::SnapshotError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level keys every snapshot must carry. The remaining collections were
/// added later and default to empty.
const REQUIRED_KEYS: [&str; 4] = ["transactions", "budgets", "goals", "exportedAt"];

/// The local working set as the local store exposes it.
///
/// Unlike [`Snapshot`], `categories` here includes built-in categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalCollections {
    pub user_profile: Option<UserProfile>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
    pub goals: Vec<Goal>,
    pub debt_accounts: Vec<DebtAccount>,
    pub credit_accounts: Vec<CreditAccount>,
    pub categories: Vec<Category>,
    pub emergency_fund: f64,
}

/// Assemble a snapshot from the local collections.
///
/// Built-in categories are left out; every device derives its own.
pub fn build_snapshot(local: &LocalCollections, exported_at: i64) -> Snapshot {
    Snapshot {
        user_profile: local.user_profile.clone(),
        transactions: local.transactions.clone(),
        budgets: local.budgets.clone(),
        goals: local.goals.clone(),
        debt_accounts: local.debt_accounts.clone(),
        credit_accounts: local.credit_accounts.clone(),
        categories: local
            .categories
            .iter()
            .filter(|category| !category.is_default)
            .cloned()
            .collect(),
        emergency_fund: local.emergency_fund,
        exported_at,
    }
}

/// Split a snapshot back into local collections.
///
/// `builtin_categories` are the receiving device's own defaults; they are
/// placed first and any snapshot category sharing an id is skipped.
pub fn split_snapshot(snapshot: Snapshot, builtin_categories: &[Category]) -> LocalCollections {
    let mut categories: Vec<Category> = builtin_categories
        .iter()
        .filter(|category| category.is_default)
        .cloned()
        .collect();
    for category in snapshot.categories {
        if !categories.iter().any(|existing| existing.id == category.id) {
            categories.push(category);
        }
    }

    LocalCollections {
        user_profile: snapshot.user_profile,
        transactions: snapshot.transactions,
        budgets: snapshot.budgets,
        goals: snapshot.goals,
        debt_accounts: snapshot.debt_accounts,
        credit_accounts: snapshot.credit_accounts,
        categories,
        emergency_fund: snapshot.emergency_fund,
    }
}

/// Serialize a snapshot to JSON bytes.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, SnapshotError> {
    serde_json::to_vec(snapshot).map_err(|e| SnapshotError::Serialization(e.to_string()))
}

/// Parse decrypted JSON into a snapshot.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| SnapshotError::InvalidJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| SnapshotError::InvalidShape("top level is not an object".to_string()))?;

    if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
        return Err(SnapshotError::MissingKey(*missing));
    }

    serde_json::from_value(value).map_err(|e| SnapshotError::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SyncEntity;
    use serde_json::{json, Map};

    fn category(id: &str, is_default: bool) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_uppercase(),
            category_type: Some("expense".to_string()),
            is_default,
            created_at: None,
            last_modified: None,
            extra: Map::new(),
        }
    }

    fn transaction(id: &str, amount: f64) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount: Some(amount),
            description: String::new(),
            category: None,
            transaction_type: None,
            date: None,
            created_at: None,
            last_modified: Some(1),
            extra: Map::new(),
        }
    }

    #[test]
    fn build_excludes_default_categories() {
        let local = LocalCollections {
            categories: vec![category("food", true), category("pets", false)],
            ..Default::default()
        };

        let snapshot = build_snapshot(&local, 1000);
        assert_eq!(snapshot.categories.len(), 1);
        assert_eq!(snapshot.categories[0].id, "pets");
        assert_eq!(snapshot.exported_at, 1000);
    }

    #[test]
    fn build_copies_every_collection() {
        let local = LocalCollections {
            transactions: vec![transaction("t1", 12.5)],
            emergency_fund: 300.0,
            ..Default::default()
        };
        let snapshot = build_snapshot(&local, 5);
        assert_eq!(snapshot.transactions, local.transactions);
        assert_eq!(snapshot.emergency_fund, 300.0);
        assert!(snapshot.user_profile.is_none());
    }

    #[test]
    fn split_restores_builtin_categories() {
        let local = LocalCollections {
            categories: vec![category("food", true), category("pets", false)],
            ..Default::default()
        };
        let snapshot = build_snapshot(&local, 1);
        let builtins = vec![category("food", true)];

        let restored = split_snapshot(snapshot, &builtins);
        let ids: Vec<&str> = restored.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["food", "pets"]);
    }

    #[test]
    fn encode_then_parse_preserves_snapshot() {
        let local = LocalCollections {
            transactions: vec![transaction("t1", 50.0)],
            categories: vec![category("pets", false)],
            emergency_fund: 10.0,
            ..Default::default()
        };
        let snapshot = build_snapshot(&local, 99);
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert_eq!(parse_snapshot(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn parse_rejects_invalid_json() {
        assert!(matches!(
            parse_snapshot(b"{not json"),
            Err(SnapshotError::InvalidJson(_))
        ));
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(matches!(
            parse_snapshot(b"[1, 2, 3]"),
            Err(SnapshotError::InvalidShape(_))
        ));
    }

    #[test]
    fn parse_reports_missing_key() {
        let bytes = serde_json::to_vec(&json!({
            "transactions": [], "budgets": [], "exportedAt": 1
        }))
        .unwrap();
        assert!(matches!(
            parse_snapshot(&bytes),
            Err(SnapshotError::MissingKey("goals"))
        ));
    }

    #[test]
    fn parse_defaults_optional_collections() {
        let bytes = serde_json::to_vec(&json!({
            "transactions": [], "budgets": [], "goals": [], "exportedAt": 1
        }))
        .unwrap();
        let snapshot = parse_snapshot(&bytes).unwrap();
        assert!(snapshot.debt_accounts.is_empty());
        assert!(snapshot.categories.is_empty());
        assert_eq!(snapshot.emergency_fund, 0.0);
        assert!(snapshot.user_profile.is_none());
    }

    #[test]
    fn parse_rejects_wrong_entity_shape() {
        let bytes = serde_json::to_vec(&json!({
            "transactions": [{ "amount": 5.0 }], "budgets": [], "goals": [], "exportedAt": 1
        }))
        .unwrap();
        assert!(matches!(
            parse_snapshot(&bytes),
            Err(SnapshotError::InvalidShape(_))
        ));
    }

    #[test]
    fn parse_accepts_sparse_entities_and_date_strings() {
        let bytes = serde_json::to_vec(&json!({
            "transactions": [
                { "id": "t1", "amount": 20.0, "createdAt": "2024-01-01T00:00:00.000Z" }
            ],
            "budgets": [{ "id": "b1", "amount": 300.0, "lastModified": 5 }],
            "goals": [{ "id": "g1" }],
            "creditAccounts": [{ "id": "c1", "balance": 12.0 }],
            "categories": [{ "id": "pets" }],
            "exportedAt": 1
        }))
        .unwrap();

        let snapshot = parse_snapshot(&bytes).unwrap();
        assert_eq!(
            snapshot.transactions[0].resolved_timestamp(),
            1_704_067_200_000
        );
        assert_eq!(snapshot.budgets[0].category, "");
        assert_eq!(snapshot.credit_accounts[0].credit_limit, None);
        assert_eq!(snapshot.categories[0].name, "");

        let reparsed = parse_snapshot(&encode_snapshot(&snapshot).unwrap()).unwrap();
        assert_eq!(reparsed, snapshot);
    }
}
