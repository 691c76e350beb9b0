//! Synced entity types and the snapshot bundle.
//!
//! Field names follow the JSON wire format (camelCase). Fields this crate
//! does not model are kept in `extra` so a newer client's data survives a
//! merge on an older one.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of syncable entity, used for change-log wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Budget,
    Goal,
    DebtAccount,
    CreditAccount,
    Category,
}

impl EntityKind {
    /// Human-readable label used in change-log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Budget => "budget",
            Self::Goal => "goal",
            Self::DebtAccount => "debt account",
            Self::CreditAccount => "credit account",
            Self::Category => "category",
        }
    }
}

/// A record in one of the mutable collections.
pub trait SyncEntity: Clone {
    const KIND: EntityKind;

    /// Identifier, unique within the collection.
    fn id(&self) -> &str;

    /// Modification time used for last-writer-wins, in epoch millis.
    ///
    /// Falls back to kind-specific secondary fields and finally to 0.
    fn resolved_timestamp(&self) -> i64;

    /// Short description for change-log lines.
    fn describe(&self) -> String;
}

fn first_timestamp(candidates: &[Option<i64>]) -> i64 {
    candidates.iter().flatten().copied().next().unwrap_or(0)
}

fn label_or_id<'a>(label: &'a str, id: &'a str) -> &'a str {
    if label.is_empty() {
        id
    } else {
        label
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date into epoch millis.
pub(crate) fn parse_date_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp_millis())
}

/// A time field that clients write either as epoch millis or as a date string.
///
/// The original representation is kept so re-encoding does not rewrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl TimeValue {
    /// Epoch millis, or `None` when a string does not parse as a date.
    pub fn millis(&self) -> Option<i64> {
        match self {
            Self::Millis(millis) => Some(*millis),
            Self::Fractional(millis) if millis.is_finite() => Some(millis.trunc() as i64),
            Self::Fractional(_) => None,
            Self::Text(raw) => parse_date_millis(raw),
        }
    }
}

impl From<i64> for TimeValue {
    fn from(millis: i64) -> Self {
        Self::Millis(millis)
    }
}

fn created_millis(created_at: &Option<TimeValue>) -> Option<i64> {
    created_at.as_ref().and_then(TimeValue::millis)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// `income` or `expense`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        let date = self.date.as_deref().and_then(parse_date_millis);
        first_timestamp(&[self.last_modified, created_millis(&self.created_at), date])
    }

    fn describe(&self) -> String {
        let label = label_or_id(&self.description, &self.id);
        match self.amount {
            Some(amount) => format!("{} ({:.2})", label, amount),
            None => label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for Budget {
    const KIND: EntityKind = EntityKind::Budget;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        first_timestamp(&[self.last_modified, created_millis(&self.created_at)])
    }

    fn describe(&self) -> String {
        label_or_id(&self.category, &self.id).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for Goal {
    const KIND: EntityKind = EntityKind::Goal;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        first_timestamp(&[self.last_modified, created_millis(&self.created_at)])
    }

    fn describe(&self) -> String {
        label_or_id(&self.name, &self.id).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_payment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for DebtAccount {
    const KIND: EntityKind = EntityKind::DebtAccount;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        first_timestamp(&[self.last_modified, created_millis(&self.created_at)])
    }

    fn describe(&self) -> String {
        label_or_id(&self.name, &self.id).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for CreditAccount {
    const KIND: EntityKind = EntityKind::CreditAccount;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        first_timestamp(&[self.last_modified, created_millis(&self.created_at)])
    }

    fn describe(&self) -> String {
        label_or_id(&self.name, &self.id).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// `income` or `expense`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub category_type: Option<String>,
    /// Built-in categories are re-derived on every device and never synced.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncEntity for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn id(&self) -> &str {
        &self.id
    }

    fn resolved_timestamp(&self) -> i64 {
        first_timestamp(&[self.last_modified, created_millis(&self.created_at)])
    }

    fn describe(&self) -> String {
        label_or_id(&self.name, &self.id).to_string()
    }
}

/// User settings record, merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile {
    pub fields: Map<String, Value>,
}

impl UserProfile {
    pub const LAST_MODIFIED: &'static str = "lastModified";

    pub fn last_modified(&self) -> i64 {
        self.fields
            .get(Self::LAST_MODIFIED)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    pub fn set_last_modified(&mut self, millis: i64) {
        self.fields
            .insert(Self::LAST_MODIFIED.to_string(), Value::from(millis));
    }
}

/// The complete synced state of one device at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub debt_accounts: Vec<DebtAccount>,
    #[serde(default)]
    pub credit_accounts: Vec<CreditAccount>,
    /// User-created categories only.
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub emergency_fund: f64,
    /// Epoch millis at which the snapshot was built.
    pub exported_at: i64,
}

impl Snapshot {
    /// Total number of entities across all collections.
    pub fn entity_count(&self) -> usize {
        self.transactions.len()
            + self.budgets.len()
            + self.goals.len()
            + self.debt_accounts.len()
            + self.credit_accounts.len()
            + self.categories.len()
    }

    /// Equal in everything but `exported_at`.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.user_profile == other.user_profile
            && self.transactions == other.transactions
            && self.budgets == other.budgets
            && self.goals == other.goals
            && self.debt_accounts == other.debt_accounts
            && self.credit_accounts == other.credit_accounts
            && self.categories == other.categories
            && self.emergency_fund == other.emergency_fund
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_timestamp_prefers_last_modified() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "amount": 5.0, "createdAt": 10, "lastModified": 20, "date": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(tx.resolved_timestamp(), 20);
    }

    #[test]
    fn transaction_timestamp_falls_back_to_created_then_date() {
        let created: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "amount": 5.0, "createdAt": 10, "date": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(created.resolved_timestamp(), 10);

        let dated: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "amount": 5.0, "date": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(dated.resolved_timestamp(), 1_704_067_200_000);

        let bare: Transaction =
            serde_json::from_value(serde_json::json!({ "id": "t1", "amount": 5.0 })).unwrap();
        assert_eq!(bare.resolved_timestamp(), 0);
    }

    #[test]
    fn parse_date_accepts_rfc3339() {
        assert_eq!(
            parse_date_millis("2024-01-01T00:00:01Z"),
            Some(1_704_067_201_000)
        );
        assert_eq!(parse_date_millis("yesterday"), None);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let json = serde_json::json!({
            "id": "g1", "name": "Vacation", "targetAmount": 1000.0, "icon": "plane"
        });
        let goal: Goal = serde_json::from_value(json).unwrap();
        assert_eq!(goal.extra.get("icon"), Some(&Value::from("plane")));

        let back = serde_json::to_value(&goal).unwrap();
        assert_eq!(back["icon"], "plane");
        assert_eq!(back["targetAmount"], 1000.0);
        assert!(back.get("currentAmount").is_none());
    }

    #[test]
    fn transaction_type_uses_wire_name() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "amount": 5.0, "type": "expense"
        }))
        .unwrap();
        assert_eq!(tx.transaction_type.as_deref(), Some("expense"));
        assert!(tx.extra.is_empty());
    }

    #[test]
    fn created_at_accepts_date_strings() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "amount": 5.0, "createdAt": "2024-01-01T00:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(tx.resolved_timestamp(), 1_704_067_200_000);

        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back["createdAt"], "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn unparseable_created_at_falls_through() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "t1", "createdAt": "sometime", "date": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(tx.resolved_timestamp(), 1_704_067_200_000);
    }

    #[test]
    fn business_fields_are_optional() {
        let budget: Budget = serde_json::from_value(serde_json::json!({
            "id": "b1", "amount": 200.0, "lastModified": 7
        }))
        .unwrap();
        assert_eq!(budget.resolved_timestamp(), 7);
        assert_eq!(budget.describe(), "b1");

        let goal: Goal = serde_json::from_value(serde_json::json!({ "id": "g1" })).unwrap();
        assert_eq!(goal.target_amount, None);
        let credit: CreditAccount =
            serde_json::from_value(serde_json::json!({ "id": "c1", "createdAt": 3 })).unwrap();
        assert_eq!(credit.resolved_timestamp(), 3);
        let category: Category = serde_json::from_value(serde_json::json!({ "id": "x" })).unwrap();
        assert!(!category.is_default);

        // Absent fields stay absent when re-encoded.
        let back = serde_json::to_value(&budget).unwrap();
        assert_eq!(
            back,
            serde_json::json!({ "id": "b1", "amount": 200.0, "lastModified": 7 })
        );
    }

    #[test]
    fn profile_last_modified_defaults_to_zero() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.last_modified(), 0);
        profile.set_last_modified(42);
        assert_eq!(profile.last_modified(), 42);
    }
}
