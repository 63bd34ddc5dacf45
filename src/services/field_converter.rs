//! Field conversion
//!
//! Pure computation at the heart of a currency re-denomination: given a raw
//! document, the monetary field allow-list for its entity type, and an
//! exchange rate, produce the converted values together with a snapshot of
//! the originals. No I/O happens here, which keeps the arithmetic and its
//! guards directly testable.

use serde_json::Value;
use std::collections::BTreeMap;

/// The entity types subject to currency conversion.
///
/// `ALL` fixes the processing order of a conversion run so statistics are
/// reproducible across runs and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Course,
    Payment,
    Product,
    MonthlySubscription,
    Schedule,
    Notification,
    Income,
    Expense,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Course,
        EntityKind::Payment,
        EntityKind::Product,
        EntityKind::MonthlySubscription,
        EntityKind::Schedule,
        EntityKind::Notification,
        EntityKind::Income,
        EntityKind::Expense,
    ];

    /// Table holding this entity type's documents
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Course => "courses",
            EntityKind::Payment => "payments",
            EntityKind::Product => "products",
            EntityKind::MonthlySubscription => "monthly_subscriptions",
            EntityKind::Schedule => "schedules",
            EntityKind::Notification => "notifications",
            EntityKind::Income => "incomes",
            EntityKind::Expense => "expenses",
        }
    }

    /// Monetary fields eligible for conversion, dotted for nested fields.
    /// This table is the contract: no other field is ever touched.
    pub fn money_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Course | EntityKind::Product | EntityKind::Schedule => &["price"],
            EntityKind::Payment => &[
                "courseFee",
                "courseRegistrationFee",
                "studentRegistrationFee",
                "outstandingAmount",
                "receivedAmount",
            ],
            EntityKind::MonthlySubscription => &[
                "courseFee",
                "registrationFee",
                "originalMonthlyAmount",
                "discountedMonthlyAmount",
                "totalPaidAmount",
                "totalExpectedAmount",
                "remainingAmount",
            ],
            EntityKind::Notification => &["metadata.amount", "metadata.dueAmount"],
            EntityKind::Income | EntityKind::Expense => &["amount", "totalAmount"],
        }
    }

    /// Label persisted on history records
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Course => "Course",
            EntityKind::Payment => "Payment",
            EntityKind::Product => "Product",
            EntityKind::MonthlySubscription => "MonthlySubscription",
            EntityKind::Schedule => "Schedule",
            EntityKind::Notification => "Notification",
            EntityKind::Income => "Income",
            EntityKind::Expense => "Expense",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Paired before/after snapshot for one document.
///
/// The two maps always have identical key sets: a field is either converted
/// (and appears in both) or skipped entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChanges {
    pub original_values: BTreeMap<String, f64>,
    pub converted_values: BTreeMap<String, i64>,
}

/// Resolve a possibly-dotted field path against a document, one level deep
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        Some((parent, child)) => data.get(parent)?.get(child),
        None => data.get(path),
    }
}

/// Compute converted values for every eligible field of a document.
///
/// A field participates only if it is present, a number, and strictly
/// positive; everything else is excluded from both maps rather than zeroed.
/// Converted amounts are rounded half-away-from-zero to whole currency units.
/// Returns `None` when nothing qualifies, in which case the caller must skip
/// both the document write and the history record.
pub fn convert_fields(data: &Value, money_fields: &[&str], rate: f64) -> Option<FieldChanges> {
    let mut original_values = BTreeMap::new();
    let mut converted_values = BTreeMap::new();

    for &field in money_fields {
        let Some(value) = lookup(data, field).and_then(Value::as_f64) else {
            continue;
        };
        if value <= 0.0 {
            continue;
        }

        original_values.insert(field.to_string(), value);
        converted_values.insert(field.to_string(), (value * rate).round() as i64);
    }

    if converted_values.is_empty() {
        None
    } else {
        Some(FieldChanges {
            original_values,
            converted_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_order_is_fixed() {
        assert_eq!(
            EntityKind::ALL
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>(),
            vec![
                "Course",
                "Payment",
                "Product",
                "MonthlySubscription",
                "Schedule",
                "Notification",
                "Income",
                "Expense"
            ]
        );
    }

    #[test]
    fn test_allow_lists() {
        assert_eq!(EntityKind::Course.money_fields(), &["price"]);
        assert_eq!(EntityKind::Product.money_fields(), &["price"]);
        assert_eq!(EntityKind::Schedule.money_fields(), &["price"]);
        assert_eq!(EntityKind::Payment.money_fields().len(), 5);
        assert_eq!(EntityKind::MonthlySubscription.money_fields().len(), 7);
        assert_eq!(
            EntityKind::Notification.money_fields(),
            &["metadata.amount", "metadata.dueAmount"]
        );
        assert_eq!(
            EntityKind::Income.money_fields(),
            &["amount", "totalAmount"]
        );
        assert_eq!(EntityKind::Income.money_fields(), EntityKind::Expense.money_fields());
    }

    #[test]
    fn test_basic_conversion_rounds_to_whole_units() {
        let doc = json!({ "price": 100 });
        let changes = convert_fields(&doc, &["price"], 0.9).unwrap();

        assert_eq!(changes.original_values["price"], 100.0);
        assert_eq!(changes.converted_values["price"], 90);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let doc = json!({ "price": 5 });
        let changes = convert_fields(&doc, &["price"], 0.5).unwrap();

        // 2.5 rounds away from zero, not to even
        assert_eq!(changes.converted_values["price"], 3);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let doc = json!({ "amount": 333, "totalAmount": 77.7 });
        let first = convert_fields(&doc, &["amount", "totalAmount"], 1.1337).unwrap();
        let second = convert_fields(&doc, &["amount", "totalAmount"], 1.1337).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_and_absent_fields_are_excluded() {
        let doc = json!({ "courseFee": 50, "outstandingAmount": 0 });
        let changes = convert_fields(
            &doc,
            EntityKind::Payment.money_fields(),
            0.9,
        )
        .unwrap();

        assert_eq!(changes.converted_values.len(), 1);
        assert_eq!(changes.converted_values["courseFee"], 45);
        assert!(!changes.original_values.contains_key("outstandingAmount"));
        assert!(!changes.original_values.contains_key("receivedAmount"));
    }

    #[test]
    fn test_negative_and_non_numeric_fields_are_excluded() {
        let doc = json!({ "amount": -10, "totalAmount": "not a number" });
        assert!(convert_fields(&doc, &["amount", "totalAmount"], 2.0).is_none());
    }

    #[test]
    fn test_all_ineligible_yields_none() {
        let doc = json!({ "unrelated": 123 });
        assert!(convert_fields(&doc, &["price"], 0.9).is_none());
    }

    #[test]
    fn test_nested_field_lookup() {
        let doc = json!({ "metadata": { "amount": 200, "dueAmount": 0 } });
        let changes = convert_fields(&doc, EntityKind::Notification.money_fields(), 1.5).unwrap();

        assert_eq!(changes.converted_values["metadata.amount"], 300);
        assert!(!changes.converted_values.contains_key("metadata.dueAmount"));
    }

    #[test]
    fn test_key_sets_match() {
        let doc = json!({
            "courseFee": 10,
            "courseRegistrationFee": 20,
            "studentRegistrationFee": 0,
            "receivedAmount": 5.5
        });
        let changes = convert_fields(&doc, EntityKind::Payment.money_fields(), 1.21).unwrap();

        let original_keys: Vec<_> = changes.original_values.keys().collect();
        let converted_keys: Vec<_> = changes.converted_values.keys().collect();
        assert_eq!(original_keys, converted_keys);
    }

    #[test]
    fn test_identity_rate_still_rounds_fractional_values() {
        let doc = json!({ "price": 99.6 });
        let changes = convert_fields(&doc, &["price"], 1.0).unwrap();

        assert_eq!(changes.original_values["price"], 99.6);
        assert_eq!(changes.converted_values["price"], 100);
    }
}
