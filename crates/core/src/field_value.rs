use serde::{Deserialize, Serialize};

use crate::ids::RecordId;
use crate::schema::FieldType;

/// A single cell value. The variant is the value's type tag and must agree
/// with the declared [`FieldType`] of the column it is written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Boolean(bool),
    /// ISO-8601 date or datetime.
    Date(String),
    /// An option key of the column, or a bare display label.
    Select(String),
    MultiSelect(Vec<String>),
    Link(Vec<RecordId>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Select(a), Self::Select(b)) => a == b,
            (Self::MultiSelect(a), Self::MultiSelect(b)) => a == b,
            (Self::Link(a), Self::Link(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::Select(_) => "select",
            Self::MultiSelect(_) => "multi_select",
            Self::Link(_) => "link",
        }
    }

    /// Whether this value may be stored in a column of `field_type`.
    /// `Null` fits every column.
    pub fn conforms_to(&self, field_type: FieldType) -> bool {
        match self {
            Self::Null => true,
            Self::Text(_) => matches!(
                field_type,
                FieldType::Text | FieldType::Email | FieldType::Phone | FieldType::Url
            ),
            Self::Number(n) => field_type == FieldType::Number && n.is_finite(),
            Self::Boolean(_) => field_type == FieldType::Checkbox,
            Self::Date(_) => matches!(field_type, FieldType::Date | FieldType::DateTime),
            Self::Select(_) => field_type == FieldType::SingleSelect,
            Self::MultiSelect(_) => field_type == FieldType::MultiSelect,
            Self::Link(_) => field_type == FieldType::Link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_form_is_adjacently_tagged() {
        let json = serde_json::to_value(FieldValue::Select("opt_1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "select", "value": "opt_1"}));

        let null = serde_json::to_value(FieldValue::Null).unwrap();
        assert_eq!(null, serde_json::json!({"type": "null"}));
    }

    #[test]
    fn number_equality_uses_total_order() {
        assert_eq!(FieldValue::Number(1.5), FieldValue::Number(1.5));
        assert_ne!(FieldValue::Number(0.0), FieldValue::Number(-0.0));
        assert_ne!(FieldValue::Number(1.0), FieldValue::Text("1".into()));
    }

    #[test]
    fn conformance_by_type() {
        assert!(FieldValue::Null.conforms_to(FieldType::SingleSelect));
        assert!(FieldValue::Text("a@b.c".into()).conforms_to(FieldType::Email));
        assert!(!FieldValue::Text("x".into()).conforms_to(FieldType::Number));
        assert!(!FieldValue::Number(f64::NAN).conforms_to(FieldType::Number));
        assert!(FieldValue::Date("2024-01-01".into()).conforms_to(FieldType::DateTime));
        assert!(!FieldValue::Select("k".into()).conforms_to(FieldType::MultiSelect));
        assert!(FieldValue::Link(vec![RecordId::new()]).conforms_to(FieldType::Link));
    }
}
