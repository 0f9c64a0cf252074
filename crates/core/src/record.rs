use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{FieldId, RecordId, TableId};

/// Reserved key carrying a shadow copy's back-reference to its masterlist
/// record in the JSON form of [`RecordValues`].
pub const SOURCE_RECORD_KEY: &str = "_source_record_id";

/// The values of one record, keyed by the field ids of the table it lives in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordValues {
    pub source_record_id: Option<RecordId>,
    pub cells: BTreeMap<FieldId, FieldValue>,
}

impl RecordValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (FieldId, FieldValue)>,
    {
        Self {
            source_record_id: None,
            cells: cells.into_iter().collect(),
        }
    }

    pub fn with_source(mut self, master_id: RecordId) -> Self {
        self.source_record_id = Some(master_id);
        self
    }

    pub fn get(&self, field_id: FieldId) -> Option<&FieldValue> {
        self.cells.get(&field_id)
    }

    pub fn set(&mut self, field_id: FieldId, value: FieldValue) {
        self.cells.insert(field_id, value);
    }

    /// Overlay `other` onto `self`: cells present in `other` win, cells only
    /// present in `self` are kept. A back-reference in `other` replaces ours.
    pub fn merge(&mut self, other: &RecordValues) {
        for (field_id, value) in &other.cells {
            self.cells.insert(*field_id, value.clone());
        }
        if other.source_record_id.is_some() {
            self.source_record_id = other.source_record_id;
        }
    }

    /// Flat JSON object: one key per field id plus the reserved
    /// `_source_record_id` key when a back-reference is present.
    pub fn to_json(&self) -> Result<Value, CoreError> {
        let mut map = Map::new();
        for (field_id, value) in &self.cells {
            let json = serde_json::to_value(value)
                .map_err(|e| CoreError::Serialization(e.to_string()))?;
            map.insert(field_id.to_string(), json);
        }
        if let Some(source) = self.source_record_id {
            map.insert(SOURCE_RECORD_KEY.to_string(), Value::String(source.to_string()));
        }
        Ok(Value::Object(map))
    }

    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let map = json
            .as_object()
            .ok_or_else(|| CoreError::InvalidData("record values must be an object".into()))?;

        let mut values = RecordValues::new();
        for (key, raw) in map {
            if key == SOURCE_RECORD_KEY {
                values.source_record_id = match raw {
                    Value::Null => None,
                    Value::String(s) => Some(s.parse()?),
                    other => {
                        return Err(CoreError::InvalidData(format!(
                            "{SOURCE_RECORD_KEY} must be a string, got {other}"
                        )));
                    }
                };
                continue;
            }
            let field_id: FieldId = key.parse()?;
            let value: FieldValue = serde_json::from_value(raw.clone())
                .map_err(|e| CoreError::Serialization(e.to_string()))?;
            values.cells.insert(field_id, value);
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_id: RecordId,
    pub table_id: TableId,
    pub values: RecordValues,
}

impl Record {
    pub fn source_record_id(&self) -> Option<RecordId> {
        self.values.source_record_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_carries_reserved_key() {
        let field = FieldId::new();
        let master = RecordId::new();
        let values = RecordValues::from_cells([(field, FieldValue::Text("Ada".into()))])
            .with_source(master);

        let json = values.to_json().unwrap();
        assert_eq!(
            json[SOURCE_RECORD_KEY],
            Value::String(master.to_string())
        );
        assert_eq!(json[field.to_string()]["value"], Value::String("Ada".into()));

        let back = RecordValues::from_json(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn merge_keeps_untouched_cells() {
        let a = FieldId::new();
        let b = FieldId::new();
        let mut base = RecordValues::from_cells([
            (a, FieldValue::Text("old".into())),
            (b, FieldValue::Number(7.0)),
        ]);
        base.merge(&RecordValues::from_cells([(a, FieldValue::Text("new".into()))]));

        assert_eq!(base.get(a), Some(&FieldValue::Text("new".into())));
        assert_eq!(base.get(b), Some(&FieldValue::Number(7.0)));
        assert_eq!(base.source_record_id, None);
    }

    #[test]
    fn rejects_non_object_and_bad_keys() {
        assert!(RecordValues::from_json(&Value::Array(vec![])).is_err());
        let bad = serde_json::json!({"not-a-field-id": {"type": "null"}});
        assert!(RecordValues::from_json(&bad).is_err());
        let bad_source = serde_json::json!({ SOURCE_RECORD_KEY: 42 });
        assert!(RecordValues::from_json(&bad_source).is_err());
    }
}
