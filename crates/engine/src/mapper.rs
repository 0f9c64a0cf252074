//! Translation of cell values between columns of different tables.
//!
//! Select option keys are table-local, so a select value is carried across
//! by its display label and re-keyed in the target column.

use tablesync_core::{
    field_value::FieldValue,
    schema::{Field, FieldType},
};

/// Translate `value` from `source`'s representation into `target`'s.
///
/// - single → single select: key → label → target key. An unmatched option
///   is returned unchanged and becomes an orphan key in the target.
/// - multi → multi select: element-wise with the single-select rule; elements
///   with no target option are dropped.
/// - anything else: unchanged.
pub fn map_value(value: &FieldValue, source: &Field, target: &Field) -> FieldValue {
    match (source.field_type, target.field_type) {
        (FieldType::SingleSelect, FieldType::SingleSelect) => match value {
            FieldValue::Select(raw) => {
                let label = source.option_label(raw).unwrap_or(raw.as_str());
                match target_key(target, label) {
                    Some(key) => FieldValue::Select(key.to_string()),
                    None => value.clone(),
                }
            }
            _ => value.clone(),
        },
        (FieldType::MultiSelect, FieldType::MultiSelect) => match value {
            FieldValue::MultiSelect(raw) => FieldValue::MultiSelect(
                raw.iter()
                    .map(|element| source.option_label(element).unwrap_or(element.as_str()))
                    .filter_map(|label| target_key(target, label))
                    .map(str::to_string)
                    .collect(),
            ),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn target_key<'a>(target: &'a Field, label: &str) -> Option<&'a str> {
    target
        .options
        .key_for_label(label)
        .or_else(|| target.options.key_for_label_ignore_case(label))
}

/// Human-readable form of a value in `field`, with option keys replaced by
/// their labels. `None` for empty cells.
pub fn display_value(value: &FieldValue, field: &Field) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Text(s) | FieldValue::Date(s) => Some(s.clone()),
        FieldValue::Number(n) => Some(format_number(*n)),
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::Select(key) => Some(field.option_label(key).unwrap_or(key.as_str()).to_string()),
        FieldValue::MultiSelect(_) => Some(display_labels(value, field).join(", ")),
        FieldValue::Link(ids) => Some(
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// Labels of the options held by a select value; empty for other values.
pub fn display_labels(value: &FieldValue, field: &Field) -> Vec<String> {
    match value {
        FieldValue::Select(key) => vec![field.option_label(key).unwrap_or(key.as_str()).to_string()],
        FieldValue::MultiSelect(keys) => keys
            .iter()
            .map(|k| field.option_label(k).unwrap_or(k.as_str()).to_string())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
