use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{BaseId, FieldId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Email,
    Phone,
    Url,
    SingleSelect,
    MultiSelect,
    Checkbox,
    Link,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::SingleSelect => "single_select",
            Self::MultiSelect => "multi_select",
            Self::Checkbox => "checkbox",
            Self::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "url" => Ok(Self::Url),
            "single_select" => Ok(Self::SingleSelect),
            "multi_select" => Ok(Self::MultiSelect),
            "checkbox" => Ok(Self::Checkbox),
            "link" => Ok(Self::Link),
            _ => Err(CoreError::InvalidData(format!("unknown field type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectChoice {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Type-specific column options. Select columns map table-local option keys
/// to their display label; the same label usually carries a different key in
/// every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    #[serde(default)]
    pub choices: BTreeMap<String, SelectChoice>,
}

impl FieldOptions {
    pub fn with_choices<I, K, L>(choices: I) -> Self
    where
        I: IntoIterator<Item = (K, L)>,
        K: Into<String>,
        L: Into<String>,
    {
        Self {
            choices: choices
                .into_iter()
                .map(|(key, label)| {
                    (
                        key.into(),
                        SelectChoice {
                            label: label.into(),
                            color: None,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn label_of(&self, key: &str) -> Option<&str> {
        self.choices.get(key).map(|c| c.label.as_str())
    }

    /// Option key whose label equals `label` exactly.
    pub fn key_for_label(&self, label: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|(_, c)| c.label == label)
            .map(|(k, _)| k.as_str())
    }

    /// Option key whose label equals `label` ignoring case.
    pub fn key_for_label_ignore_case(&self, label: &str) -> Option<&str> {
        let wanted = label.to_lowercase();
        self.choices
            .iter()
            .find(|(_, c)| c.label.to_lowercase() == wanted)
            .map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub base_id: BaseId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub table_id: TableId,
    pub base_id: BaseId,
    pub name: String,
    pub position: i64,
    pub is_master_list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub field_id: FieldId,
    pub table_id: TableId,
    pub name: String,
    pub field_type: FieldType,
    pub position: i64,
    #[serde(default)]
    pub options: FieldOptions,
}

impl Field {
    /// Display label for a select option key of this column.
    pub fn option_label(&self, key: &str) -> Option<&str> {
        self.options.label_of(key)
    }
}
