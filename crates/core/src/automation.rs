use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{AutomationId, BaseId, FieldId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    FieldChange,
    RecordCreated,
    RecordUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub value: FieldValue,
    /// Column the condition reads. Defaults to the trigger's field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl Condition {
    pub fn equals(value: FieldValue) -> Self {
        Self {
            operator: ConditionOperator::Equals,
            value,
            field_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    /// Restricts the trigger to one table (compared ignoring case).
    /// `None` makes the automation base-wide.
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    /// Legacy id reference; `field_name` takes priority when both are set.
    #[serde(default)]
    pub field_id: Option<FieldId>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl Trigger {
    pub fn field_change(field_name: impl Into<String>) -> Self {
        Self {
            trigger_type: TriggerType::FieldChange,
            table_name: None,
            field_name: Some(field_name.into()),
            field_id: None,
            condition: None,
        }
    }

    pub fn on(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            table_name: None,
            field_name: None,
            field_id: None,
            condition: None,
        }
    }

    pub fn in_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CopyToTable,
    MoveToTable,
    SyncToTable,
    ShowInTable,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CopyToTable => "copy_to_table",
            Self::MoveToTable => "move_to_table",
            Self::SyncToTable => "sync_to_table",
            Self::ShowInTable => "show_in_table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    /// Merge into the existing copy.
    #[default]
    Update,
    /// Leave an existing copy untouched.
    Skip,
}

/// Field ids here may belong to any table of the base; they are re-resolved
/// by name against the actual source and target tables at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field_id: FieldId,
    pub target_field_id: FieldId,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub target_table_name: String,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    /// Ignored by `move_to_table`.
    #[serde(default = "default_true")]
    pub preserve_original: bool,
    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,
}

impl Action {
    pub fn new(action_type: ActionType, target_table_name: impl Into<String>) -> Self {
        Self {
            action_type,
            target_table_name: target_table_name.into(),
            field_mappings: Vec::new(),
            preserve_original: true,
            duplicate_handling: DuplicateHandling::Update,
        }
    }

    pub fn with_mapping(mut self, source_field_id: FieldId, target_field_id: FieldId) -> Self {
        self.field_mappings.push(FieldMapping {
            source_field_id,
            target_field_id,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automation {
    pub automation_id: AutomationId,
    pub base_id: BaseId,
    pub name: String,
    pub enabled: bool,
    pub trigger: Option<Trigger>,
    pub action: Option<Action>,
}

impl Automation {
    pub fn new(base_id: BaseId, name: impl Into<String>, trigger: Trigger, action: Action) -> Self {
        Self {
            automation_id: AutomationId::new(),
            base_id,
            name: name.into(),
            enabled: true,
            trigger: Some(trigger),
            action: Some(action),
        }
    }

    pub fn is_move(&self) -> bool {
        self.action
            .as_ref()
            .is_some_and(|a| a.action_type == ActionType::MoveToTable)
    }
}

/// Decode an automation definition from its JSON form, as produced by the UI.
pub fn automation_from_json(json: &serde_json::Value) -> Result<Automation, CoreError> {
    serde_json::from_value(json.clone()).map_err(|e| CoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_defaults_when_absent() {
        let json = serde_json::json!({
            "action_type": "copy_to_table",
            "target_table_name": "Archive",
        });
        let action: Action = serde_json::from_value(json).unwrap();
        assert!(action.preserve_original);
        assert_eq!(action.duplicate_handling, DuplicateHandling::Update);
        assert!(action.field_mappings.is_empty());
    }

    #[test]
    fn automation_json_with_condition() {
        let base = BaseId::new();
        let json = serde_json::json!({
            "automation_id": AutomationId::new().to_string(),
            "base_id": base.to_string(),
            "name": "Done mover",
            "enabled": true,
            "trigger": {
                "trigger_type": "field_change",
                "field_name": "Status",
                "condition": {
                    "operator": "equals",
                    "value": {"type": "text", "value": "Done"}
                }
            },
            "action": {
                "action_type": "move_to_table",
                "target_table_name": "Done Items",
                "preserve_original": true
            }
        });

        let automation = automation_from_json(&json).unwrap();
        assert_eq!(automation.base_id, base);
        assert!(automation.is_move());
        let trigger = automation.trigger.unwrap();
        assert_eq!(trigger.table_name, None);
        let condition = trigger.condition.unwrap();
        assert_eq!(condition.operator, ConditionOperator::Equals);
        assert_eq!(condition.value, FieldValue::Text("Done".into()));
    }

    #[test]
    fn missing_trigger_is_representable() {
        let json = serde_json::json!({
            "automation_id": AutomationId::new().to_string(),
            "base_id": BaseId::new().to_string(),
            "name": "half configured",
            "enabled": true,
            "trigger": null,
            "action": null
        });
        let automation = automation_from_json(&json).unwrap();
        assert!(automation.trigger.is_none());
        assert!(!automation.is_move());
    }
}
