//! Deciding which automations a mutation fires, and evaluating their
//! conditions against current record state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tablesync_core::{
    automation::{Automation, Condition, ConditionOperator, Trigger, TriggerType},
    field_value::FieldValue,
    ids::*,
    record::Record,
    schema::Field,
};
use tablesync_storage::Storage;

use crate::context::Context;
use crate::error::EngineError;
use crate::mapper::{display_labels, display_value, normalize};
use crate::resolver::{BaseSchema, FieldCorrespondence, master_record_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
}

/// A committed write to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub kind: MutationKind,
    pub table_id: TableId,
    pub changed_field_ids: Vec<FieldId>,
    /// New values of the changed fields, when the caller has them.
    pub changed_values: Option<BTreeMap<FieldId, FieldValue>>,
}

impl MutationEvent {
    pub fn created(table_id: TableId, values: BTreeMap<FieldId, FieldValue>) -> Self {
        Self {
            kind: MutationKind::Created,
            table_id,
            changed_field_ids: values.keys().copied().collect(),
            changed_values: Some(values),
        }
    }

    pub fn updated(table_id: TableId, changes: BTreeMap<FieldId, FieldValue>) -> Self {
        Self {
            kind: MutationKind::Updated,
            table_id,
            changed_field_ids: changes.keys().copied().collect(),
            changed_values: Some(changes),
        }
    }

    /// An update known only by the ids of the fields it touched.
    pub fn touched(table_id: TableId, field_ids: Vec<FieldId>) -> Self {
        Self {
            kind: MutationKind::Updated,
            table_id,
            changed_field_ids: field_ids,
            changed_values: None,
        }
    }

    pub fn changed_cells(&self) -> BTreeMap<FieldId, FieldValue> {
        self.changed_values.clone().unwrap_or_default()
    }
}

/// Why an automation was not selected for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Disabled,
    OtherTable,
    EventKind,
    FieldNotChanged,
    ConditionFailed,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::OtherTable => "other_table",
            Self::EventKind => "event_kind",
            Self::FieldNotChanged => "field_not_changed",
            Self::ConditionFailed => "condition_failed",
        }
    }
}

/// The automations `event` fires, in the order given.
///
/// An automation without a trigger is passed through so that its execution
/// reports the configuration problem.
pub fn find_applicable_automations<'a>(
    automations: &'a [Automation],
    schema: &BaseSchema,
    correspondence: &dyn FieldCorrespondence,
    event: &MutationEvent,
) -> Vec<&'a Automation> {
    automations
        .iter()
        .filter(|automation| match check(automation, schema, correspondence, event) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::debug!(
                    automation = %automation.name,
                    automation_id = %automation.automation_id,
                    reason = rejection.as_str(),
                    "automation not applicable"
                );
                false
            }
        })
        .collect()
}

/// Filter steps for one automation, in order.
pub fn check(
    automation: &Automation,
    schema: &BaseSchema,
    correspondence: &dyn FieldCorrespondence,
    event: &MutationEvent,
) -> Result<(), Rejection> {
    if !automation.enabled {
        return Err(Rejection::Disabled);
    }
    let Some(trigger) = &automation.trigger else {
        return Ok(());
    };

    if let Some(scope) = &trigger.table_name {
        let in_scope = schema
            .table(event.table_id)
            .is_some_and(|t| t.name.to_lowercase() == scope.to_lowercase());
        if !in_scope {
            return Err(Rejection::OtherTable);
        }
    }

    match (trigger.trigger_type, event.kind) {
        (TriggerType::RecordCreated, MutationKind::Created)
        | (TriggerType::RecordUpdated, MutationKind::Updated) => {}
        (TriggerType::FieldChange, MutationKind::Updated) => {
            if matched_field(trigger, schema, correspondence, event).is_none() {
                return Err(Rejection::FieldNotChanged);
            }
        }
        _ => return Err(Rejection::EventKind),
    }

    if prefilter_rejects(trigger, schema, correspondence, event) {
        return Err(Rejection::ConditionFailed);
    }
    Ok(())
}

/// The changed field that is the trigger's declared field, if any.
fn matched_field<'s>(
    trigger: &Trigger,
    schema: &'s BaseSchema,
    correspondence: &dyn FieldCorrespondence,
    event: &MutationEvent,
) -> Option<&'s Field> {
    let declared_name = trigger
        .field_name
        .clone()
        .or_else(|| trigger.field_id.and_then(|id| schema.field(id)).map(|f| f.name.clone()));

    event
        .changed_field_ids
        .iter()
        .filter_map(|id| schema.field(*id))
        .find(|changed| {
            if Some(changed.field_id) == trigger.field_id && trigger.field_name.is_none() {
                return true;
            }
            declared_name
                .as_deref()
                .is_some_and(|name| correspondence.matches_name(changed, name))
        })
}

/// Cheap rejection of `equals` conditions when the event already carries the
/// value of the condition's field.
fn prefilter_rejects(
    trigger: &Trigger,
    schema: &BaseSchema,
    correspondence: &dyn FieldCorrespondence,
    event: &MutationEvent,
) -> bool {
    let Some(condition) = &trigger.condition else {
        return false;
    };
    if condition.operator != ConditionOperator::Equals {
        return false;
    }
    let Some(values) = &event.changed_values else {
        return false;
    };
    let Some(name) = condition_field_name(trigger, schema) else {
        return false;
    };

    let changed = event
        .changed_field_ids
        .iter()
        .filter_map(|id| schema.field(*id))
        .find(|f| correspondence.matches_name(f, &name));
    match changed {
        Some(field) => {
            let value = values.get(&field.field_id).cloned().unwrap_or(FieldValue::Null);
            !evaluate_condition(condition, &value, field)
        }
        // condition reads a field this event did not touch
        None => false,
    }
}

/// Column a trigger's condition reads: the condition's own field, else the
/// trigger's field by name, else by legacy id.
pub fn condition_field_name(trigger: &Trigger, schema: &BaseSchema) -> Option<String> {
    trigger
        .condition
        .as_ref()
        .and_then(|c| c.field_name.clone())
        .or_else(|| trigger.field_name.clone())
        .or_else(|| trigger.field_id.and_then(|id| schema.field(id)).map(|f| f.name.clone()))
}

/// Evaluate `condition` against a value of `field`.
///
/// Values compare by normalized display form, so select keys are compared by
/// their labels. On a multi-select, `equals` holds when any one label equals
/// the expected value. Ordering operators compare numerically when both sides
/// parse as numbers and lexically otherwise; an empty cell never orders.
pub fn evaluate_condition(condition: &Condition, value: &FieldValue, field: &Field) -> bool {
    let actual = display_value(value, field).map(|s| normalize(&s)).unwrap_or_default();
    let expected = display_value(&condition.value, field)
        .map(|s| normalize(&s))
        .unwrap_or_default();

    let equals = || {
        actual == expected
            || matches!(value, FieldValue::MultiSelect(_))
                && display_labels(value, field)
                    .iter()
                    .any(|label| normalize(label) == expected)
    };

    match condition.operator {
        ConditionOperator::Equals => equals(),
        ConditionOperator::NotEquals => !equals(),
        ConditionOperator::Contains => actual.contains(&expected),
        ConditionOperator::GreaterThan => compare(&actual, &expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => compare(&actual, &expected) == Some(Ordering::Less),
        ConditionOperator::GreaterThanOrEqual => {
            matches!(compare(&actual, &expected), Some(Ordering::Greater | Ordering::Equal))
        }
        ConditionOperator::LessThanOrEqual => {
            matches!(compare(&actual, &expected), Some(Ordering::Less | Ordering::Equal))
        }
    }
}

fn compare(actual: &str, expected: &str) -> Option<Ordering> {
    if actual.is_empty() {
        return None;
    }
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(actual.cmp(expected)),
    }
}

/// Result of re-checking a trigger's condition against stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCheck {
    Met,
    NotMet,
    /// The condition's column exists in neither the record's table nor the
    /// hinted source table.
    FieldUnresolved,
}

/// Evaluate the trigger's condition against the current state of `record`.
///
/// The condition's column is looked up in the record's own table first. A
/// masterlist record may lack it; the column is then looked up in
/// `source_table_hint` and read from the record's copy there.
pub fn condition_holds<S: Storage + ?Sized>(
    ctx: &Context<'_, S>,
    trigger: &Trigger,
    record: &Record,
    source_table_hint: Option<TableId>,
) -> Result<ConditionCheck, EngineError> {
    let Some(condition) = &trigger.condition else {
        return Ok(ConditionCheck::Met);
    };
    let name = condition_field_name(trigger, ctx.schema).ok_or_else(|| {
        EngineError::Configuration("condition does not name a field".into())
    })?;

    let local = ctx.correspondence.resolve(ctx.schema, record.table_id, &name);
    let (field, value) = match local {
        Some(field) => (field, record.values.get(field.field_id).cloned()),
        None => {
            let hinted = source_table_hint
                .filter(|t| *t != record.table_id && ctx.schema.is_masterlist(record.table_id))
                .and_then(|t| ctx.correspondence.resolve(ctx.schema, t, &name));
            let Some(field) = hinted else {
                return Ok(ConditionCheck::FieldUnresolved);
            };
            let master_id = master_record_id(ctx.schema, record);
            let copy = match ctx
                .storage
                .find_records_by_source(field.table_id, master_id)?
                .into_iter()
                .next()
            {
                Some(copy) => Some(copy),
                None => ctx.storage.get_record(field.table_id, master_id)?,
            };
            (field, copy.and_then(|c| c.values.get(field.field_id).cloned()))
        }
    };

    let value = value.unwrap_or(FieldValue::Null);
    if evaluate_condition(condition, &value, field) {
        Ok(ConditionCheck::Met)
    } else {
        Ok(ConditionCheck::NotMet)
    }
}
