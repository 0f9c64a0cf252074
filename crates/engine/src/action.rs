//! Execution of one automation's action against one record.

use std::collections::BTreeMap;

use tablesync_core::{
    automation::{Action, ActionType, Automation, DuplicateHandling},
    field_value::FieldValue,
    ids::*,
    record::{Record, RecordValues},
};
use tablesync_storage::Storage;

use crate::context::{Context, RecordLocation};
use crate::copies::{Placement, enforce_single_copy, place_copy};
use crate::error::EngineError;
use crate::mapper::map_value;
use crate::resolver::master_record_id;
use crate::sync::{merge_into_masterlist, sync_masterlist_with_table, SyncOutcome};
use crate::trigger::{ConditionCheck, condition_holds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record is gone, typically moved away by an earlier automation.
    RecordMissing,
    ConditionNotMet,
    ConditionFieldUnresolved,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordMissing => "record_missing",
            Self::ConditionNotMet => "condition_not_met",
            Self::ConditionFieldUnresolved => "condition_field_unresolved",
        }
    }
}

/// What an executed action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub action_type: ActionType,
    pub master_record_id: RecordId,
    pub target_table_id: TableId,
    pub placement: Placement,
    /// Copies deleted from tables the record may no longer appear in.
    pub removed_copies: usize,
}

impl Execution {
    pub fn is_move(&self) -> bool {
        self.action_type == ActionType::MoveToTable
    }

    /// Where the record lives after the action.
    pub fn location(&self) -> RecordLocation {
        RecordLocation::new(self.target_table_id, self.placement.record_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Executed(Execution),
    Skipped(SkipReason),
}

/// Run `automation`'s action for the record at `at`.
///
/// `source_table_id` is the table the triggering mutation happened in and
/// `changed` the values it wrote, keyed by that table's field ids.
///
/// Within the action the masterlist is synced first, stray copies are then
/// removed, the target copy is written and finally duplicates in the target
/// are pruned.
pub fn execute<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    automation: &Automation,
    at: RecordLocation,
    source_table_id: TableId,
    changed: &BTreeMap<FieldId, FieldValue>,
) -> Result<ActionOutcome, EngineError> {
    let trigger = automation.trigger.as_ref().ok_or_else(|| {
        EngineError::Configuration(format!("automation {} has no trigger", automation.automation_id))
    })?;
    let action = automation.action.as_ref().ok_or_else(|| {
        EngineError::Configuration(format!("automation {} has no action", automation.automation_id))
    })?;
    let masterlist_id = ctx.schema.masterlist_table_id()?;
    let target_id = ctx
        .schema
        .table_by_name(&action.target_table_name)
        .map(|t| t.table_id)
        .ok_or_else(|| {
            EngineError::Configuration(format!(
                "target table {:?} not found in base {}",
                action.target_table_name,
                ctx.schema.base_id()
            ))
        })?;

    let Some(record) = ctx.storage.get_record(at.table_id, at.record_id)? else {
        return Ok(ActionOutcome::Skipped(SkipReason::RecordMissing));
    };

    match condition_holds(ctx, trigger, &record, Some(source_table_id))? {
        ConditionCheck::Met => {}
        ConditionCheck::NotMet => return Ok(ActionOutcome::Skipped(SkipReason::ConditionNotMet)),
        ConditionCheck::FieldUnresolved => {
            return Ok(ActionOutcome::Skipped(SkipReason::ConditionFieldUnresolved));
        }
    }

    let master_id = master_record_id(ctx.schema, &record);
    let cells = target_cells(ctx, action, &record, target_id);

    if record.table_id != masterlist_id {
        // the shadow copy may be the only place these edits landed so far
        if let Err(e) = sync_masterlist_with_table(ctx, master_id, record.table_id, changed) {
            tracing::warn!(
                automation = %automation.name,
                master_record_id = %master_id,
                error = %e,
                "masterlist sync failed, continuing with action"
            );
        }
    }

    let execution = if target_id == masterlist_id {
        into_masterlist(ctx, action, master_id, cells)?
    } else {
        into_table(ctx, action, &record, master_id, target_id, cells)?
    };

    tracing::info!(
        automation = %automation.name,
        action = action.action_type.as_str(),
        master_record_id = %master_id,
        target_table_id = %execution.target_table_id,
        removed = execution.removed_copies,
        "automation executed"
    );
    Ok(ActionOutcome::Executed(execution))
}

/// Cells to write into the target, keyed by the target's field ids.
///
/// With no mappings every column the target shares by name is copied. A move
/// also carries the whole record across, with mapped values taking priority.
fn target_cells<S: Storage + ?Sized>(
    ctx: &Context<'_, S>,
    action: &Action,
    record: &Record,
    target_id: TableId,
) -> BTreeMap<FieldId, FieldValue> {
    let mut cells = BTreeMap::new();
    for mapping in &action.field_mappings {
        let (Some(src_decl), Some(tgt_decl)) = (
            ctx.schema.field(mapping.source_field_id),
            ctx.schema.field(mapping.target_field_id),
        ) else {
            continue;
        };
        let source = ctx
            .correspondence
            .resolve(ctx.schema, record.table_id, &src_decl.name);
        let target = ctx.correspondence.resolve(ctx.schema, target_id, &tgt_decl.name);
        let (Some(source), Some(target)) = (source, target) else {
            tracing::debug!(
                source = %src_decl.name,
                target = %tgt_decl.name,
                "field mapping does not resolve, skipped"
            );
            continue;
        };
        if let Some(value) = record.values.get(source.field_id) {
            let mapped = map_value(value, source, target);
            if mapped.conforms_to(target.field_type) {
                cells.insert(target.field_id, mapped);
            }
        }
    }

    if action.field_mappings.is_empty() || action.action_type == ActionType::MoveToTable {
        for (field_id, value) in ctx.translate_cells(&record.values.cells, target_id) {
            cells.entry(field_id).or_insert(value);
        }
    }
    cells
}

fn into_masterlist<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    action: &Action,
    master_id: RecordId,
    cells: BTreeMap<FieldId, FieldValue>,
) -> Result<Execution, EngineError> {
    let masterlist_id = ctx.schema.masterlist_table_id()?;
    let outcome = merge_into_masterlist(&mut *ctx.storage, masterlist_id, master_id, cells)?;

    let removed_copies = match action.action_type {
        ActionType::MoveToTable => enforce_single_copy(ctx, master_id, &[])?,
        _ if !action.preserve_original => enforce_single_copy(ctx, master_id, &[])?,
        _ => 0,
    };

    let placement = match outcome {
        SyncOutcome::Inserted => Placement::Created(master_id),
        SyncOutcome::Updated => Placement::Updated(master_id),
        SyncOutcome::Unchanged => Placement::Kept(master_id),
    };
    Ok(Execution {
        action_type: action.action_type,
        master_record_id: master_id,
        target_table_id: masterlist_id,
        placement,
        removed_copies,
    })
}

fn into_table<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    action: &Action,
    record: &Record,
    master_id: RecordId,
    target_id: TableId,
    cells: BTreeMap<FieldId, FieldValue>,
) -> Result<Execution, EngineError> {
    let values = RecordValues::from_cells(cells);

    if action.action_type == ActionType::ShowInTable {
        let shown = ctx
            .storage
            .insert_record(target_id, RecordId::new(), &values.with_source(master_id))?;
        return Ok(Execution {
            action_type: action.action_type,
            master_record_id: master_id,
            target_table_id: target_id,
            placement: Placement::Created(shown.record_id),
            removed_copies: 0,
        });
    }

    let mut allowed = vec![target_id];
    if action.action_type != ActionType::MoveToTable && action.preserve_original {
        allowed.push(record.table_id);
    }
    let removed_copies = enforce_single_copy(ctx, master_id, &allowed)?;

    let handling = match action.action_type {
        ActionType::MoveToTable => DuplicateHandling::Update,
        _ => action.duplicate_handling,
    };
    let placement = place_copy(&mut *ctx.storage, target_id, master_id, &values, handling)?;

    Ok(Execution {
        action_type: action.action_type,
        master_record_id: master_id,
        target_table_id: target_id,
        placement,
        removed_copies,
    })
}
