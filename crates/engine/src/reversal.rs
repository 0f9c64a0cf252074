//! Moving a record back out of a table once the condition that moved it
//! there no longer holds.

use tablesync_core::{
    automation::{Automation, DuplicateHandling},
    ids::*,
    record::RecordValues,
};
use tablesync_storage::Storage;

use crate::context::{Context, RecordLocation};
use crate::copies::{enforce_single_copy, place_copy};
use crate::error::EngineError;
use crate::resolver::master_record_id;
use crate::sync::sync_masterlist_with_table;
use crate::trigger::{ConditionCheck, condition_holds};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reversal {
    pub automation_id: AutomationId,
    pub master_record_id: RecordId,
    pub from_table_id: TableId,
    pub to_table_id: TableId,
    /// The record's id in the table it was moved back to.
    pub restored_record_id: RecordId,
    pub removed_copies: usize,
}

/// Check the record at `at` against every move automation targeting its
/// table and undo the first one whose condition is now false.
///
/// The record goes back to the move's trigger table when one is named, and
/// to the masterlist otherwise. Masterlist rows are never reversed.
pub fn check_reversal<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    automations: &[Automation],
    at: RecordLocation,
) -> Result<Option<Reversal>, EngineError> {
    let schema = ctx.schema;
    if schema.is_masterlist(at.table_id) {
        return Ok(None);
    }
    let Some(table) = schema.table(at.table_id) else {
        return Ok(None);
    };
    let Some(record) = ctx.storage.get_record(at.table_id, at.record_id)? else {
        return Ok(None);
    };
    let table_name = table.name.to_lowercase();

    for automation in automations.iter().filter(|a| a.enabled && a.is_move()) {
        let (Some(trigger), Some(action)) = (&automation.trigger, &automation.action) else {
            continue;
        };
        if action.target_table_name.to_lowercase() != table_name || trigger.condition.is_none() {
            continue;
        }
        if condition_holds(ctx, trigger, &record, None)? != ConditionCheck::NotMet {
            continue;
        }

        let masterlist_id = schema.masterlist_table_id()?;
        let destination = trigger
            .table_name
            .as_deref()
            .and_then(|name| schema.table_by_name(name))
            .map(|t| t.table_id)
            .filter(|id| *id != at.table_id)
            .unwrap_or(masterlist_id);
        let master_id = master_record_id(schema, &record);

        if let Err(e) = sync_masterlist_with_table(ctx, master_id, at.table_id, &record.values.cells) {
            tracing::warn!(
                automation = %automation.name,
                master_record_id = %master_id,
                error = %e,
                "masterlist sync before reversal failed"
            );
        }

        let (restored_record_id, removed_copies) = if destination == masterlist_id {
            (master_id, enforce_single_copy(ctx, master_id, &[])?)
        } else {
            let cells = ctx.translate_cells(&record.values.cells, destination);
            let removed = enforce_single_copy(ctx, master_id, &[destination])?;
            let placement = place_copy(
                &mut *ctx.storage,
                destination,
                master_id,
                &RecordValues::from_cells(cells),
                DuplicateHandling::Update,
            )?;
            (placement.record_id(), removed)
        };

        tracing::info!(
            automation = %automation.name,
            master_record_id = %master_id,
            from = %table.name,
            to_table_id = %destination,
            "move reversed"
        );
        return Ok(Some(Reversal {
            automation_id: automation.automation_id,
            master_record_id: master_id,
            from_table_id: at.table_id,
            to_table_id: destination,
            restored_record_id,
            removed_copies,
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{BaseSchema, NameCorrespondence};
    use tablesync_core::{
        Action, ActionType, Condition, FieldOptions, FieldType, FieldValue, Table, Trigger,
    };
    use tablesync_storage::SqliteStorage;

    struct Fixture {
        storage: SqliteStorage,
        base_id: BaseId,
        contacts: Table,
        leads: Table,
        done: Table,
        done_status: FieldId,
    }

    fn fixture() -> Fixture {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let base = storage.create_base("CRM").unwrap();
        let contacts = storage.create_table(base.base_id, "Contacts", true).unwrap();
        let leads = storage.create_table(base.base_id, "Leads", false).unwrap();
        let done = storage.create_table(base.base_id, "Done Items", false).unwrap();
        let mut done_status = None;
        for table in [&contacts, &leads, &done] {
            let field = storage
                .create_field(
                    table.table_id,
                    "Status",
                    FieldType::SingleSelect,
                    FieldOptions::with_choices([("p", "In Progress"), ("d", "Done")]),
                )
                .unwrap();
            done_status = Some(field.field_id);
        }
        Fixture {
            storage,
            base_id: base.base_id,
            contacts,
            leads,
            done,
            done_status: done_status.unwrap(),
        }
    }

    fn mover(base_id: BaseId, from: Option<&str>) -> Automation {
        let mut trigger =
            Trigger::field_change("Status").when(Condition::equals(FieldValue::Text("Done".into())));
        if let Some(from) = from {
            trigger = trigger.in_table(from);
        }
        Automation::new(base_id, "done", trigger, Action::new(ActionType::MoveToTable, "done items"))
    }

    /// Masterlist row plus its copy in Done Items carrying `status`.
    fn moved(fx: &mut Fixture, status: &str) -> (RecordId, RecordLocation) {
        let master = fx
            .storage
            .insert_record(fx.contacts.table_id, RecordId::new(), &RecordValues::new())
            .unwrap();
        let copy = fx
            .storage
            .insert_record(
                fx.done.table_id,
                RecordId::new(),
                &RecordValues::from_cells([(fx.done_status, FieldValue::Select(status.into()))])
                    .with_source(master.record_id),
            )
            .unwrap();
        (master.record_id, RecordLocation::new(fx.done.table_id, copy.record_id))
    }

    fn check(fx: &mut Fixture, automations: &[Automation], at: RecordLocation) -> Option<Reversal> {
        let schema = BaseSchema::load(&fx.storage, fx.base_id).unwrap();
        let corr = NameCorrespondence::default();
        let mut ctx = Context::new(&mut fx.storage, &schema, &corr);
        check_reversal(&mut ctx, automations, at).unwrap()
    }

    #[test]
    fn condition_still_true_keeps_record() {
        let mut fx = fixture();
        let base_id = fx.base_id;
        let (_, at) = moved(&mut fx, "d");
        assert_eq!(check(&mut fx, &[mover(base_id, None)], at), None);
        assert_eq!(fx.storage.get_records(fx.done.table_id).unwrap().len(), 1);
    }

    #[test]
    fn back_to_masterlist() {
        let mut fx = fixture();
        let base_id = fx.base_id;
        let (master, at) = moved(&mut fx, "p");

        let reversal = check(&mut fx, &[mover(base_id, None)], at).unwrap();
        assert_eq!(reversal.to_table_id, fx.contacts.table_id);
        assert_eq!(reversal.restored_record_id, master);
        assert_eq!(reversal.removed_copies, 1);
        assert!(fx.storage.get_records(fx.done.table_id).unwrap().is_empty());

        let row = fx.storage.get_record(fx.contacts.table_id, master).unwrap().unwrap();
        assert_eq!(row.values.cells.values().next(), Some(&FieldValue::Select("p".into())));
    }

    #[test]
    fn back_to_trigger_table() {
        let mut fx = fixture();
        let base_id = fx.base_id;
        let (master, at) = moved(&mut fx, "p");

        let reversal = check(&mut fx, &[mover(base_id, Some("Leads"))], at).unwrap();
        assert_eq!(reversal.to_table_id, fx.leads.table_id);
        assert!(fx.storage.get_records(fx.done.table_id).unwrap().is_empty());
        let leads = fx.storage.get_records(fx.leads.table_id).unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].source_record_id(), Some(master));
        assert_eq!(leads[0].record_id, reversal.restored_record_id);
    }

    #[test]
    fn masterlist_rows_and_disabled_moves_ignored() {
        let mut fx = fixture();
        let base_id = fx.base_id;
        let (master, at) = moved(&mut fx, "p");
        let mut disabled = mover(base_id, None);
        disabled.enabled = false;
        assert_eq!(check(&mut fx, &[disabled], at), None);

        let in_master = RecordLocation::new(fx.contacts.table_id, master);
        assert_eq!(check(&mut fx, &[mover(base_id, None)], in_master), None);
    }
}
