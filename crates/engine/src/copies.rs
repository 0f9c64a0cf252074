//! Enforcement of the single-copy invariant: outside the masterlist, a
//! logical record has at most one shadow copy per table.

use tablesync_core::{automation::DuplicateHandling, ids::*, record::RecordValues};
use tablesync_storage::Storage;

use crate::context::Context;
use crate::error::EngineError;

/// What [`place_copy`] did in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Created(RecordId),
    Updated(RecordId),
    /// An existing copy was left as it was.
    Kept(RecordId),
}

impl Placement {
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Kept(id) => *id,
        }
    }
}

/// Delete every copy of `master_record_id` in non-masterlist tables not
/// listed in `allowed`. Returns the number of rows removed.
///
/// A legacy copy sharing the master's id (and carrying no back-reference)
/// counts as a copy too.
pub fn enforce_single_copy<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    master_record_id: RecordId,
    allowed: &[TableId],
) -> Result<usize, EngineError> {
    let schema = ctx.schema;
    let mut removed = 0;
    for table in schema.tables() {
        if table.is_master_list || allowed.contains(&table.table_id) {
            continue;
        }

        let mut doomed: Vec<RecordId> = ctx
            .storage
            .find_records_by_source(table.table_id, master_record_id)?
            .into_iter()
            .map(|r| r.record_id)
            .collect();
        if !doomed.contains(&master_record_id)
            && ctx.storage.get_record(table.table_id, master_record_id)?.is_some()
        {
            doomed.push(master_record_id);
        }
        if doomed.is_empty() {
            continue;
        }

        let n = ctx.storage.delete_records(table.table_id, &doomed)?;
        tracing::debug!(
            table = %table.name,
            master_record_id = %master_record_id,
            removed = n,
            "removed stray copies"
        );
        removed += n;
    }
    Ok(removed)
}

/// Keep only the first copy (in storage order) of `master_record_id` in
/// `table_id`. Returns the number of rows removed.
pub fn prune_duplicates<S: Storage + ?Sized>(
    storage: &mut S,
    table_id: TableId,
    master_record_id: RecordId,
) -> Result<usize, EngineError> {
    let copies = storage.find_records_by_source(table_id, master_record_id)?;
    if copies.len() <= 1 {
        return Ok(0);
    }
    let extra: Vec<RecordId> = copies[1..].iter().map(|r| r.record_id).collect();
    let removed = storage.delete_records(table_id, &extra)?;
    tracing::debug!(
        table_id = %table_id,
        master_record_id = %master_record_id,
        removed,
        "pruned duplicate copies"
    );
    Ok(removed)
}

/// Write the copy of `master_record_id` in `table_id`, creating it only when
/// the table holds none. The copy always ends up carrying its back-reference.
pub fn place_copy<S: Storage + ?Sized>(
    storage: &mut S,
    table_id: TableId,
    master_record_id: RecordId,
    values: &RecordValues,
    handling: DuplicateHandling,
) -> Result<Placement, EngineError> {
    let stamped = values.clone().with_source(master_record_id);

    let existing = match storage
        .find_records_by_source(table_id, master_record_id)?
        .into_iter()
        .next()
    {
        Some(copy) => Some(copy),
        // legacy copy keyed by the master's own id
        None => storage.get_record(table_id, master_record_id)?,
    };

    let placement = match existing {
        Some(copy) if handling == DuplicateHandling::Skip => Placement::Kept(copy.record_id),
        Some(copy) => {
            let mut merged = copy.values.clone();
            merged.merge(&stamped);
            if merged == copy.values {
                Placement::Kept(copy.record_id)
            } else {
                storage.update_record(table_id, copy.record_id, &merged)?;
                Placement::Updated(copy.record_id)
            }
        }
        None => {
            let record = storage.insert_record(table_id, RecordId::new(), &stamped)?;
            Placement::Created(record.record_id)
        }
    };

    prune_duplicates(storage, table_id, master_record_id)?;
    Ok(placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{BaseSchema, NameCorrespondence};
    use tablesync_core::{FieldOptions, FieldType, FieldValue, Table};
    use tablesync_storage::SqliteStorage;

    struct Fixture {
        storage: SqliteStorage,
        base_id: BaseId,
        contacts: Table,
        leads: Table,
        archive: Table,
        lead_name: FieldId,
    }

    fn fixture() -> Fixture {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let base = storage.create_base("CRM").unwrap();
        let contacts = storage.create_table(base.base_id, "Contacts", true).unwrap();
        let leads = storage.create_table(base.base_id, "Leads", false).unwrap();
        let archive = storage.create_table(base.base_id, "Archive", false).unwrap();
        for table in [&contacts, &leads, &archive] {
            storage
                .create_field(table.table_id, "Name", FieldType::Text, FieldOptions::default())
                .unwrap();
        }
        let lead_name = storage.get_fields(leads.table_id).unwrap()[0].field_id;
        Fixture {
            storage,
            base_id: base.base_id,
            contacts,
            leads,
            archive,
            lead_name,
        }
    }

    fn copy_of(master: RecordId) -> RecordValues {
        RecordValues::new().with_source(master)
    }

    #[test]
    fn enforce_removes_outside_allowed() {
        let mut fx = fixture();
        let master = RecordId::new();
        fx.storage
            .insert_record(fx.contacts.table_id, master, &RecordValues::new())
            .unwrap();
        fx.storage
            .insert_record(fx.leads.table_id, RecordId::new(), &copy_of(master))
            .unwrap();
        fx.storage
            .insert_record(fx.archive.table_id, RecordId::new(), &copy_of(master))
            .unwrap();
        // legacy copy sharing the master's id
        fx.storage
            .insert_record(fx.archive.table_id, master, &RecordValues::new())
            .unwrap();

        let schema = BaseSchema::load(&fx.storage, fx.base_id).unwrap();
        let corr = NameCorrespondence::default();
        let mut ctx = Context::new(&mut fx.storage, &schema, &corr);
        let removed = enforce_single_copy(&mut ctx, master, &[fx.leads.table_id]).unwrap();

        assert_eq!(removed, 2);
        assert!(fx.storage.get_records(fx.archive.table_id).unwrap().is_empty());
        assert_eq!(fx.storage.get_records(fx.leads.table_id).unwrap().len(), 1);
        // the masterlist row is never touched
        assert!(fx.storage.get_record(fx.contacts.table_id, master).unwrap().is_some());
    }

    #[test]
    fn prune_keeps_first_in_storage_order() {
        let mut fx = fixture();
        let master = RecordId::new();
        let first = fx
            .storage
            .insert_record(fx.leads.table_id, RecordId::new(), &copy_of(master))
            .unwrap();
        for _ in 0..2 {
            fx.storage
                .insert_record(fx.leads.table_id, RecordId::new(), &copy_of(master))
                .unwrap();
        }

        let removed = prune_duplicates(&mut fx.storage, fx.leads.table_id, master).unwrap();
        assert_eq!(removed, 2);
        let left = fx.storage.get_records(fx.leads.table_id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id, first.record_id);
    }

    #[test]
    fn place_creates_then_updates() {
        let mut fx = fixture();
        let master = RecordId::new();
        let ada = RecordValues::from_cells([(fx.lead_name, FieldValue::Text("Ada".into()))]);

        let created = place_copy(
            &mut fx.storage,
            fx.leads.table_id,
            master,
            &ada,
            DuplicateHandling::Update,
        )
        .unwrap();
        assert!(matches!(created, Placement::Created(_)));

        let again = place_copy(
            &mut fx.storage,
            fx.leads.table_id,
            master,
            &ada,
            DuplicateHandling::Update,
        )
        .unwrap();
        assert_eq!(again, Placement::Kept(created.record_id()));

        let grace = RecordValues::from_cells([(fx.lead_name, FieldValue::Text("Grace".into()))]);
        let updated = place_copy(
            &mut fx.storage,
            fx.leads.table_id,
            master,
            &grace,
            DuplicateHandling::Update,
        )
        .unwrap();
        assert_eq!(updated, Placement::Updated(created.record_id()));

        let skipped = place_copy(
            &mut fx.storage,
            fx.leads.table_id,
            master,
            &ada,
            DuplicateHandling::Skip,
        )
        .unwrap();
        assert_eq!(skipped, Placement::Kept(created.record_id()));

        let rows = fx.storage.get_records(fx.leads.table_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_record_id(), Some(master));
        assert_eq!(
            rows[0].values.get(fx.lead_name),
            Some(&FieldValue::Text("Grace".into()))
        );
    }

    #[test]
    fn place_adopts_legacy_copy() {
        let mut fx = fixture();
        let master = RecordId::new();
        fx.storage
            .insert_record(fx.leads.table_id, master, &RecordValues::new())
            .unwrap();

        let placement = place_copy(
            &mut fx.storage,
            fx.leads.table_id,
            master,
            &RecordValues::new(),
            DuplicateHandling::Update,
        )
        .unwrap();

        assert_eq!(placement, Placement::Updated(master));
        let rows = fx.storage.get_records(fx.leads.table_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_record_id(), Some(master));
    }
}
