//! Keeps the canonical masterlist row of a logical record up to date with
//! edits made through any of its copies.

use std::collections::BTreeMap;

use tablesync_core::{field_value::FieldValue, ids::*, record::RecordValues};
use tablesync_storage::{Storage, StorageError};

use crate::context::Context;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Inserted,
    Updated,
    Unchanged,
}

fn sync_error(record_id: RecordId, source: StorageError) -> EngineError {
    EngineError::Sync {
        record_id: record_id.to_string(),
        source,
    }
}

/// Apply `changed` (keyed by field ids of `source_table_id`) to the masterlist
/// row `master_record_id`.
///
/// Columns the masterlist lacks are skipped. Cells not named in `changed`
/// keep their current masterlist value.
pub fn sync_masterlist_with_table<S: Storage + ?Sized>(
    ctx: &mut Context<'_, S>,
    master_record_id: RecordId,
    source_table_id: TableId,
    changed: &BTreeMap<FieldId, FieldValue>,
) -> Result<SyncOutcome, EngineError> {
    let masterlist_id = ctx.schema.masterlist_table_id()?;
    let translated = ctx.translate_cells(changed, masterlist_id);

    tracing::debug!(
        master_record_id = %master_record_id,
        source_table_id = %source_table_id,
        changed = changed.len(),
        mapped = translated.len(),
        "syncing masterlist"
    );

    merge_into_masterlist(&mut *ctx.storage, masterlist_id, master_record_id, translated)
}

/// Merge cells already keyed by masterlist field ids into the masterlist row,
/// inserting it under its exact id when missing.
///
/// A concurrent insert of the same id surfaces as a collision; it is retried
/// once as an update against the row the other writer created.
pub fn merge_into_masterlist<S: Storage + ?Sized>(
    storage: &mut S,
    masterlist_id: TableId,
    master_record_id: RecordId,
    cells: BTreeMap<FieldId, FieldValue>,
) -> Result<SyncOutcome, EngineError> {
    let incoming = RecordValues::from_cells(cells);

    let existing = storage
        .get_record(masterlist_id, master_record_id)
        .map_err(|e| sync_error(master_record_id, e))?;

    if let Some(existing) = existing {
        return update_merged(storage, masterlist_id, master_record_id, existing.values, &incoming);
    }

    match storage.insert_record(masterlist_id, master_record_id, &incoming) {
        Ok(_) => Ok(SyncOutcome::Inserted),
        Err(e) if e.is_collision() => {
            tracing::debug!(
                master_record_id = %master_record_id,
                "masterlist row created concurrently, merging instead"
            );
            let current = storage
                .get_record(masterlist_id, master_record_id)
                .map_err(|e| sync_error(master_record_id, e))?
                .ok_or_else(|| {
                    sync_error(
                        master_record_id,
                        StorageError::NotFound(format!("masterlist record {master_record_id}")),
                    )
                })?;
            update_merged(storage, masterlist_id, master_record_id, current.values, &incoming)
        }
        Err(e) => Err(sync_error(master_record_id, e)),
    }
}

fn update_merged<S: Storage + ?Sized>(
    storage: &mut S,
    masterlist_id: TableId,
    master_record_id: RecordId,
    current: RecordValues,
    incoming: &RecordValues,
) -> Result<SyncOutcome, EngineError> {
    let mut merged = current.clone();
    merged.merge(incoming);
    if merged == current {
        return Ok(SyncOutcome::Unchanged);
    }
    storage
        .update_record(masterlist_id, master_record_id, &merged)
        .map_err(|e| sync_error(master_record_id, e))?;
    Ok(SyncOutcome::Updated)
}
