mod common;

use common::{crm, move_done, text, TestResult};
use tablesync_core::{field_value::FieldValue, record::RecordValues};
use tablesync_engine::{EngineConfig, SyncOutcome, SyncStatus};
use tablesync_harness::{FlakyStorage, TestBase};
use tablesync_storage::SqliteStorage;

fn flaky_base() -> Result<TestBase<FlakyStorage<SqliteStorage>>, Box<dyn std::error::Error>> {
    let storage = FlakyStorage::new(SqliteStorage::open_in_memory()?);
    let mut base = TestBase::from_storage(storage, EngineConfig::default())?;
    crm(&mut base)?;
    Ok(base)
}

// ============================================================================
// Sync through copies
// ============================================================================

#[test]
fn masterlist_keeps_columns_the_copy_lacks() -> TestResult {
    let mut base = TestBase::new()?;
    crm(&mut base)?;
    move_done(&mut base)?;

    let (ada, _) = base.create_record(
        "Contacts",
        vec![
            ("Name", text("Ada")),
            ("Email", text("ada@example.com")),
            ("Phone", text("555-0100")),
        ],
    )?;
    base.choose("Contacts", ada, "Status", "Done")?;
    let copy = base.copies_of("Done Items", ada)?[0].record_id;

    base.set_cells(
        "Done Items",
        copy,
        vec![("Name", text("Ada Lovelace")), ("Completed", FieldValue::Date("2024-05-01".into()))],
    )?;

    assert_eq!(base.cell("Contacts", ada, "Name")?, Some(text("Ada Lovelace")));
    assert_eq!(base.cell("Contacts", ada, "Email")?, Some(text("ada@example.com")));
    assert_eq!(base.cell("Contacts", ada, "Phone")?, Some(text("555-0100")));
    Ok(())
}

#[test]
fn select_values_are_rekeyed_into_masterlist() -> TestResult {
    let mut base = TestBase::new()?;
    crm(&mut base)?;

    let (lead, _) = base.create_record("Leads", vec![("Name", text("Grace"))])?;
    let report = base.choose("Leads", lead, "Status", "In Progress")?;
    assert_eq!(report.sync, SyncStatus::Synced(SyncOutcome::Updated));
    assert_eq!(
        base.cell("Contacts", lead, "Status")?,
        Some(FieldValue::Select("c_prog".into()))
    );

    // repeating the same edit leaves the masterlist row alone
    let report = base.choose("Leads", lead, "Status", "In Progress")?;
    assert_eq!(report.sync, SyncStatus::Synced(SyncOutcome::Unchanged));
    Ok(())
}

#[test]
fn deleting_masterlist_row_removes_copies() -> TestResult {
    let mut base = TestBase::new()?;
    crm(&mut base)?;
    move_done(&mut base)?;

    let (ada, _) = base.create_record("Contacts", vec![("Name", text("Ada"))])?;
    base.choose("Contacts", ada, "Status", "Done")?;
    assert_eq!(base.copies_of("Done Items", ada)?.len(), 1);

    assert_eq!(base.delete_record("Contacts", ada)?, 2);
    assert!(base.records_in("Done Items")?.is_empty());
    assert!(base.records_in("Contacts")?.is_empty());
    Ok(())
}

#[test]
fn deleting_a_copy_keeps_masterlist_row() -> TestResult {
    let mut base = TestBase::new()?;
    crm(&mut base)?;
    move_done(&mut base)?;

    let (ada, _) = base.create_record("Contacts", vec![("Name", text("Ada"))])?;
    base.choose("Contacts", ada, "Status", "Done")?;
    let copy = base.copies_of("Done Items", ada)?[0].record_id;

    assert_eq!(base.delete_record("Done Items", copy)?, 1);
    assert!(base.record("Contacts", ada)?.is_some());
    Ok(())
}

// ============================================================================
// Fault injection
// ============================================================================

#[test]
fn sync_failure_leaves_primary_write() -> TestResult {
    let mut base = flaky_base()?;
    let contacts = base.table_id("Contacts")?;
    base.engine.storage_mut().fail_writes_to(Some(contacts));

    let (lead, report) = base.create_record("Leads", vec![("Name", text("Grace"))])?;
    assert!(matches!(report.sync, SyncStatus::Failed(_)));
    assert_eq!(base.cell("Leads", lead, "Name")?, Some(text("Grace")));
    assert!(base.records_in("Contacts")?.is_empty());

    // once writes recover the next edit brings the masterlist up to date
    base.engine.storage_mut().fail_writes_to(None);
    let report = base.set_cell("Leads", lead, "Email", text("grace@example.com"))?;
    assert_eq!(report.sync, SyncStatus::Synced(SyncOutcome::Inserted));
    assert_eq!(base.cell("Contacts", lead, "Email")?, Some(text("grace@example.com")));
    Ok(())
}

#[test]
fn concurrent_masterlist_insert_becomes_update() -> TestResult {
    let mut base = flaky_base()?;
    let contacts = base.table_id("Contacts")?;
    let phone = base.field_id("Contacts", "Phone")?;
    base.engine.storage_mut().race_next_insert(
        contacts,
        RecordValues::from_cells([(phone, text("555-0199"))]),
    );

    let (lead, report) = base.create_record("Leads", vec![("Name", text("Grace"))])?;
    assert_eq!(report.sync, SyncStatus::Synced(SyncOutcome::Updated));
    assert_eq!(base.engine.storage().collisions(), 1);

    let rows = base.records_in("Contacts")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(base.cell("Contacts", lead, "Name")?, Some(text("Grace")));
    assert_eq!(base.cell("Contacts", lead, "Phone")?, Some(text("555-0199")));
    Ok(())
}

#[test]
fn failing_target_table_reports_failed_run() -> TestResult {
    let mut base = flaky_base()?;
    move_done(&mut base)?;
    let done = base.table_id("Done Items")?;
    base.engine.storage_mut().fail_writes_to(Some(done));

    let (ada, _) = base.create_record("Contacts", vec![("Name", text("Ada"))])?;
    let report = base.choose("Contacts", ada, "Status", "Done")?;
    assert_eq!(report.failures().count(), 1);
    assert_eq!(base.label("Contacts", ada, "Status")?, Some("Done".into()));
    assert!(base.records_in("Done Items")?.is_empty());
    Ok(())
}
