#![allow(dead_code)]

use tablesync_core::{
    field_value::FieldValue, schema::FieldType, Action, ActionType, Automation, Condition,
    Trigger,
};
use tablesync_harness::TestBase;
use tablesync_storage::Storage;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Contacts (masterlist), Leads and Done Items. Each table keys its Status
/// options differently.
pub fn crm<S: Storage>(base: &mut TestBase<S>) -> Result<(), Box<dyn std::error::Error>> {
    base.add_table("Contacts", true)?;
    base.add_table("Leads", false)?;
    base.add_table("Done Items", false)?;

    base.add_field("Contacts", "Name", FieldType::Text)?;
    base.add_field("Contacts", "Email", FieldType::Email)?;
    base.add_field("Contacts", "Phone", FieldType::Phone)?;
    base.add_select_field(
        "Contacts",
        "Status",
        &[("c_todo", "To Do"), ("c_prog", "In Progress"), ("c_done", "Done")],
    )?;

    base.add_field("Leads", "Name", FieldType::Text)?;
    base.add_field("Leads", "Email", FieldType::Email)?;
    base.add_select_field(
        "Leads",
        "Status",
        &[("l_todo", "To Do"), ("l_prog", "In Progress"), ("l_done", "Done")],
    )?;

    base.add_field("Done Items", "Name", FieldType::Text)?;
    base.add_field("Done Items", "Completed", FieldType::Date)?;
    base.add_select_field(
        "Done Items",
        "Status",
        &[("d_todo", "To Do"), ("d_prog", "In Progress"), ("d_done", "Done")],
    )?;
    Ok(())
}

/// Move to Done Items once Status reads "Done".
pub fn move_done<S: Storage>(base: &mut TestBase<S>) -> Result<Automation, Box<dyn std::error::Error>> {
    base.add_automation(
        "Move done",
        Trigger::field_change("Status").when(Condition::equals(FieldValue::Text("Done".into()))),
        Action::new(ActionType::MoveToTable, "Done Items"),
    )
}

pub fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.into())
}
