mod common;

use common::{crm, move_done, text};
use proptest::prelude::*;
use tablesync_core::{Action, ActionType, Condition, FieldValue, Trigger, ids::RecordId};
use tablesync_harness::TestBase;

const LABELS: [&str; 3] = ["To Do", "In Progress", "Done"];
const TABLES: [&str; 3] = ["Contacts", "Leads", "Done Items"];

/// Where an edit lands: the masterlist row, or its copy in another table
/// when one exists.
fn edit_target(base: &TestBase, table: &str, master: RecordId) -> (String, RecordId) {
    if table == "Contacts" {
        return ("Contacts".into(), master);
    }
    match base.copies_of(table, master).unwrap().first() {
        Some(copy) => (table.into(), copy.record_id),
        None => ("Contacts".into(), master),
    }
}

fn seeded() -> (TestBase, RecordId) {
    let mut base = TestBase::new().unwrap();
    crm(&mut base).unwrap();
    base.add_automation(
        "Working leads",
        Trigger::field_change("Status")
            .in_table("Contacts")
            .when(Condition::equals(FieldValue::Text("In Progress".into()))),
        Action::new(ActionType::CopyToTable, "Leads"),
    )
    .unwrap();
    move_done(&mut base).unwrap();
    let (ada, _) = base
        .create_record("Contacts", vec![("Name", text("Ada"))])
        .unwrap();
    (base, ada)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn at_most_one_copy_per_table(
        edits in proptest::collection::vec((0usize..3, 0usize..3), 1..12),
    ) {
        let (mut base, ada) = seeded();

        for (table, label) in edits {
            let (table, record) = edit_target(&base, TABLES[table], ada);
            base.choose(&table, record, "Status", LABELS[label]).unwrap();

            prop_assert!(base.record("Contacts", ada).unwrap().is_some());
            for other in ["Leads", "Done Items"] {
                let copies = base.copies_of(other, ada).unwrap();
                prop_assert!(copies.len() <= 1, "{} copies in {}", copies.len(), other);
            }
        }
    }

    #[test]
    fn edits_through_copies_reach_masterlist(
        names in proptest::collection::vec("[A-Za-z]{1,12}", 1..6),
    ) {
        let (mut base, ada) = seeded();
        base.choose("Contacts", ada, "Status", "Done").unwrap();
        let copy = base.copies_of("Done Items", ada).unwrap()[0].record_id;

        for name in names {
            base.set_cell("Done Items", copy, "Name", text(&name)).unwrap();
            prop_assert_eq!(base.cell("Contacts", ada, "Name").unwrap(), Some(text(&name)));
            prop_assert_eq!(base.copies_of("Done Items", ada).unwrap().len(), 1);
        }
    }

    #[test]
    fn replaying_an_edit_is_idempotent(label in 0usize..3) {
        let (mut base, ada) = seeded();
        base.choose("Contacts", ada, "Status", LABELS[label]).unwrap();
        let once = base.state_digest().unwrap();
        base.choose("Contacts", ada, "Status", LABELS[label]).unwrap();
        prop_assert_eq!(base.state_digest().unwrap(), once);
    }
}
