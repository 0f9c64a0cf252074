use std::collections::BTreeMap;

use tablesync_core::{field_value::FieldValue, ids::*};
use tablesync_storage::Storage;

use crate::mapper::map_value;
use crate::resolver::{BaseSchema, FieldCorrespondence};

/// Everything one automation pass needs: the store, a schema snapshot of the
/// base and the field correspondence in use.
pub struct Context<'a, S: Storage + ?Sized> {
    pub storage: &'a mut S,
    pub schema: &'a BaseSchema,
    pub correspondence: &'a dyn FieldCorrespondence,
}

impl<'a, S: Storage + ?Sized> Context<'a, S> {
    pub fn new(
        storage: &'a mut S,
        schema: &'a BaseSchema,
        correspondence: &'a dyn FieldCorrespondence,
    ) -> Self {
        Self {
            storage,
            schema,
            correspondence,
        }
    }

    /// Re-key cells into `target_table`'s field ids by column name,
    /// translating each value. Cells whose column has no counterpart in the
    /// target, or whose value the target column cannot hold, are left out.
    pub fn translate_cells(
        &self,
        cells: &BTreeMap<FieldId, FieldValue>,
        target_table: TableId,
    ) -> BTreeMap<FieldId, FieldValue> {
        let mut out = BTreeMap::new();
        for (field_id, value) in cells {
            let Some(source) = self.schema.field(*field_id) else {
                continue;
            };
            let Some(target) = self
                .correspondence
                .resolve(self.schema, target_table, &source.name)
            else {
                continue;
            };
            let mapped = map_value(value, source, target);
            if !mapped.conforms_to(target.field_type) {
                tracing::debug!(
                    field = %source.name,
                    value_type = mapped.type_name(),
                    target_type = target.field_type.as_str(),
                    "column types differ, cell not carried over"
                );
                continue;
            }
            out.insert(target.field_id, mapped);
        }
        out
    }
}

/// A record addressed by table and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub table_id: TableId,
    pub record_id: RecordId,
}

impl RecordLocation {
    pub fn new(table_id: TableId, record_id: RecordId) -> Self {
        Self {
            table_id,
            record_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NameCorrespondence;
    use tablesync_core::{Field, FieldOptions, FieldType, Table};
    use tablesync_storage::SqliteStorage;

    fn table(base_id: BaseId, name: &str, master: bool) -> Table {
        Table {
            table_id: TableId::new(),
            base_id,
            name: name.into(),
            position: 0,
            is_master_list: master,
        }
    }

    fn field(table: &Table, name: &str, field_type: FieldType) -> Field {
        Field {
            field_id: FieldId::new(),
            table_id: table.table_id,
            name: name.into(),
            field_type,
            position: 0,
            options: FieldOptions::default(),
        }
    }

    #[test]
    fn translate_skips_missing_and_mistyped_columns() {
        let base_id = BaseId::new();
        let contacts = table(base_id, "Contacts", true);
        let leads = table(base_id, "Leads", false);
        let c_name = field(&contacts, "Name", FieldType::Text);
        let c_score = field(&contacts, "Score", FieldType::Number);
        let c_notes = field(&contacts, "Notes", FieldType::Text);
        let l_name = field(&leads, "name", FieldType::Text);
        let l_score = field(&leads, "Score", FieldType::Text);
        let schema = BaseSchema::from_parts(
            base_id,
            vec![contacts, leads.clone()],
            vec![c_name.clone(), c_score.clone(), c_notes.clone(), l_name.clone(), l_score],
        );

        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let corr = NameCorrespondence::default();
        let ctx = Context::new(&mut storage, &schema, &corr);

        let cells = BTreeMap::from([
            (c_name.field_id, FieldValue::Text("Ada".into())),
            (c_score.field_id, FieldValue::Number(3.0)),
            (c_notes.field_id, FieldValue::Text("no column".into())),
        ]);
        let translated = ctx.translate_cells(&cells, leads.table_id);

        assert_eq!(
            translated,
            BTreeMap::from([(l_name.field_id, FieldValue::Text("Ada".into()))])
        );
    }
}
