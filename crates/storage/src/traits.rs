use tablesync_core::{
    automation::Automation,
    ids::*,
    record::{Record, RecordValues},
    schema::{Base, Field, FieldOptions, FieldType, Table},
};

use crate::error::StorageError;

/// Generic row store the engine runs against.
///
/// Record identity is `(table, record_id)`: a legacy shadow row may share its
/// id with the masterlist row it was copied from.
pub trait Storage {
    // Schema

    fn create_base(&mut self, name: &str) -> Result<Base, StorageError>;

    fn create_table(
        &mut self,
        base_id: BaseId,
        name: &str,
        is_master_list: bool,
    ) -> Result<Table, StorageError>;

    fn create_field(
        &mut self,
        table_id: TableId,
        name: &str,
        field_type: FieldType,
        options: FieldOptions,
    ) -> Result<Field, StorageError>;

    fn get_table(&self, table_id: TableId) -> Result<Option<Table>, StorageError>;

    /// Tables of a base, ordered by position.
    fn get_tables(&self, base_id: BaseId) -> Result<Vec<Table>, StorageError>;

    /// Fields of a table, ordered by position.
    fn get_fields(&self, table_id: TableId) -> Result<Vec<Field>, StorageError>;

    /// Fields of every table in a base.
    fn get_all_fields(&self, base_id: BaseId) -> Result<Vec<Field>, StorageError>;

    // Records

    fn get_record(
        &self,
        table_id: TableId,
        record_id: RecordId,
    ) -> Result<Option<Record>, StorageError>;

    /// All records of a table in stable storage order.
    fn get_records(&self, table_id: TableId) -> Result<Vec<Record>, StorageError>;

    /// Records of a table whose back-reference equals `master_id`, in stable
    /// storage order.
    fn find_records_by_source(
        &self,
        table_id: TableId,
        master_id: RecordId,
    ) -> Result<Vec<Record>, StorageError>;

    /// Insert with an exact id. Fails with `RecordCollision` if the table
    /// already holds that id.
    fn insert_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError>;

    /// Replace the stored values. Fails with `NotFound` if absent.
    fn update_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError>;

    fn delete_records(
        &mut self,
        table_id: TableId,
        record_ids: &[RecordId],
    ) -> Result<usize, StorageError>;

    /// Update when `record_id` names an existing row, insert otherwise.
    /// A fresh id is generated when none is given.
    fn upsert_record(
        &mut self,
        table_id: TableId,
        record_id: Option<RecordId>,
        values: &RecordValues,
    ) -> Result<Record, StorageError> {
        match record_id {
            Some(id) if self.get_record(table_id, id)?.is_some() => {
                self.update_record(table_id, id, values)
            }
            Some(id) => self.insert_record(table_id, id, values),
            None => self.insert_record(table_id, RecordId::new(), values),
        }
    }

    // Automations

    fn insert_automation(&mut self, automation: &Automation) -> Result<(), StorageError>;

    fn update_automation(&mut self, automation: &Automation) -> Result<(), StorageError>;

    fn delete_automation(&mut self, automation_id: AutomationId) -> Result<(), StorageError>;

    /// Automations of a base in creation order.
    fn get_automations(&self, base_id: BaseId) -> Result<Vec<Automation>, StorageError>;
}
