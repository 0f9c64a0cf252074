use tablesync_core::{
    automation::Automation,
    ids::*,
    record::{Record, RecordValues},
    schema::{Base, Field, FieldOptions, FieldType, Table},
};
use tablesync_storage::{Storage, StorageError};

/// A [`Storage`] wrapper that injects write failures and races.
pub struct FlakyStorage<S> {
    inner: S,
    failing_table: Option<TableId>,
    racing_insert: Option<(TableId, RecordValues)>,
    collisions: usize,
}

impl<S: Storage> FlakyStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_table: None,
            racing_insert: None,
            collisions: 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make every record write to `table_id` fail until cleared.
    pub fn fail_writes_to(&mut self, table_id: Option<TableId>) {
        self.failing_table = table_id;
    }

    /// Before the next insert into `table_id`, let a concurrent writer insert
    /// `values` under the same id.
    pub fn race_next_insert(&mut self, table_id: TableId, values: RecordValues) {
        self.racing_insert = Some((table_id, values));
    }

    /// Inserts that hit a collision so far.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    fn check_writable(&self, table_id: TableId) -> Result<(), StorageError> {
        if self.failing_table == Some(table_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "injected write failure on table {table_id}"
            )));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for FlakyStorage<S> {
    fn create_base(&mut self, name: &str) -> Result<Base, StorageError> {
        self.inner.create_base(name)
    }

    fn create_table(
        &mut self,
        base_id: BaseId,
        name: &str,
        is_master_list: bool,
    ) -> Result<Table, StorageError> {
        self.inner.create_table(base_id, name, is_master_list)
    }

    fn create_field(
        &mut self,
        table_id: TableId,
        name: &str,
        field_type: FieldType,
        options: FieldOptions,
    ) -> Result<Field, StorageError> {
        self.inner.create_field(table_id, name, field_type, options)
    }

    fn get_table(&self, table_id: TableId) -> Result<Option<Table>, StorageError> {
        self.inner.get_table(table_id)
    }

    fn get_tables(&self, base_id: BaseId) -> Result<Vec<Table>, StorageError> {
        self.inner.get_tables(base_id)
    }

    fn get_fields(&self, table_id: TableId) -> Result<Vec<Field>, StorageError> {
        self.inner.get_fields(table_id)
    }

    fn get_all_fields(&self, base_id: BaseId) -> Result<Vec<Field>, StorageError> {
        self.inner.get_all_fields(base_id)
    }

    fn get_record(
        &self,
        table_id: TableId,
        record_id: RecordId,
    ) -> Result<Option<Record>, StorageError> {
        self.inner.get_record(table_id, record_id)
    }

    fn get_records(&self, table_id: TableId) -> Result<Vec<Record>, StorageError> {
        self.inner.get_records(table_id)
    }

    fn find_records_by_source(
        &self,
        table_id: TableId,
        master_id: RecordId,
    ) -> Result<Vec<Record>, StorageError> {
        self.inner.find_records_by_source(table_id, master_id)
    }

    fn insert_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError> {
        self.check_writable(table_id)?;
        if self
            .racing_insert
            .as_ref()
            .is_some_and(|(racing_table, _)| *racing_table == table_id)
        {
            if let Some((_, racing_values)) = self.racing_insert.take() {
                self.inner.insert_record(table_id, record_id, &racing_values)?;
            }
        }
        let result = self.inner.insert_record(table_id, record_id, values);
        if result.as_ref().is_err_and(StorageError::is_collision) {
            self.collisions += 1;
        }
        result
    }

    fn update_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError> {
        self.check_writable(table_id)?;
        self.inner.update_record(table_id, record_id, values)
    }

    fn delete_records(
        &mut self,
        table_id: TableId,
        record_ids: &[RecordId],
    ) -> Result<usize, StorageError> {
        self.check_writable(table_id)?;
        self.inner.delete_records(table_id, record_ids)
    }

    fn insert_automation(&mut self, automation: &Automation) -> Result<(), StorageError> {
        self.inner.insert_automation(automation)
    }

    fn update_automation(&mut self, automation: &Automation) -> Result<(), StorageError> {
        self.inner.update_automation(automation)
    }

    fn delete_automation(&mut self, automation_id: AutomationId) -> Result<(), StorageError> {
        self.inner.delete_automation(automation_id)
    }

    fn get_automations(&self, base_id: BaseId) -> Result<Vec<Automation>, StorageError> {
        self.inner.get_automations(base_id)
    }
}
