use std::collections::BTreeMap;
use std::error::Error;

use tablesync_core::{
    automation::{Action, Automation, Trigger},
    field_value::FieldValue,
    ids::*,
    record::{Record, RecordValues},
    schema::{FieldOptions, FieldType},
};
use tablesync_engine::{
    BaseSchema, Engine, EngineConfig, FieldCorrespondence, MutationReport, mapper,
};
use tablesync_storage::{SqliteStorage, Storage};
use tempfile::TempDir;

type TestResult<T> = Result<T, Box<dyn Error>>;

/// One base behind an [`Engine`], addressed by table and column names.
pub struct TestBase<S: Storage = SqliteStorage> {
    pub engine: Engine<S>,
    pub base_id: BaseId,
    _dir: Option<TempDir>,
}

impl TestBase<SqliteStorage> {
    pub fn new() -> TestResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> TestResult<Self> {
        Self::from_storage(SqliteStorage::open_in_memory()?, config)
    }

    /// Backed by a database file in a temporary directory.
    pub fn on_disk() -> TestResult<Self> {
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(&db_path(&dir)?)?;
        let mut base = Self::from_storage(storage, EngineConfig::default())?;
        base._dir = Some(dir);
        Ok(base)
    }

    /// Close the database and open a fresh engine over the same file.
    pub fn reopen(self) -> TestResult<Self> {
        let dir = self._dir.ok_or("only on-disk bases can be reopened")?;
        let config = self.engine.config().clone();
        drop(self.engine.into_storage());
        let storage = SqliteStorage::open(&db_path(&dir)?)?;
        Ok(Self {
            engine: Engine::with_config(storage, config),
            base_id: self.base_id,
            _dir: Some(dir),
        })
    }
}

fn db_path(dir: &TempDir) -> TestResult<String> {
    let path = dir.path().join("base.db");
    Ok(path.to_str().ok_or("temp path is not utf-8")?.to_owned())
}

impl<S: Storage> TestBase<S> {
    pub fn from_storage(mut storage: S, config: EngineConfig) -> TestResult<Self> {
        let base = storage.create_base("Test")?;
        Ok(Self {
            engine: Engine::with_config(storage, config),
            base_id: base.base_id,
            _dir: None,
        })
    }

    pub fn with_correspondence(self, correspondence: impl FieldCorrespondence + 'static) -> Self {
        Self {
            engine: self.engine.with_correspondence(correspondence),
            base_id: self.base_id,
            _dir: self._dir,
        }
    }

    pub fn schema(&self) -> TestResult<BaseSchema> {
        Ok(self.engine.schema(self.base_id)?)
    }

    // Schema

    pub fn add_table(&mut self, name: &str, is_master_list: bool) -> TestResult<TableId> {
        let table = self
            .engine
            .storage_mut()
            .create_table(self.base_id, name, is_master_list)?;
        Ok(table.table_id)
    }

    pub fn add_field(&mut self, table: &str, name: &str, field_type: FieldType) -> TestResult<FieldId> {
        let table_id = self.table_id(table)?;
        let field = self.engine.storage_mut().create_field(
            table_id,
            name,
            field_type,
            FieldOptions::default(),
        )?;
        Ok(field.field_id)
    }

    /// Single-select column with `(key, label)` choices.
    pub fn add_select_field(
        &mut self,
        table: &str,
        name: &str,
        choices: &[(&str, &str)],
    ) -> TestResult<FieldId> {
        let table_id = self.table_id(table)?;
        let field = self.engine.storage_mut().create_field(
            table_id,
            name,
            FieldType::SingleSelect,
            FieldOptions::with_choices(choices.iter().copied()),
        )?;
        Ok(field.field_id)
    }

    pub fn table_id(&self, name: &str) -> TestResult<TableId> {
        let schema = self.schema()?;
        let table = schema
            .table_by_name(name)
            .ok_or_else(|| format!("no table {name:?}"))?;
        Ok(table.table_id)
    }

    pub fn field_id(&self, table: &str, name: &str) -> TestResult<FieldId> {
        let table_id = self.table_id(table)?;
        let schema = self.schema()?;
        let field = schema
            .resolve_field_by_name(table_id, name)
            .ok_or_else(|| format!("no field {name:?} in {table:?}"))?;
        Ok(field.field_id)
    }

    /// Option key of `label` in a select column.
    pub fn option_key(&self, table: &str, field: &str, label: &str) -> TestResult<String> {
        let table_id = self.table_id(table)?;
        let schema = self.schema()?;
        let field = schema
            .resolve_field_by_name(table_id, field)
            .ok_or_else(|| format!("no field {field:?} in {table:?}"))?;
        let key = field
            .options
            .key_for_label(label)
            .ok_or_else(|| format!("no option {label:?} in {table}.{}", field.name))?;
        Ok(key.to_string())
    }

    fn cells(
        &self,
        table: &str,
        values: Vec<(&str, FieldValue)>,
    ) -> TestResult<BTreeMap<FieldId, FieldValue>> {
        let mut cells = BTreeMap::new();
        for (name, value) in values {
            cells.insert(self.field_id(table, name)?, value);
        }
        Ok(cells)
    }

    // Records

    pub fn create_record(
        &mut self,
        table: &str,
        values: Vec<(&str, FieldValue)>,
    ) -> TestResult<(RecordId, MutationReport)> {
        let table_id = self.table_id(table)?;
        let cells = self.cells(table, values)?;
        let report = self
            .engine
            .create_record(table_id, RecordValues::from_cells(cells))?;
        Ok((report.record_id, report))
    }

    pub fn set_cells(
        &mut self,
        table: &str,
        record_id: RecordId,
        values: Vec<(&str, FieldValue)>,
    ) -> TestResult<MutationReport> {
        let table_id = self.table_id(table)?;
        let cells = self.cells(table, values)?;
        Ok(self.engine.update_cells(table_id, record_id, cells)?)
    }

    pub fn set_cell(
        &mut self,
        table: &str,
        record_id: RecordId,
        field: &str,
        value: FieldValue,
    ) -> TestResult<MutationReport> {
        self.set_cells(table, record_id, vec![(field, value)])
    }

    /// Set a select cell by option label.
    pub fn choose(
        &mut self,
        table: &str,
        record_id: RecordId,
        field: &str,
        label: &str,
    ) -> TestResult<MutationReport> {
        let key = self.option_key(table, field, label)?;
        self.set_cell(table, record_id, field, FieldValue::Select(key))
    }

    pub fn delete_record(&mut self, table: &str, record_id: RecordId) -> TestResult<usize> {
        let table_id = self.table_id(table)?;
        Ok(self.engine.delete_record(table_id, record_id)?)
    }

    pub fn records_in(&self, table: &str) -> TestResult<Vec<Record>> {
        let table_id = self.table_id(table)?;
        Ok(self.engine.storage().get_records(table_id)?)
    }

    pub fn record(&self, table: &str, record_id: RecordId) -> TestResult<Option<Record>> {
        let table_id = self.table_id(table)?;
        Ok(self.engine.get_record(table_id, record_id)?)
    }

    /// Shadow copies of `master_id` in `table`.
    pub fn copies_of(&self, table: &str, master_id: RecordId) -> TestResult<Vec<Record>> {
        let table_id = self.table_id(table)?;
        Ok(self.engine.storage().find_records_by_source(table_id, master_id)?)
    }

    pub fn cell(&self, table: &str, record_id: RecordId, field: &str) -> TestResult<Option<FieldValue>> {
        let field_id = self.field_id(table, field)?;
        Ok(self
            .record(table, record_id)?
            .and_then(|r| r.values.get(field_id).cloned()))
    }

    /// Display form of a cell, with select keys shown as labels.
    pub fn label(&self, table: &str, record_id: RecordId, field: &str) -> TestResult<Option<String>> {
        let table_id = self.table_id(table)?;
        let schema = self.schema()?;
        let field = schema
            .resolve_field_by_name(table_id, field)
            .ok_or_else(|| format!("no field {field:?} in {table:?}"))?;
        let value = self
            .record(table, record_id)?
            .and_then(|r| r.values.get(field.field_id).cloned());
        Ok(value.and_then(|v| mapper::display_value(&v, field)))
    }

    // Automations

    pub fn add_automation(&mut self, name: &str, trigger: Trigger, action: Action) -> TestResult<Automation> {
        let automation = Automation::new(self.base_id, name, trigger, action);
        self.engine.create_automation(&automation)?;
        Ok(automation)
    }

    /// BLAKE3 digest over every record of every table, in a fixed order.
    pub fn state_digest(&self) -> TestResult<[u8; 32]> {
        let schema = self.schema()?;
        let mut hasher = blake3::Hasher::new();
        for table in schema.tables() {
            hasher.update(table.name.as_bytes());
            let mut records = self.engine.storage().get_records(table.table_id)?;
            records.sort_by_key(|r| r.record_id);
            for record in records {
                hasher.update(record.record_id.to_string().as_bytes());
                hasher.update(record.values.to_json()?.to_string().as_bytes());
            }
        }
        Ok(*hasher.finalize().as_bytes())
    }
}
