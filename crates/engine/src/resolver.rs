//! Table and field metadata for one base, and the name-based correspondence
//! between fields of different tables.
//!
//! Field ids are table-local. The only link between "Status" in one table and
//! "Status" in another is the column name, so every cross-table lookup goes
//! through a [`FieldCorrespondence`].

use tablesync_core::{
    ids::*,
    record::Record,
    schema::{Field, Table},
};
use tablesync_storage::Storage;

use crate::error::EngineError;

/// Snapshot of the tables and fields of a base.
#[derive(Debug, Clone)]
pub struct BaseSchema {
    base_id: BaseId,
    tables: Vec<Table>,
    fields: Vec<Field>,
}

impl BaseSchema {
    pub fn load<S: Storage + ?Sized>(storage: &S, base_id: BaseId) -> Result<Self, EngineError> {
        let tables = storage.get_tables(base_id)?;
        let fields = storage.get_all_fields(base_id)?;
        Ok(Self::from_parts(base_id, tables, fields))
    }

    pub fn from_parts(base_id: BaseId, tables: Vec<Table>, fields: Vec<Field>) -> Self {
        Self {
            base_id,
            tables,
            fields,
        }
    }

    pub fn base_id(&self) -> BaseId {
        self.base_id
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, table_id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.table_id == table_id)
    }

    /// Table names are matched ignoring case, exact spelling first.
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| {
                let wanted = name.to_lowercase();
                self.tables.iter().find(|t| t.name.to_lowercase() == wanted)
            })
    }

    pub fn masterlist(&self) -> Result<&Table, EngineError> {
        self.tables.iter().find(|t| t.is_master_list).ok_or_else(|| {
            EngineError::Configuration(format!("base {} has no masterlist table", self.base_id))
        })
    }

    pub fn masterlist_table_id(&self) -> Result<TableId, EngineError> {
        self.masterlist().map(|t| t.table_id)
    }

    pub fn is_masterlist(&self, table_id: TableId) -> bool {
        self.table(table_id).is_some_and(|t| t.is_master_list)
    }

    pub fn resolve_all_fields_across_base(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_of(&self, table_id: TableId) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.table_id == table_id)
    }

    /// Look a field up by id anywhere in the base.
    pub fn field(&self, field_id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    /// Exact, case-sensitive name lookup within one table.
    pub fn resolve_field_by_name(&self, table_id: TableId, name: &str) -> Option<&Field> {
        self.fields_of(table_id).find(|f| f.name == name)
    }

    fn resolve_field_ignore_case(&self, table_id: TableId, name: &str) -> Option<&Field> {
        let wanted = name.to_lowercase();
        self.fields_of(table_id)
            .find(|f| f.name.to_lowercase() == wanted)
    }
}

/// Decides which field of a table stands for a named column of another.
pub trait FieldCorrespondence {
    fn resolve<'s>(&self, schema: &'s BaseSchema, table_id: TableId, name: &str)
    -> Option<&'s Field>;

    /// Whether `field` is the column called `name`.
    fn matches_name(&self, field: &Field, name: &str) -> bool;
}

/// Correspondence by display name: exact match first, then an optional
/// case-insensitive fallback.
#[derive(Debug, Clone, Copy)]
pub struct NameCorrespondence {
    pub case_insensitive_fallback: bool,
}

impl Default for NameCorrespondence {
    fn default() -> Self {
        Self {
            case_insensitive_fallback: true,
        }
    }
}

impl FieldCorrespondence for NameCorrespondence {
    fn resolve<'s>(
        &self,
        schema: &'s BaseSchema,
        table_id: TableId,
        name: &str,
    ) -> Option<&'s Field> {
        schema.resolve_field_by_name(table_id, name).or_else(|| {
            if self.case_insensitive_fallback {
                schema.resolve_field_ignore_case(table_id, name)
            } else {
                None
            }
        })
    }

    fn matches_name(&self, field: &Field, name: &str) -> bool {
        field.name == name
            || (self.case_insensitive_fallback && field.name.to_lowercase() == name.to_lowercase())
    }
}

/// Where a record sits relative to its logical identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPosition {
    /// The canonical row in the masterlist table.
    Master,
    /// A copy in another table pointing at its masterlist row.
    Shadow { master_id: RecordId },
    /// A row outside the masterlist with no back-reference; its own id is
    /// its logical id.
    Home,
}

pub fn record_position(schema: &BaseSchema, record: &Record) -> RecordPosition {
    if schema.is_masterlist(record.table_id) {
        return RecordPosition::Master;
    }
    match record.source_record_id() {
        Some(master_id) => RecordPosition::Shadow { master_id },
        None => RecordPosition::Home,
    }
}

/// Logical (masterlist) id of any record.
pub fn master_record_id(schema: &BaseSchema, record: &Record) -> RecordId {
    match record_position(schema, record) {
        RecordPosition::Shadow { master_id } => master_id,
        RecordPosition::Master | RecordPosition::Home => record.record_id,
    }
}
