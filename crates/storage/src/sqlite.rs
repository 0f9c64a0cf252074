use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};

use tablesync_core::{
    automation::{Action, Automation, Trigger},
    ids::*,
    record::{Record, RecordValues},
    schema::{Base, Field, FieldOptions, FieldType, Table},
};

use crate::error::StorageError;
use crate::traits::Storage;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn encode_def<T: serde::Serialize>(def: &Option<T>) -> Result<Option<Vec<u8>>, StorageError> {
    def.as_ref()
        .map(|d| rmp_serde::to_vec_named(d).map_err(|e| StorageError::Serialization(e.to_string())))
        .transpose()
}

fn decode_def<T: serde::de::DeserializeOwned>(
    bytes: Option<Vec<u8>>,
) -> Result<Option<T>, StorageError> {
    bytes
        .map(|b| rmp_serde::from_slice(&b).map_err(|e| StorageError::Serialization(e.to_string())))
        .transpose()
}

fn decode_values(json: &str) -> Result<RecordValues, StorageError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(RecordValues::from_json(&value)?)
}

fn encode_values(values: &RecordValues) -> Result<String, StorageError> {
    Ok(values.to_json()?.to_string())
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<i32, StorageError> {
        let version = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Every cell must name a column of the table and carry a value of the
    /// column's type.
    fn validate_values(
        &self,
        table_id: TableId,
        values: &RecordValues,
    ) -> Result<(), StorageError> {
        if self.get_table(table_id)?.is_none() {
            return Err(StorageError::NotFound(format!("table {table_id}")));
        }
        let fields: HashMap<FieldId, Field> = self
            .get_fields(table_id)?
            .into_iter()
            .map(|f| (f.field_id, f))
            .collect();

        for (field_id, value) in &values.cells {
            let field = fields.get(field_id).ok_or_else(|| {
                StorageError::ConstraintViolation(format!(
                    "field {field_id} is not a column of table {table_id}"
                ))
            })?;
            if !value.conforms_to(field.field_type) {
                return Err(StorageError::ConstraintViolation(format!(
                    "{} value does not fit {} column '{}'",
                    value.type_name(),
                    field.field_type.as_str(),
                    field.name
                )));
            }
        }
        Ok(())
    }

    fn read_fields(&self, sql: &str, key: &[u8]) -> Result<Vec<Field>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params![key], |row| {
            let field_id_bytes: Vec<u8> = row.get(0)?;
            let table_id_bytes: Vec<u8> = row.get(1)?;
            let name: String = row.get(2)?;
            let field_type: String = row.get(3)?;
            let position: i64 = row.get(4)?;
            let options: String = row.get(5)?;
            Ok((field_id_bytes, table_id_bytes, name, field_type, position, options))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (field_id_bytes, table_id_bytes, name, field_type, position, options) = row?;
            let options: FieldOptions = serde_json::from_str(&options)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            result.push(Field {
                field_id: FieldId::from_bytes(to_array::<16>(field_id_bytes, "field_id")?),
                table_id: TableId::from_bytes(to_array::<16>(table_id_bytes, "table_id")?),
                name,
                field_type: FieldType::parse(&field_type)?,
                position,
                options,
            });
        }
        Ok(result)
    }

    fn read_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        table_id: TableId,
    ) -> Result<Vec<Record>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let record_id_bytes: Vec<u8> = row.get(0)?;
            let values_json: String = row.get(1)?;
            Ok((record_id_bytes, values_json))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (record_id_bytes, values_json) = row?;
            result.push(Record {
                record_id: RecordId::from_bytes(to_array::<16>(record_id_bytes, "record_id")?),
                table_id,
                values: decode_values(&values_json)?,
            });
        }
        Ok(result)
    }
}

impl Storage for SqliteStorage {
    fn create_base(&mut self, name: &str) -> Result<Base, StorageError> {
        let base_id = BaseId::new();
        self.conn.execute(
            "INSERT INTO bases (base_id, name) VALUES (?1, ?2)",
            rusqlite::params![base_id.as_bytes().as_slice(), name],
        )?;
        Ok(Base {
            base_id,
            name: name.to_string(),
        })
    }

    fn create_table(
        &mut self,
        base_id: BaseId,
        name: &str,
        is_master_list: bool,
    ) -> Result<Table, StorageError> {
        let table_id = TableId::new();
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tables WHERE base_id = ?1",
            rusqlite::params![base_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        let result = self.conn.execute(
            "INSERT INTO tables (table_id, base_id, name, position, is_master_list) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                table_id.as_bytes().as_slice(),
                base_id.as_bytes().as_slice(),
                name,
                position,
                is_master_list,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::ConstraintViolation(format!(
                    "base {base_id} already has a masterlist table or does not exist"
                )));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        Ok(Table {
            table_id,
            base_id,
            name: name.to_string(),
            position,
            is_master_list,
        })
    }

    fn create_field(
        &mut self,
        table_id: TableId,
        name: &str,
        field_type: FieldType,
        options: FieldOptions,
    ) -> Result<Field, StorageError> {
        if self.get_table(table_id)?.is_none() {
            return Err(StorageError::NotFound(format!("table {table_id}")));
        }
        let field_id = FieldId::new();
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM fields WHERE table_id = ?1",
            rusqlite::params![table_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        let options_json =
            serde_json::to_string(&options).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO fields (field_id, table_id, name, field_type, position, options) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                field_id.as_bytes().as_slice(),
                table_id.as_bytes().as_slice(),
                name,
                field_type.as_str(),
                position,
                options_json,
            ],
        )?;
        Ok(Field {
            field_id,
            table_id,
            name: name.to_string(),
            field_type,
            position,
            options,
        })
    }

    fn get_table(&self, table_id: TableId) -> Result<Option<Table>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT base_id, name, position, is_master_list FROM tables WHERE table_id = ?1",
                rusqlite::params![table_id.as_bytes().as_slice()],
                |row| {
                    let base_id_bytes: Vec<u8> = row.get(0)?;
                    let name: String = row.get(1)?;
                    let position: i64 = row.get(2)?;
                    let is_master_list: bool = row.get(3)?;
                    Ok((base_id_bytes, name, position, is_master_list))
                },
            )
            .optional()?;

        match row {
            Some((base_id_bytes, name, position, is_master_list)) => Ok(Some(Table {
                table_id,
                base_id: BaseId::from_bytes(to_array::<16>(base_id_bytes, "base_id")?),
                name,
                position,
                is_master_list,
            })),
            None => Ok(None),
        }
    }

    fn get_tables(&self, base_id: BaseId) -> Result<Vec<Table>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT table_id, name, position, is_master_list FROM tables WHERE base_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(rusqlite::params![base_id.as_bytes().as_slice()], |row| {
            let table_id_bytes: Vec<u8> = row.get(0)?;
            let name: String = row.get(1)?;
            let position: i64 = row.get(2)?;
            let is_master_list: bool = row.get(3)?;
            Ok((table_id_bytes, name, position, is_master_list))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (table_id_bytes, name, position, is_master_list) = row?;
            result.push(Table {
                table_id: TableId::from_bytes(to_array::<16>(table_id_bytes, "table_id")?),
                base_id,
                name,
                position,
                is_master_list,
            });
        }
        Ok(result)
    }

    fn get_fields(&self, table_id: TableId) -> Result<Vec<Field>, StorageError> {
        self.read_fields(
            "SELECT field_id, table_id, name, field_type, position, options FROM fields WHERE table_id = ?1 ORDER BY position",
            table_id.as_bytes().as_slice(),
        )
    }

    fn get_all_fields(&self, base_id: BaseId) -> Result<Vec<Field>, StorageError> {
        self.read_fields(
            "SELECT f.field_id, f.table_id, f.name, f.field_type, f.position, f.options
             FROM fields f JOIN tables t ON t.table_id = f.table_id
             WHERE t.base_id = ?1 ORDER BY t.position, f.position",
            base_id.as_bytes().as_slice(),
        )
    }

    fn get_record(
        &self,
        table_id: TableId,
        record_id: RecordId,
    ) -> Result<Option<Record>, StorageError> {
        let values_json: Option<String> = self
            .conn
            .query_row(
                "SELECT values_json FROM records WHERE table_id = ?1 AND record_id = ?2",
                rusqlite::params![
                    table_id.as_bytes().as_slice(),
                    record_id.as_bytes().as_slice()
                ],
                |row| row.get(0),
            )
            .optional()?;

        match values_json {
            Some(json) => Ok(Some(Record {
                record_id,
                table_id,
                values: decode_values(&json)?,
            })),
            None => Ok(None),
        }
    }

    fn get_records(&self, table_id: TableId) -> Result<Vec<Record>, StorageError> {
        self.read_records(
            "SELECT record_id, values_json FROM records WHERE table_id = ?1 ORDER BY rowid",
            rusqlite::params![table_id.as_bytes().as_slice()],
            table_id,
        )
    }

    fn find_records_by_source(
        &self,
        table_id: TableId,
        master_id: RecordId,
    ) -> Result<Vec<Record>, StorageError> {
        self.read_records(
            "SELECT record_id, values_json FROM records
             WHERE table_id = ?1 AND json_extract(values_json, '$._source_record_id') = ?2
             ORDER BY rowid",
            rusqlite::params![table_id.as_bytes().as_slice(), master_id.to_string()],
            table_id,
        )
    }

    fn insert_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError> {
        self.validate_values(table_id, values)?;
        let result = self.conn.execute(
            "INSERT INTO records (table_id, record_id, values_json) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                table_id.as_bytes().as_slice(),
                record_id.as_bytes().as_slice(),
                encode_values(values)?,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::RecordCollision {
                    record_id: record_id.to_string(),
                });
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        Ok(Record {
            record_id,
            table_id,
            values: values.clone(),
        })
    }

    fn update_record(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        values: &RecordValues,
    ) -> Result<Record, StorageError> {
        self.validate_values(table_id, values)?;
        let changed = self.conn.execute(
            "UPDATE records SET values_json = ?1 WHERE table_id = ?2 AND record_id = ?3",
            rusqlite::params![
                encode_values(values)?,
                table_id.as_bytes().as_slice(),
                record_id.as_bytes().as_slice(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "record {record_id} in table {table_id}"
            )));
        }
        Ok(Record {
            record_id,
            table_id,
            values: values.clone(),
        })
    }

    fn delete_records(
        &mut self,
        table_id: TableId,
        record_ids: &[RecordId],
    ) -> Result<usize, StorageError> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for record_id in record_ids {
            deleted += tx.execute(
                "DELETE FROM records WHERE table_id = ?1 AND record_id = ?2",
                rusqlite::params![
                    table_id.as_bytes().as_slice(),
                    record_id.as_bytes().as_slice()
                ],
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn insert_automation(&mut self, automation: &Automation) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO automations (automation_id, base_id, name, enabled, trigger_def, action_def) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                automation.automation_id.as_bytes().as_slice(),
                automation.base_id.as_bytes().as_slice(),
                automation.name,
                automation.enabled,
                encode_def(&automation.trigger)?,
                encode_def(&automation.action)?,
            ],
        )?;
        Ok(())
    }

    fn update_automation(&mut self, automation: &Automation) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE automations SET name = ?1, enabled = ?2, trigger_def = ?3, action_def = ?4 WHERE automation_id = ?5",
            rusqlite::params![
                automation.name,
                automation.enabled,
                encode_def(&automation.trigger)?,
                encode_def(&automation.action)?,
                automation.automation_id.as_bytes().as_slice(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "automation {}",
                automation.automation_id
            )));
        }
        Ok(())
    }

    fn delete_automation(&mut self, automation_id: AutomationId) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "DELETE FROM automations WHERE automation_id = ?1",
            rusqlite::params![automation_id.as_bytes().as_slice()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("automation {automation_id}")));
        }
        Ok(())
    }

    fn get_automations(&self, base_id: BaseId) -> Result<Vec<Automation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT automation_id, name, enabled, trigger_def, action_def FROM automations WHERE base_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(rusqlite::params![base_id.as_bytes().as_slice()], |row| {
            let automation_id_bytes: Vec<u8> = row.get(0)?;
            let name: String = row.get(1)?;
            let enabled: bool = row.get(2)?;
            let trigger_def: Option<Vec<u8>> = row.get(3)?;
            let action_def: Option<Vec<u8>> = row.get(4)?;
            Ok((automation_id_bytes, name, enabled, trigger_def, action_def))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (automation_id_bytes, name, enabled, trigger_def, action_def) = row?;
            result.push(Automation {
                automation_id: AutomationId::from_bytes(to_array::<16>(
                    automation_id_bytes,
                    "automation_id",
                )?),
                base_id,
                name,
                enabled,
                trigger: decode_def::<Trigger>(trigger_def)?,
                action: decode_def::<Action>(action_def)?,
            });
        }
        Ok(result)
    }
}
