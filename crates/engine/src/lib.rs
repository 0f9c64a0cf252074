pub mod action;
pub mod cache;
pub mod config;
pub mod context;
pub mod copies;
pub mod error;
pub mod mapper;
pub mod resolver;
pub mod reversal;
pub mod sync;
pub mod trigger;

pub use action::{ActionOutcome, Execution, SkipReason};
pub use cache::AutomationCache;
pub use config::EngineConfig;
pub use context::{Context, RecordLocation};
pub use copies::Placement;
pub use error::EngineError;
pub use resolver::{BaseSchema, FieldCorrespondence, NameCorrespondence};
pub use reversal::Reversal;
pub use sync::SyncOutcome;
pub use trigger::{MutationEvent, MutationKind};

use std::collections::BTreeMap;
use std::sync::Arc;

use tablesync_core::{
    automation::Automation,
    field_value::FieldValue,
    ids::*,
    record::{Record, RecordValues},
    schema::Table,
};
use tablesync_storage::Storage;

use crate::resolver::master_record_id;

/// How the masterlist row fared after a write through another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// The write went to the masterlist itself.
    NotNeeded,
    Synced(SyncOutcome),
    /// Logged and swallowed; the primary write stands.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Executed(Execution),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationRun {
    pub automation_id: AutomationId,
    pub name: String,
    pub status: RunStatus,
}

/// Everything that happened as a consequence of one record mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub table_id: TableId,
    pub record_id: RecordId,
    pub sync: SyncStatus,
    pub runs: Vec<AutomationRun>,
    pub reversal: Option<Reversal>,
}

impl MutationReport {
    fn new(table_id: TableId, record_id: RecordId) -> Self {
        Self {
            table_id,
            record_id,
            sync: SyncStatus::NotNeeded,
            runs: Vec::new(),
            reversal: None,
        }
    }

    pub fn executed(&self) -> impl Iterator<Item = &Execution> {
        self.runs.iter().filter_map(|run| match &run.status {
            RunStatus::Executed(execution) => Some(execution),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&AutomationRun, &str)> {
        self.runs.iter().filter_map(|run| match &run.status {
            RunStatus::Failed(message) => Some((run, message.as_str())),
            _ => None,
        })
    }

    pub fn moved(&self) -> bool {
        self.executed().any(Execution::is_move)
    }
}

/// Record mutations with masterlist consistency and automations applied on
/// top.
///
/// Writes performed by automations go straight to storage and never raise
/// events of their own, so one mutation runs at most one automation pass.
pub struct Engine<S: Storage> {
    storage: S,
    config: EngineConfig,
    cache: AutomationCache,
    correspondence: Box<dyn FieldCorrespondence>,
}

impl<S: Storage> Engine<S> {
    // ========================================================================
    // Construction and Access
    // ========================================================================

    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        let correspondence = NameCorrespondence {
            case_insensitive_fallback: config.case_insensitive_fallback,
        };
        Self {
            storage,
            config,
            cache: AutomationCache::new(),
            correspondence: Box::new(correspondence),
        }
    }

    /// Replace name-based field correspondence.
    pub fn with_correspondence(mut self, correspondence: impl FieldCorrespondence + 'static) -> Self {
        self.correspondence = Box::new(correspondence);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Direct store access. Writes made here bypass sync and automations.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn schema(&self, base_id: BaseId) -> Result<BaseSchema, EngineError> {
        BaseSchema::load(&self.storage, base_id)
    }

    fn table(&self, table_id: TableId) -> Result<Table, EngineError> {
        self.storage
            .get_table(table_id)?
            .ok_or_else(|| EngineError::RecordNotFound(format!("table {table_id}")))
    }

    pub fn get_record(
        &self,
        table_id: TableId,
        record_id: RecordId,
    ) -> Result<Option<Record>, EngineError> {
        Ok(self.storage.get_record(table_id, record_id)?)
    }

    // ========================================================================
    // Automations
    // ========================================================================

    /// Automations of a base, served from the cache when enabled.
    pub fn automations(&mut self, base_id: BaseId) -> Result<Arc<[Automation]>, EngineError> {
        if self.config.cache_automations {
            if let Some(cached) = self.cache.get(base_id) {
                return Ok(cached);
            }
        }
        let loaded = self.storage.get_automations(base_id)?;
        if self.config.cache_automations {
            Ok(self.cache.insert(base_id, loaded))
        } else {
            Ok(loaded.into())
        }
    }

    pub fn create_automation(&mut self, automation: &Automation) -> Result<(), EngineError> {
        self.storage.insert_automation(automation)?;
        self.cache.invalidate(automation.base_id);
        Ok(())
    }

    pub fn update_automation(&mut self, automation: &Automation) -> Result<(), EngineError> {
        self.storage.update_automation(automation)?;
        self.cache.invalidate(automation.base_id);
        Ok(())
    }

    pub fn delete_automation(
        &mut self,
        base_id: BaseId,
        automation_id: AutomationId,
    ) -> Result<(), EngineError> {
        self.storage.delete_automation(automation_id)?;
        self.cache.invalidate(base_id);
        Ok(())
    }

    pub fn invalidate_automations(&mut self, base_id: BaseId) {
        self.cache.invalidate(base_id);
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Insert a record, sync it into the masterlist when it lives elsewhere
    /// and run `record_created` automations.
    ///
    /// Only the insert itself can fail the call.
    pub fn create_record(
        &mut self,
        table_id: TableId,
        values: RecordValues,
    ) -> Result<MutationReport, EngineError> {
        let table = self.table(table_id)?;
        let record = self.storage.insert_record(table_id, RecordId::new(), &values)?;
        tracing::debug!(table = %table.name, record_id = %record.record_id, "record created");

        let mut report = MutationReport::new(table_id, record.record_id);
        report.sync = self.sync_after_write(&table, &record, &values.cells);

        let event = MutationEvent::created(table_id, values.cells);
        self.run_pass(&table, &event, record.record_id, &mut report);
        Ok(report)
    }

    /// Write `changes` over the record's current cells, sync the masterlist,
    /// run automations and finally check whether an earlier move should be
    /// reversed.
    ///
    /// Only the primary write can fail the call.
    pub fn update_cells(
        &mut self,
        table_id: TableId,
        record_id: RecordId,
        changes: BTreeMap<FieldId, FieldValue>,
    ) -> Result<MutationReport, EngineError> {
        let table = self.table(table_id)?;
        let mut record = self
            .storage
            .get_record(table_id, record_id)?
            .ok_or_else(|| EngineError::RecordNotFound(format!("{record_id} in {}", table.name)))?;

        let mut values = record.values.clone();
        values.cells.extend(changes.clone());
        record = self.storage.update_record(table_id, record_id, &values)?;
        tracing::debug!(
            table = %table.name,
            record_id = %record_id,
            fields = changes.len(),
            "cells updated"
        );

        let mut report = MutationReport::new(table_id, record_id);
        report.sync = self.sync_after_write(&table, &record, &changes);

        let event = MutationEvent::updated(table_id, changes);
        self.run_pass(&table, &event, record_id, &mut report);
        Ok(report)
    }

    /// Delete a record. Deleting a masterlist row also deletes its copies in
    /// every other table. Returns the number of rows removed.
    pub fn delete_record(&mut self, table_id: TableId, record_id: RecordId) -> Result<usize, EngineError> {
        let table = self.table(table_id)?;
        let mut removed = self.storage.delete_records(table_id, &[record_id])?;
        if removed == 0 || !table.is_master_list {
            return Ok(removed);
        }

        let cascade = self.schema(table.base_id).and_then(|schema| {
            let mut ctx = Context::new(&mut self.storage, &schema, self.correspondence.as_ref());
            copies::enforce_single_copy(&mut ctx, record_id, &[])
        });
        match cascade {
            Ok(n) => removed += n,
            Err(e) => tracing::warn!(
                record_id = %record_id,
                error = %e,
                "failed to remove copies of deleted masterlist record"
            ),
        }
        Ok(removed)
    }

    /// Run the automations `event` fires for `record_id` and, for updates,
    /// the reversal check.
    ///
    /// Failures of individual automations are recorded in the report; errors
    /// loading the base's schema or automations are returned.
    pub fn run_automations(
        &mut self,
        event: &MutationEvent,
        record_id: RecordId,
    ) -> Result<MutationReport, EngineError> {
        let table = self.table(event.table_id)?;
        let mut report = MutationReport::new(event.table_id, record_id);
        self.try_run_pass(&table, event, record_id, &mut report)?;
        Ok(report)
    }

    // ========================================================================
    // Automation Pass
    // ========================================================================

    fn run_pass(
        &mut self,
        table: &Table,
        event: &MutationEvent,
        record_id: RecordId,
        report: &mut MutationReport,
    ) {
        if let Err(e) = self.try_run_pass(table, event, record_id, report) {
            tracing::warn!(
                table = %table.name,
                record_id = %record_id,
                error = %e,
                "automation pass aborted"
            );
        }
    }

    fn try_run_pass(
        &mut self,
        table: &Table,
        event: &MutationEvent,
        record_id: RecordId,
        report: &mut MutationReport,
    ) -> Result<(), EngineError> {
        let automations = self.automations(table.base_id)?;
        if automations.is_empty() {
            return Ok(());
        }
        let schema = self.schema(table.base_id)?;
        let changed = event.changed_cells();
        let applicable = trigger::find_applicable_automations(
            &automations,
            &schema,
            self.correspondence.as_ref(),
            event,
        );

        let mut ctx = Context::new(&mut self.storage, &schema, self.correspondence.as_ref());
        let mut current = RecordLocation::new(event.table_id, record_id);
        let mut moved = false;

        for automation in applicable {
            let status = match action::execute(&mut ctx, automation, current, event.table_id, &changed)
            {
                Ok(ActionOutcome::Executed(execution)) => {
                    if execution.is_move() {
                        moved = true;
                        current = execution.location();
                    }
                    RunStatus::Executed(execution)
                }
                Ok(ActionOutcome::Skipped(reason)) => {
                    tracing::debug!(
                        automation = %automation.name,
                        reason = reason.as_str(),
                        "automation skipped"
                    );
                    RunStatus::Skipped(reason)
                }
                Err(e) => {
                    tracing::warn!(
                        automation = %automation.name,
                        automation_id = %automation.automation_id,
                        error = %e,
                        "automation failed"
                    );
                    RunStatus::Failed(e.to_string())
                }
            };
            report.runs.push(AutomationRun {
                automation_id: automation.automation_id,
                name: automation.name.clone(),
                status,
            });
        }

        if moved || event.kind != MutationKind::Updated || !self.config.reversal_enabled {
            return Ok(());
        }
        match reversal::check_reversal(&mut ctx, &automations, current) {
            Ok(reversal) => report.reversal = reversal,
            Err(e) => tracing::warn!(
                record_id = %record_id,
                error = %e,
                "reversal check failed"
            ),
        }
        Ok(())
    }

    /// Best-effort masterlist sync after a primary write outside it.
    fn sync_after_write(
        &mut self,
        table: &Table,
        record: &Record,
        changed: &BTreeMap<FieldId, FieldValue>,
    ) -> SyncStatus {
        if table.is_master_list {
            return SyncStatus::NotNeeded;
        }
        let result = self.schema(table.base_id).and_then(|schema| {
            let master_id = master_record_id(&schema, record);
            let mut ctx = Context::new(&mut self.storage, &schema, self.correspondence.as_ref());
            sync::sync_masterlist_with_table(&mut ctx, master_id, table.table_id, changed)
        });
        match result {
            Ok(outcome) => SyncStatus::Synced(outcome),
            Err(e) => {
                tracing::warn!(
                    table = %table.name,
                    record_id = %record.record_id,
                    error = %e,
                    "masterlist sync failed"
                );
                SyncStatus::Failed(e.to_string())
            }
        }
    }
}
