use std::collections::HashMap;
use std::sync::Arc;

use tablesync_core::{automation::Automation, ids::BaseId};

/// Automation definitions per base, kept between mutations.
///
/// Entries are dropped on any automation write for the base; nothing else
/// expires them.
#[derive(Debug, Default)]
pub struct AutomationCache {
    entries: HashMap<BaseId, Arc<[Automation]>>,
}

impl AutomationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, base_id: BaseId) -> Option<Arc<[Automation]>> {
        self.entries.get(&base_id).cloned()
    }

    pub fn insert(&mut self, base_id: BaseId, automations: Vec<Automation>) -> Arc<[Automation]> {
        let shared: Arc<[Automation]> = automations.into();
        self.entries.insert(base_id, Arc::clone(&shared));
        shared
    }

    pub fn invalidate(&mut self, base_id: BaseId) {
        if self.entries.remove(&base_id).is_some() {
            tracing::debug!(base_id = %base_id, "automation cache invalidated");
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
