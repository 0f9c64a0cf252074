use serde::{Deserialize, Serialize};

/// Tunables for [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry cross-table name matches ignoring case when no exact match exists.
    pub case_insensitive_fallback: bool,
    /// Keep automation definitions per base between mutations.
    pub cache_automations: bool,
    /// Move records back when the condition that moved them stops holding.
    pub reversal_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            case_insensitive_fallback: true,
            cache_automations: true,
            reversal_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_insensitive_fallback(mut self, enabled: bool) -> Self {
        self.case_insensitive_fallback = enabled;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_automations = enabled;
        self
    }

    pub fn with_reversal(mut self, enabled: bool) -> Self {
        self.reversal_enabled = enabled;
        self
    }
}
