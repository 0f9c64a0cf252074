pub mod automation;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod record;
pub mod schema;

pub use automation::{
    Action, ActionType, Automation, Condition, ConditionOperator, DuplicateHandling,
    FieldMapping, Trigger, TriggerType,
};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use record::{Record, RecordValues, SOURCE_RECORD_KEY};
pub use schema::{Base, Field, FieldOptions, FieldType, SelectChoice, Table};
