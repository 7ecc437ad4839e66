//! Domain types: records, templates, parse results, suggestions and settings.
//!
//! Relations between them are plain ids resolved through the store.

pub mod item;
pub mod record;
pub mod settings;
pub mod suggestion;
pub mod template;

pub use item::ParsedItem;
pub use record::{JobRecordEntry, RecordStatus};
pub use settings::{AppMode, AppSettings, DEFAULT_LEARNING_THRESHOLD};
pub use suggestion::{SuggestionStatus, TemplateSuggestion};
pub use template::{EntityDefinition, EntityType, MatchStrategy, WorkTemplate};
