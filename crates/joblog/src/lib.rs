pub mod classifier;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod service;
pub mod store;
pub mod suggestion;

pub use classifier::{
    Classification, ClassifierError, EntityClassifier, LexiconClassifier, ModelError,
    ModelManager, NullClassifier,
};
pub use config::{load_config, load_config_from_str, JoblogConfig};
pub use discovery::{
    CancelFlag, DiscoveryEngine, MigrationEvent, MigrationReporter, MigrationSummary,
    NoopReporter, Proposal,
};
pub use error::{ConfigError, JoblogError, Result, ValidationError};
pub use model::{
    AppMode, AppSettings, EntityDefinition, EntityType, JobRecordEntry, ParsedItem,
    RecordStatus, SuggestionStatus, TemplateSuggestion, WorkTemplate,
};
pub use normalize::{normalize, tokenize};
pub use parser::{ParseOutcome, ParsingEngine};
pub use service::JobLog;
pub use store::{PartitionKey, RecordFilter, Scan, SkippedPartition, Store, StoreError, UnitOfWork};
pub use suggestion::{SuggestionEngine, SuggestionJob, SuggestionOutcome};
