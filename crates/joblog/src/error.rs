use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JoblogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] crate::classifier::ClassifierError),

    #[error("Model asset error: {0}")]
    Model(#[from] crate::classifier::ModelError),

    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },

    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Suggestion not found: {id}")]
    SuggestionNotFound { id: String },

    #[error("No active template")]
    NoActiveTemplate,

    #[error("Failed to parse '{input}' against template '{template_id}': {reason}")]
    ParseFailed {
        template_id: String,
        input: String,
        reason: String,
    },

    #[error("Migration cancelled after {processed} records")]
    MigrationCancelled { processed: usize },

    #[error("Suggestion worker is not running")]
    WorkerStopped,
}

/// Construction-time validation failures. Raised synchronously, before
/// anything is persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Original input must not be blank")]
    BlankInput,

    #[error("Entity label must not be blank")]
    BlankLabel,

    #[error("Template name must not be blank")]
    BlankTemplateName,

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Duplicate entity label '{0}'")]
    DuplicateLabel(String),

    #[error("Verified records require a template id")]
    VerifiedWithoutTemplate,

    #[error("Suggestion '{id}' is already {status}")]
    SuggestionFinalized { id: String, status: String },

    #[error("Unknown {kind} value '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

pub type Result<T> = std::result::Result<T, JoblogError>;
