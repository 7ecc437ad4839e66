use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_LEARNING_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoblogConfig {
    pub version: String,
    /// Directory holding `config.db` and the monthly record partitions.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    /// Unstructured record count that triggers discovery on first launch.
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: usize,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl JoblogConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }
}

impl Default for JoblogConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: default_data_directory(),
            learning_threshold: default_learning_threshold(),
            discovery: DiscoveryConfig::default(),
            suggestions: SuggestionConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

fn default_data_directory() -> String {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .map(|p| p.join("joblog").to_string_lossy().to_string())
        .unwrap_or_else(|| "./joblog".to_string())
}

fn default_learning_threshold() -> usize {
    DEFAULT_LEARNING_THRESHOLD
}

/// Tuning for template discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Tokens shorter than this are never candidates.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    /// Share of unstructured records a token must appear in.
    #[serde(default = "default_min_document_ratio")]
    pub min_document_ratio: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Cap on the context handed to the classifier per candidate.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

fn default_min_token_len() -> usize {
    4
}

fn default_min_document_ratio() -> f64 {
    0.3
}

fn default_max_candidates() -> usize {
    5
}

fn default_context_chars() -> usize {
    2000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            min_document_ratio: default_min_document_ratio(),
            max_candidates: default_max_candidates(),
            context_chars: default_context_chars(),
        }
    }
}

/// Tuning for background vocabulary suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Jobs waiting for the worker beyond this are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_min_confidence() -> f64 {
    0.75
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Classifier asset configuration. Without a lexicon every term is
/// classified as having no confident type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub lexicon_path: Option<String>,
    /// Hex SHA-256 the lexicon file must match.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Minimum confidence for discovery to accept a predicted type.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            lexicon_path: None,
            sha256: None,
            min_confidence: default_min_confidence(),
        }
    }
}
