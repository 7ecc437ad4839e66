use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unstructured record count that triggers template discovery.
pub const DEFAULT_LEARNING_THRESHOLD: usize = 20;

/// Application-wide mode before and after a template has been adopted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Learning,
    Structured,
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Structured => "structured",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(Self::Learning),
            "structured" => Ok(Self::Structured),
            other => Err(ValidationError::UnknownVariant {
                kind: "app mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted application settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub mode: AppMode,
    pub first_launch: bool,
    pub learning_threshold: usize,
    pub active_template_id: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            mode: AppMode::Learning,
            first_launch: true,
            learning_threshold: DEFAULT_LEARNING_THRESHOLD,
            active_template_id: None,
        }
    }
}
