pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, load_config_from_str, DATA_DIR_ENV};
pub use schema::{ClassifierConfig, DiscoveryConfig, JoblogConfig, SuggestionConfig};
