use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("missing config key [{section}] {key}")]
    MissingKey { section: String, key: String },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    Invalid {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("configuration has no backing file to save to")]
    NoPath,
}

impl ConfigError {
    pub fn missing(section: &str, key: &str) -> Self {
        Self::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}
