use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    General(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("TestDefinition '{0}' cannot be found in any location.")]
    TestDefinitionNotFound(String),

    #[error("Step selector of '{0}' defines neither a test definition name nor a label.")]
    UnknownSelector(String),
}

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Cannot decode value of config '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Config '{0}' defines neither a value nor a valueFrom.")]
    MissingValue(String),

    #[error("Config '{0}' is not a file config backed by a secret or config map and has no volume.")]
    NoVolume(String),

    #[error("Config '{0}' of type 'file' has no path.")]
    MissingPath(String),

    #[error("Cannot serialize prepare repositories: {0}")]
    Json(#[from] serde_json::Error),
}
