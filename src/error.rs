//! Error types for the Folio translator.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for reading the source EPUB archive.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Failed to open or read the archive file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a readable zip archive
    #[error("Invalid EPUB archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A required entry is missing from the archive
    #[error("Missing archive entry: {0}")]
    MissingEntry(String),

    /// The container or package document could not be parsed
    #[error("Invalid package document: {0}")]
    Package(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for checkpoint, artifact and output writes.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be (de)serialized
    #[error("Invalid record {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Record exists but is not a JSON object
    #[error("Record {0} is not a JSON object")]
    NotAnObject(PathBuf),

    /// A completed, non-empty chapter has no artifact on disk
    #[error("Chapter {} is marked complete but its artifact is missing", .index + 1)]
    MissingArtifact { index: usize },

    /// Failed to write the output document package
    #[error("Failed to write document: {0}")]
    Document(#[from] zip::result::ZipError),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Error type for the named API key store.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// No key stored under this name
    #[error("No API key named '{0}'")]
    NotFound(String),

    /// Name or key was blank
    #[error("Key name and value must not be empty")]
    Empty,

    /// Key file could not be read or written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Error type for the remote model client outside of generation
/// (client construction, model listing).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request to API failed
    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {0}")]
    ApiError(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

/// Error that aborts a translation run.
#[derive(Error, Debug)]
pub enum RunError {
    /// The source book could not be read
    #[error("Source format error: {0}")]
    Source(#[from] SourceError),

    /// The provider failed with a non-transient error
    #[error("Fatal provider error on chapter {chapter}: {detail}")]
    Provider { chapter: usize, detail: String },

    /// Progress or output could not be written
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The run was rejected before it started
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
