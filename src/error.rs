use std::path::PathBuf;
use thiserror::Error;

/// Main error type for foldrank
#[derive(Error, Debug)]
pub enum FoldrankError {
    /// Malformed run, qrels, topic or document list file
    #[error("Format error in {path} line {line}: {message}")]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Caller supplied an unusable combination of arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// External program exited unsuccessfully
    #[error("External process `{program}` failed ({status}): {stderr}")]
    ExternalProcess {
        program: String,
        status: String,
        stderr: String,
    },

    /// Fold has no cached predictions yet
    #[error("Fold {fold} has no predictions at {path}")]
    MissingFold { fold: String, path: PathBuf },

    /// Fold name not declared in the folds file
    #[error("Unknown fold: {0}")]
    UnknownFold(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FoldrankError {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    pub fn format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for foldrank operations
pub type Result<T> = std::result::Result<T, FoldrankError>;
