use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Reasons an assumptions file cannot be turned into an `AssumptionSet`.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read assumptions file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse assumptions YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("assumptions root must be a mapping")]
    NotAMapping,
    #[error("required section '{0}' is missing or not a mapping")]
    MissingSection(&'static str),
    #[error("key '{key}': {reason}")]
    InvalidValue { key: String, reason: &'static str },
}

/// Errors surfaced by loading, overriding, computing and converting.
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("config load failed: {0}")]
    ConfigLoad(#[from] ConfigLoadError),
    #[error("invalid override for '{key}': {reason}")]
    InvalidOverride { key: String, reason: &'static str },
    #[error("unsupported {field} selection '{value}'")]
    UnsupportedSelection { field: &'static str, value: String },
    #[error("invalid selection: {0}")]
    InvalidSelection(&'static str),
    #[error("missing assumption '{0}'")]
    MissingAssumption(String),
}

/// Stable identifier for the error category, for the presentation layer to
/// map onto a localized hint.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigLoad,
    InvalidOverride,
    UnsupportedSelection,
    InvalidSelection,
    MissingAssumption,
}

impl CalcError {
    /// Variant without its payload, for matching in callers and tests.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::ConfigLoad(_) => ErrorKind::ConfigLoad,
            CalcError::InvalidOverride { .. } => ErrorKind::InvalidOverride,
            CalcError::UnsupportedSelection { .. } => ErrorKind::UnsupportedSelection,
            CalcError::InvalidSelection(_) => ErrorKind::InvalidSelection,
            CalcError::MissingAssumption(_) => ErrorKind::MissingAssumption,
        }
    }

    /// Caller-input errors can be fixed by re-prompting; a failed config load
    /// leaves nothing to compute with.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CalcError::ConfigLoad(_))
    }
}

pub type CalcResult<T> = Result<T, CalcError>;
