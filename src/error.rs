use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RsError {
    #[error("riverscapes project already exists at {0}; choose an empty directory")]
    ProjectExists(Utf8PathBuf),

    #[error("project document not found: {0}")]
    DocumentNotFound(Utf8PathBuf),

    #[error("watershed not found in catalog: {0}")]
    WatershedNotFound(String),

    #[error("malformed project document: {0}")]
    Malformed(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("no project input with id {0}")]
    UnknownInputRef(String),

    #[error("a realization with guid {0} already exists")]
    DuplicateGuid(String),

    #[error("invalid guid: {0}")]
    InvalidGuid(String),

    #[error("invalid HUC code: {0}")]
    InvalidHucCode(String),

    #[error("invalid dataset type: {0}")]
    InvalidDatasetKind(String),

    #[error("invalid output kind: {0}")]
    InvalidOutputKind(String),

    #[error("invalid project type {0:?}: expected a letter followed by letters, digits, '_', '-' or '.'")]
    InvalidProjectType(String),

    #[error("missing config file {0}")]
    MissingConfig(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    Malformed,
    IoFailure,
    InvalidScope,
    InvalidInput,
}

impl RsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RsError::ProjectExists(_) => ErrorKind::AlreadyExists,
            RsError::DocumentNotFound(_) | RsError::WatershedNotFound(_) => ErrorKind::NotFound,
            RsError::Malformed(_) => ErrorKind::Malformed,
            RsError::Filesystem(_) | RsError::ConfigRead(_) => ErrorKind::IoFailure,
            RsError::InvalidScope(_) | RsError::UnknownInputRef(_) => ErrorKind::InvalidScope,
            RsError::DuplicateGuid(_)
            | RsError::InvalidGuid(_)
            | RsError::InvalidHucCode(_)
            | RsError::InvalidDatasetKind(_)
            | RsError::InvalidOutputKind(_)
            | RsError::InvalidProjectType(_)
            | RsError::MissingConfig(_)
            | RsError::ConfigParse(_) => ErrorKind::InvalidInput,
        }
    }
}
