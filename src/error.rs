use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("output already exists: {0}")]
    #[diagnostic(help("use --force to delete and recreate the output directory (possibly dangerous)"))]
    OutputConflict(Utf8PathBuf),

    #[error("management API request failed: {0}")]
    ApiHttp(String),

    #[error("management API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("unexpected management API response: {0}")]
    UnexpectedResponse(String),

    #[error("invalid input file {path}: {reason}")]
    InvalidInputFile { path: Utf8PathBuf, reason: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("datasource id required to create datasource entries")]
    #[diagnostic(help("state the datasource id via the --id argument"))]
    MissingDatasourceId,

    #[error("{resource} item has no usable `{field}` field")]
    MissingIdField { resource: String, field: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),
}

impl BackupError {
    pub fn is_api_failure(&self) -> bool {
        matches!(
            self,
            BackupError::ApiHttp(_)
                | BackupError::ApiStatus { .. }
                | BackupError::UnexpectedResponse(_)
        )
    }
}
