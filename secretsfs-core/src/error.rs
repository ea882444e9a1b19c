use crate::StoreError;

/// Failure of a filesystem operation, one variant per errno the mount reports.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("operation not permitted")]
    Forbidden,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<StoreError> for FsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PermissionDenied(msg) => FsError::PermissionDenied(msg),
            StoreError::Unavailable(msg) => FsError::Unavailable(msg),
            StoreError::Configuration(msg) => FsError::Configuration(msg),
        }
    }
}
