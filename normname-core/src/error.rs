use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failure for a single file.
///
/// The engine only classifies; turning a kind into a user-facing message is
/// left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    /// The file was moved or deleted since it was scanned
    SourceMissing,
    /// The destination is now occupied
    TargetConflict,
    /// The file is in use by another process
    FileLocked,
    /// Reserved name or illegal character on the target filesystem
    InvalidName,
    DiskFull,
    Unknown,
}

impl ErrorKind {
    /// Map an I/O error from a rename or stat call to an error kind
    pub fn classify(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            if let Some(kind) = classify_os_code(code) {
                return kind;
            }
        }

        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::SourceMissing,
            io::ErrorKind::AlreadyExists => Self::TargetConflict,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Self::InvalidName,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::SourceMissing => "source_missing",
            Self::TargetConflict => "target_conflict",
            Self::FileLocked => "file_locked",
            Self::InvalidName => "invalid_name",
            Self::DiskFull => "disk_full",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(unix)]
fn classify_os_code(code: i32) -> Option<ErrorKind> {
    match code {
        libc::EACCES | libc::EPERM | libc::EROFS => Some(ErrorKind::PermissionDenied),
        libc::ENOENT => Some(ErrorKind::SourceMissing),
        libc::EEXIST | libc::ENOTEMPTY => Some(ErrorKind::TargetConflict),
        libc::EBUSY | libc::ETXTBSY => Some(ErrorKind::FileLocked),
        libc::ENAMETOOLONG | libc::EINVAL | libc::EILSEQ => Some(ErrorKind::InvalidName),
        libc::ENOSPC | libc::EDQUOT => Some(ErrorKind::DiskFull),
        _ => None,
    }
}

#[cfg(windows)]
fn classify_os_code(code: i32) -> Option<ErrorKind> {
    use winapi::shared::winerror::{
        ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS, ERROR_DISK_FULL, ERROR_FILENAME_EXCED_RANGE,
        ERROR_FILE_EXISTS, ERROR_FILE_NOT_FOUND, ERROR_HANDLE_DISK_FULL, ERROR_INVALID_NAME,
        ERROR_LOCK_VIOLATION, ERROR_PATH_NOT_FOUND, ERROR_SHARING_VIOLATION,
    };

    #[allow(clippy::cast_sign_loss)]
    let code = code as u32;
    match code {
        ERROR_ACCESS_DENIED => Some(ErrorKind::PermissionDenied),
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => Some(ErrorKind::SourceMissing),
        ERROR_ALREADY_EXISTS | ERROR_FILE_EXISTS => Some(ErrorKind::TargetConflict),
        ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION => Some(ErrorKind::FileLocked),
        ERROR_INVALID_NAME | ERROR_FILENAME_EXCED_RANGE => Some(ErrorKind::InvalidName),
        ERROR_DISK_FULL | ERROR_HANDLE_DISK_FULL => Some(ErrorKind::DiskFull),
        _ => None,
    }
}

#[cfg(not(any(unix, windows)))]
fn classify_os_code(_code: i32) -> Option<ErrorKind> {
    None
}

/// Errors that abort an engine call before or instead of producing a result
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Folder not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("Cannot read folder {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Another operation is already running on {}", .0.display())]
    OperationInProgress(PathBuf),

    #[error("Operation '{0}' cannot be undone: {1}")]
    NotUndoable(String, String),

    #[error("History store error at {}: {message}", path.display())]
    History { path: PathBuf, message: String },

    #[error("Background rename worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
