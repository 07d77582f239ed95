use std::io;

/// Errors raised by path resolution, permission checks and filesystem operations.
///
/// Messages never contain real (on-disk) paths; the only paths they carry are virtual
/// display paths the caller already supplied.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("path traversal attempt")]
    PathTraversal,
    #[error("path contains a null byte")]
    NullByte,
    #[error("path contains a dangerous pattern")]
    DangerousPattern,
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),
    #[error("invalid name: {0}")]
    InvalidName(#[from] drivefs_types::NameError),
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("resolved path escapes its namespace root")]
    EscapesRoot,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("storage quota exceeded for drive {drive}")]
    QuotaExceeded { drive: String },
    #[error("resource is locked: {0}")]
    Locked(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DriveResult<T> = std::result::Result<T, DriveError>;

impl DriveError {
    /// True for every rejection the path resolver produces for a malformed path.
    pub fn is_invalid_path(&self) -> bool {
        matches!(
            self,
            DriveError::PathTraversal
                | DriveError::NullByte
                | DriveError::DangerousPattern
                | DriveError::UnknownNamespace(_)
                | DriveError::InvalidName(_)
        )
    }

    pub fn access_denied(what: impl Into<String>) -> Self {
        Self::AccessDenied(what.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn invalid_input(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }

    /// Maps an I/O error raised while touching `display_path` onto the taxonomy.
    ///
    /// `NotFound` and `AlreadyExists` are lifted so callers can match on them without
    /// inspecting the `io::Error` kind.
    pub fn from_io(err: io::Error, display_path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(display_path.to_owned()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(display_path.to_owned()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(display_path.to_owned()),
            _ => Self::Io(err),
        }
    }
}

/// Converts to `std::io::Error` for filesystem-interface consumers.
impl From<DriveError> for io::Error {
    fn from(e: DriveError) -> Self {
        match e {
            DriveError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            DriveError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            DriveError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            DriveError::AuthenticationRequired => {
                io::Error::new(io::ErrorKind::PermissionDenied, "authentication required")
            }
            DriveError::EscapesRoot => {
                io::Error::new(io::ErrorKind::PermissionDenied, "path escapes root")
            }
            DriveError::Locked(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            DriveError::QuotaExceeded { drive } => io::Error::new(
                io::ErrorKind::Other,
                format!("storage quota exceeded for drive {drive}"),
            ),
            DriveError::Io(e) => e,
            other if other.is_invalid_path() => {
                io::Error::new(io::ErrorKind::InvalidInput, other.to_string())
            }
            DriveError::InvalidInput(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            other => io::Error::other(other.to_string()),
        }
    }
}
