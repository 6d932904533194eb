use std::fmt;

use crate::application::ports::remote_store::RemoteError;

#[derive(Debug)]
pub enum AppError {
    Storage(String),
    Network(String),
    NotFound(String),
    ValidationError(String),
    StateConflict(String),
    RemoteDuplicate(String),
    RemoteRejected(String),
    ConfigurationError(String),
    SerializationError(String),
    DeserializationError(String),
    Internal(String),
}

impl AppError {
    /// ローカルストアが使えない場合。オフライン操作はここで打ち切る。
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Storage(msg) => write!(f, "Local store unavailable: {msg}"),
            AppError::Network(msg) => write!(f, "Remote unreachable: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not found: {msg}"),
            AppError::ValidationError(msg) => write!(f, "Invalid request: {msg}"),
            AppError::StateConflict(msg) => write!(f, "State conflict: {msg}"),
            AppError::RemoteDuplicate(msg) => write!(f, "Already applied remotely: {msg}"),
            AppError::RemoteRejected(msg) => write!(f, "Rejected by remote: {msg}"),
            AppError::ConfigurationError(msg) => write!(f, "Invalid configuration: {msg}"),
            AppError::SerializationError(msg) => write!(f, "Could not encode record: {msg}"),
            AppError::DeserializationError(msg) => write!(f, "Corrupt record: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::DuplicateKey(msg) => AppError::RemoteDuplicate(msg),
            RemoteError::Unavailable(msg) => AppError::Network(msg),
            RemoteError::Rejected(msg) => AppError::RemoteRejected(msg),
            RemoteError::InvalidResponse(msg) => AppError::DeserializationError(msg),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_map_onto_taxonomy() {
        let dup: AppError = RemoteError::DuplicateKey("tickets_pkey".into()).into();
        assert!(matches!(dup, AppError::RemoteDuplicate(_)));

        let transient: AppError = RemoteError::Unavailable("timeout".into()).into();
        assert!(transient.is_transient());
        assert!(!transient.is_storage());

        let rejected: AppError = RemoteError::Rejected("row-level security".into()).into();
        assert!(matches!(rejected, AppError::RemoteRejected(_)));
        assert!(!rejected.is_transient());
    }

    #[test]
    fn sqlx_errors_become_storage_errors() {
        let err: AppError = sqlx::Error::PoolClosed.into();
        assert!(err.is_storage());
        assert!(err.to_string().starts_with("Local store unavailable"));
    }
}
