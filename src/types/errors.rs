use thiserror::Error;

// === BackendError ===

/// Errors reported by a bookmark backend (identity, table or change feed).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The identity provider rejected the credentials or callback tokens.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    /// The session token expired and could not be refreshed.
    #[error("Session expired")]
    SessionExpired,
    /// The call requires a signed-in principal.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The backend could not be reached or answered with a server error.
    #[error("Backend network error: {0}")]
    Network(String),
    /// Local storage failed.
    #[error("Backend database error: {0}")]
    Database(String),
    /// The backend refused the row (row-level policy, malformed insert).
    #[error("Constraint violation: {0}")]
    Constraint(String),
    /// A payload could not be encoded or decoded.
    #[error("Backend serialization error: {0}")]
    Serialization(String),
    /// The backend does not offer this operation.
    #[error("Unsupported backend operation: {0}")]
    Unsupported(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        BackendError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Serialization(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

// === ControllerError ===

/// Errors raised inside the view controller before they are logged and dropped.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A blocking backend task panicked or was cancelled.
    #[error("Backend task failed: {0}")]
    TaskFailed(String),
}

// === ConfigError ===

/// Errors related to loading and validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading or writing the config file.
    #[error("Config I/O error: {0}")]
    Io(String),
    /// The config file could not be parsed or serialized.
    #[error("Config parse error: {0}")]
    Parse(String),
    /// A value is present but not usable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
