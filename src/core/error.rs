use thiserror::Error;

/// Failure taxonomy shared by the cache, the executor and the controllers.
///
/// Errors are `Clone` because a failed fetch is stored on the cache entry
/// (passive surfacing to subscribers) while the same error is returned to
/// the caller that triggered it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authorization denied: {0}")]
    Authorization(String),

    #[error("Validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Record '{id}' not found in '{resource}'")]
    NotFound { resource: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unknown resource '{0}'")]
    UnknownResource(String),

    #[error("Record is missing the required 'id' field")]
    MissingId,
}

impl DataError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

}

pub type Result<T> = std::result::Result<T, DataError>;
