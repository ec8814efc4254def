//! Error kinds returned by every public service operation.

use thiserror::Error;

/// The single error taxonomy exposed to callers.
///
/// Each variant carries a human-readable message that is safe to show to the
/// client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed input or failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid or expired credential or token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch the target resource.
    #[error("{0}")]
    Forbidden(String),

    /// The referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Store, cache or runtime failure not attributable to the caller.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// The message carried by any variant.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::BadRequest(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::Forbidden(m)
            | ServiceError::NotFound(m)
            | ServiceError::Internal(m) => m,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message() {
        let err = ServiceError::unauthorized("token expired");
        assert_eq!(err.to_string(), "token expired");
        assert_eq!(err.message(), "token expired");
    }
}
