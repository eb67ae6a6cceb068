//! Errors from the client facade.

use thiserror::Error;

use super::ApiError;
use crate::traits::CredentialsError;

/// Failure of a facade operation that touches both the API and storage.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("credential storage failed: {0}")]
    Storage(#[from] CredentialsError),

    #[error("no storage location: {0}")]
    NoStorageLocation(String),
}

impl ClientError {
    /// The API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ClientError::from(CredentialsError::SaveFailed("disk full".to_string()));
        assert_eq!(
            err.to_string(),
            "credential storage failed: Failed to save credentials: disk full"
        );

        let err = ClientError::from(ApiError::Rejected {
            status: 403,
            body: String::new(),
        });
        assert_eq!(err.to_string(), "request rejected with status 403");
        assert_eq!(err.as_api().and_then(ApiError::status), Some(403));
    }
}
