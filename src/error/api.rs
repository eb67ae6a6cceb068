//! Errors produced by the authenticated request layer.

use thiserror::Error;

use super::ErrorCategory;
use crate::traits::HttpError;

/// Why no response reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Connection,
    InvalidUrl,
    /// A 2xx response whose body was not valid JSON.
    MalformedResponse,
    Other,
}

/// Normalized request failure.
///
/// `ExpiredSession` is absorbed by the reauthentication layer and only
/// escapes from the raw dispatcher. `RefreshFailure` always coincides with
/// a forced sign-out.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("transport failure ({kind:?}): {message}")]
    TransportFailure { kind: TransportKind, message: String },

    #[error("session expired")]
    ExpiredSession { body: String },

    #[error("request rejected with status {status}")]
    Rejected { status: u16, body: String },

    #[error("session refresh failed: {message}")]
    RefreshFailure { status: Option<u16>, message: String },
}

impl ApiError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        ApiError::TransportFailure {
            kind,
            message: message.into(),
        }
    }

    pub fn refresh_failure(status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError::RefreshFailure {
            status,
            message: message.into(),
        }
    }

    /// HTTP status when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::TransportFailure { .. } => None,
            ApiError::ExpiredSession { .. } => Some(401),
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::RefreshFailure { status, .. } => *status,
        }
    }

    /// Response body when one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::ExpiredSession { body } | ApiError::Rejected { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_expired_session(&self) -> bool {
        matches!(self, ApiError::ExpiredSession { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::TransportFailure { kind, .. } => match kind {
                TransportKind::MalformedResponse => ErrorCategory::Server,
                _ => ErrorCategory::Network,
            },
            ApiError::ExpiredSession { .. } | ApiError::RefreshFailure { .. } => {
                ErrorCategory::Auth
            }
            ApiError::Rejected { status, .. } if *status >= 500 => ErrorCategory::Server,
            ApiError::Rejected { .. } => ErrorCategory::Client,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::TransportFailure { kind, .. } => match kind {
                TransportKind::Timeout => "E_NET_TIMEOUT",
                TransportKind::Connection => "E_NET_CONN",
                TransportKind::InvalidUrl => "E_NET_URL",
                TransportKind::MalformedResponse => "E_NET_MALFORMED",
                TransportKind::Other => "E_NET_OTHER",
            },
            ApiError::ExpiredSession { .. } => "E_AUTH_EXPIRED",
            ApiError::Rejected { .. } => "E_API_REJECTED",
            ApiError::RefreshFailure { .. } => "E_AUTH_REFRESH_FAIL",
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::TransportFailure { kind, .. } => match kind {
                TransportKind::Timeout => "The request timed out. Please try again.".to_string(),
                TransportKind::MalformedResponse => {
                    "We received an unexpected response. Please try again.".to_string()
                }
                _ => "We couldn't reach the bank. Check your connection.".to_string(),
            },
            ApiError::ExpiredSession { .. } | ApiError::RefreshFailure { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Rejected { status, .. } => match *status {
                403 => "You don't have permission for this action.".to_string(),
                404 => "The requested item was not found.".to_string(),
                s if s >= 500 => "The service is unavailable right now.".to_string(),
                _ => "The request could not be completed.".to_string(),
            },
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        let kind = match &err {
            HttpError::Timeout(_) => TransportKind::Timeout,
            HttpError::ConnectionFailed(_) => TransportKind::Connection,
            HttpError::InvalidUrl(_) => TransportKind::InvalidUrl,
            HttpError::Io(_) | HttpError::Other(_) => TransportKind::Other,
        };
        ApiError::transport(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_variant() {
        assert_eq!(
            ApiError::transport(TransportKind::Timeout, "slow").status(),
            None
        );
        assert_eq!(
            ApiError::ExpiredSession {
                body: String::new()
            }
            .status(),
            Some(401)
        );
        assert_eq!(
            ApiError::Rejected {
                status: 422,
                body: "{}".to_string()
            }
            .status(),
            Some(422)
        );
        assert_eq!(
            ApiError::refresh_failure(Some(401), "rejected").status(),
            Some(401)
        );
    }

    #[test]
    fn test_category_classification() {
        let rejected = |status| ApiError::Rejected {
            status,
            body: String::new(),
        };
        assert_eq!(rejected(503).category(), ErrorCategory::Server);
        assert_eq!(rejected(404).category(), ErrorCategory::Client);
        assert!(rejected(502).is_retryable());
        assert!(!rejected(400).is_retryable());
        assert_eq!(
            ApiError::refresh_failure(None, "x").category(),
            ErrorCategory::Auth
        );
        assert_eq!(
            ApiError::transport(TransportKind::MalformedResponse, "x").category(),
            ErrorCategory::Server
        );
    }

    #[test]
    fn test_from_http_error() {
        let err: ApiError = HttpError::Timeout("30s".to_string()).into();
        assert!(matches!(
            err,
            ApiError::TransportFailure {
                kind: TransportKind::Timeout,
                ..
            }
        ));
        assert_eq!(err.error_code(), "E_NET_TIMEOUT");

        let err: ApiError = HttpError::ConnectionFailed("refused".to_string()).into();
        assert_eq!(err.error_code(), "E_NET_CONN");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message() {
        let err = ApiError::ExpiredSession {
            body: String::new(),
        };
        assert!(err.user_message().contains("sign in"));
        let err = ApiError::Rejected {
            status: 403,
            body: String::new(),
        };
        assert!(err.user_message().contains("permission"));
    }

    #[test]
    fn test_body_accessor() {
        let err = ApiError::Rejected {
            status: 400,
            body: r#"{"error":"bad"}"#.to_string(),
        };
        assert_eq!(err.body(), Some(r#"{"error":"bad"}"#));
        assert!(ApiError::refresh_failure(None, "x").body().is_none());
    }
}
