use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::StoreError(err.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Only the status-level reason leaves the process. Which check failed
        // is visible in the logs, never in the body.
        let message = match self {
            AppError::AuthError(e) => e.public_message(),
            AppError::StoreError(_) => "service unavailable",
            AppError::ConfigError(_) | AppError::InternalError(_) => "internal server error",
        };
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => e.status_code(),
            AppError::StoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Every failure the authentication core can report.
///
/// The token-verification kinds stay distinct so they can be logged and
/// asserted on, but [`AuthError::is_verification_failure`] collapses them into
/// the single `401` outcome seen over HTTP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Too many attempts")]
    RateLimited,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token algorithm mismatch")]
    AlgorithmMismatch,

    #[error("Token signature invalid")]
    SignatureInvalid,

    #[error("Token claim mismatch")]
    ClaimMismatch,

    #[error("Token expired")]
    Expired,

    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error("Refresh token already rotated")]
    Conflict,

    #[error("Insufficient role")]
    Forbidden,

    #[error("Token issuance failed: {0}")]
    IssuanceError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Credential service unavailable")]
    CredentialServiceUnavailable,
}

impl AuthError {
    /// True for every kind that must surface as a plain "unauthorized".
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::MalformedToken
                | AuthError::AlgorithmMismatch
                | AuthError::SignatureInvalid
                | AuthError::ClaimMismatch
                | AuthError::Expired
                | AuthError::ReuseDetected
                | AuthError::Conflict
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_verification_failure() => StatusCode::UNAUTHORIZED,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::StoreUnavailable(_) | AuthError::CredentialServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            e if e.is_verification_failure() => "unauthorized",
            AuthError::RateLimited => "too many attempts",
            AuthError::Forbidden => "forbidden",
            AuthError::StoreUnavailable(_) | AuthError::CredentialServiceUnavailable => {
                "service unavailable"
            }
            _ => "internal server error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record is not active")]
    Conflict,

    #[error("Duplicate token id")]
    Duplicate,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::Conflict,
            StoreError::Duplicate => AuthError::IssuanceError("duplicate token id".into()),
            StoreError::Unavailable(msg) => AuthError::StoreUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let db_err = sqlx::Error::PoolTimedOut;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::StoreError(StoreError::Unavailable(_))));

        let auth_err: AuthError = StoreError::Conflict.into();
        assert_eq!(auth_err, AuthError::Conflict);
    }

    #[test]
    fn test_error_status_codes() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::MalformedToken,
            AuthError::AlgorithmMismatch,
            AuthError::SignatureInvalid,
            AuthError::ClaimMismatch,
            AuthError::Expired,
            AuthError::ReuseDetected,
            AuthError::Conflict,
        ] {
            assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
        }

        let err = AppError::AuthError(AuthError::RateLimited);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = AppError::AuthError(AuthError::Forbidden);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = AppError::AuthError(AuthError::CredentialServiceUnavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::AuthError(AuthError::IssuanceError("boom".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_verification_failures_share_one_body() {
        let body_of = |err: AuthError| {
            let response = AppError::from(err).error_response();
            response.into_body().try_into_bytes().unwrap_or_default()
        };

        let expired = body_of(AuthError::Expired);
        assert_eq!(expired, body_of(AuthError::SignatureInvalid));
        assert_eq!(expired, body_of(AuthError::ReuseDetected));
        assert_eq!(expired, body_of(AuthError::InvalidCredentials));

        let text = String::from_utf8(expired.to_vec()).unwrap();
        assert!(text.contains("unauthorized"));
        assert!(!text.contains("expired"));
    }

    #[test]
    fn test_error_display() {
        let err = AppError::AuthError(AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Authentication error: Invalid credentials");

        let err = AppError::StoreError(StoreError::Conflict);
        assert_eq!(err.to_string(), "Store error: Record is not active");
    }
}
