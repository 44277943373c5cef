/// Unified Error Handling Module
///
/// Domain-specific error enums mapped into a single `AppError` that
/// implements actix's `ResponseError`. Every HTTP error body uses the
/// portal's uniform shape `{"success": false, "description": ...}`;
/// refresh rejections carry extra flags the client inspects to decide
/// between retry and forced re-login.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
///
/// `BadCredentials` and `UnknownSubject` deliberately render the same
/// class of description so responses never reveal whether an email is
/// registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token presented on a protected route
    MissingToken,
    /// Signature or structural failure on an access token
    TokenInvalid,
    /// Access token past its TTL (the client should try a refresh)
    TokenExpired,
    /// Sign-in email/password mismatch
    BadCredentials,
    /// Refresh token malformed, unknown, or bound to a different subject
    BadRefreshToken,
    /// Refresh request for an email with no matching user
    UnknownSubject,
    /// Refresh token past its TTL, or replayed after rotation/revocation.
    /// `compromised` is set on the replay path, after the whole session
    /// family has been revoked; the client must wipe credentials and
    /// re-login.
    RefreshTokenExpired { compromised: bool },
    /// Stored password hash could not be parsed
    CorruptCredential,
    /// Identity is valid but the policy denies the action
    Forbidden,
    /// SessionStore/UserStore unreachable within the bounded interval
    StoreUnavailable(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "No token provided"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::BadCredentials => write!(f, "Invalid email or password"),
            AuthError::BadRefreshToken => write!(f, "Invalid refresh token"),
            AuthError::UnknownSubject => write!(f, "Invalid refresh token"),
            AuthError::RefreshTokenExpired { compromised: true } => {
                write!(f, "Refresh token expired; session revoked")
            }
            AuthError::RefreshTokenExpired { compromised: false } => {
                write!(f, "Refresh token expired")
            }
            AuthError::CorruptCredential => write!(f, "Stored credential is unreadable"),
            AuthError::Forbidden => write!(f, "Access denied"),
            AuthError::StoreUnavailable(msg) => write!(f, "Session store unavailable: {}", msg),
        }
    }
}

impl StdError for AuthError {}

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Auth(AuthError::StoreUnavailable(err.to_string()))
            }
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::Database(db) if db.to_string().contains("unique constraint") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    "Email already registered".to_string(),
                ))
            }
            _ => AppError::Database(DatabaseError::QueryExecution(err.to_string())),
        }
    }
}

/// Uniform HTTP error body
///
/// Refresh flags match the contract the portal client keys on:
/// `badRefreshToken` means the offered token can never succeed (re-login),
/// `refreshTokenExpired` means the chain is dead (re-login; `compromised`
/// additionally signals a detected replay).
#[derive(Debug, serde::Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub description: String,
    #[serde(rename = "badRefreshToken", skip_serializing_if = "Option::is_none")]
    pub bad_refresh_token: Option<bool>,
    #[serde(rename = "refreshTokenExpired", skip_serializing_if = "Option::is_none")]
    pub refresh_token_expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compromised: Option<bool>,
}

impl ErrorBody {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
            bad_refresh_token: None,
            refresh_token_expired: None,
            compromised: None,
        }
    }
}

impl AppError {
    fn body(&self) -> ErrorBody {
        let mut body = ErrorBody::new(self.public_description());
        if let AppError::Auth(auth) = self {
            match auth {
                AuthError::BadRefreshToken | AuthError::UnknownSubject => {
                    body.bad_refresh_token = Some(true);
                }
                AuthError::RefreshTokenExpired { compromised } => {
                    body.refresh_token_expired = Some(true);
                    if *compromised {
                        body.compromised = Some(true);
                    }
                }
                _ => {}
            }
        }
        body
    }

    /// Description safe to put on the wire. Internal detail (store errors,
    /// corrupt hashes) is replaced with a generic message.
    fn public_description(&self) -> String {
        match self {
            AppError::Auth(AuthError::StoreUnavailable(_)) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Auth(AuthError::CorruptCredential)
            | AppError::Internal(_)
            | AppError::Config(_) => "Internal server error".to_string(),
            AppError::Database(DatabaseError::QueryExecution(_)) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Validation(e) => tracing::warn!(error = %e, "Validation error"),
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error = %self, "Duplicate entry attempt")
            }
            AppError::Database(e) => tracing::error!(error = %e, "Database error"),
            AppError::Auth(AuthError::RefreshTokenExpired { compromised: true }) => {
                tracing::warn!("Refresh token replay detected; session family revoked")
            }
            AppError::Auth(AuthError::StoreUnavailable(msg)) => {
                tracing::error!(error = %msg, "Session store unavailable")
            }
            AppError::Auth(AuthError::CorruptCredential) => {
                tracing::error!("Stored password hash is unreadable")
            }
            AppError::Auth(e) => tracing::warn!(error = %e, "Authentication error"),
            AppError::Config(e) => tracing::error!(error = %e, "Configuration error"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::QueryExecution(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(e) => match e {
                AuthError::Forbidden => StatusCode::FORBIDDEN,
                AuthError::CorruptCredential => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn unknown_subject_indistinguishable_from_bad_refresh_token() {
        assert_eq!(
            AuthError::UnknownSubject.to_string(),
            AuthError::BadRefreshToken.to_string()
        );
    }

    #[test]
    fn forbidden_maps_to_403_not_401() {
        let err = AppError::Auth(AuthError::Forbidden);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn store_unavailable_maps_to_503() {
        let err = AppError::Auth(AuthError::StoreUnavailable("pool timed out".to_string()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn replay_body_carries_both_flags() {
        let err = AppError::Auth(AuthError::RefreshTokenExpired { compromised: true });
        let body = err.body();
        assert!(!body.success);
        assert_eq!(body.refresh_token_expired, Some(true));
        assert_eq!(body.compromised, Some(true));
        assert_eq!(body.bad_refresh_token, None);
    }

    #[test]
    fn bad_refresh_token_body_flag() {
        let err = AppError::Auth(AuthError::BadRefreshToken);
        let body = err.body();
        assert_eq!(body.bad_refresh_token, Some(true));
        assert_eq!(body.refresh_token_expired, None);
    }

    #[test]
    fn internal_detail_never_reaches_the_wire() {
        let err = AppError::Auth(AuthError::StoreUnavailable(
            "postgres://user:hunter2@db".to_string(),
        ));
        assert!(!err.public_description().contains("hunter2"));
    }
}
