use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// A record that failed one of the schema rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    #[error("phone number must be exactly 10 digits")]
    InvalidPhoneNumber,
    #[error("invalid role: {0}")]
    InvalidRole(String),
}

/// Token issuance failures. These are configuration faults, not retryable.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("JWT signing secret is not configured")]
    MissingSecret,
    #[error("JWT TTL out of range: {0} minutes")]
    InvalidTtl(i64),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("password was not selected for this user")]
    PasswordNotLoaded,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<bcrypt::BcryptError> for UserError {
    fn from(e: bcrypt::BcryptError) -> Self {
        UserError::Hashing(e.to_string())
    }
}

impl UserError {
    /// Status and message used by the HTTP handlers.
    pub fn into_http(self) -> (StatusCode, String) {
        let status = match &self {
            UserError::Validation(ValidationError::DuplicateEmail(_)) => StatusCode::CONFLICT,
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::Hashing(_)
            | UserError::Signing(_)
            | UserError::PasswordNotLoaded
            | UserError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
            return (status, "internal error".into());
        }
        (status, self.to_string())
    }
}
