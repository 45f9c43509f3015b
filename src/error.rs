use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::identity::{AuthError, RegistrationError};
use crate::ledger::LedgerError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    /// Gated page hit without a session; browsers get sent to the login page.
    #[error("Login required")]
    LoginRequired,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),
}

impl AppError {
    /// Status and the message safe to show a client. Server-side failures
    /// are logged here and reported as a bare "Internal server error".
    pub fn public(&self) -> (StatusCode, String) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::LoginRequired => (StatusCode::SEE_OTHER, "Login required".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                internal()
            }
            AppError::Password(e) => {
                tracing::error!("Password hashing error: {}", e);
                internal()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::LoginRequired = self {
            return (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, "/auth/login")],
                "",
            )
                .into_response();
        }
        self.public().into_response()
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Unauthorized => AppError::Unauthorized,
            StoreError::Validation(msg) => AppError::Validation(msg),
            StoreError::Pool(e) => AppError::Pool(e),
            StoreError::Sql(e) => AppError::Database(e),
            StoreError::Json(e) => AppError::Json(e),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => AppError::NotFound,
            LedgerError::Validation(msg) => AppError::Validation(msg),
            LedgerError::Pool(e) => AppError::Pool(e),
            LedgerError::Sql(e) => AppError::Database(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized,
            AuthError::EmailTaken => AppError::Conflict("Email is already registered".into()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Pool(e) => AppError::Pool(e),
            AuthError::Sql(e) => AppError::Database(e),
            AuthError::Hash(e) => AppError::Password(e),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(msg) => AppError::Validation(msg),
            RegistrationError::Auth(e) => e.into(),
            RegistrationError::ProfileRejected(msg) => {
                tracing::warn!("Registration rolled back: {}", msg);
                AppError::Internal(format!("Profile could not be saved: {}", msg))
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
