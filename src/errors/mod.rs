use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for the inventory core.
///
/// Every repository, use-case, and event-handler call returns one of these
/// variants; use-cases convert them into a `{success, message}` result
/// rather than letting them propagate into the consumer loop.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("sku '{0}' not found")]
    NotFound(String),

    #[error("insufficient stock for sku '{0}': requested {1}, available {2}")]
    InsufficientStock(String, i64, i64),

    #[error("insufficient reserved for sku '{0}': requested {1}, reserved {2}")]
    InsufficientReserved(String, i64, i64),

    #[error("lock busy for key '{0}'")]
    LockBusy(String),

    #[error("sku '{0}' already exists")]
    DuplicateSku(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("event bus error: {0}")]
    EventError(String),

    #[error("duplicate event for order '{0}' kind '{1}'")]
    DuplicateEvent(String, String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Machine-readable error code used on the HTTP surface and in logs.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InsufficientStock(..) => "insufficient_stock",
            ServiceError::InsufficientReserved(..) => "insufficient_reserved",
            ServiceError::LockBusy(_) => "lock_busy",
            ServiceError::DuplicateSku(_) => "duplicate_sku",
            ServiceError::StoreError(_) => "store_error",
            ServiceError::EventError(_) => "event_error",
            ServiceError::DuplicateEvent(..) => "duplicate_event",
            ServiceError::InternalError(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InsufficientStock(..) => StatusCode::CONFLICT,
            ServiceError::InsufficientReserved(..) => StatusCode::CONFLICT,
            ServiceError::LockBusy(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::DuplicateSku(_) => StatusCode::CONFLICT,
            ServiceError::StoreError(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::EventError(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::DuplicateEvent(..) => StatusCode::OK,
            ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient errors are safe to retry without violating the atomic predicates.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::LockBusy(_) | ServiceError::StoreError(_))
    }
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        ServiceError::StoreError(err.to_string())
    }
}

/// Recognises a unique/primary-key constraint violation from the SQL error
/// code the driver reports, not from the broader `DbErr::Query`/`DbErr::Exec`
/// family (which also covers dropped connections, disk-full errors, and
/// every other exec failure). Postgres reports `23505`; SQLite reports
/// `1555` (`SQLITE_CONSTRAINT_PRIMARYKEY`) or `2067`
/// (`SQLITE_CONSTRAINT_UNIQUE`), and older sqlx builds sometimes surface only
/// the message, so that's checked too.
pub fn is_unique_violation(err: &DbErr) -> bool {
    let sqlx_err = match err {
        DbErr::Exec(sea_orm::RuntimeErr::SqlxError(e)) => Some(e),
        DbErr::Query(sea_orm::RuntimeErr::SqlxError(e)) => Some(e),
        _ => None,
    };

    sqlx_err
        .and_then(|e| e.as_database_error())
        .map(|db_err| {
            matches!(db_err.code().as_deref(), Some("23505") | Some("1555") | Some("2067"))
                || db_err.message().to_lowercase().contains("unique constraint")
        })
        .unwrap_or(false)
}

/// Error surfaced at the HTTP boundary; a superset of `ServiceError` that also
/// covers request-shape failures caught before a use-case ever runs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    ServiceError(#[from] ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");

        let (status, code, message) = match self {
            ApiError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            ApiError::ServiceError(err) => {
                let status = err.status_code();
                let code = err.code();
                (status, code, err.to_string())
            }
        };

        (
            status,
            Json(json!({ "error": code, "message": message })),
        )
            .into_response()
    }
}
