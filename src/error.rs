use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider error: {0}")]
    Upstream(String),

    #[error("Settlement requires reconciliation: {0}")]
    Integrity(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::InvalidPlan(_) => "INVALID_PLAN",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::QuotaExhausted(_) => "QUOTA_EXHAUSTED",
            ApiError::AmountMismatch(_) => "AMOUNT_MISMATCH",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Integrity(_) => "RECONCILIATION_REQUIRED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::InvalidPlan(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Unauthorized(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::QuotaExhausted(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::AmountMismatch(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Conflict(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Upstream(ref msg) => {
                tracing::warn!("Payment provider error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment provider temporarily unavailable, please retry".to_string(),
                )
            }
            ApiError::Integrity(ref msg) => {
                tracing::error!("Settlement integrity failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment received; membership activation is pending manual review"
                        .to_string(),
                )
            }
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
