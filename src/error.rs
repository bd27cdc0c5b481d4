use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("UNAUTHORIZED")]
    Unauthorized,
    #[error("INVALID_COMBINATION")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("RATE_LIMITED")]
    RateLimited,
    #[error("DATABASE_ERROR")]
    Database(#[from] mongodb::error::Error),
    #[error("SERIALIZATION_FAILED")]
    Serialization(#[from] mongodb::bson::ser::Error),
    #[error("DESERIALIZATION_FAILED")]
    Deserialization(#[from] mongodb::bson::de::Error),
    #[error("BACKEND_UNAVAILABLE")]
    BackendUnavailable(#[source] reqwest::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Best-effort sub-query: logs the failure and falls back to an empty value.
pub fn settle<T: Default>(source: &str, result: Result<T, ApiError>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(source, error = ?error, "sub-query failed, continuing without it");
            T::default()
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_)
            | ApiError::Serialization(_)
            | ApiError::Deserialization(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        HttpResponse::build(status).json(ApiResponse::<()>::error(self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            ApiError::validation("asset_name is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("FORBIDDEN").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::not_found("TICKET_NOT_FOUND").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::conflict("EMAIL_ALREADY_EXIST").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::internal("HASHING_FAILED").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn error_body_uses_envelope() {
        let response = ApiError::not_found("TICKET_NOT_FOUND").error_response();
        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "TICKET_NOT_FOUND");
        assert!(json["data"].is_null());
    }
}
