use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::store::StoreError;

/// Error returned by every service operation
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(message) => ServiceError::Conflict(message),
            StoreError::Backend(err) => ServiceError::Storage(err),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => ApiError::NotFound(message),
            ServiceError::Validation(message) => ApiError::BadRequest(message),
            ServiceError::Forbidden(message) => ApiError::Forbidden(message),
            ServiceError::Conflict(message) => ApiError::Conflict(message),
            ServiceError::Storage(err) => {
                tracing::error!("Storage failure: {:#}", err);
                ApiError::Internal("Internal storage error".to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        let json_response = serde_json::json!({
            "message": message,
            "status": status.as_u16()
        });
        (status, Json(json_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_hide_driver_details() {
        let api: ApiError = ServiceError::Storage(anyhow::anyhow!("connection refused")).into();
        match api {
            ApiError::Internal(message) => assert!(!message.contains("refused")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn maps_service_errors_to_status_codes() {
        let response = ApiError::from(ServiceError::conflict("exists")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = ApiError::from(ServiceError::not_found("missing")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
