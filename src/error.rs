use axum::{
    Json,
    extract::{
        State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::{
    dao::{media::MediaStoreError, storage::StorageError},
    realtime::RoomError,
    state::SharedState,
};

/// Generic message returned for unexpected failures.
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Resource already exists or conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unexpected failure of a collaborator.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            ServiceError::Unavailable(err)
        } else {
            ServiceError::Internal(err.to_string())
        }
    }
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::AlreadyExists(id) => ServiceError::Conflict(format!("Room {id} already exists")),
            RoomError::NotFound(id) => ServiceError::NotFound(format!("Room {id} not found")),
        }
    }
}

impl From<MediaStoreError> for ServiceError {
    fn from(err: MediaStoreError) -> Self {
        match err {
            MediaStoreError::Rejected { status, message } if (400..500).contains(&status) => {
                ServiceError::InvalidInput(message)
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or invalid bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Route exists but not for this HTTP method.
    #[error("method not allowed")]
    MethodNotAllowed,
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => {
                warn!(error = %source, "storage call failed");
                AppError::ServiceUnavailable("Storage unavailable".into())
            }
            ServiceError::Degraded => AppError::ServiceUnavailable("Storage unavailable (degraded mode)".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) | ServiceError::Conflict(message) => {
                AppError::Conflict(message)
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Internal(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Cause of a 500, carried as a response extension until [`expose_internal_detail`] decides
/// whether the client may see it.
#[derive(Debug, Clone)]
struct InternalDetail(String);

/// Response layer adding the cause of internal errors to the body outside production.
pub async fn expose_internal_detail(State(state): State<SharedState>, mut response: Response) -> Response {
    let Some(InternalDetail(detail)) = response.extensions_mut().remove::<InternalDetail>() else {
        return response;
    };
    if state.config().is_production() {
        return response;
    }
    let body = ErrorBody {
        error: INTERNAL_MESSAGE.into(),
        detail: Some(detail),
    };
    (response.status(), Json(body)).into_response()
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_body(self) -> (ErrorBody, Option<InternalDetail>) {
        let body = match self {
            AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::ServiceUnavailable(message) => ErrorBody {
                error: message,
                detail: None,
            },
            AppError::MethodNotAllowed => ErrorBody {
                error: "Method not allowed".into(),
                detail: None,
            },
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed with an internal error");
                let body = ErrorBody {
                    error: INTERNAL_MESSAGE.into(),
                    detail: None,
                };
                return (body, Some(InternalDetail(detail)));
            }
        };
        (body, None)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, detail) = self.into_body();
        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
        middleware,
        routing::get,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::{AppConfig, AppEnv},
        state::{AppState, clock::ManualClock},
    };

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn body_carries_the_bare_message() {
        let (body, detail) = AppError::BadRequest("Already checked in".into()).into_body();
        assert_eq!(body.error, "Already checked in");
        assert!(body.detail.is_none());
        assert!(detail.is_none());
    }

    #[test]
    fn internal_errors_hide_their_cause_behind_a_generic_message() {
        let (body, detail) = AppError::Internal("socket closed".into()).into_body();
        assert_eq!(body.error, INTERNAL_MESSAGE);
        assert!(body.detail.is_none());
        assert_eq!(detail.map(|InternalDetail(cause)| cause), Some("socket closed".to_string()));
    }

    async fn internal_error_body(environment: AppEnv) -> Value {
        let mut config = AppConfig::default();
        config.environment = environment;
        let state = AppState::in_memory(config, Arc::new(ManualClock::default()));
        let app = Router::new()
            .route(
                "/boom",
                get(|| async { AppError::Internal("socket closed".into()) }),
            )
            .layer(middleware::map_response_with_state(
                state.clone(),
                expose_internal_detail,
            ))
            .with_state(state);

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_detail_is_shown_outside_production() {
        let body = internal_error_body(AppEnv::Development).await;
        assert_eq!(body, json!({"error": INTERNAL_MESSAGE, "detail": "socket closed"}));
    }

    #[tokio::test]
    async fn internal_detail_is_withheld_in_production() {
        let body = internal_error_body(AppEnv::Production).await;
        assert_eq!(body, json!({"error": INTERNAL_MESSAGE}));
    }

    #[test]
    fn client_side_media_rejections_are_invalid_input() {
        let err = ServiceError::from(MediaStoreError::Rejected {
            status: 400,
            message: "Invalid image file".into(),
        });
        assert!(matches!(err, ServiceError::InvalidInput(message) if message == "Invalid image file"));

        let err = ServiceError::from(MediaStoreError::Rejected {
            status: 502,
            message: "bad gateway".into(),
        });
        assert!(matches!(err, ServiceError::Internal(_)));
    }
}
