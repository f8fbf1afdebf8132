use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use socra_core::error::{self, ApiError, TutorError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Failure reported by the tutoring core
    Tutor(TutorError),
    /// Database error (500)
    Database(sqlx::Error),
}

fn tutor_status(err: &TutorError) -> StatusCode {
    match err {
        TutorError::SessionNotFound { .. } | TutorError::NoDiagnosticData { .. } => {
            StatusCode::NOT_FOUND
        }
        TutorError::InvalidAction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TutorError::GenerationFailed(_) | TutorError::ResultsUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn tutor_docs_hint(err: &TutorError) -> Option<String> {
    match err {
        TutorError::SessionNotFound { .. } => {
            Some("Create the session first with POST /v1/sessions.".to_string())
        }
        TutorError::GenerationFailed(_) | TutorError::ResultsUnavailable(_) => {
            Some("Transient failure. The session was not changed; retry the request.".to_string())
        }
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Tutor(err) => {
                let status = tutor_status(&err);
                if status.is_server_error() {
                    tracing::error!(request_id = %request_id, "Tutor error: {err}");
                } else {
                    tracing::info!(request_id = %request_id, "Tutor error: {err}");
                }
                let field = match &err {
                    TutorError::InvalidAction { .. } => Some("action".to_string()),
                    _ => None,
                };
                let received = match &err {
                    TutorError::InvalidAction { action, .. } => {
                        Some(serde_json::Value::String(action.clone()))
                    }
                    _ => None,
                };
                (
                    status,
                    ApiError {
                        error: err.code().to_string(),
                        message: err.user_message(),
                        field,
                        received,
                        docs_hint: tutor_docs_hint(&err),
                        request_id,
                    },
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<TutorError> for AppError {
    fn from(err: TutorError) -> Self {
        AppError::Tutor(err)
    }
}
