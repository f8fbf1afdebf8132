//! Custom extractors that convert axum rejections to structured AppError responses.
//!
//! Use `AppJson<T>` as a drop-in replacement for `axum::Json<T>` in handler signatures.
//! Unlike the standard extractor, deserialization failures produce a JSON `AppError`
//! instead of axum's default plain-text 422 response.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use crate::error::AppError;

/// JSON extractor that converts deserialization errors to structured `AppError` responses.
///
/// # Example
/// ```ignore
/// async fn handler(AppJson(req): AppJson<ActionRequest>) -> Result<impl IntoResponse, AppError> {
///     // body errors never reach the handler; they become AppError::Validation
/// }
/// ```
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();

    // "missing field `action`" and "unknown field `foo`" name the field
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or("body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema (GET /api-doc/openapi.json)."
                .to_string(),
        ),
    }
}

fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    ["missing field `", "unknown field `"].iter().find_map(|pattern| {
        let after = &msg[msg.find(pattern)? + pattern.len()..];
        let end = after.find('`')?;
        Some(after[..end].to_string())
    })
}
