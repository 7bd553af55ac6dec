//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use dossier_core::{Error as CoreError, service::ServiceError, validate::ValidationErrors};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Rendered as `{"errors": {"<field>": ["message", ...]}}`.
  #[error("validation failed: {0}")]
  Invalid(ValidationErrors),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl<E> From<ServiceError<E>> for ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(e: ServiceError<E>) -> Self {
    match e {
      ServiceError::Store(e) => ApiError::Store(Box::new(e)),
      ServiceError::Invalid(errors) => ApiError::Invalid(errors),
      ServiceError::Core(e) => match e {
        CoreError::AttributeNotFound(_) => ApiError::NotFound(e.to_string()),
        CoreError::AttributeDeleted(_)
        | CoreError::AlreadyDeleted(_)
        | CoreError::DuplicateKey(_) => ApiError::Conflict(e.to_string()),
        CoreError::Serialization(_) => ApiError::Store(Box::new(e)),
        _ => ApiError::BadRequest(e.to_string()),
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Invalid(errors) => {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors })))
          .into_response();
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
