//! HTTP error envelope: `{ "success": false, "error": <message>, "code": <CODE> }`.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::session::SessionError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub success: bool,
  pub error: String,
  pub code: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
  status: StatusCode,
  code: &'static str,
  message: String,
}

impl ApiError {
  pub fn not_found(message: impl Into<String>) -> Self {
    Self { status: StatusCode::NOT_FOUND, code: "NOT_FOUND", message: message.into() }
  }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self { status: StatusCode::BAD_REQUEST, code: "BAD_REQUEST", message: message.into() }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self { status: rejection.status(), code: "INVALID_BODY", message: rejection.body_text() }
  }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self {
    Self { status: StatusCode::BAD_REQUEST, code: "INVALID_PATH", message: rejection.body_text() }
  }
}

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    let message = e.to_string();
    match e {
      SessionError::EmptyDay(_) => Self { status: StatusCode::NOT_FOUND, code: "EMPTY_DAY", message },
      SessionError::NotFound(_) => Self::not_found(message),
      SessionError::UnsupportedAction { .. } => Self { status: StatusCode::BAD_REQUEST, code: "UNSUPPORTED_ACTION", message },
      SessionError::UnknownPartOfSpeech(_) => Self::bad_request(message),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = ErrorResponse { success: false, error: self.message, code: self.code };
    (self.status, Json(body)).into_response()
  }
}
