use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::codec::json_response;
use crate::types::IdParseError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid request: {0}")]
  InvalidRequest(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("method not allowed")]
  MethodNotAllowed,
  #[error("payload too large: {0}")]
  PayloadTooLarge(String),
  #[error("internal error: {0}")]
  Internal(#[from] anyhow::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<IdParseError> for ApiError {
  fn from(e: IdParseError) -> Self {
    Self::InvalidRequest(e.to_string())
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    Self::InvalidRequest(format!("body is not valid JSON: {}", e))
  }
}

impl From<PathRejection> for ApiError {
  fn from(e: PathRejection) -> Self {
    Self::InvalidRequest(e.body_text())
  }
}

impl From<BytesRejection> for ApiError {
  fn from(e: BytesRejection) -> Self {
    match e.status() {
      StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(e.body_text()),
      _ => Self::InvalidRequest(e.body_text()),
    }
  }
}

/// How errors are rendered, fixed at startup
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFormat {
  pub debug: bool,
}

impl ErrorFormat {
  pub fn new(debug: bool) -> Self {
    Self { debug }
  }

  /// JSON `{status_code, reason}`, or a plain-text report with the cause chain in debug mode
  pub fn render(&self, error: &ApiError) -> Response {
    let status = error.status();
    if let ApiError::Internal(e) = error {
      tracing::error!("Request failed: {:#}", e);
    }

    if self.debug {
      let report = match error {
        ApiError::Internal(e) => format!("{}\n\n{:?}\n", status, e),
        other => format!("{}\n\n{}\n", status, other),
      };
      return (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        report,
      )
        .into_response();
    }

    json_response(
      status,
      &json!({
        "status_code": status.as_u16(),
        "reason": status.canonical_reason().unwrap_or("Unknown"),
      }),
    )
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    ErrorFormat::default().render(&self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(
      ApiError::InvalidRequest("x".into()).status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    assert_eq!(
      ApiError::MethodNotAllowed.status(),
      StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(
      ApiError::PayloadTooLarge("x".into()).status(),
      StatusCode::PAYLOAD_TOO_LARGE
    );
    assert_eq!(
      ApiError::from(anyhow::anyhow!("boom")).status(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn test_bad_id_is_invalid_request() {
    let err: ApiError = IdParseError::Uuid("nope".into()).into();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
  }

  #[test]
  fn test_render_modes() {
    let err = ApiError::NotFound("abc".into());

    let response = ErrorFormat::new(false).render(&err);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers()[header::CONTENT_TYPE]
      .to_str()
      .unwrap()
      .starts_with("application/json"));

    let response = ErrorFormat::new(true).render(&err);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers()[header::CONTENT_TYPE]
      .to_str()
      .unwrap()
      .starts_with("text/plain"));
  }
}
