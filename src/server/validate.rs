//! Payload validation run on create and update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use crate::codec::{parse_timestamp, DATETIME_FORMAT};

/// Field an expiring document must carry
pub const EXPIRES_FIELD: &str = "expires";

pub trait DocumentValidator: Send + Sync {
  /// Reject a payload with `ApiError::InvalidRequest`
  fn validate(&self, document: &Value) -> Result<(), ApiError>;
}

/// Accepts any JSON value
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DocumentValidator for AcceptAll {
  fn validate(&self, _document: &Value) -> Result<(), ApiError> {
    Ok(())
  }
}

/// Requires an object with an `expires` timestamp in the canonical layout
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireExpiry;

impl DocumentValidator for RequireExpiry {
  fn validate(&self, document: &Value) -> Result<(), ApiError> {
    let Some(fields) = document.as_object() else {
      return Err(ApiError::InvalidRequest("document must be a JSON object".into()));
    };
    match fields.get(EXPIRES_FIELD).and_then(Value::as_str) {
      Some(raw) if parse_timestamp(raw).is_some() => Ok(()),
      Some(raw) => Err(ApiError::InvalidRequest(format!(
        "'{}' must match {}, got '{}'",
        EXPIRES_FIELD, DATETIME_FORMAT, raw
      ))),
      None => Err(ApiError::InvalidRequest(format!(
        "document needs an '{}' timestamp",
        EXPIRES_FIELD
      ))),
    }
  }
}

/// Validator selection in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
  #[default]
  None,
  Expires,
}

impl Validation {
  pub fn validator(&self) -> Box<dyn DocumentValidator> {
    match self {
      Self::None => Box::new(AcceptAll),
      Self::Expires => Box::new(RequireExpiry),
    }
  }
}
