use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record field that holds the client payload
pub const PAYLOAD_FIELD: &str = "document";

/// Largest TTL a document store accepts (a signed 32-bit count of seconds)
pub const MAX_EXPIRE_AFTER_SECONDS: u64 = i32::MAX as u64;

/// Declarative secondary index on a record field.
///
/// `field` is a dotted path relative to the stored record, so payload fields
/// are addressed as `document.<path>`. An index with `expire_after_seconds`
/// asks the store to drop records once the timestamp at `field` plus the
/// given number of seconds lies in the past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
  pub field: String,
  #[serde(default)]
  pub unique: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expire_after_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

impl IndexSpec {
  pub fn new(field: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      unique: false,
      expire_after_seconds: None,
      name: None,
    }
  }

  pub fn unique(mut self) -> Self {
    self.unique = true;
    self
  }

  pub fn expire_after(mut self, seconds: u64) -> Self {
    self.expire_after_seconds = Some(seconds);
    self
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Index name, defaulting to the `<field>_1` convention of document stores
  pub fn index_name(&self) -> String {
    self
      .name
      .clone()
      .unwrap_or_else(|| format!("{}_1", self.field.replace('.', "_")))
  }

  /// Path inside the payload, or `None` when the field is the record key
  pub fn payload_path(&self) -> Option<&str> {
    self
      .field
      .strip_prefix(PAYLOAD_FIELD)
      .and_then(|rest| rest.strip_prefix('.'))
  }

  pub fn is_expiring(&self) -> bool {
    self.expire_after_seconds.is_some()
  }

  pub fn validate(&self) -> Result<(), IndexSpecError> {
    if self.field.is_empty() {
      return Err(IndexSpecError::EmptyField);
    }
    if let Some(ttl) = self.expire_after_seconds {
      if ttl > MAX_EXPIRE_AFTER_SECONDS {
        return Err(IndexSpecError::TtlOutOfRange(ttl));
      }
    }
    let is_key = self.field == "_id" || self.field == "uuid";
    match self.payload_path() {
      Some(path) if !path.is_empty() => Ok(()),
      None if is_key => Ok(()),
      _ => Err(IndexSpecError::UnsupportedField(self.field.clone())),
    }
  }
}

/// Parses `FIELD[:unique][:ttl=SECONDS][:name=NAME]`
impl FromStr for IndexSpec {
  type Err = IndexSpecError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split(':');
    let field = parts.next().unwrap_or_default().trim();
    let mut spec = IndexSpec::new(field);

    for option in parts {
      let option = option.trim();
      if option == "unique" {
        spec.unique = true;
      } else if let Some(secs) = option.strip_prefix("ttl=") {
        let secs = secs
          .parse()
          .map_err(|_| IndexSpecError::InvalidTtl(secs.to_string()))?;
        spec.expire_after_seconds = Some(secs);
      } else if let Some(name) = option.strip_prefix("name=") {
        spec.name = Some(name.to_string());
      } else {
        return Err(IndexSpecError::UnknownOption(option.to_string()));
      }
    }

    spec.validate()?;
    Ok(spec)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexSpecError {
  #[error("index field cannot be empty")]
  EmptyField,
  #[error("cannot index '{0}': use '_id', 'uuid' or a 'document.<path>' field")]
  UnsupportedField(String),
  #[error("invalid ttl '{0}', expected whole seconds")]
  InvalidTtl(String),
  #[error("ttl of {0} seconds exceeds the maximum of {max}", max = MAX_EXPIRE_AFTER_SECONDS)]
  TtlOutOfRange(u64),
  #[error("unknown index option '{0}'")]
  UnknownOption(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_plain_field() {
    let spec: IndexSpec = "document.name".parse().unwrap();
    assert_eq!(spec, IndexSpec::new("document.name"));
    assert_eq!(spec.payload_path(), Some("name"));
    assert_eq!(spec.index_name(), "document_name_1");
  }

  #[test]
  fn test_parse_expiring_unique() {
    let spec: IndexSpec = "document.expires:unique:ttl=0".parse().unwrap();
    assert!(spec.unique);
    assert_eq!(spec.expire_after_seconds, Some(0));
    assert!(spec.is_expiring());
  }

  #[test]
  fn test_parse_named() {
    let spec: IndexSpec = "document.a.b:name=by_ab".parse().unwrap();
    assert_eq!(spec.index_name(), "by_ab");
    assert_eq!(spec.payload_path(), Some("a.b"));
  }

  #[test]
  fn test_parse_errors() {
    assert_eq!(
      "".parse::<IndexSpec>().unwrap_err(),
      IndexSpecError::EmptyField
    );
    assert_eq!(
      "document.x:ttl=soon".parse::<IndexSpec>().unwrap_err(),
      IndexSpecError::InvalidTtl("soon".into())
    );
    assert_eq!(
      "document.x:sparse".parse::<IndexSpec>().unwrap_err(),
      IndexSpecError::UnknownOption("sparse".into())
    );
    assert!(matches!(
      "name".parse::<IndexSpec>().unwrap_err(),
      IndexSpecError::UnsupportedField(_)
    ));
    assert!("document.".parse::<IndexSpec>().is_err());
    assert!("documents.x".parse::<IndexSpec>().is_err());
  }

  #[test]
  fn test_ttl_is_bounded() {
    let at_limit = format!("document.expires:ttl={}", MAX_EXPIRE_AFTER_SECONDS);
    assert!(at_limit.parse::<IndexSpec>().is_ok());
    assert_eq!(
      "document.expires:ttl=10000000000000000"
        .parse::<IndexSpec>()
        .unwrap_err(),
      IndexSpecError::TtlOutOfRange(10_000_000_000_000_000)
    );
  }

  #[test]
  fn test_key_fields_are_valid() {
    assert!(IndexSpec::new("uuid").unique().validate().is_ok());
    assert!(IndexSpec::new("_id").validate().is_ok());
    assert_eq!(IndexSpec::new("uuid").payload_path(), None);
  }

  #[test]
  fn test_yaml_shape() {
    let spec: IndexSpec =
      serde_yaml::from_str("field: document.expires\nexpire_after_seconds: 3600\n").unwrap();
    assert_eq!(spec, IndexSpec::new("document.expires").expire_after(3600));
  }
}
