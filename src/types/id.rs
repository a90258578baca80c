use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// How document identifiers are minted and exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
  /// Store-native 12-byte object id, exposed as 24 hex chars
  ObjectId,
  /// Random v4 UUID minted by the server, exposed as 32 hex chars
  #[default]
  Uuid,
}

impl IdStrategy {
  /// Key under which a freshly created identifier is returned to the client
  pub fn response_key(&self) -> &'static str {
    match self {
      Self::ObjectId => "document_id",
      Self::Uuid => "uuid",
    }
  }

  /// Whether the server picks the identifier before insert.
  /// Object ids are left to the store.
  pub fn assigned_by_server(&self) -> bool {
    matches!(self, Self::Uuid)
  }

  /// Mint a fresh identifier of this kind
  pub fn new_id(&self) -> DocumentId {
    match self {
      Self::ObjectId => DocumentId::ObjectId(ObjectId::new()),
      Self::Uuid => DocumentId::Uuid(Uuid::new_v4()),
    }
  }

  /// Parse an identifier taken from a request path
  pub fn parse(&self, raw: &str) -> Result<DocumentId, IdParseError> {
    match self {
      Self::ObjectId => ObjectId::parse_str(raw)
        .map(DocumentId::ObjectId)
        .map_err(|_| IdParseError::ObjectId(raw.to_string())),
      Self::Uuid => {
        let uuid = Uuid::try_parse(raw).map_err(|_| IdParseError::Uuid(raw.to_string()))?;
        // The server only ever hands out random UUIDs
        if uuid.get_version_num() != 4 {
          return Err(IdParseError::Uuid(raw.to_string()));
        }
        Ok(DocumentId::Uuid(uuid))
      }
    }
  }
}

impl FromStr for IdStrategy {
  type Err = IdParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "object_id" | "objectid" | "oid" => Ok(Self::ObjectId),
      "uuid" => Ok(Self::Uuid),
      _ => Err(IdParseError::UnknownStrategy(s.to_string())),
    }
  }
}

/// Identifier of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentId {
  ObjectId(ObjectId),
  Uuid(Uuid),
}

impl DocumentId {
  pub fn strategy(&self) -> IdStrategy {
    match self {
      Self::ObjectId(_) => IdStrategy::ObjectId,
      Self::Uuid(_) => IdStrategy::Uuid,
    }
  }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
      Self::Uuid(uuid) => write!(f, "{}", uuid.simple()),
    }
  }
}

impl Serialize for DocumentId {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
  #[error("'{0}' is not a valid object id")]
  ObjectId(String),
  #[error("'{0}' is not a valid document uuid")]
  Uuid(String),
  #[error("unknown id strategy '{0}', expected 'uuid' or 'object_id'")]
  UnknownStrategy(String),
}
