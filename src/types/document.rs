use serde::Serialize;

use super::DocumentId;

/// One stored unit: the key and the client payload it was stored with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
  pub id: DocumentId,
  pub document: serde_json::Value,
}

impl DocumentRecord {
  pub fn new(id: DocumentId, document: serde_json::Value) -> Self {
    Self { id, document }
  }
}
