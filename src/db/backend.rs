use async_trait::async_trait;

use super::sanitize::{validate_collection_name, SqlSanitizeError};
use crate::server::BackendType;
use crate::types::{DocumentId, DocumentRecord, IndexSpec};

/// Database + collection a store instance is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  pub database: String,
  pub collection: String,
}

impl Namespace {
  pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
    Self {
      database: database.into(),
      collection: collection.into(),
    }
  }

  /// Check both names are safe to splice into SQL
  pub fn validate(&self) -> Result<(), SqlSanitizeError> {
    validate_collection_name(&self.database)?;
    validate_collection_name(&self.collection)
  }
}

impl std::fmt::Display for Namespace {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}.{}", self.database, self.collection)
  }
}

/// A single collection of document records.
///
/// Every method is one atomic single-record (or single-scan) operation on
/// the underlying database; callers never compose them into transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  fn backend(&self) -> BackendType;
  fn namespace(&self) -> &Namespace;

  /// Whether the database expires records on its own (TTL indexes)
  fn native_expiry(&self) -> bool {
    false
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error>;

  /// Remove every record of the bound database
  async fn drop_database(&self) -> Result<(), anyhow::Error>;

  /// Insert a record. With `id == None` the store assigns the key.
  async fn insert(
    &self,
    id: Option<DocumentId>,
    document: serde_json::Value,
  ) -> Result<DocumentId, anyhow::Error>;

  async fn find_one(&self, id: &DocumentId) -> Result<Option<serde_json::Value>, anyhow::Error>;

  async fn find_all(&self) -> Result<Vec<DocumentRecord>, anyhow::Error>;

  /// Swap the payload of an existing record. Returns false when no record matched.
  async fn replace(
    &self,
    id: &DocumentId,
    document: serde_json::Value,
  ) -> Result<bool, anyhow::Error>;

  /// Returns the number of records removed
  async fn delete(&self, id: &DocumentId) -> Result<u64, anyhow::Error>;

  /// Idempotently create a secondary index
  async fn create_index(&self, spec: &IndexSpec) -> Result<(), anyhow::Error>;

  /// Delete records whose expiry has passed. Returns the number removed.
  async fn purge_expired(&self, spec: &IndexSpec) -> Result<u64, anyhow::Error>;
}
