use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::error::ApiError;
use super::validate::DocumentValidator;
use crate::db::DocumentStore;
use crate::types::{DocumentId, IdStrategy, IndexSpec};

/// Successful outcome of one CRUD operation
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
  /// Identifier of a new record under the strategy's response key
  Created { key: &'static str, id: DocumentId },
  /// A single stored payload
  Document(Value),
  /// Every record of the collection, keyed by identifier
  Documents(Map<String, Value>),
  /// `{}`
  Empty,
}

impl Reply {
  pub fn into_json(self) -> Value {
    match self {
      Reply::Created { key, id } => {
        let mut map = Map::new();
        map.insert(key.to_string(), Value::String(id.to_string()));
        Value::Object(map)
      }
      Reply::Document(document) => document,
      Reply::Documents(map) => Value::Object(map),
      Reply::Empty => Value::Object(Map::new()),
    }
  }
}

/// Maps the four verbs onto single store operations for one collection
pub struct CrudHandler {
  store: Arc<dyn DocumentStore>,
  strategy: IdStrategy,
  indexes: Vec<IndexSpec>,
  validator: Box<dyn DocumentValidator>,
  indexes_ready: AtomicBool,
}

impl CrudHandler {
  pub fn new(
    store: Arc<dyn DocumentStore>,
    strategy: IdStrategy,
    indexes: Vec<IndexSpec>,
    validator: Box<dyn DocumentValidator>,
  ) -> Self {
    let indexes_ready = AtomicBool::new(indexes.is_empty());
    Self {
      store,
      strategy,
      indexes,
      validator,
      indexes_ready,
    }
  }

  pub fn strategy(&self) -> IdStrategy {
    self.strategy
  }

  pub fn store(&self) -> &Arc<dyn DocumentStore> {
    &self.store
  }

  pub fn indexes_ready(&self) -> bool {
    self.indexes_ready.load(Ordering::Acquire)
  }

  /// POST: the identifier is always chosen here or by the store, never by the client
  pub async fn create(&self, id: Option<&str>, body: &[u8]) -> Result<Reply, ApiError> {
    if let Some(id) = id {
      return Err(ApiError::InvalidRequest(format!(
        "cannot create with an explicit identifier '{}'",
        id
      )));
    }
    let document = self.decode_and_validate(body)?;

    let id = if self.strategy.assigned_by_server() {
      Some(self.strategy.new_id())
    } else {
      None
    };
    let id = self.store.insert(id, document).await?;
    tracing::debug!("Created {} in {}", id, self.store.namespace());

    self.ensure_indexes().await;
    Ok(Reply::Created {
      key: self.strategy.response_key(),
      id,
    })
  }

  /// GET: one record when an identifier is given, otherwise the whole collection
  pub async fn read(&self, id: Option<&str>) -> Result<Reply, ApiError> {
    match id {
      Some(id) => self.read_one(id).await,
      None => self.read_many().await,
    }
  }

  pub async fn read_one(&self, id: &str) -> Result<Reply, ApiError> {
    let id = self.strategy.parse(id)?;
    match self.store.find_one(&id).await? {
      Some(document) => Ok(Reply::Document(document)),
      None => Err(ApiError::NotFound(id.to_string())),
    }
  }

  pub async fn read_many(&self) -> Result<Reply, ApiError> {
    let records = self.store.find_all().await?;
    let map = records
      .into_iter()
      .map(|record| (record.id.to_string(), record.document))
      .collect();
    Ok(Reply::Documents(map))
  }

  /// PUT: swap the payload, keep the identifier
  pub async fn update(&self, id: Option<&str>, body: &[u8]) -> Result<Reply, ApiError> {
    let Some(id) = id else {
      return Err(ApiError::InvalidRequest("update needs an identifier".into()));
    };
    let id = self.strategy.parse(id)?;
    let document = self.decode_and_validate(body)?;

    if self.store.replace(&id, document).await? {
      Ok(Reply::Empty)
    } else {
      Err(ApiError::NotFound(id.to_string()))
    }
  }

  pub async fn delete(&self, id: Option<&str>) -> Result<Reply, ApiError> {
    let Some(id) = id else {
      return Err(ApiError::InvalidRequest("delete needs an identifier".into()));
    };
    let id = self.strategy.parse(id)?;

    match self.store.delete(&id).await? {
      0 => Err(ApiError::NotFound(id.to_string())),
      _ => Ok(Reply::Empty),
    }
  }

  fn decode_and_validate(&self, body: &[u8]) -> Result<Value, ApiError> {
    let document: Value = serde_json::from_slice(body)?;
    self.validator.validate(&document)?;
    Ok(document)
  }

  /// Apply configured indexes once. Failures are logged and retried on the next create.
  pub async fn ensure_indexes(&self) {
    if self.indexes_ready() {
      return;
    }
    for spec in &self.indexes {
      if let Err(e) = self.store.create_index(spec).await {
        tracing::warn!(
          "Failed to create index '{}' on {}: {:#}",
          spec.index_name(),
          self.store.namespace(),
          e
        );
        return;
      }
    }
    self.indexes_ready.store(true, Ordering::Release);
    tracing::info!(
      "Applied {} index(es) on {}",
      self.indexes.len(),
      self.store.namespace()
    );
  }
}
