use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use super::backend::{DocumentStore, Namespace};
use crate::codec::{bson_to_json, bson_to_uuid, json_to_bson, promote_timestamp, uuid_to_bson};
use crate::server::BackendType;
use crate::types::{DocumentId, DocumentRecord, IdStrategy, IndexSpec, PAYLOAD_FIELD};

/// Record field holding the server-generated key under the UUID strategy
const UUID_FIELD: &str = "uuid";

pub struct MongoBackend {
  client: Client,
  collection: Collection<Document>,
  namespace: Namespace,
  strategy: IdStrategy,
  /// Record paths of TTL indexes; timestamps there are stored as BSON datetimes
  expiring: Vec<String>,
}

impl MongoBackend {
  pub async fn connect(
    uri: &str,
    namespace: Namespace,
    strategy: IdStrategy,
    indexes: &[IndexSpec],
  ) -> Result<Self, anyhow::Error> {
    let options = ClientOptions::parse(uri).await?;
    let client = Client::with_options(options)?;
    let collection = client
      .database(&namespace.database)
      .collection::<Document>(&namespace.collection);
    let expiring = indexes
      .iter()
      .filter(|spec| spec.is_expiring())
      .map(|spec| spec.field.clone())
      .collect();

    Ok(Self {
      client,
      collection,
      namespace,
      strategy,
      expiring,
    })
  }

  fn filter(id: &DocumentId) -> Document {
    match id {
      DocumentId::ObjectId(oid) => doc! { "_id": *oid },
      DocumentId::Uuid(uuid) => doc! { UUID_FIELD: uuid_to_bson(uuid) },
    }
  }

  /// `{document: <payload>}` with expiry timestamps promoted
  fn payload(&self, document: &serde_json::Value) -> Document {
    let mut record = doc! { PAYLOAD_FIELD: json_to_bson(document) };
    for field in &self.expiring {
      promote_timestamp(&mut record, field);
    }
    record
  }

  fn record_id(&self, record: &Document) -> Result<DocumentId, anyhow::Error> {
    let id = match self.strategy {
      IdStrategy::ObjectId => record.get_object_id("_id").ok().map(DocumentId::ObjectId),
      IdStrategy::Uuid => record
        .get(UUID_FIELD)
        .and_then(bson_to_uuid)
        .map(DocumentId::Uuid),
    };
    id.ok_or_else(|| anyhow::anyhow!("record in {} has no usable key", self.namespace))
  }
}

#[async_trait]
impl DocumentStore for MongoBackend {
  fn backend(&self) -> BackendType {
    BackendType::Mongodb
  }

  fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  fn native_expiry(&self) -> bool {
    true
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    // Collections are created on first write
    self
      .client
      .database(&self.namespace.database)
      .run_command(doc! { "ping": 1 })
      .await?;
    tracing::info!("MongoDB connection established for {}", self.namespace);
    Ok(())
  }

  async fn drop_database(&self) -> Result<(), anyhow::Error> {
    self.client.database(&self.namespace.database).drop().await?;
    tracing::info!("Dropped database '{}'", self.namespace.database);
    Ok(())
  }

  async fn insert(
    &self,
    id: Option<DocumentId>,
    document: serde_json::Value,
  ) -> Result<DocumentId, anyhow::Error> {
    let mut record = self.payload(&document);
    let id = match id {
      Some(id) => Some(id),
      None if self.strategy.assigned_by_server() => Some(self.strategy.new_id()),
      None => None,
    };
    match &id {
      Some(DocumentId::ObjectId(oid)) => {
        record.insert("_id", *oid);
      }
      Some(DocumentId::Uuid(uuid)) => {
        record.insert(UUID_FIELD, uuid_to_bson(uuid));
      }
      None => {}
    }

    let result = self.collection.insert_one(record).await?;
    match id {
      Some(id) => Ok(id),
      None => result
        .inserted_id
        .as_object_id()
        .map(DocumentId::ObjectId)
        .ok_or_else(|| anyhow::anyhow!("store returned a non-ObjectId key")),
    }
  }

  async fn find_one(&self, id: &DocumentId) -> Result<Option<serde_json::Value>, anyhow::Error> {
    let record = self.collection.find_one(Self::filter(id)).await?;
    Ok(record.map(|mut r| r.remove(PAYLOAD_FIELD).map(bson_to_json).unwrap_or_default()))
  }

  async fn find_all(&self) -> Result<Vec<DocumentRecord>, anyhow::Error> {
    let mut cursor = self.collection.find(doc! {}).await?;
    let mut out = Vec::new();
    while let Some(mut record) = cursor.try_next().await? {
      let id = self.record_id(&record)?;
      let payload = record
        .remove(PAYLOAD_FIELD)
        .map(bson_to_json)
        .unwrap_or_default();
      out.push(DocumentRecord::new(id, payload));
    }
    Ok(out)
  }

  async fn replace(
    &self,
    id: &DocumentId,
    document: serde_json::Value,
  ) -> Result<bool, anyhow::Error> {
    let update = doc! { "$set": self.payload(&document) };
    let previous = self
      .collection
      .find_one_and_update(Self::filter(id), update)
      .await?;
    Ok(previous.is_some())
  }

  async fn delete(&self, id: &DocumentId) -> Result<u64, anyhow::Error> {
    let result = self.collection.delete_one(Self::filter(id)).await?;
    Ok(result.deleted_count)
  }

  async fn create_index(&self, spec: &IndexSpec) -> Result<(), anyhow::Error> {
    spec.validate()?;
    let options = IndexOptions::builder()
      .unique(spec.unique)
      .name(spec.index_name())
      .expire_after(spec.expire_after_seconds.map(Duration::from_secs))
      .build();
    let mut keys = Document::new();
    keys.insert(spec.field.clone(), 1);
    let model = IndexModel::builder()
      .keys(keys)
      .options(options)
      .build();
    self.collection.create_index(model).await?;
    tracing::debug!("Ensured index {} on {}", spec.index_name(), self.namespace);
    Ok(())
  }

  async fn purge_expired(&self, _spec: &IndexSpec) -> Result<u64, anyhow::Error> {
    // TTL indexes are enforced by the server
    Ok(0)
  }
}
