use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use super::backend::{DocumentStore, Namespace};
use super::sanitize::{escape_string, index_object_name, validate_identifier};
use crate::codec::{expiry_cutoff, DATETIME_REGEX};
use crate::server::BackendType;
use crate::types::{DocumentId, DocumentRecord, IdStrategy, IndexSpec};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id VARCHAR(64) NOT NULL,
    db_name VARCHAR(255) NOT NULL,
    collection VARCHAR(255) NOT NULL,
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW(),
    updated_at TIMESTAMPTZ DEFAULT NOW(),
    PRIMARY KEY (db_name, collection, id)
);
"#;

pub struct PostgresBackend {
  pool: Pool,
  namespace: Namespace,
  strategy: IdStrategy,
}

impl PostgresBackend {
  pub fn new(
    url: &str,
    max_connections: usize,
    namespace: Namespace,
    strategy: IdStrategy,
  ) -> Result<Self, anyhow::Error> {
    namespace.validate()?;

    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(Self {
      pool,
      namespace,
      strategy,
    })
  }

  /// `a.b` becomes the `text[]` path `{a,b}` used by `#>` / `#>>`
  fn json_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
  }
}

#[async_trait]
impl DocumentStore for PostgresBackend {
  fn backend(&self) -> BackendType {
    BackendType::Postgres
  }

  fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.batch_execute(SCHEMA).await?;
    tracing::info!("PostgreSQL schema initialized");
    Ok(())
  }

  async fn drop_database(&self) -> Result<(), anyhow::Error> {
    let removed = self
      .pool
      .get()
      .await?
      .execute(
        "DELETE FROM documents WHERE db_name = $1",
        &[&self.namespace.database],
      )
      .await?;
    tracing::info!(
      "Cleared database '{}' ({} records)",
      self.namespace.database,
      removed
    );
    Ok(())
  }

  async fn insert(
    &self,
    id: Option<DocumentId>,
    document: serde_json::Value,
  ) -> Result<DocumentId, anyhow::Error> {
    let id = id.unwrap_or_else(|| self.strategy.new_id());
    let id_str = id.to_string();
    self.pool.get().await?.execute(
      "INSERT INTO documents (id, db_name, collection, document) VALUES ($1, $2, $3, $4)",
      &[&id_str, &self.namespace.database, &self.namespace.collection, &document],
    ).await?;
    Ok(id)
  }

  async fn find_one(&self, id: &DocumentId) -> Result<Option<serde_json::Value>, anyhow::Error> {
    let id_str = id.to_string();
    let row = self.pool.get().await?.query_opt(
      "SELECT document FROM documents WHERE db_name = $1 AND collection = $2 AND id = $3",
      &[&self.namespace.database, &self.namespace.collection, &id_str],
    ).await?;
    Ok(row.map(|r| r.get(0)))
  }

  async fn find_all(&self) -> Result<Vec<DocumentRecord>, anyhow::Error> {
    let rows = self
      .pool
      .get()
      .await?
      .query(
        "SELECT id, document FROM documents WHERE db_name = $1 AND collection = $2",
        &[&self.namespace.database, &self.namespace.collection],
      )
      .await?;

    rows
      .into_iter()
      .map(|r| {
        let id: String = r.get(0);
        Ok(DocumentRecord::new(self.strategy.parse(&id)?, r.get(1)))
      })
      .collect()
  }

  async fn replace(
    &self,
    id: &DocumentId,
    document: serde_json::Value,
  ) -> Result<bool, anyhow::Error> {
    let id_str = id.to_string();
    let changed = self.pool.get().await?.execute(
      "UPDATE documents SET document = $1, updated_at = NOW() WHERE db_name = $2 AND collection = $3 AND id = $4",
      &[&document, &self.namespace.database, &self.namespace.collection, &id_str],
    ).await?;
    Ok(changed > 0)
  }

  async fn delete(&self, id: &DocumentId) -> Result<u64, anyhow::Error> {
    let id_str = id.to_string();
    let removed = self
      .pool
      .get()
      .await?
      .execute(
        "DELETE FROM documents WHERE db_name = $1 AND collection = $2 AND id = $3",
        &[&self.namespace.database, &self.namespace.collection, &id_str],
      )
      .await?;
    Ok(removed)
  }

  async fn create_index(&self, spec: &IndexSpec) -> Result<(), anyhow::Error> {
    spec.validate()?;
    let Some(path) = spec.payload_path() else {
      tracing::debug!("Index on '{}' is implied by the primary key", spec.field);
      return Ok(());
    };
    validate_identifier(path)?;

    let name = index_object_name(&[
      "idx",
      &self.namespace.database,
      &self.namespace.collection,
      &spec.index_name(),
    ])?;
    let sql = format!(
      "CREATE {unique}INDEX IF NOT EXISTS {name} ON documents ((document #>> '{{{path}}}')) WHERE db_name = '{db}' AND collection = '{col}'",
      unique = if spec.unique { "UNIQUE " } else { "" },
      name = name,
      path = path.replace('.', ","),
      db = escape_string(&self.namespace.database)?,
      col = escape_string(&self.namespace.collection)?,
    );

    self.pool.get().await?.batch_execute(&sql).await?;
    tracing::debug!("Ensured index {} on {}", name, self.namespace);
    Ok(())
  }

  async fn purge_expired(&self, spec: &IndexSpec) -> Result<u64, anyhow::Error> {
    let (Some(ttl), Some(path)) = (spec.expire_after_seconds, spec.payload_path()) else {
      return Ok(0);
    };
    validate_identifier(path)?;

    let json_path = Self::json_path(path);
    let cutoff = expiry_cutoff(ttl)?;
    let removed = self.pool.get().await?.execute(
      "DELETE FROM documents WHERE db_name = $1 AND collection = $2 AND jsonb_typeof(document #> $3) = 'string' AND (document #>> $3) ~ $5 AND (document #>> $3) <= $4",
      &[&self.namespace.database, &self.namespace.collection, &json_path, &cutoff, &DATETIME_REGEX],
    ).await?;
    Ok(removed)
  }
}
