use async_trait::async_trait;
use rusqlite::params;
use tokio_rusqlite::Connection;

use super::backend::{DocumentStore, Namespace};
use super::sanitize::{escape_string, index_object_name, validate_identifier};
use crate::codec::{expiry_cutoff, now_timestamp, DATETIME_GLOB};
use crate::server::BackendType;
use crate::types::{DocumentId, DocumentRecord, IdStrategy, IndexSpec};

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
"#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT NOT NULL,
    db_name TEXT NOT NULL,
    collection TEXT NOT NULL,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (db_name, collection, id)
) WITHOUT ROWID;
"#;

pub struct SqliteBackend {
  conn: Connection,
  namespace: Namespace,
  strategy: IdStrategy,
}

impl SqliteBackend {
  pub async fn new(
    path: &str,
    namespace: Namespace,
    strategy: IdStrategy,
  ) -> Result<Self, anyhow::Error> {
    namespace.validate()?;

    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    // Apply performance pragmas
    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self {
      conn,
      namespace,
      strategy,
    })
  }

  pub async fn in_memory(namespace: Namespace, strategy: IdStrategy) -> Result<Self, anyhow::Error> {
    Self::new(":memory:", namespace, strategy).await
  }

  fn keys(&self) -> (String, String) {
    (
      self.namespace.database.clone(),
      self.namespace.collection.clone(),
    )
  }
}

#[async_trait]
impl DocumentStore for SqliteBackend {
  fn backend(&self) -> BackendType {
    BackendType::Sqlite
  }

  fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self
      .conn
      .call(|conn| conn.execute_batch(SCHEMA).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized");
    Ok(())
  }

  async fn drop_database(&self) -> Result<(), anyhow::Error> {
    let db = self.namespace.database.clone();
    let removed: usize = self
      .conn
      .call(move |conn| {
        conn
          .execute("DELETE FROM documents WHERE db_name = ?1", params![db])
          .map_err(|e| e.into())
      })
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
    let (db, col) = self.keys();
    let id_str = id.to_string();
    let doc_str = serde_json::to_string(&document)?;
    let now_str = now_timestamp();

    self.conn.call(move |conn| {
      conn.execute(
        "INSERT INTO documents (id, db_name, collection, document, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id_str, db, col, doc_str, now_str],
      ).map_err(|e| e.into())
    }).await?;

    Ok(id)
  }

  async fn find_one(&self, id: &DocumentId) -> Result<Option<serde_json::Value>, anyhow::Error> {
    let (db, col) = self.keys();
    let id_str = id.to_string();

    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT document FROM documents WHERE db_name = ?1 AND collection = ?2 AND id = ?3",
        )?;
        let mut rows = stmt.query(params![db, col, id_str])?;
        match rows.next()? {
          Some(row) => Ok(Some(row.get::<_, String>(0)?)),
          None => Ok(None),
        }
      })
      .await?;

    match raw {
      Some(s) => Ok(Some(serde_json::from_str(&s)?)),
      None => Ok(None),
    }
  }

  async fn find_all(&self) -> Result<Vec<DocumentRecord>, anyhow::Error> {
    let (db, col) = self.keys();

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn
          .prepare_cached("SELECT id, document FROM documents WHERE db_name = ?1 AND collection = ?2")?;
        let mut rows = stmt.query(params![db, col])?;
        let mut out: Vec<(String, String)> = Vec::new();
        while let Some(row) = rows.next()? {
          out.push((row.get(0)?, row.get(1)?));
        }
        Ok(out)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, doc)| {
        Ok(DocumentRecord::new(
          self.strategy.parse(&id)?,
          serde_json::from_str(&doc)?,
        ))
      })
      .collect()
  }

  async fn replace(
    &self,
    id: &DocumentId,
    document: serde_json::Value,
  ) -> Result<bool, anyhow::Error> {
    let (db, col) = self.keys();
    let id_str = id.to_string();
    let doc_str = serde_json::to_string(&document)?;
    let now_str = now_timestamp();

    let changed: usize = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "UPDATE documents SET document = ?1, updated_at = ?2 WHERE db_name = ?3 AND collection = ?4 AND id = ?5",
            params![doc_str, now_str, db, col, id_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete(&self, id: &DocumentId) -> Result<u64, anyhow::Error> {
    let (db, col) = self.keys();
    let id_str = id.to_string();

    let removed: usize = self
      .conn
      .call(move |conn| {
        conn
          .execute(
            "DELETE FROM documents WHERE db_name = ?1 AND collection = ?2 AND id = ?3",
            params![db, col, id_str],
          )
          .map_err(|e| e.into())
      })
      .await?;
    Ok(removed as u64)
  }

  async fn create_index(&self, spec: &IndexSpec) -> Result<(), anyhow::Error> {
    spec.validate()?;
    // Record keys are already covered by the primary key
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
      "CREATE {unique}INDEX IF NOT EXISTS {name} ON documents (json_extract(document, '$.{path}')) WHERE db_name = '{db}' AND collection = '{col}'",
      unique = if spec.unique { "UNIQUE " } else { "" },
      name = name,
      path = path,
      db = escape_string(&self.namespace.database)?,
      col = escape_string(&self.namespace.collection)?,
    );

    self
      .conn
      .call(move |conn| conn.execute_batch(&sql).map_err(|e| e.into()))
      .await?;
    tracing::debug!("Ensured index {} on {}", name, self.namespace);
    Ok(())
  }

  async fn purge_expired(&self, spec: &IndexSpec) -> Result<u64, anyhow::Error> {
    let (Some(ttl), Some(path)) = (spec.expire_after_seconds, spec.payload_path()) else {
      return Ok(0);
    };
    validate_identifier(path)?;

    let (db, col) = self.keys();
    let cutoff = expiry_cutoff(ttl)?;
    // Canonical timestamps sort lexicographically; other values never expire
    let sql = format!(
      "DELETE FROM documents WHERE db_name = ?1 AND collection = ?2 AND json_type(document, '$.{path}') = 'text' AND json_extract(document, '$.{path}') GLOB ?4 AND json_extract(document, '$.{path}') <= ?3",
      path = path
    );

    let removed: usize = self
      .conn
      .call(move |conn| {
        conn
          .execute(&sql, params![db, col, cutoff, DATETIME_GLOB])
          .map_err(|e| e.into())
      })
      .await?;
    Ok(removed as u64)
  }
}
