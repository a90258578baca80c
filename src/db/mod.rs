mod backend;
#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "postgres")]
mod postgres;
pub mod sanitize;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

pub use backend::{DocumentStore, Namespace};
#[cfg(feature = "mongodb")]
pub use mongo::MongoBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
pub use sanitize::SqlSanitizeError;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use crate::server::{AppConfig, BackendType};

/// Open the store selected by `config.backend`
pub async fn connect(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, anyhow::Error> {
  let namespace = Namespace::new(
    config.store.database_name.as_str(),
    config.store.collection_name.as_str(),
  );
  let strategy = config.store.id_strategy;

  let store: Arc<dyn DocumentStore> = match config.backend {
    #[cfg(feature = "sqlite")]
    BackendType::Sqlite => {
      Arc::new(SqliteBackend::new(&config.sqlite.path, namespace, strategy).await?)
    }
    #[cfg(feature = "postgres")]
    BackendType::Postgres => Arc::new(PostgresBackend::new(
      &config.postgres.url,
      config.postgres.max_connections,
      namespace,
      strategy,
    )?),
    #[cfg(feature = "mongodb")]
    BackendType::Mongodb => Arc::new(
      MongoBackend::connect(
        &config.mongodb.uri,
        namespace,
        strategy,
        &config.store.indexes,
      )
      .await?,
    ),
    #[allow(unreachable_patterns)]
    other => anyhow::bail!("backend '{}' is not compiled into this build", other),
  };
  Ok(store)
}
