use clap::Parser;
use crudster::db;
use crudster::server::{AppConfig, BackendType, Daemon, Validation};
use crudster::types::{IdStrategy, IndexSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "crudster", about = "CRUD REST server for a document collection", version)]
struct Args {
  /// Path the collection is served under
  #[arg(short = 'a', long)]
  api_prefix: Option<String>,
  #[arg(short = 'c', long)]
  collection_name: Option<String>,
  #[arg(short = 'd', long)]
  database_name: Option<String>,
  /// Wipe the database before serving
  #[arg(short = 'i', long)]
  initialize_database: bool,
  #[arg(short = 'm', long, env = "CRUDSTER_MONGODB_URI")]
  mongodb_uri: Option<String>,
  #[arg(short = 'p', long)]
  port: Option<u16>,
  /// Return error reports instead of bare status JSON
  #[arg(long)]
  debug: bool,
  #[arg(long)]
  config: Option<String>,
  #[arg(long, value_enum)]
  backend: Option<BackendType>,
  #[arg(long, env = "CRUDSTER_SQLITE_PATH")]
  sqlite: Option<String>,
  #[arg(long, env = "CRUDSTER_PG_URL")]
  pg_url: Option<String>,
  #[arg(long)]
  host: Option<String>,
  /// uuid or object_id
  #[arg(long)]
  id_strategy: Option<IdStrategy>,
  /// FIELD[:unique][:ttl=SECONDS], repeatable
  #[arg(long = "index")]
  indexes: Vec<IndexSpec>,
  #[arg(long, value_enum)]
  validation: Option<Validation>,
  #[arg(long)]
  log_level: Option<String>,
  /// Set by JupyterHub when running as a hub service
  #[arg(long, env = "JUPYTERHUB_SERVICE_PREFIX", hide = true)]
  service_prefix: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    AppConfig::from_file(path)?
  } else {
    AppConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(url) = args.mongodb_uri {
    config.mongodb.uri = url;
    config.backend = BackendType::Mongodb;
  }
  if let Some(url) = args.pg_url {
    config.postgres.url = url;
    config.backend = BackendType::Postgres;
  }
  if let Some(path) = args.sqlite {
    config.sqlite.path = path;
    config.backend = BackendType::Sqlite;
  }
  if let Some(backend) = args.backend {
    config.backend = backend;
  }
  if let Some(prefix) = args.api_prefix {
    config.server.api_prefix = prefix;
  }
  if let Some(prefix) = args.service_prefix {
    config.server.service_prefix = prefix;
  }
  if let Some(name) = args.collection_name {
    config.store.collection_name = name;
  }
  if let Some(name) = args.database_name {
    config.store.database_name = name;
  }
  if args.initialize_database {
    config.store.initialize_database = true;
  }
  if let Some(port) = args.port {
    config.server.port = port;
  }
  if let Some(host) = args.host {
    config.server.host = host;
  }
  if args.debug {
    config.server.debug = true;
  }
  if let Some(strategy) = args.id_strategy {
    config.store.id_strategy = strategy;
  }
  if !args.indexes.is_empty() {
    config.store.indexes = args.indexes;
  }
  if let Some(validation) = args.validation {
    config.store.validation = validation;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let store = db::connect(&config).await?;

  let daemon = Arc::new(Daemon::new(config, store));
  let daemon_clone = daemon.clone();

  // Handle shutdown signals (SIGINT, SIGTERM)
  tokio::spawn(async move {
    shutdown_signal().await;
    daemon_clone.shutdown();

    // Give in-flight requests time to drain
    tokio::time::sleep(Duration::from_secs(5)).await;
    tracing::info!("Shutdown complete");
    std::process::exit(0);
  });

  daemon.run().await
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!("Failed to listen for Ctrl+C: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        tracing::error!("Failed to install SIGTERM handler: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("Received SIGINT"),
    _ = terminate => tracing::info!("Received SIGTERM"),
  }
}
