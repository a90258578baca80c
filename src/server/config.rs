use serde::{Deserialize, Serialize};
use std::path::Path;

use super::validate::Validation;
use crate::types::{IdStrategy, IndexSpec};

/// Expand environment variables in a string.
/// Supports $VAR_NAME and ${VAR_NAME} syntax.
fn expand_env_vars(input: &str) -> String {
  let mut result = input.to_string();

  // ${VAR_NAME} first
  while let Some(start) = result.find("${") {
    let Some(end) = result[start..].find('}') else {
      break;
    };
    let value = std::env::var(&result[start + 2..start + end]).unwrap_or_default();
    result.replace_range(start..start + end + 1, &value);
  }

  // $VAR_NAME (alphanumeric + underscore)
  let mut i = 0;
  while i < result.len() {
    if result.as_bytes()[i] == b'$' {
      let var_len = result[i + 1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
      if var_len > 0 {
        let value = std::env::var(&result[i + 1..i + 1 + var_len]).unwrap_or_default();
        result.replace_range(i..i + 1 + var_len, &value);
        i += value.len();
        continue;
      }
    }
    i += 1;
  }

  result
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
  Sqlite,
  Postgres,
  #[default]
  Mongodb,
}

impl std::fmt::Display for BackendType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      BackendType::Sqlite => "sqlite",
      BackendType::Postgres => "postgres",
      BackendType::Mongodb => "mongodb",
    })
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub backend: BackendType,
  #[serde(default)]
  pub sqlite: SqliteSection,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub mongodb: MongodbSection,
  #[serde(default)]
  pub store: StoreSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Path the collection is mounted under
  #[serde(default = "default_prefix")]
  pub api_prefix: String,
  /// Outer prefix added by a path-rewriting gateway
  #[serde(default = "default_prefix")]
  pub service_prefix: String,
  /// Render errors as plain-text reports instead of JSON
  #[serde(default)]
  pub debug: bool,
  /// Use ["*"] for permissive mode; empty disables CORS
  #[serde(default)]
  pub cors_origins: Vec<String>,
  /// Larger request bodies are rejected with 413
  #[serde(default = "default_max_body_bytes")]
  pub max_body_bytes: usize,
}

fn default_host() -> String {
  "0.0.0.0".into()
}
fn default_port() -> u16 {
  8888
}
fn default_prefix() -> String {
  "/".into()
}
fn default_max_body_bytes() -> usize {
  2 * 1024 * 1024
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      api_prefix: default_prefix(),
      service_prefix: default_prefix(),
      debug: false,
      cors_origins: Vec::new(),
      max_body_bytes: default_max_body_bytes(),
    }
  }
}

impl ServerSection {
  /// Full route prefix: service prefix + api prefix, always `/`-delimited.
  ///
  /// `("/user/x/", "api")` gives `/user/x/api/`.
  pub fn route_prefix(&self) -> String {
    let service = self.service_prefix.trim_matches('/');
    let api = self.api_prefix.trim_matches('/');
    let mut prefix = String::from("/");
    for part in [service, api] {
      if !part.is_empty() {
        prefix.push_str(part);
        prefix.push('/');
      }
    }
    prefix
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}
fn default_sqlite_path() -> String {
  "crudster.db".into()
}
impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  #[serde(default = "default_pg_url")]
  pub url: String,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}
fn default_pg_url() -> String {
  "postgres://localhost/crudster".into()
}
fn default_max_conn() -> usize {
  20
}
impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: default_pg_url(),
      max_connections: default_max_conn(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongodbSection {
  #[serde(default = "default_mongodb_uri")]
  pub uri: String,
}
fn default_mongodb_uri() -> String {
  "mongodb://127.0.0.1:27017".into()
}
impl Default for MongodbSection {
  fn default() -> Self {
    Self {
      uri: default_mongodb_uri(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
  #[serde(default = "default_database_name")]
  pub database_name: String,
  #[serde(default = "default_collection_name")]
  pub collection_name: String,
  /// Wipe the database on startup. Test isolation only.
  #[serde(default)]
  pub initialize_database: bool,
  #[serde(default)]
  pub id_strategy: IdStrategy,
  #[serde(default)]
  pub validation: Validation,
  /// Interval of the expiry sweeper for stores without native TTL
  #[serde(default = "default_sweep_secs")]
  pub expiry_sweep_secs: u64,
  #[serde(default)]
  pub indexes: Vec<IndexSpec>,
}

fn default_database_name() -> String {
  "crudster".into()
}
fn default_collection_name() -> String {
  "data".into()
}
fn default_sweep_secs() -> u64 {
  60
}

impl Default for StoreSection {
  fn default() -> Self {
    Self {
      database_name: default_database_name(),
      collection_name: default_collection_name(),
      initialize_database: false,
      id_strategy: IdStrategy::default(),
      validation: Validation::default(),
      expiry_sweep_secs: default_sweep_secs(),
      indexes: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}
fn default_level() -> String {
  "info".into()
}
impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl AppConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["crudster.yaml", "crudster.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }

  /// Check the index declarations before anything is started
  pub fn validate(&self) -> Result<(), anyhow::Error> {
    for spec in &self.store.indexes {
      spec.validate()?;
    }
    Ok(())
  }
}
