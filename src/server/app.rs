use std::sync::Arc;

use axum::Router;

use super::config::AppConfig;
use super::error::ErrorFormat;
use super::handler::CrudHandler;
use super::router::{build_router, AppState};
use crate::db::DocumentStore;

/// A store bound to its HTTP surface, ready to be served
pub struct Application {
  pub router: Router,
  pub handler: Arc<CrudHandler>,
  pub prefix: String,
}

impl Application {
  /// Prepare the store and build the router for `config`.
  ///
  /// With `store.initialize_database` set, the target database is wiped
  /// before anything else happens.
  pub async fn new(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self, anyhow::Error> {
    config.validate()?;
    store.init_schema().await?;
    if config.store.initialize_database {
      tracing::warn!("Wiping database '{}'", store.namespace().database);
      store.drop_database().await?;
    }

    let handler = Arc::new(CrudHandler::new(
      store,
      config.store.id_strategy,
      config.store.indexes.clone(),
      config.store.validation.validator(),
    ));
    let state = AppState {
      handler: handler.clone(),
      errors: ErrorFormat::new(config.server.debug),
    };
    let prefix = config.server.route_prefix();
    let router = build_router(state, &config.server);

    Ok(Self {
      router,
      handler,
      prefix,
    })
  }

  pub fn store(&self) -> &Arc<dyn DocumentStore> {
    self.handler.store()
  }
}
