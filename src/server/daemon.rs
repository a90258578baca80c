use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::app::Application;
use super::config::AppConfig;
use crate::db::DocumentStore;
use crate::types::IndexSpec;

pub struct Daemon {
  config: AppConfig,
  store: Arc<dyn DocumentStore>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      config,
      store,
      shutdown_tx,
    }
  }

  /// Trigger graceful shutdown of the server and background tasks
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    let app = Application::new(&self.config, self.store.clone()).await?;

    let expiring: Vec<IndexSpec> = self
      .config
      .store
      .indexes
      .iter()
      .filter(|spec| spec.is_expiring())
      .cloned()
      .collect();
    if !expiring.is_empty() && !self.store.native_expiry() {
      let interval = Duration::from_secs(self.config.store.expiry_sweep_secs.max(1));
      tokio::spawn(sweep_expired(
        self.store.clone(),
        expiring,
        interval,
        self.shutdown_tx.subscribe(),
      ));
      tracing::info!("Expiry sweeper running every {:?}", interval);
    }

    let addr = self.config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
      "crudster serving {} ({}) at http://{}{}",
      self.store.namespace(),
      self.store.backend(),
      addr,
      app.prefix
    );

    let mut shutdown_rx = self.shutdown_tx.subscribe();
    axum::serve(listener, app.router.into_make_service())
      .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        tracing::info!("HTTP server shutting down");
      })
      .await?;
    Ok(())
  }
}

/// Periodically delete expired records for stores without native TTL
async fn sweep_expired(
  store: Arc<dyn DocumentStore>,
  specs: Vec<IndexSpec>,
  interval: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) {
  let mut ticker = tokio::time::interval(interval);
  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = shutdown_rx.recv() => break,
    }
    for spec in &specs {
      match store.purge_expired(spec).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Expired {} record(s) via '{}'", n, spec.field),
        Err(e) => tracing::warn!("Expiry sweep on '{}' failed: {:#}", spec.field, e),
      }
    }
  }
}
