mod app;
mod config;
mod daemon;
mod error;
mod handler;
mod router;
mod validate;

pub use app::Application;
pub use config::{
  AppConfig, BackendType, LoggingSection, MongodbSection, PostgresSection, ServerSection,
  SqliteSection, StoreSection,
};
pub use daemon::Daemon;
pub use error::{ApiError, ErrorFormat};
pub use handler::{CrudHandler, Reply};
pub use router::{build_router, AppState};
pub use validate::{AcceptAll, DocumentValidator, RequireExpiry, Validation, EXPIRES_FIELD};
