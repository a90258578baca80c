use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::ServerSection;
use super::error::{ApiError, ErrorFormat};
use super::handler::{CrudHandler, Reply};
use crate::codec::json_response;

#[derive(Clone)]
pub struct AppState {
  pub handler: Arc<CrudHandler>,
  pub errors: ErrorFormat,
}

impl AppState {
  fn respond(&self, result: Result<Reply, ApiError>) -> Response {
    match result {
      Ok(reply) => json_response(StatusCode::OK, &reply.into_json()),
      Err(e) => self.errors.render(&e),
    }
  }
}

/// Mount the collection at the server's route prefix and a single record
/// at `<prefix>{id}`. Every error, including extractor rejections and
/// panics, is rendered through the state's `ErrorFormat`.
pub fn build_router(state: AppState, server: &ServerSection) -> Router {
  let prefix = server.route_prefix();
  let collection = get(read_all)
    .post(create)
    .put(update_without_id)
    .delete(delete_without_id);
  let item = get(read_one)
    .post(create_with_id)
    .put(update)
    .delete(remove);

  let mut router = Router::new()
    .route(&prefix, collection.clone())
    .route(&format!("{}{{id}}", prefix), item);
  let bare = prefix.trim_end_matches('/');
  if !bare.is_empty() {
    router = router.route(bare, collection);
  }

  let errors = state.errors;
  let router = router
    .fallback(not_found)
    .method_not_allowed_fallback(method_not_allowed)
    .layer(DefaultBodyLimit::max(server.max_body_bytes))
    .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send>| {
      render_panic(errors, panic)
    }))
    .layer(TraceLayer::new_for_http());

  let router = match cors_layer(&server.cors_origins) {
    Some(cors) => router.layer(cors),
    None => router,
  };
  router.with_state(state)
}

fn render_panic(errors: ErrorFormat, panic: Box<dyn Any + Send>) -> Response {
  let message = panic
    .downcast_ref::<String>()
    .map(String::as_str)
    .or_else(|| panic.downcast_ref::<&str>().copied())
    .unwrap_or("unknown panic");
  errors.render(&ApiError::Internal(anyhow::anyhow!(
    "request handler panicked: {}",
    message
  )))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
  if origins.is_empty() {
    return None;
  }
  if origins.iter().any(|o| o == "*") {
    return Some(CorsLayer::permissive());
  }
  let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
  Some(
    CorsLayer::new()
      .allow_origin(origins)
      .allow_methods(cors::Any)
      .allow_headers(cors::Any),
  )
}

async fn create(
  State(state): State<AppState>,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  let result = match body {
    Ok(body) => state.handler.create(None, &body).await,
    Err(e) => Err(e.into()),
  };
  state.respond(result)
}

async fn create_with_id(
  State(state): State<AppState>,
  id: Result<Path<String>, PathRejection>,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  let result = match (id, body) {
    (Ok(Path(id)), Ok(body)) => state.handler.create(Some(&id), &body).await,
    (Err(e), _) => Err(e.into()),
    (_, Err(e)) => Err(e.into()),
  };
  state.respond(result)
}

async fn read_all(State(state): State<AppState>) -> Response {
  state.respond(state.handler.read(None).await)
}

async fn read_one(
  State(state): State<AppState>,
  id: Result<Path<String>, PathRejection>,
) -> Response {
  let result = match id {
    Ok(Path(id)) => state.handler.read(Some(&id)).await,
    Err(e) => Err(e.into()),
  };
  state.respond(result)
}

async fn update(
  State(state): State<AppState>,
  id: Result<Path<String>, PathRejection>,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  let result = match (id, body) {
    (Ok(Path(id)), Ok(body)) => state.handler.update(Some(&id), &body).await,
    (Err(e), _) => Err(e.into()),
    (_, Err(e)) => Err(e.into()),
  };
  state.respond(result)
}

async fn update_without_id(
  State(state): State<AppState>,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  let result = match body {
    Ok(body) => state.handler.update(None, &body).await,
    Err(e) => Err(e.into()),
  };
  state.respond(result)
}

async fn remove(
  State(state): State<AppState>,
  id: Result<Path<String>, PathRejection>,
) -> Response {
  let result = match id {
    Ok(Path(id)) => state.handler.delete(Some(&id)).await,
    Err(e) => Err(e.into()),
  };
  state.respond(result)
}

async fn delete_without_id(State(state): State<AppState>) -> Response {
  state.respond(state.handler.delete(None).await)
}

async fn not_found(State(state): State<AppState>) -> Response {
  state
    .errors
    .render(&ApiError::NotFound("no such route".into()))
}

async fn method_not_allowed(State(state): State<AppState>) -> Response {
  state.errors.render(&ApiError::MethodNotAllowed)
}
