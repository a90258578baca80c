//! HTTP surface tests, driven through the router against in-memory SQLite

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crudster::db::{Namespace, SqliteBackend};
use crudster::server::{AppConfig, Application, Validation};
use crudster::types::IdStrategy;

async fn app_with(config: AppConfig) -> Router {
  let store = SqliteBackend::in_memory(
    Namespace::new(
      config.store.database_name.as_str(),
      config.store.collection_name.as_str(),
    ),
    config.store.id_strategy,
  )
  .await
  .unwrap();
  Application::new(&config, Arc::new(store))
    .await
    .unwrap()
    .router
}

async fn app() -> Router {
  app_with(AppConfig::default()).await
}

struct Reply {
  status: StatusCode,
  content_type: String,
  body: Vec<u8>,
}

impl Reply {
  fn json(&self) -> Value {
    serde_json::from_slice(&self.body).unwrap()
  }

  fn text(&self) -> String {
    String::from_utf8(self.body.clone()).unwrap()
  }
}

async fn send(router: &Router, method: &str, uri: &str, body: &str) -> Reply {
  let request = Request::builder()
    .method(method)
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap();
  let response = router.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let content_type = response
    .headers()
    .get(header::CONTENT_TYPE)
    .map(|v| v.to_str().unwrap().to_string())
    .unwrap_or_default();
  let body = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap()
    .to_vec();
  Reply {
    status,
    content_type,
    body,
  }
}

async fn create(router: &Router, payload: &Value) -> String {
  let reply = send(router, "POST", "/", &payload.to_string()).await;
  assert_eq!(reply.status, StatusCode::OK);
  reply.json()["uuid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_round_trip_scenario() {
  let router = app().await;

  let reply = send(&router, "POST", "/", r#"{"Hello":"Doctor"}"#).await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.content_type, "application/json; charset=UTF-8");
  let id = reply.json()["uuid"].as_str().unwrap().to_string();
  assert_eq!(id.len(), 32);

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.json(), json!({"Hello": "Doctor"}));

  let reply = send(&router, "PUT", &format!("/{}", id), r#"{"Computer":"Science"}"#).await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.json(), json!({}));

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.json(), json!({"Computer": "Science"}));

  let reply = send(&router, "DELETE", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.json(), json!({}));

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payloads_come_back_unchanged() {
  let router = app().await;
  let payloads = [
    json!({"nested": {"list": [1, 2.5, "three", null, false]}}),
    json!([1, 2, 3]),
    json!("just a string"),
    json!(12345),
    json!(null),
    json!({}),
    json!({"unicode": "héllo wörld ✓"}),
  ];
  for payload in payloads {
    let id = create(&router, &payload).await;
    let reply = send(&router, "GET", &format!("/{}", id), "").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), payload);
  }
}

#[tokio::test]
async fn test_create_with_id_in_path_is_rejected() {
  let router = app().await;
  let id = create(&router, &json!({"a": 1})).await;

  for body in [r#"{"a":2}"#, "not json", ""] {
    let reply = send(&router, "POST", &format!("/{}", id), body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json(), json!({"status_code": 400, "reason": "Bad Request"}));
  }

  // The existing record is untouched
  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.json(), json!({"a": 1}));
}

#[tokio::test]
async fn test_invalid_json_body() {
  let router = app().await;
  let reply = send(&router, "POST", "/", "{not json").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);

  let id = create(&router, &json!(1)).await;
  let reply = send(&router, "PUT", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_read_unknown_id() {
  let router = app().await;
  let never = uuid::Uuid::new_v4().simple().to_string();
  let reply = send(&router, "GET", &format!("/{}", never), "").await;
  assert_eq!(reply.status, StatusCode::NOT_FOUND);
  assert_eq!(reply.json(), json!({"status_code": 404, "reason": "Not Found"}));
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
  let router = app().await;
  for method in ["GET", "PUT", "DELETE"] {
    let reply = send(&router, method, "/not-a-uuid", "{}").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", method);
  }
}

#[tokio::test]
async fn test_update_unknown_id() {
  let router = app().await;
  let never = uuid::Uuid::new_v4().simple().to_string();
  let reply = send(&router, "PUT", &format!("/{}", never), "{}").await;
  assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete_need_id() {
  let router = app().await;
  let reply = send(&router, "PUT", "/", "{}").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
  let reply = send(&router, "DELETE", "/", "").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_keeps_identifier() {
  let router = app().await;
  let id = create(&router, &json!({"v": 1})).await;
  send(&router, "PUT", &format!("/{}", id), r#"{"v":2}"#).await;

  let reply = send(&router, "GET", "/", "").await;
  let all = reply.json();
  let all = all.as_object().unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[&id], json!({"v": 2}));
}

#[tokio::test]
async fn test_delete_twice() {
  let router = app().await;
  let id = create(&router, &json!({"bye": true})).await;

  let first = send(&router, "DELETE", &format!("/{}", id), "").await;
  assert_eq!(first.status, StatusCode::OK);
  let second = send(&router, "DELETE", &format!("/{}", id), "").await;
  assert_eq!(second.status, StatusCode::NOT_FOUND);
  let read = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(read.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_read_many() {
  let router = app().await;
  let reply = send(&router, "GET", "/", "").await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.json(), json!({}));

  let mut ids = HashSet::new();
  for n in 0..5 {
    ids.insert(create(&router, &json!({ "n": n })).await);
  }
  assert_eq!(ids.len(), 5);

  let all = send(&router, "GET", "/", "").await.json();
  let all = all.as_object().unwrap();
  assert_eq!(all.len(), 5);
  let keys: HashSet<String> = all.keys().cloned().collect();
  assert_eq!(keys, ids);
}

#[tokio::test]
async fn test_unsupported_method() {
  let router = app().await;
  let reply = send(&router, "PATCH", "/", "{}").await;
  assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
  assert_eq!(
    reply.json(),
    json!({"status_code": 405, "reason": "Method Not Allowed"})
  );
}

#[tokio::test]
async fn test_unknown_route() {
  let router = app().await;
  let reply = send(&router, "GET", "/a/b/c", "").await;
  assert_eq!(reply.status, StatusCode::NOT_FOUND);
  assert!(reply.content_type.starts_with("application/json"));
}

#[tokio::test]
async fn test_undecodable_id_uses_error_format() {
  let router = app().await;
  for method in ["GET", "PUT", "DELETE", "POST"] {
    let reply = send(&router, method, "/%FF", "{}").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{}", method);
    assert_eq!(
      reply.json(),
      json!({"status_code": 400, "reason": "Bad Request"})
    );
  }
}

#[tokio::test]
async fn test_oversized_body_uses_error_format() {
  let mut config = AppConfig::default();
  config.server.max_body_bytes = 1024;
  let router = app_with(config).await;

  let big = json!({ "blob": "x".repeat(4096) }).to_string();
  let reply = send(&router, "POST", "/", &big).await;
  assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
  assert_eq!(
    reply.json(),
    json!({"status_code": 413, "reason": "Payload Too Large"})
  );

  // Within the limit still works
  let reply = send(&router, "POST", "/", r#"{"small":true}"#).await;
  assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_default_body_limit() {
  let router = app().await;
  let big = json!({ "blob": "x".repeat(3 * 1024 * 1024) }).to_string();
  let reply = send(&router, "POST", "/", &big).await;
  assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
  assert!(reply.content_type.starts_with("application/json"));
}

#[tokio::test]
async fn test_debug_mode_returns_text_report() {
  let mut config = AppConfig::default();
  config.server.debug = true;
  let router = app_with(config).await;

  let reply = send(&router, "GET", "/not-a-uuid", "").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
  assert!(reply.content_type.starts_with("text/plain"));
  assert!(reply.text().contains("not-a-uuid"));
  assert!(serde_json::from_slice::<Value>(&reply.body).is_err());

  let reply = send(&router, "GET", "/%FF", "").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
  assert!(reply.content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_api_prefix() {
  let mut config = AppConfig::default();
  config.server.api_prefix = "/api/v1".into();
  config.server.service_prefix = "/user/alice/".into();
  let router = app_with(config).await;

  let reply = send(&router, "POST", "/user/alice/api/v1/", r#"{"x":1}"#).await;
  assert_eq!(reply.status, StatusCode::OK);
  let id = reply.json()["uuid"].as_str().unwrap().to_string();

  let reply = send(&router, "GET", &format!("/user/alice/api/v1/{}", id), "").await;
  assert_eq!(reply.json(), json!({"x": 1}));

  // Without the trailing slash the collection is still reachable
  let reply = send(&router, "GET", "/user/alice/api/v1", "").await;
  assert_eq!(reply.status, StatusCode::OK);
  assert_eq!(reply.json().as_object().unwrap().len(), 1);

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_object_id_strategy() {
  let mut config = AppConfig::default();
  config.store.id_strategy = IdStrategy::ObjectId;
  let router = app_with(config).await;

  let reply = send(&router, "POST", "/", r#"{"Hello":"Doctor"}"#).await;
  assert_eq!(reply.status, StatusCode::OK);
  let created = reply.json();
  assert!(created.get("uuid").is_none());
  let id = created["document_id"].as_str().unwrap().to_string();
  assert_eq!(id.len(), 24);
  assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.json(), json!({"Hello": "Doctor"}));

  // A UUID is not an object id
  let uuid = uuid::Uuid::new_v4().simple().to_string();
  let reply = send(&router, "GET", &format!("/{}", uuid), "").await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_require_expiry_validation() {
  let mut config = AppConfig::default();
  config.store.validation = Validation::Expires;
  let router = app_with(config).await;

  let reply = send(&router, "POST", "/", r#"{"note":"no expiry"}"#).await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);

  let reply = send(&router, "POST", "/", r#"{"expires":"tomorrow"}"#).await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);

  let id = create(&router, &json!({"expires": "2030-01-01T00:00:00"})).await;
  let reply = send(&router, "PUT", &format!("/{}", id), r#"{"note":"dropped"}"#).await;
  assert_eq!(reply.status, StatusCode::BAD_REQUEST);

  let reply = send(&router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.json(), json!({"expires": "2030-01-01T00:00:00"}));
}

#[tokio::test]
async fn test_initialize_database_wipes_records() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("wipe.db");
  let path = path.to_str().unwrap();

  let open = || async {
    SqliteBackend::new(path, Namespace::new("crudster", "data"), IdStrategy::Uuid)
      .await
      .unwrap()
  };

  let first = Application::new(&AppConfig::default(), Arc::new(open().await))
    .await
    .unwrap();
  let id = create(&first.router, &json!({"keep": false})).await;

  // Reopening without the flag keeps data
  let second = Application::new(&AppConfig::default(), Arc::new(open().await))
    .await
    .unwrap();
  let reply = send(&second.router, "GET", &format!("/{}", id), "").await;
  assert_eq!(reply.status, StatusCode::OK);

  let mut config = AppConfig::default();
  config.store.initialize_database = true;
  let third = Application::new(&config, Arc::new(open().await))
    .await
    .unwrap();
  let reply = send(&third.router, "GET", "/", "").await;
  assert_eq!(reply.json(), json!({}));
}
