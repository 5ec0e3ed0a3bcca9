//! The `/api/load` and `/api/save` endpoints, in-process and over HTTP.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use prototyp3d::bridge::FileBridge;
use prototyp3d::server::{router, AppState};
use prototyp3d::{BridgeError, DirStore, FileSet, HttpBridge};

fn scenario_files() -> Value {
  json!({
    "index.html": "<h1>hi</h1>",
    "styles.css": "h1{color:red}",
    "script.js": "console.log(1)",
  })
}

fn app(dir: &std::path::Path) -> Router {
  router(AppState::new(DirStore::new(dir)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
  let response = app.oneshot(request).await.unwrap();
  let status = response.status();
  let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  (status, body.to_vec())
}

fn save_request(body: &Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri("/api/save")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn load_request() -> Request<Body> {
  Request::builder().uri("/api/load").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn save_then_load_returns_the_same_files() {
  let dir = tempfile::tempdir().unwrap();

  let (status, body) = send(app(dir.path()), save_request(&scenario_files())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "success": true }));

  let (status, body) = send(app(dir.path()), load_request()).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), scenario_files());
}

#[tokio::test]
async fn load_from_missing_directory_is_a_500() {
  let dir = tempfile::tempdir().unwrap();

  let (status, body) = send(app(&dir.path().join("missing")), load_request()).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(
    serde_json::from_slice::<Value>(&body).unwrap(),
    json!({ "error": "Failed to load files" })
  );
}

#[tokio::test]
async fn save_into_missing_directory_is_a_500() {
  let dir = tempfile::tempdir().unwrap();

  let (status, body) = send(
    app(&dir.path().join("missing")),
    save_request(&scenario_files()),
  )
  .await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

  let body: Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(body["success"], json!(false));
  assert!(body["error"].as_str().unwrap().contains("failed to write"));
}

async fn assert_save_fails(request: Request<Body>) {
  let dir = tempfile::tempdir().unwrap();

  let (status, body) = send(app(dir.path()), request).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  let body: Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(body["success"], json!(false));
  assert!(!body["error"].as_str().unwrap().is_empty());
  assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

fn raw_save_request(content_type: Option<&str>, body: &str) -> Request<Body> {
  let mut builder = Request::builder().method("POST").uri("/api/save");
  if let Some(content_type) = content_type {
    builder = builder.header(header::CONTENT_TYPE, content_type);
  }
  builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn malformed_save_body_is_a_500() {
  assert_save_fails(raw_save_request(Some("application/json"), "{not json")).await;
}

#[tokio::test]
async fn non_string_file_content_is_a_500() {
  assert_save_fails(save_request(&json!({ "index.html": 5 }))).await;
}

#[tokio::test]
async fn save_without_content_type_is_a_500() {
  assert_save_fails(raw_save_request(None, &scenario_files().to_string())).await;
}

#[tokio::test]
async fn root_serves_compiled_preview() {
  let dir = tempfile::tempdir().unwrap();
  let files = json!({
    "index.html": r#"<link href="styles.css"><script src="script.js"></script>"#,
    "styles.css": "",
    "script.js": "",
  });
  send(app(dir.path()), save_request(&files)).await;

  let request = Request::builder().uri("/").body(Body::empty()).unwrap();
  let (status, body) = send(app(dir.path()), request).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(
    String::from_utf8(body).unwrap(),
    r#"<link href="/static/product/styles.css"><script src="/static/product/script.js"></script>"#
  );
}

#[tokio::test]
async fn static_files_are_served() {
  let dir = tempfile::tempdir().unwrap();
  send(app(dir.path()), save_request(&scenario_files())).await;

  let request = Request::builder()
    .uri("/static/product/styles.css")
    .body(Body::empty())
    .unwrap();
  let (status, body) = send(app(dir.path()), request).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, b"h1{color:red}");
}

async fn spawn_server(dir: &std::path::Path) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let app = app(dir);
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{addr}")
}

#[tokio::test]
async fn http_bridge_round_trips_through_the_server() {
  let dir = tempfile::tempdir().unwrap();
  let bridge = HttpBridge::new(&spawn_server(dir.path()).await);
  let files: FileSet = serde_json::from_value(scenario_files()).unwrap();

  bridge.save(&files).await.unwrap();
  assert_eq!(bridge.load().await.unwrap(), files);
}

#[tokio::test]
async fn http_bridge_reports_server_errors() {
  let dir = tempfile::tempdir().unwrap();
  let base = spawn_server(&dir.path().join("missing")).await;
  let bridge = HttpBridge::new(&format!("{base}/"));

  match bridge.load().await.unwrap_err() {
    BridgeError::Status { status, message } => {
      assert_eq!(status, 500);
      assert_eq!(message, "Failed to load files");
    }
    other => panic!("unexpected error: {other}"),
  }

  let files: FileSet = serde_json::from_value(scenario_files()).unwrap();
  assert!(matches!(
    bridge.save(&files).await,
    Err(BridgeError::Status { status: 500, .. })
  ));
}
