use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  response::{Html, IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::bridge::{ErrorBody, SaveResponse};
use crate::files::FileSet;
use crate::preview::{self, AssetMode};
use crate::store::DirStore;

/// Where the load directory is mounted; compiled previews point here.
pub const STATIC_PREFIX: &str = "/static/product";

#[derive(Clone)]
pub struct AppState {
  store: Arc<DirStore>,
}

impl AppState {
  pub fn new(store: DirStore) -> Self {
    Self {
      store: Arc::new(store),
    }
  }
}

async fn load_files(State(state): State<AppState>) -> Response {
  match state.store.load().await {
    Ok(files) => {
      files.warn_missing("load");
      Json(files).into_response()
    }
    Err(e) => {
      error!("Error loading files: {e}");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
          error: "Failed to load files".to_string(),
        }),
      )
        .into_response()
    }
  }
}

fn save_failed(message: String) -> Response {
  (
    StatusCode::INTERNAL_SERVER_ERROR,
    Json(SaveResponse {
      success: false,
      error: Some(message),
    }),
  )
    .into_response()
}

/// Every failure, an unreadable body included, is a 500 `SaveResponse`.
async fn save_files(
  State(state): State<AppState>,
  payload: Result<Json<FileSet>, JsonRejection>,
) -> Response {
  let files = match payload {
    Ok(Json(files)) => files,
    Err(rejection) => {
      error!("Error saving files: {}", rejection.body_text());
      return save_failed(rejection.body_text());
    }
  };

  match state.store.save(&files).await {
    Ok(()) => Json(SaveResponse {
      success: true,
      error: None,
    })
    .into_response(),
    Err(e) => {
      error!("Error saving files: {e}");
      save_failed(e.to_string())
    }
  }
}

/// Renders the stored project with its assets served from [`STATIC_PREFIX`].
async fn serve_preview(State(state): State<AppState>) -> Response {
  let files = match state.store.load().await {
    Ok(files) => files,
    Err(e) => {
      error!("Error loading files for preview: {e}");
      return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load files")
        .into_response();
    }
  };

  let mode = AssetMode::StaticBase(format!("{STATIC_PREFIX}/"));
  match preview::compile(&files, &mode) {
    Ok(html) => Html(html).into_response(),
    Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
  }
}

pub fn router(state: AppState) -> Router {
  let static_files = ServeDir::new(state.store.load_dir());

  Router::new()
    .route("/", get(serve_preview))
    .route("/api/load", get(load_files))
    .route("/api/save", post(save_files))
    .nest_service(STATIC_PREFIX, static_files)
    .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    .with_state(state)
}
