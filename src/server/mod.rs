//! The HTTP layer (spec §6): routes `GET /`, `GET /index.yaml`,
//! `GET /chart/{name}/{version...}`, and `POST /api/webhooks/github` over
//! the shared, atomically-swapped Index Cache.

mod webhook;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::chart;
use crate::error::CoreError;
use crate::git::Backend;
use crate::index::SharedCache;
use crate::package;
use crate::worker::ReindexHandle;

/// State shared across every request, cheap to clone (everything behind an
/// `Arc` or plain `String`/`Sender`).
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SharedCache>,
    pub backend: Arc<Backend>,
    pub base: String,
    pub reindex: ReindexHandle,
    pub webhook_secret: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/index.yaml", get(get_index))
        .route("/chart/:name/*version", get(get_chart))
        .route("/api/webhooks/github", post(webhook::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness() -> &'static str {
    "chart-streams"
}

async fn get_index(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.cache.load();
    (
        [(header::CONTENT_TYPE, "application/x-yaml; charset=utf-8")],
        cache.rendered_yaml().to_owned(),
    )
}

/// Strips the leading `/` the wildcard `*version` segment carries (spec
/// §6), looks up the commit that produced `(name, version)`, re-reads the
/// chart at that commit, and streams the tarball.
async fn get_chart(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let version = version.trim_start_matches('/').to_owned();

    let binding = {
        let cache = state.cache.load();
        cache.lookup(&name, &version).cloned()
    };

    let binding = match binding {
        Some(binding) => binding,
        None => {
            let err = CoreError::CommitNotFound(format!("{}@{}", name, version));
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let backend = state.backend.clone();
    let base = state.base.clone();
    let dir = binding.chart_dir.clone();
    let commit_id = binding.commit_id.clone();
    let commit_time = binding.commit_time;

    let build = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, anyhow::Error> {
        let commit = backend.lookup_commit(&commit_id)?;
        let loaded = chart::load(&backend, &base, &dir, commit)?;
        package::build(&loaded, commit_time)
    })
    .await;

    match build {
        Ok(Ok(bytes)) => ([(header::CONTENT_TYPE, "application/gzip")], bytes).into_response(),
        Ok(Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        Err(join_err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, join_err.to_string()).into_response()
        }
    }
}
