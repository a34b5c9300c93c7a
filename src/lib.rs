pub mod broadcast;
pub mod config;
pub mod db;
pub mod event;
pub mod history;
pub mod registry;
pub mod rooms;
pub mod uploads;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use tower_http::{services::ServeDir, trace::TraceLayer};

use broadcast::BroadcastRouter;
use history::HistoryStore;
use registry::RoomRegistry;
use uploads::MediaIngestHandler;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub history: HistoryStore,
    pub registry: Arc<RoomRegistry>,
    pub router: BroadcastRouter,
    pub ingest: MediaIngestHandler,
}

impl AppState {
    /// Wires the fan-out core together and spawns the router's consumer
    /// task. Must run inside a tokio runtime.
    pub fn new(db_pool: SqlitePool, upload_dir: impl Into<PathBuf>) -> Self {
        let history = HistoryStore::new(db_pool);
        let registry = Arc::new(RoomRegistry::new());
        let router = BroadcastRouter::spawn(history.clone(), registry.clone());
        Self {
            history,
            registry,
            router,
            ingest: MediaIngestHandler::new(upload_dir),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let upload_dir = state.ingest.dir().to_path_buf();
    Router::new()
        .nest("/r", rooms::router())
        .nest("/u", uploads::router())
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub inner: anyhow::Error,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            inner: anyhow::Error::msg(msg.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = if self.status.is_server_error() {
            format!("{}\n\n{}", self.inner, self.inner.backtrace())
        } else {
            self.inner.to_string()
        };
        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            inner: err.into(),
        }
    }
}
