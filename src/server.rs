//!
//! csvdeck HTTP server
//! -------------------
//! Axum-based HTTP API over the upload folder.
//!
//! Responsibilities:
//! - Multipart upload of CSV files, stored under a timestamped identity.
//! - Listing, reading (decoded to JSON rows) and deleting stored files.
//! - A server-sent events endpoint broadcasting upload/delete notifications.
//!
//! Every mutating route publishes to the shared [`FileLifecycleNotifier`] only
//! after the filesystem operation succeeded.

use std::convert::Infallible;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::events::{FileEventKind, FileLifecycleEvent, FileLifecycleNotifier};
use crate::files::FileStore;
use crate::tabular::{decode_csv, Dataset};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: FileStore,
    pub notifier: FileLifecycleNotifier,
    /// Upper bound on request body size, enforced for uploads.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: FileStore, notifier: FileLifecycleNotifier, max_upload_bytes: usize) -> Self {
        Self { store, notifier, max_upload_bytes }
    }
}

/// Log where the server runs from and where uploads go.
fn log_startup_folders(cfg: &ServerConfig) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let dir_env = std::env::var("CSVDECK_UPLOAD_DIR").ok();

    info!(
        target: "startup",
        "csvdeck starting. Folder configuration: cwd={:?}, exe={:?}, upload_dir={:?}, CSVDECK_UPLOAD_DIR_env={:?}",
        cwd, exe, cfg.upload_dir, dir_env
    );
    info!(
        target: "startup",
        "Path existence: upload_dir_exists={}, max_upload_bytes={}",
        cfg.upload_dir.exists(), cfg.max_upload_bytes
    );
}

/// Mount all routes. The older endpoint names `/api/upload` and
/// `/api/getFileNames` are kept as aliases.
pub fn build_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(|| async { "csvdeck ok" }))
        .route("/api/uploadFile", post(upload_file))
        .route("/api/upload", post(upload_file))
        .route("/api/getFileList", get(get_file_list))
        .route("/api/getFileNames", get(get_file_list))
        .route("/api/getFileData/{file_name}", get(get_file_data))
        .route("/api/deleteFile/{file_name}", delete(delete_file))
        .route("/api/events", get(events))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serve on an already-bound listener until the listener fails.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the csvdeck HTTP server with the given configuration.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    log_startup_folders(&cfg);

    let store = FileStore::new(&cfg.upload_dir)?;
    let existing = store.list().await.map(|l| l.len()).unwrap_or(0);
    info!(target: "startup", "{} stored file(s) under {}", existing, store.root_path().display());

    let state = AppState::new(store, FileLifecycleNotifier::new(), cfg.max_upload_bytes);

    let addr = cfg.socket_addr()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

/// Convenience entry point using defaults (port 5173, folder "uploads").
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::default()).await
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::too_large("too_large".to_string(), e.body_text())
    } else {
        AppError::user("bad_multipart".to_string(), e.body_text())
    }
}

async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<&'static str> {
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        // Only a part with a non-empty filename counts as a file
        let Some(name) = field.file_name().map(|s| s.to_string()) else { continue };
        if name.trim().is_empty() { continue; }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((name, bytes));
        break;
    }
    let Some((original, bytes)) = upload else {
        return Err(AppError::user("no_file", "No file uploaded"));
    };

    let id = state.store.persist(&original, &bytes).await?;
    info!(target: "csvdeck::server", identity = %id, bytes = bytes.len(), "upload accepted");
    state.notifier.publish(FileEventKind::Uploaded, id.as_str());
    Ok("File uploaded successfully")
}

async fn get_file_list(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let ids = state.store.list().await?;
    Ok(Json(ids.into_iter().map(|id| id.to_string()).collect()))
}

async fn get_file_data(State(state): State<AppState>, Path(file_name): Path<String>) -> AppResult<Json<Dataset>> {
    info!(target: "csvdeck::server", "Getting file data for: {}", file_name);
    let bytes = state.store.read(&file_name).await?;
    let dataset = decode_csv(&bytes)?;
    Ok(Json(dataset))
}

async fn delete_file(State(state): State<AppState>, Path(file_name): Path<String>) -> AppResult<&'static str> {
    let id = state.store.delete(&file_name).await?;
    state.notifier.publish(FileEventKind::Deleted, id.as_str());
    Ok("File deleted successfully")
}

fn to_sse_event(ev: &FileLifecycleEvent) -> Event {
    Event::default().event(ev.kind.event_name()).data(ev.data_json())
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.notifier.subscribe();
    info!(
        target: "csvdeck::server",
        subscription = subscription.id(),
        subscribers = state.notifier.subscriber_count(),
        "event stream opened"
    );
    // The subscription lives inside the stream; axum drops the stream when the
    // client disconnects, which unregisters the listener.
    let stream = stream::unfold(subscription, |mut sub| async move {
        let ev = sub.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(&ev)), sub))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
