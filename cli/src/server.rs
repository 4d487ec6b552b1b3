//! HTTP front desk for fontfill (made by FontLab https://www.fontlab.com/)
//!
//! A small local web service around one long-lived [`PreviewGenerator`]:
//! ask it to fill a directory, watch it work over server-sent events, and
//! fetch the resulting fonts back.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use axum::extract::{Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task;

use fontfill_core::cleanup::{sweep_expired, SWEEP_INTERVAL};
use fontfill_core::validate::{is_download_allowed, validate_font_directory};
use fontfill_core::{Config, DownloadLinks, FontFormat, FontPreview, Kind, PreviewGenerator};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    generator: Arc<PreviewGenerator>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(generator: Arc<PreviewGenerator>) -> Self {
        let config = Arc::new(generator.config().clone());
        Self { generator, config }
    }
}

/// `/generate` query string.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateQuery {
    #[serde(rename = "fontDir")]
    pub font_dir: String,
}

/// Body of every JSON error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Bind, serve until Ctrl-C, then shut the generator down.
///
/// Converted files are swept every few hours while the server runs.
pub async fn serve(config: Config, host: &str) -> Result<()> {
    let bind = format!("{host}:{}", config.port);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding HTTP server to {bind}"))?;

    let generator = Arc::new(PreviewGenerator::new(config));
    let state = AppState::new(generator.clone());
    let sweeper = tokio::spawn(sweep_periodically(
        state.config.converted_dir(),
        state.config.cache_ttl,
    ));

    tracing::info!(%bind, "fontfill listening");

    // Cancelling ends every open /progress stream, so shutdown is not held up.
    let cancel = generator.cancel_token();
    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
        cancel.cancel();
    };

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving HTTP");

    sweeper.abort();
    task::spawn_blocking(move || generator.close())
        .await
        .context("closing preview generator")?;
    served
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/generate", get(generate_handler))
        .route("/progress", get(progress_handler))
        .route("/download", get(download_handler))
        .with_state(state)
}

async fn generate_handler(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> Result<Json<Vec<FontPreview>>, ApiError> {
    if query.font_dir.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please enter a directory path".to_string(),
        ));
    }

    let dir = validate_font_directory(&query.font_dir)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, format!("Invalid directory: {err}")))?;

    let generator = state.generator.clone();
    let previews = task::spawn_blocking(move || generator.process_fonts(dir))
        .await
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("task join error: {e}"),
            )
        })?
        .map_err(|err| {
            api_error(
                status_for(err.kind()),
                format!("Error processing fonts: {err}"),
            )
        })?;

    Ok(Json(previews))
}

async fn progress_handler(State(state): State<AppState>) -> impl IntoResponse {
    let greeting = stream::once(async {
        Ok::<_, Infallible>(Event::default().data("Initializing progress monitoring..."))
    });
    let updates = match state.generator.subscribe() {
        Some(lines) => lines
            .map(|line| Ok::<_, Infallible>(Event::default().data(line)))
            .boxed(),
        None => stream::empty().boxed(),
    };

    Sse::new(greeting.chain(updates).boxed()).keep_alive(KeepAlive::default())
}

/// The query is read raw so the path keeps its exact bytes.
async fn download_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, (StatusCode, String)> {
    let query = query.unwrap_or_default();
    let Some(path) = DownloadLinks::path_from_query(&query) else {
        return Err((StatusCode::BAD_REQUEST, "No font path specified".to_string()));
    };
    let filename = DownloadLinks::filename_from_query(&query);

    if !is_download_allowed(&path) {
        return Err((StatusCode::FORBIDDEN, "Access denied".to_string()));
    }

    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            "Font file not found or not accessible".to_string(),
        )
    };
    let meta = tokio::fs::metadata(&path).await.map_err(|err| {
        tracing::warn!(path = %path.display(), error = %err, "failed to open font file");
        not_found()
    })?;
    if !meta.is_file() {
        return Err(not_found());
    }
    if meta.len() > state.config.max_file_size {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Font file exceeds {} bytes", state.config.max_file_size),
        ));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        tracing::error!(path = %path.display(), error = %err, "error reading font file");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error reading font file".to_string(),
        )
    })?;

    let file_name = download_name(&path, filename.as_deref());
    let mime = FontFormat::from_path(Path::new(&file_name))
        .or_else(|| FontFormat::from_path(&path))
        .map_or("application/octet-stream", FontFormat::mime_type);

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.config.cache_ttl.as_secs()),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Requested name if any, else the file's own name; never breaks the header.
fn download_name(path: &Path, requested: Option<&str>) -> String {
    let name = requested
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "font".to_string());
    name.replace(['"', '\\', '\r', '\n'], "_")
}

fn status_for(kind: Kind) -> StatusCode {
    match kind {
        Kind::Validation | Kind::DiscoveryEmpty | Kind::DiscoveryWalk | Kind::DiscoveryPermission => {
            StatusCode::BAD_REQUEST
        }
        Kind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorBody { error }))
}

async fn sweep_periodically(dir: PathBuf, ttl: Duration) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    // the first tick completes immediately; the first sweep waits a full interval
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let dir = dir.clone();
        match task::spawn_blocking(move || sweep_expired(&dir, ttl, SystemTime::now())).await {
            Ok(Ok(report)) => tracing::debug!(?report, "scheduled cleanup done"),
            Ok(Err(err)) => tracing::error!(error = %err, "scheduled cleanup failed"),
            Err(err) => tracing::error!(error = %err, "scheduled cleanup panicked"),
        }
    }
}
