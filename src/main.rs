//! PDF Analyzer - upload a PDF, ask questions about it, get Gemini's answer.

mod analyzer;
mod config;
mod document;
mod error;
mod pipeline;
mod scoped_file;
mod ui;

use analyzer::AnalyzerHandle;
use askama::Template;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::{SecretStore, Settings, GEMINI_API_KEY};
use document::{DocumentPolicy, UploadedDocument};
use error::{ErrorBody, PipelineError};
use pipeline::UploadPipeline;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Room for multipart boundaries and the prompt field on top of the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<UploadPipeline>,
    model: String,
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_analyzer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    info!(
        "Settings: model={}, max upload={} bytes, tmp dir={:?}, enforce pdf={}",
        settings.model, settings.max_upload_bytes, settings.tmp_dir, settings.enforce_pdf
    );

    // A missing key must not stop the server: the failure is reported per
    // request and acquire() tries again next time.
    let secrets = SecretStore::from_env(&[GEMINI_API_KEY]);
    let analyzers = Arc::new(AnalyzerHandle::gemini(secrets, &settings));
    if let Err(e) = analyzers.acquire().await {
        warn!("Analyzer not ready at startup: {}", e);
    }

    let state = AppState {
        pipeline: Arc::new(UploadPipeline::new(
            analyzers,
            DocumentPolicy {
                max_bytes: settings.max_upload_bytes,
                require_pdf: settings.enforce_pdf,
            },
            settings.tmp_dir.clone(),
        )),
        model: settings.model.clone(),
        max_upload_bytes: settings.max_upload_bytes,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/prompt/default", get(default_prompt))
        .route("/analyze", post(analyze_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// The upload form.
async fn index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    ui::IndexTemplate::new(&state.model, state.max_upload_bytes)
        .render()
        .map(Html)
        .map_err(|e| {
            error!("Failed to render index page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn default_prompt() -> &'static str {
    ui::DEFAULT_PROMPT
}

#[derive(Debug, Default, serde::Deserialize)]
struct AnalyzeQuery {
    #[serde(default)]
    download: bool,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

fn pipeline_error(e: PipelineError) -> HandlerError {
    (e.status_code(), Json(e.body()))
}

fn bad_request(msg: String) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: msg,
            kind: "bad_request",
        }),
    )
}

/// A body over `DefaultBodyLimit` surfaces as a multipart read error; report
/// it as the oversize document it is.
fn multipart_error(e: MultipartError, context: &str, limit: usize) -> HandlerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload rejected by body limit: {}", e);
        return pipeline_error(PipelineError::upload_too_large(limit));
    }
    bad_request(format!("{}: {}", context, e))
}

/// Upload a document with a prompt and return the analysis.
///
/// With `?download=true` the answer comes back as a plain-text attachment.
async fn analyze_document(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> Result<Response, HandlerError> {
    let mut document = None;
    let mut prompt = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Multipart error", state.max_upload_bytes))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let media_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| {
                        multipart_error(e, "Failed to read file", state.max_upload_bytes)
                    })?;
                document = Some(UploadedDocument::new(file_name, media_type, bytes.to_vec()));
            }
            Some("prompt") => {
                prompt = field
                    .text()
                    .await
                    .map_err(|e| {
                        multipart_error(e, "Failed to read prompt", state.max_upload_bytes)
                    })?;
            }
            _ => {}
        }
    }

    if let Some(doc) = &document {
        info!(
            "Received file: {} ({} bytes), prompt: {} chars",
            doc.file_name,
            doc.len(),
            prompt.len()
        );
    }

    let report = state
        .pipeline
        .run(document, &prompt)
        .await
        .map_err(pipeline_error)?;

    if query.download {
        let disposition = format!("attachment; filename=\"{}\"", ui::DOWNLOAD_FILE_NAME);
        Ok((
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            report.text,
        )
            .into_response())
    } else {
        Ok(Json(report).into_response())
    }
}
