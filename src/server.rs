//! HTTP API server.
//!
//! Exposes catalog lookups and imports as a JSON HTTP API for the web
//! front-end and service tooling.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/printers` | Registered printers with their aliases |
//! | `GET`  | `/api/errors?model=&code=&exact=&limit=` | Error-code search |
//! | `GET`  | `/api/dipswitches?model=&switch=&bit=` | DIP-switch lookup |
//! | `POST` | `/api/import/{kind}?model=&format=` | Import a CSV/XLSX body |
//!
//! `model` on the import route takes a comma-separated list of targets.
//! Import bodies are the raw file bytes, up to 50 MiB.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "model is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A rolled-back import is not an error response: it returns the import
//! outcome with `success: false` and status 500.
//!
//! # Concurrency
//!
//! Imports are serialized by a run-level mutex; lookups are not blocked by a
//! running import and see the catalog as of the last commit.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use printcode_core::ingest::IngestPipeline;
use printcode_core::models::SheetKind;
use printcode_core::store::CatalogStore;

use crate::config::Config;
use crate::db;
use crate::ingest::{import_table, ImportOutcome};
use crate::migrate;
use crate::search::{lookup_dip_switches, search_error_codes, DipSwitchResult, ErrorSearchResult};
use crate::source::{read_bytes, SourceFormat};
use crate::sqlite_store::SqliteStore;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn CatalogStore>,
    pipeline: IngestPipeline,
    /// Held for the duration of one import.
    import_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CatalogStore>) -> anyhow::Result<Self> {
        let pipeline = IngestPipeline::new(Arc::new(config.resolver()?));
        Ok(Self {
            config: Arc::new(config),
            store,
            pipeline,
            import_lock: Arc::new(Mutex::new(())),
        })
    }
}

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/printers", get(handle_printers))
        .route("/api/errors", get(handle_errors))
        .route("/api/dipswitches", get(handle_dipswitches))
        .route("/api/import/{kind}", post(handle_import))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, applies migrations, and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let state = AppState::new(config.clone(), Arc::new(SqliteStore::new(pool)))?;

    let app = router(state);

    info!(%bind_addr, "server listening");
    println!("pcode server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

fn require_model(model: Option<String>) -> Result<String, AppError> {
    match model {
        Some(m) if !m.trim().is_empty() => Ok(m),
        _ => Err(bad_request("model is required")),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/printers ============

#[derive(Serialize)]
struct PrinterEntry {
    id: String,
    model_name: String,
    aliases: Vec<String>,
}

#[derive(Serialize)]
struct PrinterListResponse {
    printers: Vec<PrinterEntry>,
}

async fn handle_printers(State(state): State<AppState>) -> Result<Json<PrinterListResponse>, AppError> {
    let resolver = state.pipeline.resolver();
    let printers = state
        .store
        .list_printers()
        .await
        .map_err(internal)?
        .into_iter()
        .map(|p| PrinterEntry {
            aliases: resolver
                .aliases_of(&p.model_name)
                .into_iter()
                .map(str::to_string)
                .collect(),
            id: p.id,
            model_name: p.model_name,
        })
        .collect();
    Ok(Json(PrinterListResponse { printers }))
}

// ============ GET /api/errors ============

#[derive(Deserialize)]
struct ErrorSearchParams {
    model: Option<String>,
    code: Option<String>,
    /// Defaults to `true`; `false` returns every loose prefix match.
    exact: Option<bool>,
    limit: Option<i64>,
}

async fn handle_errors(
    State(state): State<AppState>,
    Query(params): Query<ErrorSearchParams>,
) -> Result<Json<ErrorSearchResult>, AppError> {
    let model = require_model(params.model)?;
    let limit = params.limit.unwrap_or(state.config.search.default_limit);
    if limit < 1 {
        return Err(bad_request("limit must be >= 1"));
    }

    let found = search_error_codes(
        state.store.as_ref(),
        state.pipeline.resolver(),
        &model,
        params.code.as_deref().unwrap_or_default(),
        params.exact.unwrap_or(true),
        limit,
    )
    .await
    .map_err(internal)?;

    if !found.registered {
        return Err(not_found(format!("printer model not found: {}", found.model)));
    }
    Ok(Json(found))
}

// ============ GET /api/dipswitches ============

#[derive(Deserialize)]
struct DipSwitchParams {
    model: Option<String>,
    switch: Option<i64>,
    bit: Option<i64>,
}

async fn handle_dipswitches(
    State(state): State<AppState>,
    Query(params): Query<DipSwitchParams>,
) -> Result<Json<DipSwitchResult>, AppError> {
    let model = require_model(params.model)?;
    let found = lookup_dip_switches(
        state.store.as_ref(),
        state.pipeline.resolver(),
        &model,
        params.switch,
        params.bit,
    )
    .await
    .map_err(internal)?;
    Ok(Json(found))
}

// ============ POST /api/import/{kind} ============

#[derive(Deserialize)]
struct ImportParams {
    /// Comma-separated target models.
    model: Option<String>,
    /// `csv` (default) or `xlsx`.
    format: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

async fn handle_import(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportOutcome>), AppError> {
    let kind: SheetKind = kind.parse().map_err(bad_request)?;
    let models: Vec<String> = require_model(params.model)?
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    let format: SourceFormat = params
        .format
        .as_deref()
        .unwrap_or("csv")
        .parse()
        .map_err(|e: crate::source::SourceError| bad_request(e.to_string()))?;

    let table = read_bytes(&body, format).map_err(|e| bad_request(e.to_string()))?;

    let _guard = state.import_lock.lock().await;
    info!(kind = kind.as_str(), models = ?models, bytes = body.len(), "import started");

    let outcome = import_table(
        state.store.as_ref(),
        &state.pipeline,
        kind,
        &table,
        &models,
        params.dry_run,
        state.config.ingest_timeout(),
    )
    .await
    .map_err(|e| bad_request(format!("{:#}", e)))?;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use printcode_core::store::memory::InMemoryStore;
    use tower::ServiceExt;

    fn test_config() -> Config {
        toml::from_str(
            "[db]\npath = \"unused.sqlite\"\n\n[models.aliases]\nC6085 = \"C6100\"\n",
        )
        .unwrap()
    }

    async fn app() -> (Router, InMemoryStore) {
        let store = InMemoryStore::new();
        store.register_printer("C6100").await.unwrap();
        let state = AppState::new(test_config(), Arc::new(store.clone())).unwrap();
        (router(state), store)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn import(app: &Router, uri: &str, body: &'static str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn get_uri(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let resp = get_uri(&app, "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_import_then_search_through_alias() {
        let (app, store) = app().await;
        let resp = import(
            &app,
            "/api/import/error_codes?model=C6085,C9999",
            "Code,Cause,Faulty part isolation DIPSW\nC-0202,Fuser,DipSW 3-5\n,orphan,\n",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let out = body_json(resp).await;
        assert_eq!(out["success"], true);
        assert_eq!(out["report"]["row_errors"][0]["row"], 2);
        assert_eq!(out["report"]["models"][1]["status"], "not_found");
        assert_eq!(store.error_code_count(), 1);

        let resp = get_uri(&app, "/api/errors?model=C6100&code=202").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let found = body_json(resp).await;
        assert_eq!(found["results"][0]["code"], "C-0202");
        assert_eq!(found["results"][0]["cause"], "Fuser");
    }

    #[tokio::test]
    async fn test_dipswitches_same_for_alias() {
        let (app, _) = app().await;
        let resp = import(
            &app,
            "/api/import/dip_switches?model=C6100",
            "Switch,Bit,Function,Setting 0,Setting 1,Default\n3,5,Fuser isolate,Off,On,0\n",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let a = body_json(get_uri(&app, "/api/dipswitches?model=C6085").await).await;
        let b = body_json(get_uri(&app, "/api/dipswitches?model=C6100&switch=3").await).await;
        assert_eq!(a["results"], b["results"]);
        assert_eq!(a["model"], "C6100");
    }

    #[tokio::test]
    async fn test_errors_unknown_model_is_404() {
        let (app, _) = app().await;
        let resp = get_uri(&app, "/api/errors?model=C1&code=1").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_import_bad_kind_and_missing_model() {
        let (app, _) = app().await;
        let resp = import(&app, "/api/import/manuals?model=C6100", "Code\nC-1\n").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = import(&app, "/api/import/error_codes", "Code\nC-1\n").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_printers_lists_aliases() {
        let (app, _) = app().await;
        let out = body_json(get_uri(&app, "/api/printers").await).await;
        assert_eq!(out["printers"][0]["model_name"], "C6100");
        assert_eq!(out["printers"][0]["aliases"][0], "C6085");
    }
}
