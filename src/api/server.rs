//! HTTP server for the import API.
//!
//! # API Endpoints
//!
//! | Method | Path          | Description                          |
//! |--------|---------------|--------------------------------------|
//! | GET    | `/health`     | Health check                         |
//! | POST   | `/api/import` | Run an import for the posted items   |
//! | GET    | `/api/logs`   | SSE stream of import probe entries   |
//! | GET    | `/api/state`  | Latest importer state snapshot       |

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, sync::Mutex, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, ImportRequest, ImportResponse};
use crate::docstore::DocumentStore;
use crate::import::progress::SavedState;
use crate::import::{create_importer, run_items_import};
use crate::store::MemoryStore;

/// Shared server state: the target document store and the last run snapshot.
#[derive(Clone)]
pub struct AppState {
    pub docstore: Arc<dyn DocumentStore>,
    last_state: Arc<Mutex<Option<SavedState>>>,
}

impl AppState {
    pub fn new(docstore: Arc<dyn DocumentStore>) -> Self {
        Self {
            docstore,
            last_state: Arc::new(Mutex::new(None)),
        }
    }
}

/// Start the HTTP server.
pub async fn start_server(
    port: u16,
    docstore: Arc<dyn DocumentStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import", post(run_import))
        .route("/api/logs", get(sse_logs))
        .route("/api/state", get(last_state))
        .layer(cors)
        .with_state(AppState::new(docstore));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Eventload server running on http://localhost:{}", port);
    println!("   POST /api/import - Run an import");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /api/state  - Latest importer state");
    println!("   GET  /health     - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "eventload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "import": "POST /api/import",
            "logs": "GET /api/logs (SSE)",
            "state": "GET /api/state"
        }
    }))
}

/// SSE endpoint for real-time log streaming.
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Latest importer state observed by this server.
async fn last_state(State(state): State<AppState>) -> Result<Json<SavedState>, (StatusCode, Json<Value>)> {
    let snapshot = state.last_state.lock().expect("state poisoned").clone();
    match snapshot {
        Some(saved) => Ok(Json(saved)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(error_response("no import has run yet")),
        )),
    }
}

/// Run a full import for the posted settings and items.
async fn run_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, (StatusCode, Json<Value>)> {
    let items_staged = request.items.len();
    let settings = request.settings.into_settings();
    let importer = create_importer(settings, Arc::new(MemoryStore::new()), state.docstore.clone())
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(error_response(&e.to_string()))))?;

    let saved = run_items_import(&importer, request.items)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(error_response(&e.to_string())),
            )
        })?;

    *state.last_state.lock().expect("state poisoned") = Some(saved.clone());
    Ok(Json(ImportResponse::from_state(&saved, items_staged)))
}
