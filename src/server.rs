//! HTTP front end.
//!
//! Thin JSON/SSE layer over [`DriveChat`]. The caller's identity arrives in
//! the `X-Owner-Id` header; drive tokens for indexing arrive as
//! `Authorization: Bearer <access token>` plus an optional
//! `X-Refresh-Token`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/index-gdrive` | Index a Drive folder: `{ "drive_url": …, "name": … }` |
//! | `POST` | `/chat` | Ask a question: `{ "query": … }`, answered as `text/event-stream` |
//! | `GET`  | `/indexed` | `{ "indexed", "indexLink", "indexName" }` for the caller |
//!
//! # Error Contract
//!
//! `/index-gdrive` answers `{ "status": "error", "error": "<message>" }` on
//! failure. Other endpoints use:
//!
//! ```json
//! { "error": { "code": "not_indexed", "message": "no index found for owner alice" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::drive_client::Credentials;
use crate::error::Error;
use crate::ingest::IngestReport;
use crate::service::DriveChat;

pub const OWNER_HEADER: &str = "x-owner-id";
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Build the router.
pub fn router(app: Arc<DriveChat>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/index-gdrive", post(handle_index))
        .route("/chat", post(handle_chat))
        .route("/indexed", get(handle_indexed))
        .layer(cors)
        .with_state(app)
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(app: Arc<DriveChat>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", bind_addr);
    axum::serve(listener, router(app)).await?;
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotIndexed(_) => StatusCode::NOT_FOUND,
            Error::InvalidOwner(_) | Error::MalformedUrl(_) => StatusCode::BAD_REQUEST,
            Error::RemoteApi(_) | Error::Ingestion { .. } | Error::Answer(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn owner_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| bad_request("missing X-Owner-Id header"))
}

fn credentials(headers: &HeaderMap) -> Result<Credentials, AppError> {
    let access = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request("missing bearer access token"))?;
    let refresh = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Ok(Credentials::new(access, refresh))
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

// ============ POST /index-gdrive ============

#[derive(Deserialize)]
struct IndexRequest {
    drive_url: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum IndexResponse {
    Success { report: IngestReport },
    Error { error: String },
}

async fn handle_index(
    State(app): State<Arc<DriveChat>>,
    headers: HeaderMap,
    Json(req): Json<IndexRequest>,
) -> Result<(StatusCode, Json<IndexResponse>), AppError> {
    let owner = owner_id(&headers)?;
    let creds = credentials(&headers)?;

    match app
        .ingest_and_index(&req.drive_url, &owner, &creds, req.name.as_deref())
        .await
    {
        Ok(report) => Ok((StatusCode::OK, Json(IndexResponse::Success { report }))),
        Err(e) => {
            warn!(owner_id = %owner, error = %e, "indexing failed");
            let error = e.to_string();
            let status = AppError::from(e).status;
            Ok((status, Json(IndexResponse::Error { error })))
        }
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

async fn handle_chat(
    State(app): State<Arc<DriveChat>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let owner = owner_id(&headers)?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let tokens = app.query_index(&owner, &req.query).await?;
    let events = tokens
        // SSE data may not carry carriage returns
        .map(|token| Ok::<_, Infallible>(Event::default().data(token.replace('\r', ""))))
        .chain(stream::once(async {
            Ok::<_, Infallible>(Event::default().event("done").data(""))
        }));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ============ GET /indexed ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexedResponse {
    indexed: bool,
    index_link: Option<String>,
    index_name: Option<String>,
}

async fn handle_indexed(
    State(app): State<Arc<DriveChat>>,
    headers: HeaderMap,
) -> Result<Json<IndexedResponse>, AppError> {
    let owner = owner_id(&headers)?;
    let status = app.is_indexed(&owner).await?;
    Ok(Json(IndexedResponse {
        indexed: status.found,
        index_link: status.source_url,
        index_name: status.display_name,
    }))
}
