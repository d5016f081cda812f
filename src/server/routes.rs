//! HTTP routes
//!
//! | Route                                  | Handler        |
//! |----------------------------------------|----------------|
//! | `GET /`                                | liveness `OK`  |
//! | `POST /api/clipboard/{type}`           | [`upload`]     |
//! | `GET /api/clipboard`                   | [`latest`]     |
//! | `GET /api/clipboard/file/{uuid}`       | [`download`]   |
//! | `GET /api/clipboard/ws`                | [`connect`]    |

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::auth::{Principal, TokenAuthenticator};
use crate::error::Error;
use crate::history::{ClipboardKind, ClipboardRecord, RecordId, UserKey};
use crate::registry::{run_session, ConnectionId};
use crate::relay::ClipboardRelay;
use crate::storage::FileStore;

use super::response::{ApiError, ApiResponse};
use super::ws::WsTransport;

/// Shared token header
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// User key header
pub const USER_KEY_HEADER: &str = "x-user-key";

/// Device / connection id header
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// State shared by all handlers
pub struct AppState<S: FileStore> {
    relay: Arc<ClipboardRelay<S, WsTransport>>,
    auth: Arc<TokenAuthenticator>,
}

impl<S: FileStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<S: FileStore> AppState<S> {
    pub fn new(relay: Arc<ClipboardRelay<S, WsTransport>>, auth: Arc<TokenAuthenticator>) -> Self {
        Self { relay, auth }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, Error> {
        self.auth.authenticate(
            header(headers, AUTH_TOKEN_HEADER),
            header(headers, USER_KEY_HEADER),
        )
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Build the API router
pub fn router<S: FileStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/clipboard", get(latest::<S>))
        .route("/api/clipboard/ws", get(connect::<S>))
        .route("/api/clipboard/file/{uuid}", get(download::<S>))
        .route("/api/clipboard/{kind}", post(upload::<S>))
        // Uploads are capped while streaming instead
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn index() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    #[serde(rename = "dataLength")]
    data_length: Option<u64>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    uuid: RecordId,
}

/// Store a clipboard upload and notify the user's other devices
async fn upload<S: FileStore>(
    State(state): State<AppState<S>>,
    Path(kind): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<ApiResponse<UploadResponse>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let kind: ClipboardKind = kind.parse()?;
    let origin = header(&headers, CLIENT_ID_HEADER).map(ConnectionId::new);
    let content_length = header(&headers, CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let record = state
        .relay
        .upload(
            &principal,
            origin.as_ref(),
            kind,
            query.data_length,
            content_length,
            stream,
        )
        .await?;

    Ok(ApiResponse::success(UploadResponse { uuid: record.id }))
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    #[serde(rename = "onlyText", default)]
    only_text: bool,
}

/// Latest record in the caller's history
async fn latest<S: FileStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<LatestQuery>,
    headers: HeaderMap,
) -> Result<ApiResponse<ClipboardRecord>, ApiError> {
    let principal = state.authenticate(&headers)?;
    let record = state
        .relay
        .latest(&principal.user_key, query.only_text)
        .await?;
    Ok(ApiResponse::success(record))
}

/// Stream a payload back as `application/octet-stream`
async fn download<S: FileStore>(
    State(state): State<AppState<S>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let principal = state.authenticate(&headers)?;
    let id: RecordId = uuid.parse()?;

    let (_, reader) = state.relay.open_payload(&principal.user_key, &id).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    Ok(([(CONTENT_TYPE, "application/octet-stream")], body).into_response())
}

/// Upgrade to a WebSocket and run the device's session
async fn connect<S: FileStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let (Some(client_id), Some(user_key)) = (
        header(&headers, CLIENT_ID_HEADER),
        header(&headers, USER_KEY_HEADER),
    ) else {
        return Err(Error::InvalidRequest("missing client id or user key".into()).into());
    };

    state.authenticate(&headers)?;
    let ws = ws.map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;

    let connection_id = ConnectionId::new(client_id);
    let user_key = UserKey::new(user_key);
    let registry = Arc::clone(state.relay.registry());

    Ok(ws.on_upgrade(move |socket| async move {
        tracing::info!(connection_id = %connection_id, user = %user_key, "Device connected");

        let transport = Arc::new(WsTransport::new(socket));
        let end = run_session(&registry, transport, connection_id.clone(), user_key).await;

        tracing::info!(connection_id = %connection_id, reason = ?end, "Device disconnected");
    }))
}
