//! HTTP API Server
//!
//! REST surface for both node roles. The leader serves `/write`; followers
//! serve `/replicate`. Both serve the read side (`/read`, `/health`,
//! `/store`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::replication::{FollowerNode, QuorumCoordinator, ReplicateAck, WriteRequest, WriteResult};
use crate::store::KvStore;

/// Role-specific half of the application state
pub enum NodeRole {
    Leader(Arc<QuorumCoordinator>),
    Follower(Arc<FollowerNode>),
}

/// Shared application state
pub struct AppState {
    /// What this node does with writes
    pub role: NodeRole,
    /// This node's store (the leader's own or the follower's)
    pub store: Arc<KvStore>,
}

/// HTTP API server
pub struct HttpServer {
    bind_address: String,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a server fronting a leader
    pub fn leader(bind_address: String, coordinator: Arc<QuorumCoordinator>) -> Self {
        let store = Arc::clone(coordinator.store());
        Self {
            bind_address,
            state: Arc::new(AppState {
                role: NodeRole::Leader(coordinator),
                store,
            }),
        }
    }

    /// Create a server fronting a follower
    pub fn follower(bind_address: String, follower: Arc<FollowerNode>) -> Self {
        let store = Arc::clone(follower.store());
        Self {
            bind_address,
            state: Arc::new(AppState {
                role: NodeRole::Follower(follower),
                store,
            }),
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let writes: Router = match &self.state.role {
            NodeRole::Leader(coordinator) => Router::new()
                .route("/write", post(handle_write))
                .with_state(Arc::clone(coordinator)),
            NodeRole::Follower(follower) => Router::new()
                .route("/replicate", post(handle_replicate))
                .with_state(Arc::clone(follower)),
        };

        Router::new()
            .route("/", get(handle_root))
            .route("/read", get(handle_read))
            .route("/health", get(handle_health))
            .route("/store", get(handle_store))
            .with_state(Arc::clone(&self.state))
            .merge(writes)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.bind_address);

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        tracing::info!("HTTP API on {} stopped", self.bind_address);
        Ok(())
    }
}

// ============ Request/Response Types ============

/// Write response
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: WriteResult,
}

/// Read query parameters
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub key: Option<String>,
}

/// Read response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub key: String,
    pub value: String,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_quorum: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_id: Option<String>,
    pub store_size: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidRequest(_) | Error::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Error::KeyNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ============ Handlers ============

async fn handle_write(
    State(coordinator): State<Arc<QuorumCoordinator>>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<WriteResponse>> {
    let result = coordinator.write(req.key, req.value).await?;

    // The leader holds the write even when quorum was not met
    Ok(Json(WriteResponse {
        success: true,
        result,
    }))
}

async fn handle_replicate(
    State(follower): State<Arc<FollowerNode>>,
    Json(req): Json<WriteRequest>,
) -> Json<ReplicateAck> {
    Json(follower.replicate(req).await)
}

async fn handle_read(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadParams>,
) -> Result<Json<ReadResponse>> {
    let key = params.key.ok_or(Error::MissingParameter("key"))?;

    match state.store.read(&key).await {
        Some(value) => Ok(Json(ReadResponse { key, value })),
        None => Err(Error::KeyNotFound(key)),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_size = state.store.len().await;

    let response = match &state.role {
        NodeRole::Leader(coordinator) => HealthResponse {
            status: "healthy".to_string(),
            role: "leader".to_string(),
            followers: Some(coordinator.followers().to_vec()),
            write_quorum: Some(coordinator.write_quorum()),
            follower_id: None,
            store_size,
        },
        NodeRole::Follower(follower) => HealthResponse {
            status: "healthy".to_string(),
            role: "follower".to_string(),
            followers: None,
            write_quorum: None,
            follower_id: Some(follower.follower_id().to_string()),
            store_size,
        },
    };

    Json(response)
}

async fn handle_store(State(state): State<Arc<AppState>>) -> Json<HashMap<String, String>> {
    Json(state.store.snapshot().await)
}

async fn handle_root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let body = match &state.role {
        NodeRole::Leader(_) => serde_json::json!({
            "message": "Key-Value Store Leader API",
            "endpoints": {
                "POST /write": "Write a key-value pair. Body: {\"key\": \"string\", \"value\": \"string\"}",
                "GET /read?key=<key>": "Read a value by key",
                "GET /health": "Health check",
                "GET /store": "Get entire store"
            }
        }),
        NodeRole::Follower(follower) => serde_json::json!({
            "message": format!("Key-Value Store Follower API ({})", follower.follower_id()),
            "endpoints": {
                "POST /replicate": "Internal endpoint for replication (called by leader)",
                "GET /read?key=<key>": "Read a value by key",
                "GET /health": "Health check",
                "GET /store": "Get entire store"
            }
        }),
    };

    Json(body)
}
