//! REST API server for the finance tools
//!
//! Every registered tool is callable over HTTP. The status code follows the
//! failure code of the tool output.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ErrorCode, FinanceError};
use crate::models::{OperationFailure, ToolInput, ToolOutput};
use crate::store::StoreHandle;
use crate::tools::{AgentScope, ToolDescriptor, ToolRegistry};

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ToolRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListing {
    pub count: usize,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct ToolListQuery {
    pub scope: Option<AgentScope>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ToolRegistry>,
    pub store: StoreHandle,
    pub default_user_id: String,
}

fn status_for(output: &ToolOutput) -> StatusCode {
    match output.code {
        None => StatusCode::OK,
        Some(ErrorCode::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(ErrorCode::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorCode::StorageError) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, health, store_status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "up"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "degraded", "down"),
    };

    (
        status,
        Json(serde_json::json!({
            "status": health,
            "store": store_status,
            "backend": state.store.backend(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// =============================
/// Tool Endpoints
/// =============================

async fn list_tools(
    State(state): State<ApiState>,
    axum::extract::Query(query): axum::extract::Query<ToolListQuery>,
) -> Json<ToolListing> {
    let tools: Vec<ToolDescriptor> = state
        .registry
        .describe()
        .into_iter()
        .filter(|t| query.scope.map_or(true, |scope| t.scope == scope))
        .collect();

    Json(ToolListing {
        count: tools.len(),
        tools,
    })
}

async fn invoke_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<ToolOutput>) {
    let req = match parse_tool_request(&body) {
        Ok(req) => req,
        Err(e) => {
            info!(tool = %name, error = %e, "Rejected tool request body");
            let output = ToolOutput::failed(OperationFailure::from_error(&e, "Invalid request body"));
            return (status_for(&output), Json(output));
        }
    };

    let user_id = req
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.default_user_id.clone());

    info!(tool = %name, user_id = %user_id, "Received tool request");

    let output = state
        .registry
        .invoke(&ToolInput {
            tool_name: name,
            user_id,
            parameters: req.parameters,
        })
        .await;

    (status_for(&output), Json(output))
}

/// An empty body means "no arguments"; anything else must be a valid request.
fn parse_tool_request(body: &[u8]) -> crate::Result<ToolRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ToolRequest::default());
    }

    serde_json::from_slice(body)
        .map_err(|e| FinanceError::invalid(format!("Malformed request body: {}", e)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name", post(invoke_tool))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(state: ApiState, port: u16) -> crate::Result<()> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
