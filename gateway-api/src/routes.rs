//! HTTP routes: `GET /tools` lists the catalog, `POST /tools/call`
//! dispatches one named tool call, `GET /healthz` is used by orchestrators.

use axum::{
    extract::{Extension, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::auth::{auth_middleware, CallerContext};
use crate::state::AppState;
use crate::tools::{execute_tool, get_available_tools, CallToolRequest, CallToolResponse, ListToolsResponse};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_tools() -> Json<ListToolsResponse> {
    Json(ListToolsResponse {
        tools: get_available_tools(),
    })
}

async fn call_tool(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(request): Json<CallToolRequest>,
) -> Json<CallToolResponse> {
    match execute_tool(&state, &caller, &request.name, &request.arguments).await {
        Ok(value) => Json(CallToolResponse::ok(&value)),
        Err(error) => Json(CallToolResponse::error(&error)),
    }
}
