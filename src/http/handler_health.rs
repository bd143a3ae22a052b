//! Health check endpoint for service availability.

use axum::response::Json as ResponseJson;
use serde_json::{Value, json};

pub async fn health_check_handler() -> ResponseJson<Value> {
    ResponseJson(json!({ "status": "healthy", "service": "mcp-server" }))
}
