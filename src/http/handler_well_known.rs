//! OAuth protected-resource discovery metadata (RFC 9728).

use axum::{extract::State, response::Json as ResponseJson};
use serde_json::{Value, json};

use crate::config::AuthProviderMode;
use crate::http::context::AppState;

/// GET /.well-known/oauth-protected-resource
///
/// Points clients at the authorization server for this deployment: the
/// realm URL when a realm-based provider is configured, otherwise this
/// server's own OAuth proxy surface.
pub async fn oauth_protected_resource_handler(State(state): State<AppState>) -> ResponseJson<Value> {
    let external_base = state.config.external_base.trim_end_matches('/');
    let authorization_server = match state.config.auth_provider_mode {
        AuthProviderMode::Keycloak => state
            .config
            .keycloak_realm_url
            .clone()
            .unwrap_or_else(|| external_base.to_string()),
        _ => external_base.to_string(),
    };

    ResponseJson(json!({
        "resource": external_base,
        "authorization_servers": [authorization_server],
        "bearer_methods_supported": ["header"],
    }))
}
