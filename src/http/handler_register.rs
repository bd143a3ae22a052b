//! Handles POST /auth/register - dynamic OAuth client registration per RFC 7591

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::errors::StorageError;
use crate::http::context::AppState;
use crate::storage::traits::DynamicClientRecord;

/// Registration response returned to the client (RFC 7591 section 3.2.1).
#[derive(Debug, Serialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_id_issued_at: i64,
    pub registration_access_token: String,
    pub registration_client_uri: String,
    #[serde(flatten)]
    pub metadata: Value,
}

impl ClientRegistrationResponse {
    fn from_record(record: DynamicClientRecord, redact_token: bool) -> Self {
        let registration_access_token = if redact_token {
            // Disclosed exactly once, at registration time.
            "redacted".to_string()
        } else {
            record.registration_access_token
        };
        Self {
            registration_client_uri: format!("/auth/clients/{}", record.client_id),
            client_id: record.client_id,
            client_id_issued_at: record.created_at.timestamp(),
            registration_access_token,
            metadata: record.client_metadata,
        }
    }
}

fn storage_error_response(error: &StorageError) -> (StatusCode, ResponseJson<Value>) {
    // Fail closed: an unreachable store must never let registration traffic
    // degrade into unauthenticated acceptance.
    tracing::error!(error = %error, "client registration store unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        ResponseJson(json!({
            "error": "temporarily_unavailable",
            "error_description": "client registration store unavailable"
        })),
    )
}

pub async fn register_client_handler(
    State(state): State<AppState>,
    Json(metadata): Json<Value>,
) -> Result<(StatusCode, ResponseJson<ClientRegistrationResponse>), (StatusCode, ResponseJson<Value>)>
{
    let Value::Object(_) = &metadata else {
        return Err((
            StatusCode::BAD_REQUEST,
            ResponseJson(json!({
                "error": "invalid_client_metadata",
                "error_description": "client metadata must be a JSON object"
            })),
        ));
    };

    if let Some(redirect_uris) = metadata.get("redirect_uris") {
        let all_valid = redirect_uris.as_array().is_some_and(|uris| {
            uris.iter()
                .all(|uri| uri.as_str().is_some_and(|u| url::Url::parse(u).is_ok()))
        });
        if !all_valid {
            return Err((
                StatusCode::BAD_REQUEST,
                ResponseJson(json!({
                    "error": "invalid_redirect_uri",
                    "error_description": "redirect_uris must be an array of valid URIs"
                })),
            ));
        }
    }

    match state.client_registration_store.create_client(metadata).await {
        Ok(record) => {
            tracing::info!(client_id = %record.client_id, "dynamic client registered");
            Ok((
                StatusCode::CREATED,
                ResponseJson(ClientRegistrationResponse::from_record(record, false)),
            ))
        }
        Err(e) => Err(storage_error_response(&e)),
    }
}

pub async fn get_client_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<ResponseJson<ClientRegistrationResponse>, (StatusCode, ResponseJson<Value>)> {
    match state.client_registration_store.get_client(&client_id).await {
        Ok(Some(record)) => Ok(ResponseJson(ClientRegistrationResponse::from_record(
            record, true,
        ))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            ResponseJson(json!({
                "error": "client_not_found",
                "error_description": format!("no client registered with ID {}", client_id)
            })),
        )),
        Err(e) => Err(storage_error_response(&e)),
    }
}
