//! Microsoft Graph application-registration API client.
//!
//! Only the slice of the Graph surface the Entra proxy provider needs:
//! application lookup and creation, service principals, redirect-URI
//! patching, and password credential generation. The [`GraphApi`] trait is
//! the seam the provider is tested against.

use crate::config::Secret;
use crate::errors::ProvisionError;
use crate::provision::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subset of a Graph `application` resource used by provisioning.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Directory object ID, used for follow-up management calls
    pub id: String,
    /// The OAuth client ID
    pub app_id: String,
    pub display_name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub web: WebApplication,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebApplication {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// OAuth2 permission scope exposed by the created application.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionScope {
    pub id: Uuid,
    pub admin_consent_display_name: String,
    pub admin_consent_description: String,
    pub user_consent_display_name: String,
    pub user_consent_description: String,
    pub is_enabled: bool,
    pub value: String,
    #[serde(rename = "type")]
    pub scope_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiApplication {
    pub oauth2_permission_scopes: Vec<PermissionScope>,
    pub requested_access_token_version: u8,
}

/// Request body for creating an application registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub display_name: String,
    pub sign_in_audience: String,
    pub notes: String,
    pub web: WebApplication,
    pub api: ApiApplication,
}

/// Partial application update. Absent fields are left untouched by Graph.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebApplication>,
}

impl ApplicationPatch {
    /// Set the `api://<client_id>` identifier URI after creation, once the
    /// client ID is known.
    pub fn identifier_uri(client_id: &str) -> Self {
        Self {
            identifier_uris: Some(vec![format!("api://{}", client_id)]),
            ..Self::default()
        }
    }

    pub fn redirect_uris(redirect_uris: Vec<String>) -> Self {
        Self {
            web: Some(WebApplication { redirect_uris }),
            ..Self::default()
        }
    }
}

/// Management operations against the identity provider's application
/// directory.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// All applications whose display name matches exactly.
    async fn list_applications_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<Application>>;

    async fn create_application(&self, request: &NewApplication) -> Result<Application>;

    /// Create the service principal backing an application in this tenant.
    async fn create_service_principal(&self, app_id: &str) -> Result<()>;

    async fn update_application(&self, object_id: &str, patch: &ApplicationPatch) -> Result<()>;

    /// Generate a new password credential. The secret text is only ever
    /// returned by this call; it cannot be read back later.
    async fn add_password(&self, object_id: &str, display_name: &str) -> Result<Secret>;
}

/// reqwest-backed [`GraphApi`] implementation.
///
/// The bearer token is acquired by the surrounding deployment pipeline and
/// handed in through configuration; this client never performs its own
/// credential flow.
pub struct GraphHttpClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: Secret,
}

#[derive(Debug, Deserialize)]
struct ApplicationCollection {
    value: Vec<Application>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    secret_text: Option<String>,
}

impl GraphHttpClient {
    pub fn new(http_client: reqwest::Client, base_url: String, access_token: Secret) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.access_token.expose())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProvisionError::Permission(
                format!("directory returned {}: {}", status, detail),
            ),
            StatusCode::CONFLICT => {
                ProvisionError::Conflict(format!("directory returned {}: {}", status, detail))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ProvisionError::Timeout(format!("directory returned {}", status))
            }
            _ => ProvisionError::Provisioning(format!("directory returned {}: {}", status, detail)),
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> ProvisionError {
    if error.is_timeout() {
        ProvisionError::Timeout(error.to_string())
    } else {
        ProvisionError::Provisioning(error.to_string())
    }
}

/// Escape a value for use inside an OData `eq '...'` literal.
fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl GraphApi for GraphHttpClient {
    async fn list_applications_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<Application>> {
        let filter = format!("displayName eq '{}'", odata_quote(display_name));
        let request = self.request(reqwest::Method::GET, "/applications").query(&[
            ("$filter", filter.as_str()),
            (
                "$select",
                "id,appId,displayName,notes,web,createdDateTime",
            ),
        ]);

        let collection: ApplicationCollection = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))?;
        Ok(collection.value)
    }

    async fn create_application(&self, request: &NewApplication) -> Result<Application> {
        let response = self
            .send(self.request(reqwest::Method::POST, "/applications").json(request))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))
    }

    async fn create_service_principal(&self, app_id: &str) -> Result<()> {
        self.send(
            self.request(reqwest::Method::POST, "/servicePrincipals")
                .json(&serde_json::json!({ "appId": app_id })),
        )
        .await?;
        Ok(())
    }

    async fn update_application(&self, object_id: &str, patch: &ApplicationPatch) -> Result<()> {
        self.send(
            self.request(
                reqwest::Method::PATCH,
                &format!("/applications/{}", object_id),
            )
            .json(patch),
        )
        .await?;
        Ok(())
    }

    async fn add_password(&self, object_id: &str, display_name: &str) -> Result<Secret> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("/applications/{}/addPassword", object_id),
                )
                .json(&serde_json::json!({
                    "passwordCredential": { "displayName": display_name }
                })),
            )
            .await?;

        let credential: PasswordCredential = response
            .json()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))?;
        credential
            .secret_text
            .map(Secret::new)
            .ok_or_else(|| {
                ProvisionError::InvalidResponse(
                    "created password credential has no secret text".to_string(),
                )
            })
    }
}
