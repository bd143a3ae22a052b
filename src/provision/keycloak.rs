//! Realm-based identity provider configured by declarative import.
//!
//! Bootstrap renders a realm-import document that the identity-provider
//! container consumes at startup; nothing here calls the admin API. Realm
//! clients carry templated redirect patterns, so the post-provision patch
//! phase has nothing to do for this provider.
//!
//! Known limitation: issuer-URL validation needs the externally reachable
//! base URL of the identity provider itself, which does not exist until the
//! provider's own container resource is created. Deployments close that
//! ordering gap operationally by fronting the provider with a custom domain
//! known ahead of time.

use crate::config::{AuthProviderMode, Config, Secret};
use crate::errors::{ConfigError, ProvisionError};
use crate::provision::{
    BootstrapKind, BootstrapOutcome, CredentialEnvMapping, DeployedServiceEndpoint, PatchOutcome,
    ProviderStrategy, Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Client ID the resource server validates token audiences against.
const SERVER_CLIENT_ID: &str = "mcp-server";

/// Administrative credential for the identity-provider container.
///
/// Consumed by the container's own bootstrap, not by any call made here.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    pub username: String,
    pub password: Secret,
}

/// A client entry in the realm-import document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmClient {
    pub client_id: String,
    pub protocol: String,
    pub public_client: bool,
    pub standard_flow_enabled: bool,
    /// Templated patterns; the wildcard entries make runtime redirect
    /// patching unnecessary.
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
}

/// Declarative description of the realm handed to the identity provider's
/// import mechanism.
#[derive(Debug, Clone)]
pub struct RealmConfig {
    pub realm_name: String,
    pub admin_credential: AdminCredential,
    pub preconfigured_clients: Vec<RealmClient>,
}

impl RealmConfig {
    /// The standard realm: one confidential client for the resource server
    /// with development and editor redirect patterns preconfigured.
    pub fn standard(realm_name: String, admin_credential: AdminCredential) -> Self {
        Self {
            realm_name,
            admin_credential,
            preconfigured_clients: vec![RealmClient {
                client_id: SERVER_CLIENT_ID.to_string(),
                protocol: "openid-connect".to_string(),
                public_client: false,
                standard_flow_enabled: true,
                redirect_uris: vec![
                    "http://localhost:8000/*".to_string(),
                    "https://vscode.dev/redirect".to_string(),
                    "http://127.0.0.1:*".to_string(),
                ],
                web_origins: vec!["+".to_string()],
            }],
        }
    }

    /// Render the realm-import document.
    ///
    /// The admin credential is deliberately absent: it reaches the container
    /// through its environment, never through the import file.
    pub fn import_document(&self) -> serde_json::Value {
        serde_json::json!({
            "realm": self.realm_name,
            "enabled": true,
            "clients": self.preconfigured_clients,
        })
    }
}

/// Identity provisioning for the self-hosted realm-based provider.
pub struct KeycloakProvider {
    realm: RealmConfig,
    import_path: PathBuf,
}

impl KeycloakProvider {
    pub fn new(realm: RealmConfig, import_path: PathBuf) -> Self {
        Self { realm, import_path }
    }

    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        let password = config
            .keycloak_admin_password
            .clone()
            .ok_or_else(|| ConfigError::EnvVarRequired("KEYCLOAK_ADMIN_PASSWORD".to_string()))?;
        let admin_credential = AdminCredential {
            username: config.keycloak_admin_username.clone(),
            password,
        };
        let realm = RealmConfig::standard(config.keycloak_realm_name.clone(), admin_credential);
        Ok(Self::new(
            realm,
            PathBuf::from(&config.keycloak_realm_import_path),
        ))
    }

    pub fn realm(&self) -> &RealmConfig {
        &self.realm
    }
}

#[async_trait]
impl ProviderStrategy for KeycloakProvider {
    fn mode(&self) -> AuthProviderMode {
        AuthProviderMode::Keycloak
    }

    fn bootstrap_kind(&self) -> BootstrapKind {
        BootstrapKind::Declarative
    }

    fn credential_env_mapping(&self) -> CredentialEnvMapping {
        // Realm clients are declared in the import document; no generated
        // credentials to export.
        CredentialEnvMapping::default()
    }

    async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        let document = self.realm.import_document();
        let rendered = serde_json::to_vec_pretty(&document)
            .map_err(|e| ProvisionError::Output(e.to_string()))?;
        tokio::fs::write(&self.import_path, rendered)
            .await
            .map_err(|e| {
                ProvisionError::Output(format!(
                    "writing realm import to {}: {}",
                    self.import_path.display(),
                    e
                ))
            })?;

        tracing::info!(
            realm = %self.realm.realm_name,
            path = %self.import_path.display(),
            "realm import document written"
        );
        Ok(BootstrapOutcome::Declarative {
            import_path: self.import_path.clone(),
        })
    }

    async fn patch_redirect_uris(
        &self,
        _endpoint: &DeployedServiceEndpoint,
    ) -> Result<PatchOutcome> {
        // Redirect patterns are fixed at realm-import time.
        tracing::debug!(realm = %self.realm.realm_name, "realm clients use templated redirects, nothing to patch");
        Ok(PatchOutcome::Skipped)
    }
}
