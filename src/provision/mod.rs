//! Identity-provider provisioning strategies and the two-phase orchestrator.
//!
//! The deployed service's public endpoint is unknown until after
//! infrastructure creation, so provisioning is split into a pre-provision
//! phase (create or reuse the identity client) and a post-provision phase
//! (patch the redirect target once the endpoint exists). Providers differ
//! structurally: the managed app-registration proxy is driven imperatively
//! through remote calls, while the realm-based provider is configured by a
//! declarative import document. That asymmetry is surfaced as a
//! [`BootstrapKind`] capability rather than forcing both through one remote
//! protocol.

pub mod entra;
pub mod graph;
pub mod keycloak;
pub mod none;
pub mod orchestrator;
pub mod outputs;

pub use entra::EntraProxyProvider;
pub use keycloak::KeycloakProvider;
pub use none::NoneProvider;
pub use orchestrator::{ProvisionOrchestrator, ProvisionPhase};
pub use outputs::{DotenvFileSink, MemoryOutputSink, OutputSink};

use crate::config::{AUTH_CALLBACK_PATH, AuthProviderMode, Config, Secret};
use crate::errors::{ConfigError, ProvisionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// How a provider establishes its identity client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapKind {
    /// No identity provider configured; both phases skip.
    Disabled,
    /// Provisioning produces a configuration document consumed by the
    /// identity provider's own import mechanism; no remote calls.
    Declarative,
    /// Provisioning drives the identity provider's management API directly.
    Imperative,
}

/// The deployed service's externally reachable address, known only after
/// infrastructure creation.
#[derive(Debug, Clone)]
pub struct DeployedServiceEndpoint {
    base_url: Url,
}

impl DeployedServiceEndpoint {
    pub fn new(raw: &str) -> std::result::Result<Self, ConfigError> {
        let base_url = Url::parse(raw)
            .map_err(|e| ConfigError::UrlParsingFailed(raw.to_string(), e.to_string()))?;
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The OAuth callback address registered for this deployment.
    pub fn callback_uri(&self) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            AUTH_CALLBACK_PATH
        )
    }
}

/// An identity client established with a provider.
///
/// The secret is populated only when the registration was created in this
/// run; managed providers cannot re-disclose secrets afterwards, and this
/// orchestration never tries to read one back.
#[derive(Debug, Clone)]
pub struct IdentityClientRegistration {
    pub client_id: String,
    pub client_secret: Option<Secret>,
    pub redirect_uris: Vec<String>,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a bootstrap call.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// Nothing to do for this provider.
    Skipped,
    /// A declarative configuration document was produced at the given path.
    Declarative { import_path: PathBuf },
    /// An identity client exists; `created` is false when an earlier run's
    /// registration was found and reused.
    Registered {
        registration: IdentityClientRegistration,
        created: bool,
    },
}

/// Result of a redirect-URI patch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Provider does not patch at runtime (disabled, or redirect patterns
    /// are fixed at import time).
    Skipped,
    /// The callback URI was already registered; verified, nothing written.
    AlreadyPresent,
    /// The callback URI was appended to the registration.
    Added(String),
}

/// Environment variable names a provider's credentials are exported under.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialEnvMapping {
    pub client_id: Option<&'static str>,
    pub client_secret: Option<&'static str>,
}

/// Polymorphic identity-provisioning backend.
///
/// The orchestrator stays provider-agnostic: it drives this capability set
/// and never branches on the mode string itself.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Mode this strategy serves.
    fn mode(&self) -> AuthProviderMode;

    /// Declarative-vs-imperative capability, checked by the orchestrator.
    fn bootstrap_kind(&self) -> BootstrapKind;

    /// Environment variable names for produced credentials.
    fn credential_env_mapping(&self) -> CredentialEnvMapping;

    /// Create or reuse the identity client. Must be idempotent: re-running
    /// with unchanged configuration yields the same client and never a
    /// duplicate registration.
    async fn bootstrap(&self) -> Result<BootstrapOutcome>;

    /// Register the deployed endpoint's callback URI. Strictly additive;
    /// pre-seeded development and editor URIs are never removed.
    async fn patch_redirect_uris(&self, endpoint: &DeployedServiceEndpoint)
    -> Result<PatchOutcome>;
}

/// Select and construct the provider strategy for the resolved mode.
pub fn provider_for(config: &Config) -> anyhow::Result<Arc<dyn ProviderStrategy>> {
    match config.auth_provider_mode {
        AuthProviderMode::None => Ok(Arc::new(NoneProvider)),
        AuthProviderMode::Keycloak => Ok(Arc::new(KeycloakProvider::from_config(config)?)),
        AuthProviderMode::EntraProxy => {
            let tenant_id = config.require_tenant_id()?.to_string();
            let token = config.require_graph_access_token()?.clone();
            let http_client = reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(*config.http_client_timeout.as_ref())
                .build()?;
            let graph = Arc::new(graph::GraphHttpClient::new(
                http_client,
                config.graph_base_url.clone(),
                token,
            ));
            Ok(Arc::new(EntraProxyProvider::new(
                graph,
                tenant_id,
                config.entra_app_display_name.clone(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_uri_construction() {
        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com").unwrap();
        assert_eq!(
            endpoint.callback_uri(),
            "https://mcp.example.com/auth/callback"
        );

        // Trailing slash never doubles up.
        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com/").unwrap();
        assert_eq!(
            endpoint.callback_uri(),
            "https://mcp.example.com/auth/callback"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(DeployedServiceEndpoint::new("not a url").is_err());
    }
}
