//! Environment-based configuration types for idprov runtime settings.

use anyhow::Result;
use std::time::Duration;

use crate::errors::ConfigError;

/// Callback path appended to the deployed server base URL when patching
/// redirect URIs. Must match the path the OAuth proxy serves at runtime.
pub const AUTH_CALLBACK_PATH: &str = "/auth/callback";

/// Auth-provider mode for a deployment.
///
/// Resolved once at startup and threaded explicitly through both
/// provisioning entry points; immutable for the deployment's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthProviderMode {
    /// No identity provider; provisioning hooks skip cleanly.
    #[default]
    None,
    /// Self-hosted realm-based provider configured by declarative import.
    Keycloak,
    /// Managed cloud app-registration proxy driven through the Graph API.
    EntraProxy,
}

impl AuthProviderMode {
    /// Resolve a mode from a raw configuration value.
    ///
    /// Unrecognized or absent values resolve to `None`. That is a fail-safe
    /// default, not an error.
    pub fn resolve(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("keycloak") => Self::Keycloak,
            Some("entra_proxy") => Self::EntraProxy,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Keycloak => "keycloak",
            Self::EntraProxy => "entra_proxy",
        }
    }
}

/// Sensitive configuration or provisioning value.
///
/// Debug and Display are redacted; the inner value is only reachable through
/// [`Secret::expose`], keeping secrets out of tracing output by construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Callers own the decision to write it
    /// forward; it must never flow into logs.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// HTTP client timeout configuration
#[derive(Clone)]
pub struct HttpClientTimeout(Duration);

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub auth_provider_mode: AuthProviderMode,
    pub http_port: HttpPort,
    pub external_base: String,
    pub user_agent: String,
    pub http_client_timeout: HttpClientTimeout,
    pub storage_backend: String,
    pub database_url: Option<String>,
    pub tenant_id: Option<String>,
    pub graph_base_url: String,
    pub graph_access_token: Option<Secret>,
    pub entra_app_display_name: String,
    pub deployed_server_base_url: Option<String>,
    pub provision_env_file: String,
    pub keycloak_realm_name: String,
    pub keycloak_realm_url: Option<String>,
    pub keycloak_admin_username: String,
    pub keycloak_admin_password: Option<Secret>,
    pub keycloak_realm_import_path: String,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let auth_provider_mode =
            AuthProviderMode::resolve(optional_env("MCP_AUTH_PROVIDER").as_deref());
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base = default_env("SERVER_EXTERNAL_BASE", "http://localhost:8000");
        let default_user_agent = format!("idprov/{}", version()?);
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "10s").try_into()?;
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let database_url = optional_env("DATABASE_URL");
        let tenant_id = optional_env("AZURE_TENANT_ID");
        let graph_base_url = default_env("GRAPH_BASE_URL", "https://graph.microsoft.com/v1.0");
        let graph_access_token = optional_env("GRAPH_ACCESS_TOKEN").map(Secret::new);
        let entra_app_display_name = default_env("ENTRA_APP_DISPLAY_NAME", "MCP Server App");
        let deployed_server_base_url = optional_env("ENTRA_PROXY_MCP_SERVER_BASE_URL");
        let provision_env_file = default_env("PROVISION_ENV_FILE", "provision.env");
        let keycloak_realm_name = default_env("KEYCLOAK_REALM_NAME", "mcp");
        let keycloak_realm_url = optional_env("KEYCLOAK_REALM_URL");
        let keycloak_admin_username = default_env("KEYCLOAK_ADMIN_USERNAME", "admin");
        let keycloak_admin_password = optional_env("KEYCLOAK_ADMIN_PASSWORD").map(Secret::new);
        let keycloak_realm_import_path =
            default_env("KEYCLOAK_REALM_IMPORT_PATH", "realm-import.json");

        Ok(Self {
            version: version()?,
            auth_provider_mode,
            http_port,
            external_base,
            user_agent,
            http_client_timeout,
            storage_backend,
            database_url,
            tenant_id,
            graph_base_url,
            graph_access_token,
            entra_app_display_name,
            deployed_server_base_url,
            provision_env_file,
            keycloak_realm_name,
            keycloak_realm_url,
            keycloak_admin_username,
            keycloak_admin_password,
            keycloak_realm_import_path,
        })
    }

    /// Tenant identifier, required outside `none` mode.
    pub fn require_tenant_id(&self) -> Result<&str, ConfigError> {
        self.tenant_id
            .as_deref()
            .ok_or_else(|| ConfigError::EnvVarRequired("AZURE_TENANT_ID".to_string()))
    }

    /// Graph bearer token acquired by the surrounding pipeline.
    pub fn require_graph_access_token(&self) -> Result<&Secret, ConfigError> {
        self.graph_access_token
            .as_ref()
            .ok_or_else(|| ConfigError::EnvVarRequired("GRAPH_ACCESS_TOKEN".to_string()))
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for HttpClientTimeout {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(Duration::from_secs(10)));
        }

        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        Ok(Self(duration))
    }
}

impl AsRef<Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}
