//! Managed app-registration proxy provider.
//!
//! Drives the tenant's application directory imperatively: look up or create
//! a registration under a deterministic display name during pre-provision,
//! then append the deployed server's callback URI once the endpoint is
//! known. The generated client secret is disclosed by the directory exactly
//! once at creation; reuse of an existing registration therefore never
//! attempts to read it back.

use crate::config::AuthProviderMode;
use crate::errors::ProvisionError;
use crate::provision::graph::{
    ApiApplication, Application, ApplicationPatch, GraphApi, NewApplication, PermissionScope,
    WebApplication,
};
use crate::provision::{
    BootstrapKind, BootstrapOutcome, CredentialEnvMapping, DeployedServiceEndpoint,
    IdentityClientRegistration, PatchOutcome, ProviderStrategy, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use std::ops::Range;
use std::sync::Arc;
use uuid::Uuid;

/// Environment variable the produced client ID is exported under.
pub const ENTRA_CLIENT_ID_ENV: &str = "ENTRA_PROXY_AZURE_CLIENT_ID";

/// Environment variable the generated client secret is exported under.
pub const ENTRA_CLIENT_SECRET_ENV: &str = "ENTRA_PROXY_AZURE_CLIENT_SECRET";

/// Ownership marker stored in the registration's notes field. A same-name
/// registration without this marker belongs to someone else and is never
/// touched.
const OWNERSHIP_MARKER: &str = "managed-by:idprov";

/// Display name of the generated password credential.
const SECRET_DISPLAY_NAME: &str = "idprov-generated";

/// Callback used when running the server locally.
const LOCAL_CALLBACK_URI: &str = "http://localhost:8000/auth/callback";

/// Web editor redirect host.
const EDITOR_REDIRECT_URI: &str = "https://vscode.dev/redirect";

/// Loopback ports the desktop editor listens on for OAuth callbacks.
const EDITOR_LOOPBACK_PORTS: Range<u16> = 33418..33428;

/// The fixed development/editor redirect set seeded at creation. Patch
/// operations only ever add to this set.
pub fn seed_redirect_uris() -> Vec<String> {
    let mut uris = vec![
        LOCAL_CALLBACK_URI.to_string(),
        EDITOR_REDIRECT_URI.to_string(),
    ];
    for port in EDITOR_LOOPBACK_PORTS {
        uris.push(format!("http://127.0.0.1:{}", port));
    }
    uris
}

/// Identity provisioning backed by a managed app-registration directory.
pub struct EntraProxyProvider {
    graph: Arc<dyn GraphApi>,
    tenant_id: String,
    display_name: String,
}

impl EntraProxyProvider {
    pub fn new(graph: Arc<dyn GraphApi>, tenant_id: String, display_name: String) -> Self {
        Self {
            graph,
            tenant_id,
            display_name,
        }
    }

    /// Find the registration owned by this tool, keyed by its deterministic
    /// display name.
    ///
    /// A same-name registration without the ownership marker, or more than
    /// one match, is a conflict: it is reported and never silently
    /// overwritten.
    async fn find_managed_registration(&self) -> Result<Option<Application>> {
        let mut applications = self
            .graph
            .list_applications_by_display_name(&self.display_name)
            .await?;

        match applications.len() {
            0 => Ok(None),
            1 => {
                let application = applications.remove(0);
                if application.notes.as_deref() == Some(OWNERSHIP_MARKER) {
                    Ok(Some(application))
                } else {
                    Err(ProvisionError::Conflict(format!(
                        "registration '{}' exists but is not managed by this deployment",
                        self.display_name
                    )))
                }
            }
            n => Err(ProvisionError::Conflict(format!(
                "{} registrations named '{}' exist in the tenant",
                n, self.display_name
            ))),
        }
    }

    fn registration_request(&self) -> NewApplication {
        NewApplication {
            display_name: self.display_name.clone(),
            // Single tenant
            sign_in_audience: "AzureADMyOrg".to_string(),
            notes: OWNERSHIP_MARKER.to_string(),
            web: WebApplication {
                redirect_uris: seed_redirect_uris(),
            },
            api: ApiApplication {
                oauth2_permission_scopes: vec![PermissionScope {
                    id: Uuid::new_v4(),
                    admin_consent_display_name: "Access MCP Server".to_string(),
                    admin_consent_description:
                        "Allows access to the MCP server as the signed-in user.".to_string(),
                    user_consent_display_name: "Access MCP Server".to_string(),
                    user_consent_description: "Allow access to the MCP server on your behalf"
                        .to_string(),
                    is_enabled: true,
                    value: "mcp-access".to_string(),
                    scope_type: "User".to_string(),
                }],
                // v2 tokens are required by the OAuth proxy runtime
                requested_access_token_version: 2,
            },
        }
    }
}

#[async_trait]
impl ProviderStrategy for EntraProxyProvider {
    fn mode(&self) -> AuthProviderMode {
        AuthProviderMode::EntraProxy
    }

    fn bootstrap_kind(&self) -> BootstrapKind {
        BootstrapKind::Imperative
    }

    fn credential_env_mapping(&self) -> CredentialEnvMapping {
        CredentialEnvMapping {
            client_id: Some(ENTRA_CLIENT_ID_ENV),
            client_secret: Some(ENTRA_CLIENT_SECRET_ENV),
        }
    }

    async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        if let Some(existing) = self.find_managed_registration().await? {
            tracing::info!(
                client_id = %existing.app_id,
                "app registration already exists, reusing"
            );
            let registration = IdentityClientRegistration {
                client_id: existing.app_id,
                // The directory cannot re-disclose the secret; it stays
                // wherever the creating run exported it.
                client_secret: None,
                redirect_uris: existing.web.redirect_uris,
                tenant_id: self.tenant_id.clone(),
                created_at: existing.created_date_time.unwrap_or_else(Utc::now),
            };
            return Ok(BootstrapOutcome::Registered {
                registration,
                created: false,
            });
        }

        tracing::info!(display_name = %self.display_name, "creating app registration");
        let created = self
            .graph
            .create_application(&self.registration_request())
            .await?;
        self.graph.create_service_principal(&created.app_id).await?;
        self.graph
            .update_application(&created.id, &ApplicationPatch::identifier_uri(&created.app_id))
            .await?;
        let secret = self
            .graph
            .add_password(&created.id, SECRET_DISPLAY_NAME)
            .await?;

        tracing::info!(client_id = %created.app_id, "app registration created");
        let registration = IdentityClientRegistration {
            client_id: created.app_id,
            client_secret: Some(secret),
            redirect_uris: created.web.redirect_uris,
            tenant_id: self.tenant_id.clone(),
            created_at: created.created_date_time.unwrap_or_else(Utc::now),
        };
        Ok(BootstrapOutcome::Registered {
            registration,
            created: true,
        })
    }

    async fn patch_redirect_uris(
        &self,
        endpoint: &DeployedServiceEndpoint,
    ) -> Result<PatchOutcome> {
        let registration = self.find_managed_registration().await?.ok_or_else(|| {
            ProvisionError::Provisioning(format!(
                "no registration named '{}' to patch; run the pre-provision hook first",
                self.display_name
            ))
        })?;

        let callback = endpoint.callback_uri();
        if registration.web.redirect_uris.iter().any(|uri| uri == &callback) {
            tracing::info!(%callback, "redirect URI already registered");
            return Ok(PatchOutcome::AlreadyPresent);
        }

        // Additive only: every existing entry, seeded development URIs
        // included, is carried over.
        let mut redirect_uris = registration.web.redirect_uris;
        redirect_uris.push(callback.clone());
        self.graph
            .update_application(
                &registration.id,
                &ApplicationPatch::redirect_uris(redirect_uris),
            )
            .await?;

        tracing::info!(%callback, "redirect URI registered");
        Ok(PatchOutcome::Added(callback))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Secret;
    use std::sync::Mutex;

    /// Scripted in-memory directory standing in for the remote API.
    #[derive(Default)]
    pub(crate) struct MockGraph {
        pub applications: Mutex<Vec<Application>>,
        pub create_calls: Mutex<u32>,
        pub password_calls: Mutex<u32>,
        pub fail_with: Mutex<Option<fn() -> ProvisionError>>,
    }

    impl MockGraph {
        pub fn with_application(application: Application) -> Self {
            let mock = Self::default();
            mock.applications.lock().unwrap().push(application);
            mock
        }

        fn check_failure(&self) -> Result<()> {
            if let Some(make_error) = *self.fail_with.lock().unwrap() {
                return Err(make_error());
            }
            Ok(())
        }
    }

    pub(crate) fn managed_application(redirect_uris: Vec<String>) -> Application {
        Application {
            id: "object-1".to_string(),
            app_id: "client-1".to_string(),
            display_name: "MCP Server App".to_string(),
            notes: Some(OWNERSHIP_MARKER.to_string()),
            web: WebApplication { redirect_uris },
            created_date_time: None,
        }
    }

    #[async_trait]
    impl GraphApi for MockGraph {
        async fn list_applications_by_display_name(
            &self,
            display_name: &str,
        ) -> Result<Vec<Application>> {
            self.check_failure()?;
            Ok(self
                .applications
                .lock()
                .unwrap()
                .iter()
                .filter(|app| app.display_name == display_name)
                .cloned()
                .collect())
        }

        async fn create_application(&self, request: &NewApplication) -> Result<Application> {
            self.check_failure()?;
            *self.create_calls.lock().unwrap() += 1;
            let application = Application {
                id: "object-1".to_string(),
                app_id: "client-1".to_string(),
                display_name: request.display_name.clone(),
                notes: Some(request.notes.clone()),
                web: request.web.clone(),
                created_date_time: None,
            };
            self.applications.lock().unwrap().push(application.clone());
            Ok(application)
        }

        async fn create_service_principal(&self, _app_id: &str) -> Result<()> {
            self.check_failure()
        }

        async fn update_application(
            &self,
            object_id: &str,
            patch: &ApplicationPatch,
        ) -> Result<()> {
            self.check_failure()?;
            if let Some(web) = &patch.web {
                let mut applications = self.applications.lock().unwrap();
                if let Some(app) = applications.iter_mut().find(|app| app.id == object_id) {
                    app.web = web.clone();
                }
            }
            Ok(())
        }

        async fn add_password(&self, _object_id: &str, _display_name: &str) -> Result<Secret> {
            self.check_failure()?;
            *self.password_calls.lock().unwrap() += 1;
            Ok(Secret::new("generated-secret"))
        }
    }

    fn provider(graph: Arc<MockGraph>) -> EntraProxyProvider {
        EntraProxyProvider::new(graph, "tenant-1".to_string(), "MCP Server App".to_string())
    }

    #[tokio::test]
    async fn test_bootstrap_creates_exactly_one_registration() {
        let graph = Arc::new(MockGraph::default());
        let provider = provider(graph.clone());

        let outcome = provider.bootstrap().await.unwrap();
        let BootstrapOutcome::Registered {
            registration,
            created,
        } = outcome
        else {
            panic!("expected a registration");
        };

        assert!(created);
        assert_eq!(registration.client_id, "client-1");
        assert!(registration.client_secret.is_some());
        assert_eq!(*graph.create_calls.lock().unwrap(), 1);
        assert_eq!(*graph.password_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let graph = Arc::new(MockGraph::default());
        let provider = provider(graph.clone());

        let first = provider.bootstrap().await.unwrap();
        let second = provider.bootstrap().await.unwrap();

        let BootstrapOutcome::Registered { registration: a, created: created_a } = first else {
            panic!("expected a registration");
        };
        let BootstrapOutcome::Registered { registration: b, created: created_b } = second else {
            panic!("expected a registration");
        };

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.client_id, b.client_id);
        // The reuse path never re-reads the secret.
        assert!(b.client_secret.is_none());
        assert_eq!(*graph.create_calls.lock().unwrap(), 1);
        assert_eq!(*graph.password_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_development_redirects() {
        let graph = Arc::new(MockGraph::default());
        let provider = provider(graph.clone());

        provider.bootstrap().await.unwrap();

        let applications = graph.applications.lock().unwrap();
        let uris = &applications[0].web.redirect_uris;
        assert!(uris.contains(&LOCAL_CALLBACK_URI.to_string()));
        assert!(uris.contains(&EDITOR_REDIRECT_URI.to_string()));
        assert!(uris.contains(&"http://127.0.0.1:33418".to_string()));
        assert!(uris.contains(&"http://127.0.0.1:33427".to_string()));
        assert_eq!(uris.len(), 12);
    }

    #[tokio::test]
    async fn test_bootstrap_conflicts_on_foreign_registration() {
        let mut foreign = managed_application(vec![]);
        foreign.notes = Some("someone-else".to_string());
        let graph = Arc::new(MockGraph::with_application(foreign));
        let provider = provider(graph.clone());

        let error = provider.bootstrap().await.unwrap_err();
        assert!(matches!(error, ProvisionError::Conflict(_)));
        assert_eq!(*graph.create_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_surfaces_permission_errors() {
        let graph = Arc::new(MockGraph::default());
        *graph.fail_with.lock().unwrap() =
            Some(|| ProvisionError::Permission("missing Application.ReadWrite.All".to_string()));
        let provider = provider(graph);

        let error = provider.bootstrap().await.unwrap_err();
        assert!(matches!(error, ProvisionError::Permission(_)));
    }

    #[tokio::test]
    async fn test_patch_appends_once_and_preserves_seeds() {
        let graph = Arc::new(MockGraph::with_application(managed_application(
            seed_redirect_uris(),
        )));
        let provider = provider(graph.clone());
        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com").unwrap();

        let first = provider.patch_redirect_uris(&endpoint).await.unwrap();
        assert_eq!(
            first,
            PatchOutcome::Added("https://mcp.example.com/auth/callback".to_string())
        );

        let second = provider.patch_redirect_uris(&endpoint).await.unwrap();
        assert_eq!(second, PatchOutcome::AlreadyPresent);

        let applications = graph.applications.lock().unwrap();
        let uris = &applications[0].web.redirect_uris;
        assert_eq!(
            uris.iter()
                .filter(|u| *u == "https://mcp.example.com/auth/callback")
                .count(),
            1
        );
        for seeded in seed_redirect_uris() {
            assert!(uris.contains(&seeded), "seeded URI {} was removed", seeded);
        }
    }

    #[tokio::test]
    async fn test_patch_without_registration_fails() {
        let graph = Arc::new(MockGraph::default());
        let provider = provider(graph);
        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com").unwrap();

        let error = provider.patch_redirect_uris(&endpoint).await.unwrap_err();
        assert!(matches!(error, ProvisionError::Provisioning(_)));
    }
}
