//! Provisioning and registration integration tests
//!
//! These tests verify the two-phase provisioning protocol end to end against
//! a scripted directory, the dynamic client registration surface over HTTP,
//! and the behavior of the shared registration store under concurrent use.

use axum_test::TestServer;
use idprov::config::{AuthProviderMode, Config, Secret};
use idprov::errors::{ProvisionError, StorageError};
use idprov::http::{AppState, build_router, default_resource_router};
use idprov::provision::graph::{
    Application, ApplicationPatch, GraphApi, NewApplication, WebApplication,
};
use idprov::provision::keycloak::{AdminCredential, KeycloakProvider, RealmConfig};
use idprov::provision::{
    DeployedServiceEndpoint, MemoryOutputSink, NoneProvider, ProvisionOrchestrator, ProvisionPhase,
    entra::{ENTRA_CLIENT_ID_ENV, ENTRA_CLIENT_SECRET_ENV, EntraProxyProvider},
};
use idprov::storage::{ClientRegistrationStore, MemoryClientRegistrationStore};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Scripted application directory standing in for the remote management API.
#[derive(Default)]
struct ScriptedDirectory {
    applications: Mutex<Vec<Application>>,
    create_calls: Mutex<u32>,
    password_calls: Mutex<u32>,
}

#[async_trait]
impl GraphApi for ScriptedDirectory {
    async fn list_applications_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<Application>, ProvisionError> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .iter()
            .filter(|app| app.display_name == display_name)
            .cloned()
            .collect())
    }

    async fn create_application(
        &self,
        request: &NewApplication,
    ) -> Result<Application, ProvisionError> {
        *self.create_calls.lock().unwrap() += 1;
        let application = Application {
            id: format!("object-{}", self.applications.lock().unwrap().len() + 1),
            app_id: "11111111-2222-3333-4444-555555555555".to_string(),
            display_name: request.display_name.clone(),
            notes: Some(request.notes.clone()),
            web: request.web.clone(),
            created_date_time: None,
        };
        self.applications.lock().unwrap().push(application.clone());
        Ok(application)
    }

    async fn create_service_principal(&self, _app_id: &str) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn update_application(
        &self,
        object_id: &str,
        patch: &ApplicationPatch,
    ) -> Result<(), ProvisionError> {
        if let Some(web) = &patch.web {
            let mut applications = self.applications.lock().unwrap();
            if let Some(app) = applications.iter_mut().find(|app| app.id == object_id) {
                app.web = WebApplication {
                    redirect_uris: web.redirect_uris.clone(),
                };
            }
        }
        Ok(())
    }

    async fn add_password(
        &self,
        _object_id: &str,
        _display_name: &str,
    ) -> Result<Secret, ProvisionError> {
        *self.password_calls.lock().unwrap() += 1;
        Ok(Secret::new("scripted-secret"))
    }
}

fn entra_orchestrator(directory: Arc<ScriptedDirectory>) -> ProvisionOrchestrator {
    ProvisionOrchestrator::new(Arc::new(EntraProxyProvider::new(
        directory,
        "tenant-1".to_string(),
        "MCP Server App".to_string(),
    )))
}

fn test_config(mode: AuthProviderMode) -> Config {
    Config {
        version: "test".to_string(),
        auth_provider_mode: mode,
        http_port: "8080".to_string().try_into().unwrap(),
        external_base: "http://localhost:8000".to_string(),
        user_agent: "test-user-agent".to_string(),
        http_client_timeout: "10s".to_string().try_into().unwrap(),
        storage_backend: "memory".to_string(),
        database_url: None,
        tenant_id: None,
        graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
        graph_access_token: None,
        entra_app_display_name: "MCP Server App".to_string(),
        deployed_server_base_url: None,
        provision_env_file: "provision.env".to_string(),
        keycloak_realm_name: "mcp".to_string(),
        keycloak_realm_url: Some("https://auth.example.com/realms/mcp".to_string()),
        keycloak_admin_username: "admin".to_string(),
        keycloak_admin_password: None,
        keycloak_realm_import_path: "realm-import.json".to_string(),
    }
}

fn test_server(store: Arc<dyn ClientRegistrationStore>) -> TestServer {
    let state = AppState {
        config: Arc::new(test_config(AuthProviderMode::Keycloak)),
        client_registration_store: store,
    };
    TestServer::new(build_router(state, default_resource_router())).unwrap()
}

#[tokio::test]
async fn test_two_phase_provisioning_flow() {
    let directory = Arc::new(ScriptedDirectory::default());
    let orchestrator = entra_orchestrator(directory.clone());
    let mut sink = MemoryOutputSink::new();

    // Phase 1: bootstrap before the service endpoint exists.
    let phase = orchestrator.preprovision(&mut sink).await.unwrap();
    assert_eq!(phase, ProvisionPhase::BootstrapComplete);

    let client_id = sink.get(ENTRA_CLIENT_ID_ENV).unwrap().to_string();
    assert!(!client_id.is_empty());
    assert_eq!(sink.get(ENTRA_CLIENT_SECRET_ENV), Some("scripted-secret"));
    assert_eq!(*directory.create_calls.lock().unwrap(), 1);

    // Deployment retry: the same client comes back, nothing is recreated,
    // and the secret is not written a second time.
    let phase = orchestrator.preprovision(&mut sink).await.unwrap();
    assert_eq!(phase, ProvisionPhase::BootstrapComplete);
    assert_eq!(sink.get(ENTRA_CLIENT_ID_ENV).unwrap(), client_id);
    assert_eq!(sink.write_count(ENTRA_CLIENT_SECRET_ENV), 1);
    assert_eq!(*directory.create_calls.lock().unwrap(), 1);
    assert_eq!(*directory.password_calls.lock().unwrap(), 1);

    // Phase 2: the endpoint now exists; its callback gets registered once.
    let endpoint = DeployedServiceEndpoint::new("https://mcp-server.example.net").unwrap();
    let phase = orchestrator.postprovision(&endpoint).await.unwrap();
    assert_eq!(phase, ProvisionPhase::PatchComplete);

    let uris_after_first = directory.applications.lock().unwrap()[0]
        .web
        .redirect_uris
        .clone();
    assert!(
        uris_after_first.contains(&"https://mcp-server.example.net/auth/callback".to_string())
    );

    // Patch is idempotent and removes nothing.
    let phase = orchestrator.postprovision(&endpoint).await.unwrap();
    assert_eq!(phase, ProvisionPhase::PatchComplete);
    let uris_after_second = directory.applications.lock().unwrap()[0]
        .web
        .redirect_uris
        .clone();
    assert_eq!(uris_after_first, uris_after_second);
    assert!(uris_after_second.contains(&"http://localhost:8000/auth/callback".to_string()));
    assert!(uris_after_second.contains(&"https://vscode.dev/redirect".to_string()));
}

#[tokio::test]
async fn test_none_mode_skips_both_phases() {
    let orchestrator = ProvisionOrchestrator::new(Arc::new(NoneProvider));
    let mut sink = MemoryOutputSink::new();

    let phase = orchestrator.preprovision(&mut sink).await.unwrap();
    assert_eq!(phase, ProvisionPhase::Skipped);
    assert!(sink.values().is_empty());

    let endpoint = DeployedServiceEndpoint::new("https://mcp-server.example.net").unwrap();
    let phase = orchestrator.postprovision(&endpoint).await.unwrap();
    assert_eq!(phase, ProvisionPhase::Skipped);
}

#[tokio::test]
async fn test_declarative_provider_writes_realm_import() {
    let dir = tempfile::tempdir().unwrap();
    let import_path = dir.path().join("realm-import.json");
    let realm = RealmConfig::standard(
        "mcp".to_string(),
        AdminCredential {
            username: "admin".to_string(),
            password: Secret::new("admin-password"),
        },
    );
    let orchestrator = ProvisionOrchestrator::new(Arc::new(KeycloakProvider::new(
        realm,
        import_path.clone(),
    )));
    let mut sink = MemoryOutputSink::new();

    let phase = orchestrator.preprovision(&mut sink).await.unwrap();
    assert_eq!(phase, ProvisionPhase::BootstrapComplete);

    // The declarative provider exports no credentials; the import document
    // is the whole output, and it never contains the admin password.
    assert!(sink.values().is_empty());
    let rendered = std::fs::read_to_string(&import_path).unwrap();
    assert!(rendered.contains("\"realm\": \"mcp\""));
    assert!(!rendered.contains("admin-password"));

    // Patch phase completes without doing anything.
    let endpoint = DeployedServiceEndpoint::new("https://mcp-server.example.net").unwrap();
    let phase = orchestrator.postprovision(&endpoint).await.unwrap();
    assert_eq!(phase, ProvisionPhase::PatchComplete);
}

#[tokio::test]
async fn test_dynamic_registration_over_http() {
    let server = test_server(Arc::new(MemoryClientRegistrationStore::new()));

    let response = server
        .post("/auth/register")
        .json(&json!({
            "client_name": "Test Application",
            "redirect_uris": ["https://app.example.com/callback"],
        }))
        .await;
    response.assert_status(http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    let client_id = body["client_id"].as_str().unwrap().to_string();
    assert!(!client_id.is_empty());
    assert_ne!(body["registration_access_token"], "redacted");
    assert_eq!(body["client_name"], "Test Application");

    // Registered clients stay recognized; the token is disclosed only once.
    let response = server.get(&format!("/auth/clients/{}", client_id)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["client_id"], client_id.as_str());
    assert_eq!(body["registration_access_token"], "redacted");

    let response = server.get("/auth/clients/unknown-client").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_register_rejects_malformed_metadata() {
    let server = test_server(Arc::new(MemoryClientRegistrationStore::new()));

    let response = server
        .post("/auth/register")
        .json(&json!({ "redirect_uris": ["not a uri"] }))
        .await;
    response.assert_status_bad_request();

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_redirect_uri");
}

/// Store that refuses every operation, standing in for an unreachable
/// backend.
struct UnavailableStore;

#[async_trait]
impl ClientRegistrationStore for UnavailableStore {
    async fn create_client(
        &self,
        _metadata: serde_json::Value,
    ) -> Result<idprov::storage::DynamicClientRecord, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn get_client(
        &self,
        _client_id: &str,
    ) -> Result<Option<idprov::storage::DynamicClientRecord>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_outage_fails_closed() {
    let server = test_server(Arc::new(UnavailableStore));

    let response = server
        .post("/auth/register")
        .json(&json!({ "client_name": "Test" }))
        .await;
    response.assert_status(http::StatusCode::SERVICE_UNAVAILABLE);

    let response = server.get("/auth/clients/some-client").await;
    response.assert_status(http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_surfaces_are_multiplexed_by_prefix() {
    let server = test_server(Arc::new(MemoryClientRegistrationStore::new()));

    // Resource-server surface answers the health probe.
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    // Identity-provider surface serves the discovery document.
    let response = server.get("/.well-known/oauth-protected-resource").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["authorization_servers"][0],
        "https://auth.example.com/realms/mcp"
    );
    assert_eq!(body["resource"], "http://localhost:8000");
}

#[tokio::test]
async fn test_concurrent_registrations_do_not_conflict() {
    let store = Arc::new(MemoryClientRegistrationStore::new());

    let registrations = futures::future::join_all((0..8).map(|i| {
        let store = store.clone();
        async move {
            store
                .create_client(json!({ "client_name": format!("Client {}", i) }))
                .await
        }
    }))
    .await;

    let mut client_ids = Vec::new();
    for (i, registration) in registrations.into_iter().enumerate() {
        let record = registration.unwrap();
        assert!(!client_ids.contains(&record.client_id));

        // Read-your-write: each record is visible immediately after create.
        let fetched = store.get_client(&record.client_id).await.unwrap().unwrap();
        assert_eq!(
            fetched.client_metadata["client_name"],
            format!("Client {}", i)
        );
        client_ids.push(record.client_id);
    }
}
