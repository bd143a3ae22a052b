//! Two-phase provisioning orchestration around a provider strategy.
//!
//! The pre-provision and post-provision entry points are invoked by the
//! surrounding deployment pipeline as separate steps: the patch phase only
//! runs once the compute resource has a stable address, so ordering is
//! guaranteed structurally rather than by timers or polling. Both entry
//! points are safe to re-run; recovery after an interrupted run relies
//! entirely on the providers' idempotent lookup, not on rollback.

use crate::provision::outputs::OutputSink;
use crate::provision::{
    BootstrapKind, BootstrapOutcome, DeployedServiceEndpoint, PatchOutcome, ProviderStrategy,
    Result,
};
use std::sync::Arc;

/// Provisioning progress for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionPhase {
    #[default]
    NotStarted,
    /// Provider mode is `none`; both phases exit cleanly without remote
    /// calls.
    Skipped,
    Bootstrapping,
    BootstrapComplete,
    PatchPending,
    PatchComplete,
}

/// Drives a provider strategy through the two-phase protocol.
pub struct ProvisionOrchestrator {
    provider: Arc<dyn ProviderStrategy>,
}

impl ProvisionOrchestrator {
    pub fn new(provider: Arc<dyn ProviderStrategy>) -> Self {
        Self { provider }
    }

    /// Pre-provision entry point: establish the identity client before the
    /// service's own infrastructure exists.
    ///
    /// Produced credentials flow through `sink`; the client secret is
    /// written only on the run that created it.
    pub async fn preprovision(&self, sink: &mut dyn OutputSink) -> Result<ProvisionPhase> {
        if self.provider.bootstrap_kind() == BootstrapKind::Disabled {
            tracing::info!(
                mode = self.provider.mode().as_str(),
                "auth provisioning disabled, skipping"
            );
            return Ok(ProvisionPhase::Skipped);
        }

        tracing::info!(
            mode = self.provider.mode().as_str(),
            phase = ?ProvisionPhase::Bootstrapping,
            "starting identity client bootstrap"
        );

        match self.provider.bootstrap().await? {
            BootstrapOutcome::Skipped => Ok(ProvisionPhase::Skipped),
            BootstrapOutcome::Declarative { import_path } => {
                tracing::info!(
                    path = %import_path.display(),
                    "declarative provider configuration produced"
                );
                Ok(ProvisionPhase::BootstrapComplete)
            }
            BootstrapOutcome::Registered {
                registration,
                created,
            } => {
                let mapping = self.provider.credential_env_mapping();
                if let Some(key) = mapping.client_id {
                    sink.set(key, &registration.client_id)?;
                }
                if created {
                    if let (Some(key), Some(secret)) =
                        (mapping.client_secret, &registration.client_secret)
                    {
                        sink.set(key, secret.expose())?;
                    }
                }
                tracing::info!(
                    client_id = %registration.client_id,
                    created,
                    "identity client bootstrap complete"
                );
                Ok(ProvisionPhase::BootstrapComplete)
            }
        }
    }

    /// Post-provision entry point: register the now-known deployed endpoint.
    ///
    /// The pipeline invokes this strictly after infrastructure creation; it
    /// verifies and re-exits cleanly when the callback is already present.
    pub async fn postprovision(
        &self,
        endpoint: &DeployedServiceEndpoint,
    ) -> Result<ProvisionPhase> {
        if self.provider.bootstrap_kind() == BootstrapKind::Disabled {
            tracing::info!(
                mode = self.provider.mode().as_str(),
                "auth provisioning disabled, skipping"
            );
            return Ok(ProvisionPhase::Skipped);
        }

        tracing::info!(
            mode = self.provider.mode().as_str(),
            phase = ?ProvisionPhase::PatchPending,
            endpoint = %endpoint.base_url(),
            "patching redirect URIs for deployed endpoint"
        );

        match self.provider.patch_redirect_uris(endpoint).await? {
            PatchOutcome::Skipped => {
                tracing::info!("provider does not patch redirect URIs at runtime");
            }
            PatchOutcome::AlreadyPresent => {
                tracing::info!("deployed callback already registered, verified");
            }
            PatchOutcome::Added(uri) => {
                tracing::info!(%uri, "deployed callback registered");
            }
        }
        Ok(ProvisionPhase::PatchComplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::entra::tests::MockGraph;
    use crate::provision::entra::{
        ENTRA_CLIENT_ID_ENV, ENTRA_CLIENT_SECRET_ENV, EntraProxyProvider,
    };
    use crate::provision::outputs::MemoryOutputSink;
    use crate::provision::NoneProvider;

    fn entra_orchestrator(graph: Arc<MockGraph>) -> ProvisionOrchestrator {
        ProvisionOrchestrator::new(Arc::new(EntraProxyProvider::new(
            graph,
            "tenant-1".to_string(),
            "MCP Server App".to_string(),
        )))
    }

    #[tokio::test]
    async fn test_none_mode_skips_without_output() {
        let orchestrator = ProvisionOrchestrator::new(Arc::new(NoneProvider));
        let mut sink = MemoryOutputSink::new();

        let phase = orchestrator.preprovision(&mut sink).await.unwrap();
        assert_eq!(phase, ProvisionPhase::Skipped);
        assert!(sink.values().is_empty());

        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com").unwrap();
        let phase = orchestrator.postprovision(&endpoint).await.unwrap();
        assert_eq!(phase, ProvisionPhase::Skipped);
    }

    #[tokio::test]
    async fn test_preprovision_writes_secret_exactly_once() {
        let graph = Arc::new(MockGraph::default());
        let orchestrator = entra_orchestrator(graph.clone());
        let mut sink = MemoryOutputSink::new();

        let phase = orchestrator.preprovision(&mut sink).await.unwrap();
        assert_eq!(phase, ProvisionPhase::BootstrapComplete);
        assert_eq!(sink.get(ENTRA_CLIENT_ID_ENV), Some("client-1"));
        assert_eq!(sink.get(ENTRA_CLIENT_SECRET_ENV), Some("generated-secret"));
        assert_eq!(sink.write_count(ENTRA_CLIENT_SECRET_ENV), 1);

        // A rerun verifies the registration and re-exports the client ID,
        // but never touches the secret again.
        let phase = orchestrator.preprovision(&mut sink).await.unwrap();
        assert_eq!(phase, ProvisionPhase::BootstrapComplete);
        assert_eq!(sink.write_count(ENTRA_CLIENT_SECRET_ENV), 1);
        assert_eq!(*graph.create_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_postprovision_completes_after_bootstrap() {
        let graph = Arc::new(MockGraph::default());
        let orchestrator = entra_orchestrator(graph.clone());
        let mut sink = MemoryOutputSink::new();
        orchestrator.preprovision(&mut sink).await.unwrap();

        let endpoint = DeployedServiceEndpoint::new("https://mcp.example.com").unwrap();
        let phase = orchestrator.postprovision(&endpoint).await.unwrap();
        assert_eq!(phase, ProvisionPhase::PatchComplete);

        // Re-running the patch phase is a verification no-op.
        let phase = orchestrator.postprovision(&endpoint).await.unwrap();
        assert_eq!(phase, ProvisionPhase::PatchComplete);
    }
}
