//! No-op provider for deployments without an identity provider.

use crate::config::AuthProviderMode;
use crate::provision::{
    BootstrapKind, BootstrapOutcome, CredentialEnvMapping, DeployedServiceEndpoint, PatchOutcome,
    ProviderStrategy, Result,
};
use async_trait::async_trait;

/// Uniform branch for the orchestrator when no provider is configured.
///
/// Both operations are no-ops and perform no remote calls.
pub struct NoneProvider;

#[async_trait]
impl ProviderStrategy for NoneProvider {
    fn mode(&self) -> AuthProviderMode {
        AuthProviderMode::None
    }

    fn bootstrap_kind(&self) -> BootstrapKind {
        BootstrapKind::Disabled
    }

    fn credential_env_mapping(&self) -> CredentialEnvMapping {
        CredentialEnvMapping::default()
    }

    async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        Ok(BootstrapOutcome::Skipped)
    }

    async fn patch_redirect_uris(
        &self,
        _endpoint: &DeployedServiceEndpoint,
    ) -> Result<PatchOutcome> {
        Ok(PatchOutcome::Skipped)
    }
}
