//! Standardized error types following the `error-idprov-<domain>-<number>` format.

use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-idprov-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when HTTP_PORT cannot be parsed
    #[error("error-idprov-config-2 Parsing HTTP_PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-idprov-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when a duration string cannot be parsed
    #[error("error-idprov-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when a URL cannot be parsed
    #[error("error-idprov-config-5 Failed to parse URL '{0}': {1}")]
    UrlParsingFailed(String, String),
}

/// Identity-provider provisioning errors.
///
/// Failures surface to the deployment pipeline unchanged; nothing here is
/// retried internally. A `none`-mode skip is not an error and never reaches
/// this type.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Remote identity-provider call failed
    #[error("error-idprov-provision-1 Provisioning call failed: {0}")]
    Provisioning(String),

    /// A registration with the same name exists under different ownership
    #[error("error-idprov-provision-2 Registration conflict: {0}")]
    Conflict(String),

    /// The caller lacks rights to manage registrations in the tenant
    #[error("error-idprov-provision-3 Insufficient permissions: {0}")]
    Permission(String),

    /// Remote identity-provider call timed out; retry policy belongs to the
    /// outer pipeline
    #[error("error-idprov-provision-4 Remote call timed out: {0}")]
    Timeout(String),

    /// Writing produced credentials or realm documents failed
    #[error("error-idprov-provision-5 Output write failed: {0}")]
    Output(String),

    /// Remote response could not be interpreted
    #[error("error-idprov-provision-6 Unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProvisionError {
    /// Process exit code for the provisioning hook binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Permission(_) => 3,
            Self::Conflict(_) | Self::Provisioning(_) | Self::InvalidResponse(_) => 2,
            Self::Timeout(_) | Self::Output(_) => 1,
        }
    }
}

/// Client registration store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store cannot be reached or refused the operation
    #[error("error-idprov-storage-1 Store unavailable: {0}")]
    Unavailable(String),

    /// Record serialization failed
    #[error("error-idprov-storage-2 Serialization failed: {0}")]
    Serialization(String),

    /// Stored data is malformed
    #[error("error-idprov-storage-3 Invalid data: {0}")]
    InvalidData(String),
}

/// Route table construction errors
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Two rules share the same path prefix
    #[error("error-idprov-routing-1 Ambiguous route table: duplicate prefix '{0}'")]
    DuplicatePrefix(String),

    /// A rule prefix is not an absolute path
    #[error("error-idprov-routing-2 Route prefix must start with '/': '{0}'")]
    InvalidPrefix(String),
}

