//! Storage trait definitions for dynamically registered OAuth clients.
//!
//! The resource server consults this store at request time so that clients
//! registered through dynamic client registration stay recognized across
//! restarts and across replicas.

use crate::errors::StorageError;
use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StorageError>;

/// A dynamically self-registered OAuth client.
///
/// Records are immutable once created; client revocation is handled outside
/// this store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicClientRecord {
    /// Generated client identifier
    pub client_id: String,
    /// Registration metadata submitted by the client (RFC 7591 document)
    pub client_metadata: serde_json::Value,
    /// Token authorizing the client to read its own registration
    pub registration_access_token: String,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Trait for persisting dynamic client registrations.
///
/// `create` calls for distinct clients must not conflict with each other,
/// and a `get` on the replica that issued a successful `create` observes the
/// record immediately. Cross-replica visibility is whatever the backing
/// store replicates; this trait adds no caching of its own.
#[async_trait]
pub trait ClientRegistrationStore: Send + Sync {
    /// Persist a new client registration built from the submitted metadata.
    ///
    /// Generates the client identifier and registration access token. Fails
    /// only when the backing store is unavailable.
    async fn create_client(&self, metadata: serde_json::Value) -> Result<DynamicClientRecord>;

    /// Look up a registration by client ID. Idempotent.
    async fn get_client(&self, client_id: &str) -> Result<Option<DynamicClientRecord>>;
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an opaque registration access token
pub fn generate_registration_token() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Build a record for freshly submitted metadata.
pub fn new_client_record(metadata: serde_json::Value) -> DynamicClientRecord {
    DynamicClientRecord {
        client_id: generate_client_id(),
        client_metadata: metadata,
        registration_access_token: generate_registration_token(),
        created_at: Utc::now(),
    }
}
