//! In-memory client registration store.
//!
//! Suitable for local development and tests. Every replica sees only its own
//! records, so production deployments use one of the shared backends.

use crate::errors::StorageError;
use crate::storage::traits::{
    ClientRegistrationStore, DynamicClientRecord, Result, new_client_record,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory implementation of the client registration store
#[derive(Default)]
pub struct MemoryClientRegistrationStore {
    clients: Mutex<HashMap<String, DynamicClientRecord>>,
}

impl MemoryClientRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientRegistrationStore for MemoryClientRegistrationStore {
    async fn create_client(&self, metadata: serde_json::Value) -> Result<DynamicClientRecord> {
        let record = new_client_record(metadata);
        let mut clients = self
            .clients
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))?;
        clients.insert(record.client_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<DynamicClientRecord>> {
        let clients = self
            .clients
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("Lock error: {}", e)))?;
        Ok(clients.get(client_id).cloned())
    }
}
