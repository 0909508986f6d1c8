//! In-memory object store with operation tracing.

use super::{ObjectMetadata, ObjectStore, PutOutcome, validate_key};
use crate::signing::UrlSigner;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Record of a store operation for test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists { key: String },
    Head { key: String },
    Put { key: String, created: bool },
    Get { key: String },
    SignedUrl { key: String },
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: Arc::default(),
            operations: Arc::default(),
            fail_prefixes: Arc::default(),
            signer,
        }
    }

    /// Recorded operations, oldest first
    pub fn operations(&self) -> Vec<StoreOp> {
        lock(&self.operations).clone()
    }

    pub fn clear_operations(&self) {
        lock(&self.operations).clear();
    }

    /// Make every operation on keys with this prefix fail
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        lock(&self.fail_prefixes).push(prefix.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.fail_prefixes).clear();
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn metadata(&self, key: &str) -> Option<ObjectMetadata> {
        lock(&self.objects).get(key).map(|o| o.metadata.clone())
    }

    fn record(&self, op: StoreOp) {
        lock(&self.operations).push(op);
    }

    fn check(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        if lock(&self.fail_prefixes).iter().any(|p| key.starts_with(p)) {
            return Err(CompileError::Storage(format!(
                "injected failure for key: {key}"
            )));
        }
        Ok(())
    }
}

// A poisoned map is still structurally valid; keep serving it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.check(key)?;
        self.record(StoreOp::Exists {
            key: key.to_string(),
        });
        Ok(lock(&self.objects).contains_key(key))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        self.check(key)?;
        self.record(StoreOp::Head {
            key: key.to_string(),
        });
        Ok(lock(&self.objects).get(key).map(|o| o.metadata.clone()))
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<PutOutcome> {
        self.check(key)?;
        let outcome = {
            let mut objects = lock(&self.objects);
            if objects.contains_key(key) {
                PutOutcome::AlreadyExists
            } else {
                objects.insert(
                    key.to_string(),
                    StoredObject {
                        data,
                        metadata,
                    },
                );
                PutOutcome::Created
            }
        };
        self.record(StoreOp::Put {
            key: key.to_string(),
            created: outcome == PutOutcome::Created,
        });
        Ok(outcome)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.check(key)?;
        self.record(StoreOp::Get {
            key: key.to_string(),
        });
        lock(&self.objects)
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| CompileError::NotFound(key.to_string()))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.check(key)?;
        self.record(StoreOp::SignedUrl {
            key: key.to_string(),
        });
        self.signer.signed_url(key, ttl)
    }
}
