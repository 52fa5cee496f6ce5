//! # In-Memory Backend
//!
//! A [`SecretBackend`] held in process memory. Used by tests and local dry
//! runs; honours create-only check-and-set exactly like Vault does.

use super::{SecretBackend, SecretData, StoreError, WriteMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    secrets: Mutex<HashMap<(String, String), SecretData>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a secret directly, bypassing check-and-set
    pub fn insert(&self, mount: &str, path: &str, data: SecretData) {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((mount.to_string(), path.to_string()), data);
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory backend switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn read(&self, mount: &str, path: &str) -> Result<Option<SecretData>, StoreError> {
        self.check_available()?;
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(mount.to_string(), path.to_string()))
            .cloned())
    }

    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let key = (mount.to_string(), path.to_string());
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        if mode == WriteMode::CreateOnly && secrets.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{mount}/{path}")));
        }
        secrets.insert(key, data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, mount: &str, path: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(mount.to_string(), path.to_string()));
        Ok(())
    }
}
