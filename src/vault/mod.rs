//! # Secret Store
//!
//! Addressing, access and log masking for secrets kept in a versioned KV store.
//!
//! ## Sub-modules
//!
//! - `address` - `vault:{mount}/data/{path}[#KEY]` parsing
//! - `gateway` - read/create/delete plus unvaulting on top of a backend
//! - `client` - HashiCorp Vault KV v2 backend (vaultrs)
//! - `memory` - in-process backend with the same check-and-set semantics
//! - `mask` - log-safe rendering of payloads
//! - `unvault` - typed tables of secret-bearing fields

pub mod address;
pub mod client;
pub mod gateway;
pub mod mask;
pub mod memory;
pub mod unvault;

pub use address::{AddressError, CandidateAddress, SecretAddress};
pub use client::VaultBackend;
pub use gateway::{SecretGateway, WriteOutcome};
pub use mask::Masked;
pub use memory::InMemoryBackend;
pub use unvault::Unvault;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Payload of one secret version
pub type SecretData = BTreeMap<String, serde_json::Value>;

/// How a write treats an existing secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Only succeed if no version exists yet (check-and-set against version 0)
    CreateOnly,
    /// Write a new version regardless of what exists
    Upsert,
}

/// Failures from the secret store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A create-only write lost the check-and-set race
    #[error("secret `{0}` already exists")]
    AlreadyExists(String),
    /// The store could not be reached or failed internally
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    /// The store answered but refused the request (auth, policy, bad request)
    #[error("secret store rejected request for `{path}`: {message}")]
    Rejected { path: String, message: String },
}

/// Raw storage operations against a KV v2 style store
///
/// Implementations address secrets by mount and path only; key selection and
/// address parsing live in [`SecretGateway`].
#[async_trait]
pub trait SecretBackend: Send + Sync + std::fmt::Debug {
    /// Latest version of the secret, `None` when absent
    async fn read(&self, mount: &str, path: &str) -> Result<Option<SecretData>, StoreError>;

    /// Write a new version
    ///
    /// With [`WriteMode::CreateOnly`], a secret that already exists yields
    /// [`StoreError::AlreadyExists`] and nothing is written.
    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StoreError>;

    /// Remove the secret and all its versions
    async fn delete(&self, mount: &str, path: &str) -> Result<(), StoreError>;
}
