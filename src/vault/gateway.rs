//! # Secret Gateway
//!
//! Address-aware access to a [`SecretBackend`]: tolerant reads, scalar
//! reads, check-and-set creation and unvaulting of instance configuration.

use super::mask::Masked;
use super::unvault::Unvault;
use super::{CandidateAddress, SecretAddress, SecretBackend, SecretData, StoreError, WriteMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`SecretGateway::create_or_update`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The payload was written
    Written,
    /// A create-only write found an existing secret; this is its payload
    AlreadyExists(SecretData),
}

#[derive(Debug, Clone)]
pub struct SecretGateway {
    backend: Arc<dyn SecretBackend>,
}

impl SecretGateway {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    /// Read the secret behind `address`
    ///
    /// A string that does not parse as an address reads as "not found". Any
    /// key component is ignored; the whole payload is returned.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn read(&self, address: &str) -> Result<Option<SecretData>, StoreError> {
        let Ok(parsed) = SecretAddress::parse(address) else {
            debug!(address, "Not a secret address, treating as not found");
            return Ok(None);
        };
        self.read_at(&parsed).await
    }

    /// Read the secret at an already parsed address
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn read_at(&self, address: &SecretAddress) -> Result<Option<SecretData>, StoreError> {
        self.backend.read(address.mount(), address.path()).await
    }

    /// Read a single value; `address` must carry a key
    ///
    /// Returns `None` when the address is invalid, has no key, the secret is
    /// absent or the key is missing from it. Non-string values are rendered
    /// with their JSON representation.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn read_scalar(&self, address: &str) -> Result<Option<String>, StoreError> {
        let Ok(parsed) = SecretAddress::parse(address) else {
            return Ok(None);
        };
        let Some(key) = parsed.key() else {
            return Ok(None);
        };
        let data = self.read_at(&parsed).await?;
        Ok(data.and_then(|d| d.get(key).map(render_scalar)))
    }

    /// Write `data` at `address` (any key component is ignored)
    ///
    /// With `allow_update == false` the write is a check-and-set against "no
    /// version yet". Losing that race is not an error: the current payload is
    /// read back and returned as [`WriteOutcome::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Propagates backend failures, including a lost race whose winner can no
    /// longer be read.
    pub async fn create_or_update(
        &self,
        address: &SecretAddress,
        data: &SecretData,
        allow_update: bool,
    ) -> Result<WriteOutcome, StoreError> {
        let mode = if allow_update {
            WriteMode::Upsert
        } else {
            WriteMode::CreateOnly
        };
        info!(
            address = %address.without_key(),
            secret = %Masked(data),
            ?mode,
            "Writing secret"
        );
        match self
            .backend
            .write(address.mount(), address.path(), data, mode)
            .await
        {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(StoreError::AlreadyExists(path)) => {
                warn!(
                    address = %address.without_key(),
                    "Secret already exists, using current version"
                );
                match self.read_at(address).await? {
                    Some(existing) => Ok(WriteOutcome::AlreadyExists(existing)),
                    None => Err(StoreError::AlreadyExists(path)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Create the secret if absent and return whatever is stored afterwards
    ///
    /// # Errors
    ///
    /// See [`SecretGateway::create_or_update`].
    pub async fn create_if_absent(
        &self,
        address: &SecretAddress,
        data: SecretData,
    ) -> Result<SecretData, StoreError> {
        match self.create_or_update(address, &data, false).await? {
            WriteOutcome::Written => Ok(data),
            WriteOutcome::AlreadyExists(existing) => Ok(existing),
        }
    }

    /// Delete the secret at `address`
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn delete(&self, address: &SecretAddress) -> Result<(), StoreError> {
        info!(address = %address.without_key(), "Deleting secret");
        self.backend.delete(address.mount(), address.path()).await
    }

    /// Replace every secret-bearing field of `target` that holds a fully
    /// qualified address with the value it points to
    ///
    /// Fields whose address does not resolve are left unchanged.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn unvault<T: Unvault + Send + ?Sized>(
        &self,
        target: &mut T,
    ) -> Result<(), StoreError> {
        for (name, field) in target.secret_fields() {
            let candidate = CandidateAddress::try_parse(field);
            if !candidate.is_fully_qualified() {
                continue;
            }
            match self.read_scalar(candidate.raw()).await? {
                Some(value) => {
                    debug!(field = name, "Resolved secret reference");
                    *field = value;
                }
                None => {
                    warn!(
                        field = name,
                        address = candidate.raw(),
                        "Secret reference did not resolve"
                    );
                }
            }
        }
        Ok(())
    }
}

fn render_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
