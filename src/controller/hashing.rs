//! # Source Hash
//!
//! Stable identity of one external side effect, used as the source lock key.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("source hash needs at least one identity component")]
pub struct EmptyIdentity;

/// Hex SHA-256 over the concatenation of `parts`
///
/// # Errors
///
/// Returns [`EmptyIdentity`] when `parts` is empty.
pub fn source_hash<S: AsRef<str>>(parts: &[S]) -> Result<String, EmptyIdentity> {
    if parts.is_empty() {
        return Err(EmptyIdentity);
    }
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("abc")
        assert_eq!(
            source_hash(&["a", "b", "c"]).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_stable_and_order_sensitive() {
        let one = source_hash(&["pg.svc", "5432", "app", "app"]).unwrap();
        let two = source_hash(&["pg.svc", "5432", "app", "app"]).unwrap();
        let swapped = source_hash(&["pg.svc", "5432", "app2", "app"]).unwrap();
        assert_eq!(one, two);
        assert_ne!(one, swapped);
        assert_eq!(one.len(), 64);
    }

    #[test]
    fn test_empty_identity_rejected() {
        let parts: [&str; 0] = [];
        assert_eq!(source_hash(&parts), Err(EmptyIdentity));
    }
}
