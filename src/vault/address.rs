//! # Secret Addresses
//!
//! Parsing and formatting of `vault:{mount}/data/{path}[#KEY]` references.
//!
//! `SecretAddress::parse` is strict and returns an [`AddressError`] for any
//! malformed input. `CandidateAddress::try_parse` never fails; it is used when
//! scanning strings that may or may not be secret references.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed scheme prefix of every secret address
pub const SCHEME: &str = "vault:";

/// Separator between the KV v2 mount and the secret path
pub const DATA_SEPARATOR: &str = "/data/";

/// Separator between the secret path and a single key inside it
pub const KEY_SEPARATOR: char = '#';

/// Reasons a string is not a valid secret address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("`{0}` does not start with `vault:`")]
    MissingScheme(String),
    #[error("`{0}` does not contain `/data/`")]
    MissingDataSeparator(String),
    #[error("`{0}` has an empty mount")]
    EmptyMount(String),
    #[error("`{0}` has an empty path")]
    EmptyPath(String),
    #[error("`{0}` has an empty key after `#`")]
    EmptyKey(String),
    #[error("`{0}` contains more than one `#`")]
    AmbiguousKey(String),
}

/// A parsed secret address
///
/// Immutable once constructed; the only constructor is [`SecretAddress::parse`]
/// (plus [`SecretAddress::without_key`] / [`SecretAddress::with_key`] which
/// derive from an already valid address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretAddress {
    mount: String,
    path: String,
    key: Option<String>,
}

impl SecretAddress {
    /// Parse a secret address
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] when the scheme is missing, the data
    /// separator is missing, the mount/path/key are empty, or the key
    /// separator appears more than once.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let rest = raw
            .strip_prefix(SCHEME)
            .ok_or_else(|| AddressError::MissingScheme(raw.to_string()))?;

        let (mount, remainder) = rest
            .split_once(DATA_SEPARATOR)
            .ok_or_else(|| AddressError::MissingDataSeparator(raw.to_string()))?;

        if mount.is_empty() {
            return Err(AddressError::EmptyMount(raw.to_string()));
        }
        if remainder.is_empty() {
            return Err(AddressError::EmptyPath(raw.to_string()));
        }

        let (path, key) = match remainder.matches(KEY_SEPARATOR).count() {
            0 => (remainder, None),
            1 => {
                let (path, key) = remainder
                    .rsplit_once(KEY_SEPARATOR)
                    .ok_or_else(|| AddressError::AmbiguousKey(raw.to_string()))?;
                if key.is_empty() {
                    return Err(AddressError::EmptyKey(raw.to_string()));
                }
                (path, Some(key.to_string()))
            }
            _ => return Err(AddressError::AmbiguousKey(raw.to_string())),
        };

        if path.is_empty() {
            return Err(AddressError::EmptyPath(raw.to_string()));
        }

        Ok(Self {
            mount: mount.to_string(),
            path: path.to_string(),
            key,
        })
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The same secret without the key component
    #[must_use]
    pub fn without_key(&self) -> Self {
        Self {
            mount: self.mount.clone(),
            path: self.path.clone(),
            key: None,
        }
    }

    /// The same secret narrowed to `key`
    ///
    /// Returns `None` if `key` is empty or contains the key separator, since
    /// the result would not parse back.
    pub fn with_key(&self, key: &str) -> Option<Self> {
        if key.is_empty() || key.contains(KEY_SEPARATOR) {
            return None;
        }
        Some(Self {
            mount: self.mount.clone(),
            path: self.path.clone(),
            key: Some(key.to_string()),
        })
    }
}

impl fmt::Display for SecretAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}{DATA_SEPARATOR}{}", self.mount, self.path)?;
        if let Some(key) = &self.key {
            write!(f, "{KEY_SEPARATOR}{key}")?;
        }
        Ok(())
    }
}

impl FromStr for SecretAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A string that might be a secret address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAddress {
    raw: String,
    parsed: Option<SecretAddress>,
}

impl CandidateAddress {
    /// Inspect `raw` without failing
    pub fn try_parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            parsed: SecretAddress::parse(raw).ok(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> Option<&SecretAddress> {
        self.parsed.as_ref()
    }

    /// True when the string parses and names a single key, i.e. it resolves
    /// to one scalar value
    pub fn is_fully_qualified(&self) -> bool {
        self.parsed.as_ref().is_some_and(|a| a.key.is_some())
    }
}
