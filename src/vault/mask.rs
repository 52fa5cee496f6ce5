//! # Log Masking
//!
//! Hides sensitive fields of secret payloads before they reach log output.
//! Masking never touches the stored or returned values.

use super::SecretData;
use crate::constants::MASK;
use std::collections::BTreeMap;
use std::fmt;

/// Field-name fragments (lowercase) that mark a value as sensitive
///
/// `url` and `dsn` cover connection strings, which embed credentials.
const SENSITIVE_FRAGMENTS: [&str; 5] = ["pass", "token", "secret", "dsn", "url"];

/// Whether a field with this name must be masked in logs
pub fn is_sensitive(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// A copy of `data` with every sensitive value replaced by the mask string
pub fn masked(data: &SecretData) -> BTreeMap<String, String> {
    data.iter()
        .map(|(k, v)| {
            let shown = if is_sensitive(k) {
                MASK.to_string()
            } else {
                match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            };
            (k.clone(), shown)
        })
        .collect()
}

/// `Debug`/`Display` adapter for logging a payload with sensitive fields masked
///
/// ```ignore
/// info!(secret = %Masked(&data), "Writing secret");
/// ```
#[derive(Clone, Copy)]
pub struct Masked<'a>(pub &'a SecretData);

impl fmt::Display for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(masked(self.0)).finish()
    }
}

impl fmt::Debug for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
