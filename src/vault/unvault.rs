//! # Unvaulting
//!
//! Instance configuration may hold secret addresses in place of literal
//! values. Each configuration type lists the string fields that may carry
//! such references; [`SecretGateway::unvault`](super::SecretGateway::unvault)
//! walks that list and substitutes the resolved values.

/// Types with string fields that may hold `vault:...#KEY` references
pub trait Unvault {
    /// Every string field that may hold a secret reference, with its name
    fn secret_fields(&mut self) -> Vec<(&'static str, &mut String)>;
}
