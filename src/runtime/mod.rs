//! # Runtime Module
//!
//! Runtime components for the connector controller: initialization, the HTTP
//! servers and the serve loop.

pub mod initialization;
pub mod server;

pub use initialization::*;
pub use server::*;
