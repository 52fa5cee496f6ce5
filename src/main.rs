//! # Connector Controller
//!
//! Admission webhook server. See the library documentation for an overview.

use anyhow::Result;
use connector_controller::runtime::{initialize, run_until_shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    run_until_shutdown(init_result).await
}
