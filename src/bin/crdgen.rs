//! Print the instance CRDs as multi-document YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/connectors.yaml
//! ```

use anyhow::Result;
use connector_controller::crd::all_crds;

fn main() -> Result<()> {
    for crd in all_crds() {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
