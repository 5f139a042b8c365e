use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use envpin_schema::compute_manifest_hash;
use std::path::Path;

pub fn run(manifest: &Path, json: bool) -> Result<u8, String> {
    let normalized = load_manifest(manifest)?;
    let identity = compute_manifest_hash(&normalized);
    if json {
        println!("{}", json_pretty(&identity)?);
    } else {
        println!("{}", identity.hash);
    }
    Ok(EXIT_SUCCESS)
}
