use super::{colorize_kind, json_pretty, Context, EXIT_SUCCESS};
use envpin_core::ResolveOptions;
use std::path::Path;

pub fn run(ctx: &Context, manifest: &Path, options: ResolveOptions) -> Result<u8, String> {
    let outcome = ctx.resolve(manifest, options)?;

    if ctx.json {
        let payload = serde_json::json!({
            "manifest_hash": outcome.identity.hash,
            "short_hash": outcome.identity.short,
            "cache_hit": outcome.cache_hit,
            "environment": outcome.environment,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("manifest_hash: {}", outcome.identity.hash);
    for artifact in &outcome.environment.artifacts {
        println!(
            "  {:<10} {:<20} {:<16} {}",
            colorize_kind(&artifact.kind.to_string()),
            artifact.name,
            artifact.version,
            artifact.install_path
        );
    }
    for (name, value) in &outcome.environment.variables {
        println!("  {name}={value}");
    }
    Ok(EXIT_SUCCESS)
}
