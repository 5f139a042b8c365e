use super::{colorize_kind, json_pretty, resolve_hash, Context, EXIT_SUCCESS};

pub fn run(ctx: &Context, input: &str) -> Result<u8, String> {
    let store = ctx.open_store()?;
    let hash = resolve_hash(&store, input)?;
    let entry = store
        .get_entry(&hash)
        .map_err(|e| format!("store error: {e}"))?
        .ok_or_else(|| format!("no lock entry matching '{input}'"))?;

    if ctx.json {
        println!("{}", json_pretty(&entry)?);
        return Ok(EXIT_SUCCESS);
    }

    let env = &entry.environment;
    println!("manifest_hash: {}", env.manifest_hash);
    println!("short_hash:    {}", env.manifest_hash.short());
    println!("created_at:    {}", env.created_at);
    println!("checksum:      {}", entry.checksum.as_deref().unwrap_or("(none)"));
    println!(
        "snapshot:      {}",
        env.provider_snapshot.as_deref().unwrap_or("(unknown)")
    );
    println!("artifacts:");
    for artifact in &env.artifacts {
        println!(
            "  {:<10} {:<20} {:<16} {}",
            colorize_kind(&artifact.kind.to_string()),
            artifact.name,
            artifact.version,
            artifact.install_path
        );
        if let Some(channel) = &artifact.channel {
            println!("             channel: {channel}");
        }
        if !artifact.targets.is_empty() {
            println!("             targets: {}", artifact.targets.join(", "));
        }
    }
    if !env.variables.is_empty() {
        println!("variables:");
        for (name, value) in &env.variables {
            println!("  {name}={value}");
        }
    }
    Ok(EXIT_SUCCESS)
}
