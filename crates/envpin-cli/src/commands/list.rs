use super::{json_pretty, Context, EXIT_SUCCESS};

pub fn run(ctx: &Context) -> Result<u8, String> {
    let store = ctx.open_store()?;
    let entries = store.list().map_err(|e| format!("store error: {e}"))?;

    if ctx.json {
        let payload: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "manifest_hash": e.manifest_hash,
                    "toolchains": e.environment.toolchains().count(),
                    "packages": e.environment.packages().count(),
                    "created_at": e.environment.created_at,
                })
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else if entries.is_empty() {
        println!("no lock entries found");
    } else {
        println!(
            "{:<14} {:<11} {:<9} {:<26} MANIFEST_HASH",
            "SHORT_HASH", "TOOLCHAINS", "PACKAGES", "CREATED_AT"
        );
        for entry in &entries {
            println!(
                "{:<14} {:<11} {:<9} {:<26} {}",
                entry.manifest_hash.short(),
                entry.environment.toolchains().count(),
                entry.environment.packages().count(),
                entry.environment.created_at,
                entry.manifest_hash
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
