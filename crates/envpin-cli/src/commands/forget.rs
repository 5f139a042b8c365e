use super::{json_pretty, resolve_hash, Context, EXIT_SUCCESS};
use envpin_core::StoreLock;

pub fn run(ctx: &Context, input: &str) -> Result<u8, String> {
    let store = ctx.open_store()?;
    let _lock =
        StoreLock::acquire(&ctx.layout()).map_err(|e| format!("store lock: {e}"))?;

    let hash = resolve_hash(&store, input)?;
    let removed = store
        .remove(&hash)
        .map_err(|e| format!("store error: {e}"))?;

    if ctx.json {
        let payload = serde_json::json!({
            "manifest_hash": hash,
            "removed": removed,
        });
        println!("{}", json_pretty(&payload)?);
    } else if removed {
        println!("forgot lock entry {}", hash.short());
    } else {
        println!("lock entry {} was already gone", hash.short());
    }
    Ok(EXIT_SUCCESS)
}
