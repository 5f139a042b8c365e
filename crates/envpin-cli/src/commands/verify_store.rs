use super::{json_pretty, Context, EXIT_STORE_ERROR, EXIT_SUCCESS};
use envpin_core::StoreLock;

pub fn run(ctx: &Context) -> Result<u8, String> {
    let store = ctx.open_store()?;
    let _lock =
        StoreLock::acquire(&ctx.layout()).map_err(|e| format!("store lock: {e}"))?;
    let report = store.verify().map_err(|e| format!("store error: {e}"))?;

    if ctx.json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!(
            "store integrity: {}/{} lock entries passed",
            report.passed, report.checked
        );
        for f in &report.failed {
            println!("  FAIL {}: {}", f.hash, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_STORE_ERROR)
    }
}
