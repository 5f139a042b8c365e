use super::{Context, EXIT_SUCCESS};
use envpin_core::{materialize, ResolveOptions, ShellFormat};
use std::path::Path;

pub fn run(
    ctx: &Context,
    manifest: &Path,
    format: ShellFormat,
    offline: bool,
) -> Result<u8, String> {
    let outcome = ctx.resolve(
        manifest,
        ResolveOptions {
            offline,
            ..ResolveOptions::default()
        },
    )?;
    let description = materialize(&outcome.environment);
    let format = if ctx.json { ShellFormat::Json } else { format };
    print!("{}", description.render(format).map_err(|e| e.to_string())?);
    Ok(EXIT_SUCCESS)
}
