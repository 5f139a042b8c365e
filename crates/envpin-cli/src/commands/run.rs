use super::{Context, EXIT_FAILURE};
use envpin_core::{materialize, ResolveOptions};
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub fn run(
    ctx: &Context,
    manifest: &Path,
    offline: bool,
    command: &[String],
) -> Result<u8, String> {
    let outcome = ctx.resolve(
        manifest,
        ResolveOptions {
            offline,
            ..ResolveOptions::default()
        },
    )?;
    let description = materialize(&outcome.environment);

    let Some((program, args)) = command.split_first() else {
        return Err("no command given".to_owned());
    };
    let mut child = Command::new(program);
    child.args(args);
    let existing_path = std::env::var_os("PATH");
    description
        .apply_to(&mut child, existing_path.as_deref())
        .map_err(|e| format!("cannot build PATH: {e}"))?;

    debug!("running {program} in environment {}", outcome.identity.short);
    let status = child
        .status()
        .map_err(|e| format!("failed to run '{program}': {e}"))?;
    Ok(status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(EXIT_FAILURE))
}
