//! `version`

use crate::bundler::CommandRunner;
use crate::cli::{Args, OutputManager};
use crate::config::PipelineOptions;
use crate::error::Result;
use crate::version::resolve_version;

/// Print the resolved version and numeric bundle version.
pub(super) async fn execute_version<R: CommandRunner>(
    runner: &R,
    args: &Args,
    options: &PipelineOptions,
    output: &OutputManager,
) -> Result<()> {
    let resolved = resolve_version(
        runner,
        options.version_override.as_deref(),
        &args.project_root(),
    )
    .await?;

    output.result(&format!("version: {}", resolved.version));
    output.result(&format!("bundle_version: {}", resolved.bundle_version));
    output.field("source", &resolved.source.to_string());
    if resolved.bundle_version_is_fallback {
        output.warn("Bundle version is a placeholder; tag the release with X.Y.Z");
    }
    Ok(())
}
