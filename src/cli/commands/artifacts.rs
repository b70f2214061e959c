//! `dmg`, `checksum` and `package-plugin`.

use crate::bundler::{AppBundle, ArtifactState, CommandRunner, Pipeline, Step, checksum, plugin};
use crate::cli::{Args, OutputManager};
use crate::config::PipelineOptions;
use crate::error::Result;
use std::path::Path;

/// Package an existing bundle into a disk image.
pub(super) async fn execute_dmg<R: CommandRunner>(
    runner: &R,
    args: &Args,
    options: &PipelineOptions,
    bundle: Option<&Path>,
    output: &OutputManager,
) -> Result<()> {
    let config = args.load_config()?;
    let path = bundle
        .map(|b| b.to_path_buf())
        .unwrap_or_else(|| config.bundle_path());

    let pipeline = Pipeline::new(runner, &config, options);
    let state = ArtifactState {
        bundle: Some(AppBundle::open(&path, &config)?),
        ..pipeline.prepare().await?
    };
    let state = pipeline
        .execute(&[Step::Dmg], state, |step| output.info(&format!("Running {step}")))
        .await?;

    if let Some(image) = &state.image {
        output.success(&format!("Created {}", image.display()));
    }
    Ok(())
}

/// Write `<file>.sha256`.
pub(super) async fn execute_checksum(file: &Path, output: &OutputManager) -> Result<()> {
    let out = checksum::write_checksum_file(file).await?;
    let line = tokio::fs::read_to_string(&out).await?;
    output.result(line.trim_end());
    output.success(&format!("Wrote {}", out.display()));
    Ok(())
}

/// Archive a plugin directory and print the follow-up steps.
pub(super) async fn execute_package_plugin(
    dir: &Path,
    manifest: &Path,
    out: &Path,
    output: &OutputManager,
) -> Result<()> {
    let packaged = plugin::package_plugin(dir, manifest, out).await?;

    output.success(&format!("Packaged {} {}", packaged.name, packaged.version));
    output.field("archive", &packaged.archive.display().to_string());
    output.field("checksum", &packaged.checksum.display().to_string());
    output.info("Next steps:");
    for (i, line) in packaged.instructions().iter().enumerate() {
        output.indent(&format!("{}. {}", i + 1, line));
    }
    Ok(())
}
