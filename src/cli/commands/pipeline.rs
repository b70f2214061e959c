//! `release`, `build` and `bundle`.

use crate::bundler::platform::macos::universal;
use crate::bundler::{ArtifactState, CommandRunner, Pipeline, Step};
use crate::cli::{Args, OutputManager};
use crate::config::PipelineOptions;
use crate::error::Result;

/// Run the full pipeline.
pub(super) async fn execute_release<R: CommandRunner>(
    runner: &R,
    args: &Args,
    options: &PipelineOptions,
    output: &OutputManager,
) -> Result<()> {
    let config = args.load_config()?;
    let pipeline = Pipeline::new(runner, &config, options);

    let total = pipeline.steps().len();
    let mut index = 0;
    let state = pipeline
        .run_with(|step| {
            index += 1;
            output.step(index, total, step.name());
        })
        .await?;

    print_summary(&state, output);
    output.success(&format!("Released {}", config.app_name));
    Ok(())
}

/// Build universal binaries only.
pub(super) async fn execute_build<R: CommandRunner>(
    runner: &R,
    args: &Args,
    output: &OutputManager,
) -> Result<()> {
    let config = args.load_config()?;
    let binaries = universal::build_universal(runner, &config).await?;

    output.success(&format!("Built {} universal binaries", binaries.len()));
    for binary in &binaries {
        output.indent(&binary.display().to_string());
    }
    Ok(())
}

/// Assemble the bundle, ad-hoc signed unless `no_sign`.
pub(super) async fn execute_bundle<R: CommandRunner>(
    runner: &R,
    args: &Args,
    options: &PipelineOptions,
    no_sign: bool,
    output: &OutputManager,
) -> Result<()> {
    let config = args.load_config()?;
    let pipeline = Pipeline::new(runner, &config, options);

    let steps: &[Step] = if no_sign {
        &[Step::Assemble]
    } else {
        &[Step::Assemble, Step::AdhocSign]
    };
    let state = pipeline.prepare().await?;
    let state = pipeline
        .execute(steps, state, |step| output.info(&format!("Running {step}")))
        .await?;

    print_summary(&state, output);
    Ok(())
}

pub(super) fn print_summary(state: &ArtifactState, output: &OutputManager) {
    output.info("Artifacts:");
    if let Some(version) = &state.version {
        output.field("version", &version.version);
        output.field("bundle version", &version.bundle_version);
    }
    if let Some(bundle) = &state.bundle {
        output.field("bundle", &bundle.path.display().to_string());
    }
    if let Some(phase) = state.signing_phase {
        output.field("signature", &format!("{phase:?}"));
    }
    if let Some(identity) = &state.identity {
        output.field("identity", identity);
    }
    if let Some(image) = &state.image {
        output.field("disk image", &image.display().to_string());
    }
    if let Some(submission) = &state.submission {
        output.field("notarization", &format!("{} ({})", submission.status, submission.id));
    }
    if let Some(checksum) = &state.checksum {
        output.field("checksum", &checksum.display().to_string());
    }
}
