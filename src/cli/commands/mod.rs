//! Command execution.
//!
//! Every command builds its [`PipelineOptions`](crate::config::PipelineOptions)
//! once from flags and environment, then drives library code through a
//! [`SystemRunner`]. Failures are reported with recovery suggestions and
//! exit code 1.

mod artifacts;
mod pipeline;
mod signing;
mod version;

use crate::bundler::SystemRunner;
use crate::cli::{Args, Command, OutputManager};
use crate::error::Result;

/// Execute the parsed command and return the process exit code.
pub async fn execute_command(args: Args) -> Result<i32> {
    let output = OutputManager::new(args.quiet);

    match run_command(&args, &output).await {
        Ok(()) => Ok(0),
        Err(e) => {
            output.error(&format!("Command '{}' failed: {}", args.command.name(), e));
            output.suggestions(&e.recovery_suggestions());
            Ok(1)
        }
    }
}

async fn run_command(args: &Args, output: &OutputManager) -> Result<()> {
    let options = args.pipeline_options()?;
    let runner = SystemRunner;

    match &args.command {
        Command::Release { .. } => pipeline::execute_release(&runner, args, &options, output).await,
        Command::Build => pipeline::execute_build(&runner, args, output).await,
        Command::Bundle { no_sign, .. } => {
            pipeline::execute_bundle(&runner, args, &options, *no_sign, output).await
        }
        Command::Sign { bundle, .. } => {
            signing::execute_sign(&runner, args, &options, bundle.as_deref(), output).await
        }
        Command::Notarize { image, .. } => {
            signing::execute_notarize(&runner, &options, image, output).await
        }
        Command::Dmg { bundle, .. } => {
            artifacts::execute_dmg(&runner, args, &options, bundle.as_deref(), output).await
        }
        Command::Checksum { file } => artifacts::execute_checksum(file, output).await,
        Command::PackagePlugin { dir, manifest, out } => {
            artifacts::execute_package_plugin(dir, manifest, out, output).await
        }
        Command::Version { .. } => version::execute_version(&runner, args, &options, output).await,
    }
}
