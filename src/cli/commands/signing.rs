//! `sign` and `notarize` for existing artifacts.

use crate::bundler::platform::macos::notarize::{self, Submission};
use crate::bundler::platform::macos::{keychain::TemporaryKeychain, sign};
use crate::bundler::{AppBundle, ArtifactState, CommandRunner, Error, Pipeline, Step};
use crate::cli::{Args, OutputManager};
use crate::config::{NotaryCredentials, PipelineOptions};
use crate::error::Result;
use std::path::Path;

/// Sign an existing bundle, ad-hoc or with the release identity.
pub(super) async fn execute_sign<R: CommandRunner>(
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

    let state = ArtifactState {
        bundle: Some(AppBundle::open(&path, &config)?),
        ..ArtifactState::default()
    };
    let step = if options.enable_signing {
        Step::ReleaseSign
    } else {
        Step::AdhocSign
    };

    let state = Pipeline::new(runner, &config, options)
        .execute(&[step], state, |step| output.info(&format!("Running {step}")))
        .await?;

    super::pipeline::print_summary(&state, output);
    output.success(&format!("Signed {}", path.display()));
    Ok(())
}

/// Notarize and staple an existing image.
pub(super) async fn execute_notarize<R: CommandRunner>(
    runner: &R,
    options: &PipelineOptions,
    image: &Path,
    output: &OutputManager,
) -> Result<()> {
    if !image.is_file() {
        return Err(Error::MissingInput {
            what: "disk image".into(),
            path: image.to_path_buf(),
        }
        .into());
    }
    let credentials = options.require_credentials()?;

    let keychain = match &options.certificate {
        Some(cert) => Some(TemporaryKeychain::import(runner, cert).await?),
        None => None,
    };

    let result = submit(runner, options, image, credentials, output).await;

    if let Some(keychain) = keychain {
        keychain.delete(runner).await;
    }

    let submission = result?;
    output.success(&format!(
        "Notarization {} ({}); ticket stapled to {}",
        submission.status,
        submission.id,
        image.display()
    ));
    output.warn("Stapling changed the image; regenerate its checksum with `checksum`");
    Ok(())
}

async fn submit<R: CommandRunner>(
    runner: &R,
    options: &PipelineOptions,
    image: &Path,
    credentials: &NotaryCredentials,
    output: &OutputManager,
) -> crate::bundler::Result<Submission> {
    let identity = sign::resolve_identity(runner, options.identity_filter.as_deref()).await?;
    output.info(&format!("Notarizing {} (this can take several minutes)", image.display()));
    notarize::notarize(runner, image, &identity, credentials).await
}
