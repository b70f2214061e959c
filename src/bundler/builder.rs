//! Release pipeline orchestration.
//!
//! The pipeline is an ordered list of [`Step`]s. Each step takes the
//! [`ArtifactState`] produced so far and returns the next one; a step that
//! needs an artifact no earlier step produced fails with a descriptive error.
//!
//! | # | Step | Runs when |
//! |---|------|-----------|
//! | 1 | `build` | unless `skip_build` |
//! | 2 | `assemble` | always |
//! | 3 | `adhoc-sign` | signing disabled |
//! | 4 | `release-sign` | signing enabled |
//! | 5 | `dmg` | always |
//! | 6 | `notarize` | signing enabled |
//! | 7 | `checksum` | always, last |
//!
//! # Example
//!
//! ```no_run
//! use macos_bundler_release::bundler::{Pipeline, SystemRunner};
//! use macos_bundler_release::config::{PipelineOptions, ProjectConfig};
//! use std::path::Path;
//!
//! # async fn example() -> macos_bundler_release::bundler::Result<()> {
//! let config = ProjectConfig::load(Path::new("release.toml"), None).expect("config");
//! let options = PipelineOptions::default();
//! let state = Pipeline::new(&SystemRunner, &config, &options).run().await?;
//! println!("checksum: {:?}", state.checksum);
//! # Ok(())
//! # }
//! ```

use crate::bundler::{
    checksum,
    error::{Context, Result},
    platform::macos::{
        app::{self, AppBundle},
        dmg,
        keychain::TemporaryKeychain,
        notarize::{self, Submission},
        sign::{self, SigningPhase},
        universal,
    },
    tools::CommandRunner,
};
use crate::config::{PipelineOptions, ProjectConfig};
use crate::version::{self, ResolvedVersion};
use std::fmt;
use std::path::PathBuf;

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Per-architecture cargo builds merged with `lipo`
    Build,
    /// `.app` assembly and `Info.plist`
    Assemble,
    /// Local ad-hoc signature
    AdhocSign,
    /// Developer ID signature with hardened runtime
    ReleaseSign,
    /// Compressed disk image
    Dmg,
    /// Notarization and stapling
    Notarize,
    /// `<image>.sha256`
    Checksum,
}

impl Step {
    /// Short name used in logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Build => "build",
            Step::Assemble => "assemble",
            Step::AdhocSign => "adhoc-sign",
            Step::ReleaseSign => "release-sign",
            Step::Dmg => "dmg",
            Step::Notarize => "notarize",
            Step::Checksum => "checksum",
        }
    }

    /// Steps a full release runs with `options`, in order.
    pub fn plan(options: &PipelineOptions) -> Vec<Step> {
        let mut steps = Vec::with_capacity(7);
        if !options.skip_build {
            steps.push(Step::Build);
        }
        steps.push(Step::Assemble);
        if options.enable_signing {
            steps.push(Step::ReleaseSign);
        } else {
            steps.push(Step::AdhocSign);
        }
        steps.push(Step::Dmg);
        if options.enable_signing {
            steps.push(Step::Notarize);
        }
        steps.push(Step::Checksum);
        steps
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Artifacts produced so far.
#[derive(Debug, Clone, Default)]
pub struct ArtifactState {
    /// Resolved version
    pub version: Option<ResolvedVersion>,
    /// Universal binaries from the build step
    pub universal_binaries: Vec<PathBuf>,
    /// Assembled bundle
    pub bundle: Option<AppBundle>,
    /// Release signing identity, once resolved
    pub identity: Option<String>,
    /// Signing progress of the bundle
    pub signing_phase: Option<SigningPhase>,
    /// Disk image
    pub image: Option<PathBuf>,
    /// Notarization result
    pub submission: Option<Submission>,
    /// Checksum file
    pub checksum: Option<PathBuf>,
}

impl ArtifactState {
    /// State with a known version.
    pub fn with_version(version: ResolvedVersion) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }

    fn version(&self, step: Step) -> Result<&ResolvedVersion> {
        self.version
            .as_ref()
            .with_context(|| format!("{step}: no resolved version"))
    }

    fn bundle(&self, step: Step) -> Result<&AppBundle> {
        self.bundle
            .as_ref()
            .with_context(|| format!("{step}: no app bundle, run the assemble step first"))
    }

    fn image(&self, step: Step) -> Result<&PathBuf> {
        self.image
            .as_ref()
            .with_context(|| format!("{step}: no disk image, run the dmg step first"))
    }
}

/// Runs pipeline steps against one project.
pub struct Pipeline<'a, R> {
    runner: &'a R,
    config: &'a ProjectConfig,
    options: &'a PipelineOptions,
}

impl<'a, R: CommandRunner> Pipeline<'a, R> {
    /// Create a pipeline.
    pub fn new(runner: &'a R, config: &'a ProjectConfig, options: &'a PipelineOptions) -> Self {
        Self {
            runner,
            config,
            options,
        }
    }

    /// Steps [`Pipeline::run`] will execute.
    pub fn steps(&self) -> Vec<Step> {
        Step::plan(self.options)
    }

    /// Resolve the version into a fresh state.
    pub async fn prepare(&self) -> Result<ArtifactState> {
        let version = version::resolve_version(
            self.runner,
            self.options.version_override.as_deref(),
            &self.config.root,
        )
        .await?;
        Ok(ArtifactState::with_version(version))
    }

    /// Run the full release.
    pub async fn run(&self) -> Result<ArtifactState> {
        self.run_with(|_| {}).await
    }

    /// Run the full release, calling `on_step` before each step.
    pub async fn run_with<F: FnMut(Step)>(&self, on_step: F) -> Result<ArtifactState> {
        let state = self.prepare().await?;
        self.execute(&self.steps(), state, on_step).await
    }

    /// Run `steps` from `state`, preparing the keychain when needed.
    ///
    /// Notarization credentials are checked before any step runs when
    /// `steps` includes [`Step::Notarize`].
    ///
    /// If a step needs the release identity and a CI certificate is
    /// configured, the certificate is imported into a temporary keychain
    /// first; the keychain is deleted afterwards whether or not the steps
    /// succeed.
    pub async fn execute<F: FnMut(Step)>(
        &self,
        steps: &[Step],
        state: ArtifactState,
        on_step: F,
    ) -> Result<ArtifactState> {
        if steps.contains(&Step::Notarize) {
            self.options.require_credentials()?;
        }

        let needs_identity = steps
            .iter()
            .any(|s| matches!(s, Step::ReleaseSign | Step::Notarize));
        let keychain = match &self.options.certificate {
            Some(cert) if needs_identity => {
                Some(TemporaryKeychain::import(self.runner, cert).await?)
            }
            _ => None,
        };

        let result = self.run_steps(steps, state, on_step).await;

        if let Some(keychain) = keychain {
            keychain.delete(self.runner).await;
        }
        result
    }

    async fn run_steps<F: FnMut(Step)>(
        &self,
        steps: &[Step],
        mut state: ArtifactState,
        mut on_step: F,
    ) -> Result<ArtifactState> {
        for &step in steps {
            on_step(step);
            log::info!("── {} ──", step);
            state = self
                .run_step(step, state)
                .await
                .with_context(|| format!("{step} step failed"))?;
        }
        Ok(state)
    }

    /// Run a single step.
    pub async fn run_step(&self, step: Step, mut state: ArtifactState) -> Result<ArtifactState> {
        let runner = self.runner;
        let config = self.config;

        match step {
            Step::Build => {
                state.universal_binaries = universal::build_universal(runner, config).await?;
            }
            Step::Assemble => {
                let version = state.version(step)?;
                let bundle =
                    app::assemble(runner, config, version, self.options.strict_versions).await?;
                state.bundle = Some(bundle);
                state.signing_phase = Some(SigningPhase::Unsigned);
            }
            Step::AdhocSign => {
                let bundle = state.bundle(step)?;
                let session = sign::sign_adhoc(runner, bundle, &config.bundle_identifier).await?;
                state.signing_phase = Some(session.phase());
            }
            Step::ReleaseSign => {
                let bundle = state.bundle(step)?;
                let identity =
                    sign::resolve_identity(runner, self.options.identity_filter.as_deref()).await?;
                let entitlements = config.entitlements.as_deref().map(|p| config.resolve(p));
                let session =
                    sign::sign_release(runner, bundle, &identity, entitlements.as_deref()).await?;
                state.signing_phase = Some(session.phase());
                state.identity = Some(identity);
            }
            Step::Dmg => {
                let version = state.version(step)?;
                let bundle = state.bundle(step)?;
                let image = dmg::create_dmg(
                    runner,
                    &bundle.path,
                    &config.app_name,
                    &version.version,
                    &config.dist_dir(),
                )
                .await?;
                state.image = Some(image);
            }
            Step::Notarize => {
                let credentials = self.options.require_credentials()?;
                let image = state.image(step)?;
                let identity = match &state.identity {
                    Some(identity) => identity.clone(),
                    None => {
                        sign::resolve_identity(runner, self.options.identity_filter.as_deref())
                            .await?
                    }
                };
                let submission = notarize::notarize(runner, image, &identity, credentials).await?;
                state.submission = Some(submission);
                state.identity = Some(identity);
            }
            Step::Checksum => {
                let image = state.image(step)?;
                state.checksum = Some(checksum::write_checksum_file(image).await?);
            }
        }

        Ok(state)
    }
}

impl<R> fmt::Debug for Pipeline<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("app", &self.config.app_name)
            .field("options", self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::tools::RecordingRunner;
    use crate::version::VersionSource;

    #[test]
    fn test_plan_local() {
        let steps = Step::plan(&PipelineOptions::default());
        assert_eq!(
            steps,
            [Step::Build, Step::Assemble, Step::AdhocSign, Step::Dmg, Step::Checksum]
        );
    }

    #[test]
    fn test_plan_signed_skip_build() {
        let options = PipelineOptions {
            enable_signing: true,
            skip_build: true,
            ..Default::default()
        };
        assert_eq!(
            Step::plan(&options),
            [
                Step::Assemble,
                Step::ReleaseSign,
                Step::Dmg,
                Step::Notarize,
                Step::Checksum
            ]
        );
    }

    #[tokio::test]
    async fn test_step_without_prerequisite_fails_descriptively() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ProjectConfig::from_toml(
            r#"
            app_name = "Example"
            bundle_identifier = "com.example.app"
            main_executable = "example"
            version_manifest = "versions.json"
            "#,
            tmp.path(),
        )
        .unwrap();
        let options = PipelineOptions::default();
        let runner = RecordingRunner::new();
        let pipeline = Pipeline::new(&runner, &config, &options);

        let version = ResolvedVersion::from_raw("1.0.0", VersionSource::Override);
        let state = ArtifactState::with_version(version);
        let err = pipeline.run_step(Step::Dmg, state).await.unwrap_err();
        assert!(err.to_string().contains("no app bundle"));
        assert!(runner.calls().is_empty());
    }
}
