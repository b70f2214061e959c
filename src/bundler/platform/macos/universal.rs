//! Universal binary creation for macOS (Intel + Apple Silicon)
//!
//! Builds every configured executable once per Rust target and merges the
//! per-architecture outputs with Apple's `lipo` tool.

use crate::bundler::error::{Context, Error, Result};
use crate::bundler::tools::{CommandRunner, Invocation};
use crate::bundler::utils::fs;
use crate::config::ProjectConfig;
use std::path::PathBuf;

/// Compile all targets, then merge each executable into `config.build_dir()`.
///
/// Returns the paths of the universal binaries, main executable first.
///
/// # Errors
/// - `cargo` or `lipo` missing from PATH
/// - a `cargo build` exits non-zero
/// - an executable is missing from one of the per-target outputs
/// - `lipo -create` fails
pub async fn build_universal<R: CommandRunner>(
    runner: &R,
    config: &ProjectConfig,
) -> Result<Vec<PathBuf>> {
    runner.require_tool("cargo", "install Rust via rustup")?;
    runner.require_tool("lipo", "install Xcode Command Line Tools")?;

    for target in &config.targets {
        log::info!("Building release binaries for {}", target);
        let invocation = Invocation::new("cargo")
            .args(["build", "--release", "--target", target.as_str()])
            .args(config.cargo_args.iter().cloned())
            .current_dir(&config.root);
        runner
            .run_checked(&invocation)
            .await
            .with_context(|| format!("building for {target}"))?;
    }

    merge_universal(runner, config).await
}

/// Merge already-built per-target binaries with `lipo -create`.
pub async fn merge_universal<R: CommandRunner>(
    runner: &R,
    config: &ProjectConfig,
) -> Result<Vec<PathBuf>> {
    let output_dir = config.build_dir();
    fs::create_dir_all(&output_dir, false).await?;

    log::info!(
        "Creating universal binaries ({}) for {} executables",
        config.targets.join(" + "),
        config.executables().count()
    );

    let mut universal_binaries = Vec::new();

    for name in config.executables() {
        let inputs: Vec<PathBuf> = config
            .targets
            .iter()
            .map(|t| config.root.join("target").join(t).join("release").join(name))
            .collect();

        // A missing slice would silently produce a single-arch binary
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            return Err(Error::MissingInput {
                what: format!("'{name}' build output"),
                path: missing.clone(),
            });
        }

        let universal_bin = output_dir.join(name);
        fs::remove_file(&universal_bin).await?;

        let mut invocation = Invocation::new("lipo").arg("-create");
        for input in &inputs {
            invocation = invocation.path_arg(input)?;
        }
        let invocation = invocation.arg("-output").path_arg(&universal_bin)?;
        runner
            .run_checked(&invocation)
            .await
            .with_context(|| format!("lipo failed for {name}"))?;

        let info = runner
            .run(&Invocation::new("lipo").arg("-info").path_arg(&universal_bin)?)
            .await?;
        log::info!("✓ {}: {}", name, info.stdout.trim());

        universal_binaries.push(universal_bin);
    }

    Ok(universal_binaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::tools::{RecordingRunner, ToolOutput};
    use std::path::Path;

    fn config(root: &Path) -> ProjectConfig {
        ProjectConfig::from_toml(
            r#"
            app_name = "Example"
            bundle_identifier = "com.example.app"
            main_executable = "example"
            helpers = ["example-cli"]
            version_manifest = "versions.json"
            cargo_args = ["--locked"]
            "#,
            root,
        )
        .unwrap()
    }

    fn fake_target_outputs(root: &Path, names: &[&str]) {
        for target in ["x86_64-apple-darwin", "aarch64-apple-darwin"] {
            let dir = root.join("target").join(target).join("release");
            std::fs::create_dir_all(&dir).unwrap();
            for name in names {
                std::fs::write(dir.join(name), target).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_builds_each_target_then_merges_each_executable() {
        let tmp = tempfile::tempdir().unwrap();
        fake_target_outputs(tmp.path(), &["example", "example-cli"]);
        let runner = RecordingRunner::new();

        let out = build_universal(&runner, &config(tmp.path())).await.unwrap();

        let cargo = runner.calls_to("cargo");
        assert_eq!(cargo.len(), 2);
        assert!(cargo[0].has_arg("x86_64-apple-darwin"));
        assert!(cargo[1].has_arg("aarch64-apple-darwin"));
        assert!(cargo.iter().all(|c| c.has_arg("--locked")));

        let creates: Vec<_> = runner
            .calls_to("lipo")
            .into_iter()
            .filter(|c| c.has_arg("-create"))
            .collect();
        assert_eq!(creates.len(), 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].ends_with("target/universal/release/example"));
    }

    #[tokio::test]
    async fn test_missing_slice_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fake_target_outputs(tmp.path(), &["example"]);
        let runner = RecordingRunner::new();

        let err = merge_universal(&runner, &config(tmp.path())).await.unwrap_err();
        assert!(matches!(err, Error::MissingInput { .. }));
    }

    #[tokio::test]
    async fn test_cargo_failure_stops_build() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .respond_to("cargo", "build", ToolOutput::failed(101, "error[E0425]"));

        let err = build_universal(&runner, &config(tmp.path())).await.unwrap_err();
        assert!(err.to_string().contains("building for x86_64-apple-darwin"));
        assert_eq!(runner.calls_to("cargo").len(), 1);
        assert!(runner.calls_to("lipo").is_empty());
    }
}
