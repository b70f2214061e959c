//! macOS DMG disk image creator.
//!
//! Creates a drag-to-install DMG with the native `hdiutil` tool. The image
//! holds a copy of the .app bundle and an `Applications` symlink.

use crate::bundler::{
    error::{Context, Result},
    tools::{CommandRunner, Invocation},
    utils::fs,
};
use std::path::{Path, PathBuf};

/// Image file name: `{AppName}-{version}.dmg`.
pub fn image_name(app_name: &str, version: &str) -> String {
    format!("{app_name}-{version}.dmg")
}

/// Create `<output_dir>/<App>-<version>.dmg` from a finished bundle.
///
/// The bundle's signature must be final: the image contains a by-value copy.
///
/// # DMG Creation Steps
/// 1. Remove any previous image at the same path
/// 2. Stage a copy of the bundle and an `Applications -> /Applications`
///    symlink in a temporary directory
/// 3. `hdiutil create -volname <App> -srcfolder <staging> -ov -format UDZO`
/// 4. The staging directory is removed when the tempdir drops
pub async fn create_dmg<R: CommandRunner>(
    runner: &R,
    app_bundle: &Path,
    app_name: &str,
    version: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    runner.require_tool("hdiutil", "hdiutil ships with macOS")?;

    fs::create_dir_all(output_dir, false).await?;
    let dmg_path = output_dir.join(image_name(app_name, version));
    fs::remove_file(&dmg_path).await?;

    let temp_dir = tempfile::tempdir().map_err(|e| {
        crate::bundler::Error::GenericError(format!(
            "Failed to create temporary directory for DMG contents: {}",
            e
        ))
    })?;
    let staging_path = temp_dir.path();

    let bundle_name = app_bundle
        .file_name()
        .context("Invalid app bundle path")?;
    let staged_app = staging_path.join(bundle_name);

    log::debug!("Copying .app to staging: {}", staged_app.display());
    fs::copy_dir(app_bundle, &staged_app).await.with_context(|| {
        format!(
            "copying .app bundle to staging directory: {}",
            staged_app.display()
        )
    })?;
    fs::symlink(Path::new("/Applications"), &staging_path.join("Applications"))?;

    log::info!("Creating DMG {}...", dmg_path.display());
    let invocation = Invocation::new("hdiutil")
        .args(["create", "-volname", app_name, "-srcfolder"])
        .path_arg(staging_path)?
        .args(["-ov", "-format", "UDZO"])
        .path_arg(&dmg_path)?;
    runner
        .run_checked(&invocation)
        .await
        .context("hdiutil failed")?;

    drop(temp_dir);

    log::info!("✓ Created DMG: {}", dmg_path.display());
    Ok(dmg_path)
}
