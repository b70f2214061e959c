//! macOS application bundle (.app) assembly.
//!
//! Everything that can make the bundle inconsistent (missing executables,
//! missing version manifest, plugin/manifest version disagreement) is
//! checked before the previous bundle is removed, so a failed run never
//! leaves a half-written bundle that looks complete.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    platform::macos::info_plist::{self, BundleIdentity, DescriptorMetadata},
    tools::{CommandRunner, Invocation},
    utils::fs,
};
use crate::config::ProjectConfig;
use crate::metadata::{self, VerifiedPlugin};
use crate::version::{ResolvedVersion, compare_bundle_versions};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;

/// File name of the bundled icon, without extension (`CFBundleIconFile`).
pub const ICON_NAME: &str = "AppIcon";

/// Name of the generated build timestamp resource.
pub const BUILD_TIMESTAMP_FILE: &str = "build_timestamp";

/// Name of the version manifest inside `Contents/Resources`.
pub const BUNDLED_MANIFEST_FILE: &str = "versions.json";

/// rpath added to the main executable when an update framework is embedded.
pub const FRAMEWORKS_RPATH: &str = "@executable_path/../Frameworks";

/// Layout of an assembled bundle.
#[derive(Debug, Clone)]
pub struct AppBundle {
    /// `<App>.app`
    pub path: PathBuf,
    /// `Contents/MacOS/<main>`
    pub main_executable: PathBuf,
    /// Other executables in `Contents/MacOS`
    pub helpers: Vec<PathBuf>,
    /// Embedded frameworks in `Contents/Frameworks`
    pub frameworks: Vec<PathBuf>,
    /// Plugins copied into `Contents/Resources/plugins`
    pub plugins: Vec<VerifiedPlugin>,
}

impl AppBundle {
    /// Describe an existing bundle on disk (for signing a bundle built earlier).
    pub fn open(path: &Path, config: &ProjectConfig) -> Result<Self> {
        let contents = path.join("Contents");
        if !contents.join("Info.plist").is_file() {
            return Err(Error::MissingInput {
                what: "app bundle".into(),
                path: path.to_path_buf(),
            });
        }
        let macos = contents.join("MacOS");
        let main_executable = macos.join(&config.main_executable);
        if !main_executable.is_file() {
            return Err(Error::MissingInput {
                what: "main executable".into(),
                path: main_executable,
            });
        }
        let helpers = config
            .helpers
            .iter()
            .map(|h| macos.join(h))
            .filter(|p| p.is_file())
            .collect();

        let frameworks_dir = contents.join("Frameworks");
        let mut frameworks = Vec::new();
        if frameworks_dir.is_dir() {
            for entry in std::fs::read_dir(&frameworks_dir)
                .fs_context("listing frameworks", &frameworks_dir)?
            {
                let entry = entry.fs_context("listing frameworks", &frameworks_dir)?;
                if entry.path().extension().is_some_and(|e| e == "framework") {
                    frameworks.push(entry.path());
                }
            }
            frameworks.sort();
        }

        Ok(Self {
            path: path.to_path_buf(),
            main_executable,
            helpers,
            frameworks,
            plugins: Vec::new(),
        })
    }

    /// `Contents/Info.plist`
    pub fn info_plist(&self) -> PathBuf {
        self.path.join("Contents/Info.plist")
    }
}

/// Assemble the bundle at `config.bundle_path()` from `config.build_dir()`.
pub async fn assemble<R: CommandRunner>(
    runner: &R,
    config: &ProjectConfig,
    version: &ResolvedVersion,
    strict_versions: bool,
) -> Result<AppBundle> {
    assemble_at(runner, config, version, &config.bundle_path(), strict_versions).await
}

/// Assemble a bundle at `destination`, replacing any bundle already there.
pub async fn assemble_at<R: CommandRunner>(
    runner: &R,
    config: &ProjectConfig,
    version: &ResolvedVersion,
    destination: &Path,
    strict_versions: bool,
) -> Result<AppBundle> {
    let build_dir = config.build_dir();
    log::info!(
        "Assembling {} from {}",
        destination.display(),
        build_dir.display()
    );

    // Preconditions, before anything on disk changes
    let executables: Vec<(String, PathBuf)> = config
        .executables()
        .map(|name| (name.to_string(), build_dir.join(name)))
        .collect();
    for (name, src) in &executables {
        if !src.is_file() {
            return Err(Error::MissingInput {
                what: format!("executable '{name}'"),
                path: src.clone(),
            });
        }
    }
    let (manifest, plugins) = metadata::verify_plugins(config)?;
    let icon = optional_input(config, config.icon.as_deref(), "icon");
    let framework = optional_input(
        config,
        config.update.as_ref().and_then(|u| u.framework.as_deref()),
        "update framework",
    );
    check_version_progression(destination, version, strict_versions)?;

    // Layout
    let contents = destination.join("Contents");
    let macos_dir = contents.join("MacOS");
    let resources_dir = contents.join("Resources");
    fs::create_dir_all(destination, true).await?;
    fs::create_dir_all(&macos_dir, false).await?;
    fs::create_dir_all(&resources_dir, false).await?;

    let mut main_executable = PathBuf::new();
    let mut helpers = Vec::new();
    for (name, src) in &executables {
        let dst = macos_dir.join(name);
        fs::copy_file(src, &dst)
            .await
            .with_context(|| format!("failed to copy {name} into bundle"))?;
        fs::set_executable(&dst).await?;
        if *name == config.main_executable {
            main_executable = dst;
        } else {
            helpers.push(dst);
        }
    }

    let plugins_dir = resources_dir.join("plugins");
    for plugin in &plugins {
        fs::copy_dir_filtered(&plugin.source, &plugins_dir.join(&plugin.name), |e| {
            e.file_name() != ".git" && e.file_name() != ".DS_Store"
        })
        .await
        .with_context(|| format!("failed to copy plugin {}", plugin.name))?;
    }

    fs::copy_file(&manifest.path, &resources_dir.join(BUNDLED_MANIFEST_FILE)).await?;

    let icon_file = match &icon {
        Some(src) => {
            fs::copy_file(src, &resources_dir.join(format!("{ICON_NAME}.icns"))).await?;
            Some(ICON_NAME)
        }
        None => None,
    };

    write_build_timestamp(&resources_dir).await?;

    let mut frameworks = Vec::new();
    if let Some(src) = &framework {
        frameworks.push(embed_framework(runner, src, &contents, &main_executable).await?);
    }

    // Info.plist
    let update = config.update.as_ref();
    let plist = info_plist::render(
        &BundleIdentity {
            app_name: &config.app_name,
            bundle_identifier: &config.bundle_identifier,
            version: &version.version,
            bundle_version: &version.bundle_version,
        },
        &DescriptorMetadata {
            executable: &config.main_executable,
            minimum_system_version: &config.minimum_system_version,
            icon_file,
            feed_url: update.map(|u| u.feed_url.as_str()),
            public_ed_key: update.map(|u| u.public_ed_key.as_str()),
        },
    )?;
    let plist_path = contents.join("Info.plist");
    tokio_fs::write(&plist_path, plist)
        .await
        .fs_context("writing Info.plist", &plist_path)?;

    log::info!("✓ Assembled {}", destination.display());

    Ok(AppBundle {
        path: destination.to_path_buf(),
        main_executable,
        helpers,
        frameworks,
        plugins,
    })
}

/// Resolve an optional resource; configured-but-absent is a warning.
fn optional_input(config: &ProjectConfig, path: Option<&Path>, what: &str) -> Option<PathBuf> {
    let resolved = config.resolve(path?);
    if resolved.exists() {
        Some(resolved)
    } else {
        log::warn!("Optional {} not found at {}, skipping", what, resolved.display());
        None
    }
}

/// Compare against the bundle about to be replaced.
fn check_version_progression(
    destination: &Path,
    version: &ResolvedVersion,
    strict: bool,
) -> Result<()> {
    let Some(previous) = info_plist::read_bundle_version(&destination.join("Contents/Info.plist"))
    else {
        return Ok(());
    };

    if compare_bundle_versions(&version.bundle_version, &previous) == Ordering::Less {
        let err = Error::VersionRegression {
            previous,
            new: version.bundle_version.clone(),
        };
        if strict {
            return Err(err);
        }
        log::warn!("{}", err);
    }
    Ok(())
}

async fn write_build_timestamp(resources_dir: &Path) -> Result<()> {
    let path = resources_dir.join(BUILD_TIMESTAMP_FILE);
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    tokio_fs::write(&path, format!("{stamp}\n"))
        .await
        .fs_context("writing build timestamp", &path)
}

/// Copy the update framework and point the main executable's rpath at it.
async fn embed_framework<R: CommandRunner>(
    runner: &R,
    src: &Path,
    contents: &Path,
    main_executable: &Path,
) -> Result<PathBuf> {
    let name = src
        .file_name()
        .context("invalid update framework path")?;
    let dst = contents.join("Frameworks").join(name);
    fs::copy_dir(src, &dst)
        .await
        .with_context(|| format!("failed to embed {}", src.display()))?;

    runner.require_tool("install_name_tool", "install Xcode Command Line Tools")?;
    let invocation = Invocation::new("install_name_tool")
        .args(["-add_rpath", FRAMEWORKS_RPATH])
        .path_arg(main_executable)?;
    runner.run_checked(&invocation).await?;

    log::info!("Embedded {}", dst.display());
    Ok(dst)
}
