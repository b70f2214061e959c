//! Command line argument parsing and validation.

use crate::config::{NotaryCredentials, PipelineOptions, ProjectConfig, SigningCertificate};
use crate::error::Result;
use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Build, sign, package and notarize a macOS app
#[derive(Parser, Debug)]
#[command(
    name = "macos_bundler_release",
    version,
    about = "Build, sign, package and notarize a macOS app",
    long_about = "Release pipeline for a macOS menu-bar app: universal binaries, .app bundle,
code signing, DMG, notarization and checksum.

Usage:
  macos_bundler_release release                 # local build, ad-hoc signed
  ENABLE_SIGNING=1 macos_bundler_release release # Developer ID + notarization
  macos_bundler_release version                 # print resolved versions"
)]
pub struct Args {
    /// Project configuration file
    #[arg(short = 'c', long = "config", global = true, default_value = "release.toml")]
    pub config: PathBuf,

    /// Project root (defaults to the directory containing the config file)
    #[arg(long, global = true, value_name = "DIR")]
    pub project_root: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Version selection shared by commands that stamp a version.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct VersionArgs {
    /// Use this version instead of the latest git tag
    #[arg(long = "app-version", env = "APP_VERSION", value_name = "VERSION")]
    pub app_version: Option<String>,
}

/// Signing selection shared by signing commands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SigningArgs {
    /// Sign with a Developer ID identity (and notarize, for `release`)
    #[arg(
        long,
        env = "ENABLE_SIGNING",
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::SetTrue
    )]
    pub sign: bool,

    /// Only use identities whose name or hash contains this text
    #[arg(long, env = "SIGNING_IDENTITY", value_name = "TEXT")]
    pub identity: Option<String>,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline: build, bundle, sign, dmg, notarize, checksum
    Release {
        /// Signing options
        #[command(flatten)]
        signing: SigningArgs,

        /// Reuse existing universal binaries
        #[arg(long)]
        skip_build: bool,

        /// Version options
        #[command(flatten)]
        version: VersionArgs,

        /// Fail instead of warning when the bundle version goes backwards
        #[arg(long)]
        strict_versions: bool,
    },

    /// Build universal binaries only
    Build,

    /// Assemble the .app bundle (ad-hoc signed unless --no-sign)
    Bundle {
        /// Leave the bundle unsigned
        #[arg(long)]
        no_sign: bool,

        /// Version options
        #[command(flatten)]
        version: VersionArgs,

        /// Fail instead of warning when the bundle version goes backwards
        #[arg(long)]
        strict_versions: bool,
    },

    /// Sign an existing bundle
    Sign {
        /// Signing options
        #[command(flatten)]
        signing: SigningArgs,

        /// Bundle to sign (defaults to the configured bundle path)
        #[arg(value_name = "BUNDLE")]
        bundle: Option<PathBuf>,
    },

    /// Package an existing bundle into a DMG
    Dmg {
        /// Bundle to package (defaults to the configured bundle path)
        #[arg(value_name = "BUNDLE")]
        bundle: Option<PathBuf>,

        /// Version options
        #[command(flatten)]
        version: VersionArgs,
    },

    /// Notarize and staple an existing disk image
    Notarize {
        /// Disk image
        #[arg(value_name = "DMG")]
        image: PathBuf,

        /// Only use identities whose name or hash contains this text
        #[arg(long, env = "SIGNING_IDENTITY", value_name = "TEXT")]
        identity: Option<String>,
    },

    /// Write <FILE>.sha256
    Checksum {
        /// File to hash
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the resolved version and numeric bundle version
    Version {
        /// Version options
        #[command(flatten)]
        version: VersionArgs,
    },

    /// Archive a plugin directory as <name>-<version>.zip
    PackagePlugin {
        /// Plugin directory
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Manifest file inside the plugin directory
        #[arg(long, default_value = crate::bundler::plugin::DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Output directory
        #[arg(long, default_value = "dist")]
        out: PathBuf,
    },
}

impl Command {
    /// Subcommand name for messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Release { .. } => "release",
            Command::Build => "build",
            Command::Bundle { .. } => "bundle",
            Command::Sign { .. } => "sign",
            Command::Dmg { .. } => "dmg",
            Command::Notarize { .. } => "notarize",
            Command::Checksum { .. } => "checksum",
            Command::Version { .. } => "version",
            Command::PackagePlugin { .. } => "package-plugin",
        }
    }

    /// Whether the command reads `release.toml`.
    pub fn needs_config(&self) -> bool {
        !matches!(
            self,
            Command::Notarize { .. }
                | Command::Checksum { .. }
                | Command::Version { .. }
                | Command::PackagePlugin { .. }
        )
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Project root: `--project-root`, else the config file's directory.
    pub fn project_root(&self) -> PathBuf {
        match &self.project_root {
            Some(root) => root.clone(),
            None => self
                .config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Build pipeline options from flags and the environment.
    ///
    /// With signing enabled, notarization credentials must be present;
    /// missing variables abort here, before any step runs.
    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        let mut options = PipelineOptions::default();

        match &self.command {
            Command::Release {
                signing,
                skip_build,
                version,
                strict_versions,
            } => {
                options.enable_signing = signing.sign;
                options.identity_filter = signing.identity.clone();
                options.skip_build = *skip_build;
                options.version_override = version.app_version.clone();
                options.strict_versions = *strict_versions;
                if signing.sign {
                    options.credentials = Some(NotaryCredentials::from_env()?);
                    options.certificate = SigningCertificate::from_env()?;
                }
            }
            Command::Bundle {
                version,
                strict_versions,
                ..
            } => {
                options.version_override = version.app_version.clone();
                options.strict_versions = *strict_versions;
            }
            Command::Sign { signing, .. } => {
                options.enable_signing = signing.sign;
                options.identity_filter = signing.identity.clone();
                if signing.sign {
                    options.certificate = SigningCertificate::from_env()?;
                }
            }
            Command::Dmg { version, .. } | Command::Version { version } => {
                options.version_override = version.app_version.clone();
            }
            Command::Notarize { identity, .. } => {
                options.enable_signing = true;
                options.identity_filter = identity.clone();
                options.credentials = Some(NotaryCredentials::from_env()?);
                options.certificate = SigningCertificate::from_env()?;
            }
            Command::Build | Command::Checksum { .. } | Command::PackagePlugin { .. } => {}
        }

        Ok(options)
    }

    /// Load `release.toml`.
    pub fn load_config(&self) -> Result<ProjectConfig> {
        ProjectConfig::load(&self.config, self.project_root.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_release_flags() {
        let args = Args::try_parse_from([
            "macos_bundler_release",
            "-c",
            "app/release.toml",
            "release",
            "--skip-build",
            "--app-version",
            "v1.3.0-beta.4",
            "--strict-versions",
        ])
        .unwrap();

        assert_eq!(args.project_root(), PathBuf::from("app"));
        let options = args.pipeline_options().unwrap();
        assert!(options.skip_build);
        assert!(options.strict_versions);
        assert!(!options.enable_signing);
        assert_eq!(options.version_override.as_deref(), Some("v1.3.0-beta.4"));
    }

    #[test]
    fn test_project_root_defaults_to_cwd() {
        let args = Args::try_parse_from(["macos_bundler_release", "build"]).unwrap();
        assert_eq!(args.project_root(), PathBuf::from("."));
        assert!(args.command.needs_config());
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Args::try_parse_from(["macos_bundler_release", "publish"]).is_err());
    }

    #[test]
    fn test_package_plugin_defaults() {
        let args = Args::try_parse_from([
            "macos_bundler_release",
            "package-plugin",
            "plugins/editor",
        ])
        .unwrap();
        match args.command {
            Command::PackagePlugin { manifest, out, .. } => {
                assert_eq!(manifest, PathBuf::from("plugin.json"));
                assert_eq!(out, PathBuf::from("dist"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
