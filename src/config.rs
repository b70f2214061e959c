//! Project configuration (`release.toml`) and runtime pipeline options.
//!
//! The project file describes *what* is released (names, executables,
//! plugins, update feed); [`PipelineOptions`] describes *how* this run
//! behaves (signing on/off, version override, credentials) and is built
//! once from CLI flags and environment so that no step reads the
//! environment on its own.

use crate::bundler::error::Error as BundlerError;
use crate::bundler::tools::Invocation;
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name, relative to the project root.
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Architectures merged into universal binaries.
pub const DEFAULT_TARGETS: &[&str] = &["x86_64-apple-darwin", "aarch64-apple-darwin"];

/// Deserialized `release.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Application name; also the `.app` and volume name
    pub app_name: String,
    /// Reverse-DNS bundle identifier
    pub bundle_identifier: String,
    /// Executable launched by the bundle (`CFBundleExecutable`)
    pub main_executable: String,
    /// Additional executables signed before the bundle
    #[serde(default)]
    pub helpers: Vec<String>,
    /// Central JSON version manifest
    pub version_manifest: PathBuf,
    /// Optional `.icns` icon
    #[serde(default)]
    pub icon: Option<PathBuf>,
    /// `LSMinimumSystemVersion`
    #[serde(default = "default_minimum_system_version")]
    pub minimum_system_version: String,
    /// Entitlements applied to the bundle when release-signing
    #[serde(default)]
    pub entitlements: Option<PathBuf>,
    /// Where universal binaries are written
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Where the `.app` bundle is assembled
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
    /// Where the disk image and checksum are written
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,
    /// Rust targets merged with `lipo`
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    /// Extra arguments passed to `cargo build`
    #[serde(default)]
    pub cargo_args: Vec<String>,
    /// Auto-update feed settings
    #[serde(default)]
    pub update: Option<UpdateConfig>,
    /// Plugin payloads bundled under `Resources/plugins`
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Directory all relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

/// Auto-update feed metadata embedded in `Info.plist`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConfig {
    /// Appcast URL (`SUFeedURL`)
    pub feed_url: String,
    /// EdDSA public key (`SUPublicEDKey`)
    pub public_ed_key: String,
    /// Update framework copied into `Contents/Frameworks` (optional)
    #[serde(default)]
    pub framework: Option<PathBuf>,
}

/// A plugin payload directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Directory name under `Resources/plugins`
    pub name: String,
    /// Source directory
    pub source: PathBuf,
    /// JSON manifest declaring the plugin version, relative to `source`
    #[serde(default = "default_plugin_manifest")]
    pub manifest: PathBuf,
    /// Field in the version manifest that must equal the plugin version
    pub version_key: String,
}

fn default_minimum_system_version() -> String {
    "13.0".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("target/universal/release")
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("target/bundle")
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_targets() -> Vec<String> {
    DEFAULT_TARGETS.iter().map(|t| t.to_string()).collect()
}

fn default_plugin_manifest() -> PathBuf {
    PathBuf::from("plugin.json")
}

impl ProjectConfig {
    /// Load `path`, resolving relative paths against `root`
    /// (or the file's directory when `root` is `None`).
    pub fn load(path: &Path, root: Option<&Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let base = match root {
            Some(r) => r.to_path_buf(),
            None => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        Self::parse(&text, &base, path)
    }

    /// Parse configuration text, resolving relative paths against `root`.
    pub fn from_toml(text: &str, root: &Path) -> Result<Self> {
        Self::parse(text, root, Path::new(DEFAULT_CONFIG_FILE))
    }

    fn parse(text: &str, root: &Path, source: &Path) -> Result<Self> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: source.to_path_buf(),
            reason,
        };

        let mut config: Self =
            toml::from_str(text).map_err(|e| invalid(e.message().to_string()))?;
        config.root = root.to_path_buf();
        config.validate().map_err(invalid)?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.app_name.trim().is_empty() {
            return Err("app_name must not be empty".into());
        }
        if !self.bundle_identifier.contains('.') {
            return Err(format!(
                "bundle_identifier '{}' is not reverse-DNS",
                self.bundle_identifier
            ));
        }
        if self.helpers.iter().any(|h| h == &self.main_executable) {
            return Err(format!(
                "'{}' is listed as both main_executable and helper",
                self.main_executable
            ));
        }
        if self.targets.is_empty() {
            return Err("targets must list at least one Rust target".into());
        }
        let mut names: Vec<&str> = self.plugins.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(format!("plugin '{}' is declared twice", w[0]));
        }
        Ok(())
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// All executables, main first.
    pub fn executables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.main_executable.as_str())
            .chain(self.helpers.iter().map(String::as_str))
    }

    /// Absolute universal build directory.
    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build_dir)
    }

    /// Absolute path of the `.app` bundle.
    pub fn bundle_path(&self) -> PathBuf {
        self.resolve(&self.bundle_dir)
            .join(format!("{}.app", self.app_name))
    }

    /// Absolute distribution directory.
    pub fn dist_dir(&self) -> PathBuf {
        self.resolve(&self.dist_dir)
    }

    /// Absolute path of a plugin's JSON manifest.
    pub fn plugin_manifest_path(&self, plugin: &PluginConfig) -> PathBuf {
        self.resolve(&plugin.source).join(&plugin.manifest)
    }
}

/// Apple notarization credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum NotaryCredentials {
    /// Apple ID with an app-specific password
    AppleId {
        /// `APPLE_ID`
        apple_id: String,
        /// `APPLE_TEAM_ID`
        team_id: String,
        /// `APPLE_APP_PASSWORD`
        password: String,
    },
    /// App Store Connect API key
    ApiKey {
        /// `APPLE_API_KEY`
        key_id: String,
        /// `APPLE_API_ISSUER`
        issuer: String,
        /// `APPLE_API_KEY_PATH`
        key_path: PathBuf,
    },
}

impl std::fmt::Debug for NotaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppleId {
                apple_id, team_id, ..
            } => f
                .debug_struct("AppleId")
                .field("apple_id", apple_id)
                .field("team_id", team_id)
                .field("password", &"<redacted>")
                .finish(),
            Self::ApiKey {
                key_id, issuer, key_path,
            } => f
                .debug_struct("ApiKey")
                .field("key_id", key_id)
                .field("issuer", issuer)
                .field("key_path", key_path)
                .finish(),
        }
    }
}

impl NotaryCredentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> std::result::Result<Self, BundlerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`.
    ///
    /// `APPLE_API_KEY` selects API-key mode; otherwise Apple ID mode is
    /// used. Every missing variable of the selected mode is reported.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, BundlerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (keys, api_mode): (&[&str], bool) = if get("APPLE_API_KEY").is_some() {
            (&["APPLE_API_KEY", "APPLE_API_ISSUER", "APPLE_API_KEY_PATH"], true)
        } else {
            (&["APPLE_ID", "APPLE_TEAM_ID", "APPLE_APP_PASSWORD"], false)
        };

        let missing: Vec<String> = keys
            .iter()
            .filter(|k| get(k).is_none())
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BundlerError::MissingCredentials { missing });
        }

        let value = |key: &str| get(key).unwrap_or_default();
        Ok(if api_mode {
            Self::ApiKey {
                key_id: value("APPLE_API_KEY"),
                issuer: value("APPLE_API_ISSUER"),
                key_path: PathBuf::from(value("APPLE_API_KEY_PATH")),
            }
        } else {
            Self::AppleId {
                apple_id: value("APPLE_ID"),
                team_id: value("APPLE_TEAM_ID"),
                password: value("APPLE_APP_PASSWORD"),
            }
        })
    }

    /// Append `notarytool` authentication arguments to `invocation`.
    ///
    /// The app-specific password is a secret argument.
    pub fn notarytool_auth(&self, invocation: Invocation) -> Invocation {
        match self {
            Self::AppleId {
                apple_id,
                team_id,
                password,
            } => invocation
                .args(["--apple-id", apple_id.as_str(), "--team-id", team_id.as_str()])
                .arg("--password")
                .secret_arg(password.as_str()),
            Self::ApiKey {
                key_id,
                issuer,
                key_path,
            } => invocation
                .args(["--key-id", key_id.as_str(), "--issuer", issuer.as_str(), "--key"])
                .arg(key_path.to_string_lossy()),
        }
    }
}

/// A Developer ID certificate supplied through the environment (CI).
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    /// `APPLE_CERTIFICATE`: base64-encoded `.p12`
    pub p12_base64: String,
    /// `APPLE_CERTIFICATE_PASSWORD`
    pub password: String,
}

impl std::fmt::Debug for SigningCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCertificate")
            .field("p12_base64", &format!("<{} bytes>", self.p12_base64.len()))
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SigningCertificate {
    /// Read the certificate from the process environment.
    pub fn from_env() -> std::result::Result<Option<Self>, BundlerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `None` when `APPLE_CERTIFICATE` is unset; an error when the
    /// certificate is set without its password.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Option<Self>, BundlerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(p12_base64) = lookup("APPLE_CERTIFICATE").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let password = lookup("APPLE_CERTIFICATE_PASSWORD").ok_or_else(|| {
            BundlerError::MissingCredentials {
                missing: vec!["APPLE_CERTIFICATE_PASSWORD".into()],
            }
        })?;
        Ok(Some(Self {
            p12_base64: p12_base64.trim().to_string(),
            password,
        }))
    }
}

/// Per-run options, built once from CLI flags and environment.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Release-sign and notarize instead of ad-hoc signing
    pub enable_signing: bool,
    /// Use this version instead of the latest git tag
    pub version_override: Option<String>,
    /// Reuse existing universal binaries
    pub skip_build: bool,
    /// Treat a bundle-version regression as fatal
    pub strict_versions: bool,
    /// Narrow identity selection to identities containing this text
    pub identity_filter: Option<String>,
    /// Notarization credentials; required when `enable_signing` is set
    pub credentials: Option<NotaryCredentials>,
    /// Certificate to import into a temporary keychain before signing
    pub certificate: Option<SigningCertificate>,
}

impl PipelineOptions {
    /// Credentials for notarization, or the variables that must be set.
    pub fn require_credentials(&self) -> std::result::Result<&NotaryCredentials, BundlerError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| BundlerError::MissingCredentials {
                missing: vec![
                    "APPLE_ID".into(),
                    "APPLE_TEAM_ID".into(),
                    "APPLE_APP_PASSWORD".into(),
                ],
            })
    }
}
