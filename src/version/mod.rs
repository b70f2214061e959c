//! Release version resolution.
//!
//! The human-facing version comes from an explicit override or the latest
//! git tag; the numeric `CFBundleVersion` the update feed compares is derived
//! from it.

use crate::bundler::error::{Error, Result};
use crate::bundler::tools::{CommandRunner, Invocation};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// Version used when neither an override nor a tag is available.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Placeholder bundle version when no digits can be derived.
pub const FALLBACK_BUNDLE_VERSION: &str = "1";

/// Pre-release labels whose number is appended to the bundle version.
pub const PRERELEASE_LABELS: &[&str] = &["alpha", "beta", "rc"];

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// `--app-version` / `APP_VERSION`
    Override,
    /// `git describe --tags`
    GitTag,
    /// [`DEFAULT_VERSION`]
    Default,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Override => "override",
            Self::GitTag => "git tag",
            Self::Default => "default",
        })
    }
}

/// Human version plus the numeric bundle version derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version with any leading `v` stripped, e.g. `1.3.0-beta.4`
    pub version: String,
    /// Digits-only bundle version, e.g. `13004`
    pub bundle_version: String,
    /// Origin of `version`
    pub source: VersionSource,
    /// True when `bundle_version` is the [`FALLBACK_BUNDLE_VERSION`] placeholder
    pub bundle_version_is_fallback: bool,
}

impl ResolvedVersion {
    /// Build from a raw tag or version string.
    pub fn from_raw(raw: &str, source: VersionSource) -> Self {
        let version = strip_version_prefix(raw).to_string();
        let (bundle_version, bundle_version_is_fallback) = match derive_bundle_version(&version) {
            Some(v) => (v, false),
            None => (FALLBACK_BUNDLE_VERSION.to_string(), true),
        };
        Self {
            version,
            bundle_version,
            source,
            bundle_version_is_fallback,
        }
    }
}

/// Resolve the release version.
///
/// Precedence: `override_version`, then the latest tag reachable from HEAD
/// in `repo_dir`, then [`DEFAULT_VERSION`].
pub async fn resolve_version<R: CommandRunner>(
    runner: &R,
    override_version: Option<&str>,
    repo_dir: &Path,
) -> Result<ResolvedVersion> {
    let resolved = match override_version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => ResolvedVersion::from_raw(v, VersionSource::Override),
        None => match latest_tag(runner, repo_dir).await? {
            Some(tag) => ResolvedVersion::from_raw(&tag, VersionSource::GitTag),
            None => {
                log::warn!("No git tag found, defaulting version to {}", DEFAULT_VERSION);
                ResolvedVersion::from_raw(DEFAULT_VERSION, VersionSource::Default)
            }
        },
    };

    if resolved.bundle_version_is_fallback {
        log::warn!(
            "Could not derive a numeric bundle version from '{}'; using placeholder '{}'",
            resolved.version,
            FALLBACK_BUNDLE_VERSION
        );
    }

    log::info!(
        "Version {} (bundle {}) from {}",
        resolved.version,
        resolved.bundle_version,
        resolved.source
    );
    Ok(resolved)
}

async fn latest_tag<R: CommandRunner>(runner: &R, repo_dir: &Path) -> Result<Option<String>> {
    let invocation = Invocation::new("git")
        .args(["describe", "--tags", "--abbrev=0"])
        .current_dir(repo_dir);

    match runner.run(&invocation).await {
        Ok(output) if output.success() => {
            let tag = output.stdout.trim();
            Ok((!tag.is_empty()).then(|| tag.to_string()))
        }
        Ok(output) => {
            log::debug!("git describe failed: {}", output.stderr.trim());
            Ok(None)
        }
        // git itself missing is not fatal; the version simply defaults
        Err(Error::CommandFailed { error, .. }) => {
            log::debug!("git unavailable: {}", error);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Strip surrounding whitespace and one leading `v`/`V`.
pub fn strip_version_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Derive the digits-only `CFBundleVersion` from a human version.
///
/// Major, minor and patch are concatenated; a recognized pre-release
/// `<label>.<N>` appends `N` zero-padded to two digits. Returns `None` when
/// no digits can be derived.
///
/// ```
/// use macos_bundler_release::version::derive_bundle_version;
///
/// assert_eq!(derive_bundle_version("1.3.0-beta.4").as_deref(), Some("13004"));
/// assert_eq!(derive_bundle_version("2.1.7").as_deref(), Some("217"));
/// assert_eq!(derive_bundle_version("nightly"), None);
/// ```
pub fn derive_bundle_version(version: &str) -> Option<String> {
    let version = strip_version_prefix(version);

    let mut digits = match semver::Version::parse(version) {
        Ok(v) => {
            let mut out = format!("{}{}{}", v.major, v.minor, v.patch);
            if let Some(n) = prerelease_number(v.pre.as_str()) {
                out.push_str(&format!("{n:02}"));
            }
            out
        }
        Err(_) => {
            // Not semver: keep whatever digits precede the first '-'
            let core = version.split('-').next().unwrap_or_default();
            let mut out: String = core.chars().filter(char::is_ascii_digit).collect();
            if let Some((_, pre)) = version.split_once('-')
                && let Some(n) = prerelease_number(pre)
            {
                out.push_str(&format!("{n:02}"));
            }
            out
        }
    };

    digits.retain(|c| c.is_ascii_digit());
    (!digits.is_empty()).then_some(digits)
}

/// Number of a recognized `<label>.<N>` pre-release, if any.
fn prerelease_number(pre: &str) -> Option<u64> {
    let (label, number) = pre.split_once('.')?;
    if !PRERELEASE_LABELS.contains(&label.to_ascii_lowercase().as_str()) {
        return None;
    }
    number.parse().ok()
}

/// Compare two digits-only bundle versions numerically.
///
/// Leading zeros are ignored and arbitrarily long values are supported.
pub fn compare_bundle_versions(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::tools::{RecordingRunner, ToolOutput};

    #[test]
    fn test_tag_with_prerelease() {
        let v = ResolvedVersion::from_raw("v1.3.0-beta.4", VersionSource::GitTag);
        assert_eq!(v.version, "1.3.0-beta.4");
        assert_eq!(v.bundle_version, "13004");
        assert!(!v.bundle_version_is_fallback);
    }

    #[test]
    fn test_release_versions() {
        assert_eq!(derive_bundle_version("2.1.7").as_deref(), Some("217"));
        assert_eq!(derive_bundle_version("0.9.12").as_deref(), Some("0912"));
        assert_eq!(derive_bundle_version("1.0.0-rc.12").as_deref(), Some("10012"));
        assert_eq!(derive_bundle_version("1.0.0-alpha.1").as_deref(), Some("10001"));
    }

    #[test]
    fn test_unrecognized_prerelease_label_is_dropped() {
        assert_eq!(derive_bundle_version("1.2.3-dev.7").as_deref(), Some("123"));
        assert_eq!(derive_bundle_version("1.2.3-beta").as_deref(), Some("123"));
    }

    #[test]
    fn test_non_semver_falls_back_to_digits() {
        assert_eq!(derive_bundle_version("1.4").as_deref(), Some("14"));
        assert_eq!(derive_bundle_version("1.4-beta.2").as_deref(), Some("1402"));
        assert_eq!(derive_bundle_version("nightly"), None);
        assert_eq!(derive_bundle_version(""), None);
    }

    #[test]
    fn test_fallback_placeholder_is_flagged() {
        let v = ResolvedVersion::from_raw("nightly", VersionSource::Override);
        assert_eq!(v.bundle_version, FALLBACK_BUNDLE_VERSION);
        assert!(v.bundle_version_is_fallback);
    }

    #[test]
    fn test_bundle_version_is_deterministic_and_digits_only() {
        for major in 0..4 {
            for minor in [0, 1, 9, 10] {
                for patch in [0, 3, 11] {
                    for suffix in ["", "-alpha.1", "-beta.4", "-rc.10", "-preview.2"] {
                        let version = format!("{major}.{minor}.{patch}{suffix}");
                        let first = derive_bundle_version(&version).unwrap();
                        let second = derive_bundle_version(&version).unwrap();
                        assert_eq!(first, second);
                        assert!(first.chars().all(|c| c.is_ascii_digit()), "{version} -> {first}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_compare_bundle_versions() {
        assert_eq!(compare_bundle_versions("13004", "13003"), Ordering::Greater);
        assert_eq!(compare_bundle_versions("200", "1100"), Ordering::Less);
        assert_eq!(compare_bundle_versions("0912", "912"), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_override_wins_over_git() {
        let runner = RecordingRunner::new();
        let v = resolve_version(&runner, Some("v2.0.0"), Path::new("."))
            .await
            .unwrap();
        assert_eq!(v.version, "2.0.0");
        assert_eq!(v.source, VersionSource::Override);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_git_tag_is_used() {
        let runner =
            RecordingRunner::new().respond_to("git", "describe", ToolOutput::ok("v1.3.0-beta.4\n"));
        let v = resolve_version(&runner, None, Path::new(".")).await.unwrap();
        assert_eq!(v.version, "1.3.0-beta.4");
        assert_eq!(v.bundle_version, "13004");
        assert_eq!(v.source, VersionSource::GitTag);
    }

    #[tokio::test]
    async fn test_missing_tag_defaults() {
        let runner = RecordingRunner::new().respond_to(
            "git",
            "describe",
            ToolOutput::failed(128, "fatal: No names found"),
        );
        let v = resolve_version(&runner, None, Path::new(".")).await.unwrap();
        assert_eq!(v.version, DEFAULT_VERSION);
        assert_eq!(v.source, VersionSource::Default);
        assert_eq!(v.bundle_version, "000");
    }
}
