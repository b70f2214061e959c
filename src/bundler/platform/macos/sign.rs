//! macOS code signing.
//!
//! A bundle is signed leaf-to-root: nested update-framework components,
//! then frameworks, then helper executables, then the bundle itself. Signing
//! an outer target seals the hashes of everything inside it, so signing a
//! nested target afterwards invalidates the outer seal. [`SigningSession`]
//! tracks that and refuses to verify a bundle whose seals are stale.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::macos::app::AppBundle,
    tools::{CommandRunner, Invocation},
};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Certificate class required for distribution outside the App Store.
pub const DEVELOPER_ID_CLASS: &str = "Developer ID Application";

/// What a signing target is, in signing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetKind {
    /// XPC service, `Autoupdate` or `Updater.app` inside a framework
    FrameworkComponent,
    /// `Contents/Frameworks/*.framework`
    Framework,
    /// Helper executable in `Contents/MacOS`
    Helper,
    /// The `.app` itself (seals the main executable and resources)
    Bundle,
}

/// One path to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningTarget {
    /// Path passed to `codesign`
    pub path: PathBuf,
    /// Target kind
    pub kind: TargetKind,
}

/// Ordered list of targets, leaf-to-root.
#[derive(Debug, Clone)]
pub struct SigningPlan {
    targets: Vec<SigningTarget>,
}

impl SigningPlan {
    /// Compute the plan for an assembled bundle.
    pub fn for_bundle(bundle: &AppBundle) -> Result<Self> {
        let mut targets = Vec::new();

        for framework in &bundle.frameworks {
            for component in framework_components(framework)? {
                targets.push(SigningTarget {
                    path: component,
                    kind: TargetKind::FrameworkComponent,
                });
            }
            targets.push(SigningTarget {
                path: framework.clone(),
                kind: TargetKind::Framework,
            });
        }
        for helper in &bundle.helpers {
            targets.push(SigningTarget {
                path: helper.clone(),
                kind: TargetKind::Helper,
            });
        }
        targets.push(SigningTarget {
            path: bundle.path.clone(),
            kind: TargetKind::Bundle,
        });

        // Kind first, then deeper paths before shallower ones
        targets.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| b.path.components().count().cmp(&a.path.components().count()))
        });

        Ok(Self { targets })
    }

    /// Build a plan from explicit targets, keeping their order.
    pub fn from_targets(targets: Vec<SigningTarget>) -> Self {
        Self { targets }
    }

    /// Targets in signing order.
    pub fn targets(&self) -> &[SigningTarget] {
        &self.targets
    }
}

/// Nested code inside an update framework that carries its own signature.
fn framework_components(framework: &Path) -> Result<Vec<PathBuf>> {
    let versions = framework.join("Versions");
    let mut found = Vec::new();
    if !versions.is_dir() {
        return Ok(found);
    }

    for entry in std::fs::read_dir(&versions).fs_context("listing framework versions", &versions)? {
        let entry = entry.fs_context("listing framework versions", &versions)?;
        // Skip the `Current` symlink so each version is signed once
        if entry
            .file_type()
            .fs_context("reading file type", entry.path())?
            .is_symlink()
        {
            continue;
        }
        let version = entry.path();

        let xpc_dir = version.join("XPCServices");
        if xpc_dir.is_dir() {
            let mut services = Vec::new();
            for xpc in std::fs::read_dir(&xpc_dir).fs_context("listing XPC services", &xpc_dir)? {
                let xpc = xpc.fs_context("listing XPC services", &xpc_dir)?.path();
                if xpc.extension().is_some_and(|e| e == "xpc") {
                    services.push(xpc);
                }
            }
            services.sort();
            found.extend(services);
        }
        for name in ["Autoupdate", "Updater.app"] {
            let path = version.join(name);
            if path.exists() {
                found.push(path);
            }
        }
    }

    Ok(found)
}

/// Seal state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    /// Not signed yet
    Unsigned,
    /// Signed; the number orders signatures within the session
    Signed(u32),
    /// Signed, but something inside was re-signed afterwards
    Stale,
}

/// Progress of a signing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SigningPhase {
    /// Nothing signed
    Unsigned,
    /// All frameworks and their components signed
    FrameworksSigned,
    /// Helpers signed too
    HelpersSigned,
    /// Bundle sealed
    BundleSigned,
    /// `codesign --verify` passed
    Verified,
}

/// Tracks which targets are signed, in which order.
#[derive(Debug, Clone)]
pub struct SigningSession {
    plan: SigningPlan,
    states: Vec<SealState>,
    next_seq: u32,
    verified: bool,
}

impl SigningSession {
    /// Start a session with every target unsigned.
    pub fn new(plan: SigningPlan) -> Self {
        let states = vec![SealState::Unsigned; plan.targets.len()];
        Self {
            plan,
            states,
            next_seq: 1,
            verified: false,
        }
    }

    /// The plan being executed.
    pub fn plan(&self) -> &SigningPlan {
        &self.plan
    }

    /// State of the target at `path`.
    pub fn state_of(&self, path: &Path) -> Option<SealState> {
        self.plan
            .targets
            .iter()
            .position(|t| t.path == path)
            .map(|i| self.states[i])
    }

    /// Record that `path` has just been signed.
    ///
    /// Every already-signed target that contains `path` becomes stale.
    pub fn record_signed(&mut self, path: &Path) -> Result<()> {
        let index = self
            .plan
            .targets
            .iter()
            .position(|t| t.path == path)
            .ok_or_else(|| {
                Error::GenericError(format!("{} is not part of the signing plan", path.display()))
            })?;

        for (i, target) in self.plan.targets.iter().enumerate() {
            if i != index
                && path.starts_with(&target.path)
                && matches!(self.states[i], SealState::Signed(_))
            {
                log::debug!("Seal of {} is now stale", target.path.display());
                self.states[i] = SealState::Stale;
            }
        }

        self.states[index] = SealState::Signed(self.next_seq);
        self.next_seq += 1;
        self.verified = false;
        Ok(())
    }

    /// Derived overall phase.
    pub fn phase(&self) -> SigningPhase {
        if self.verified {
            return SigningPhase::Verified;
        }
        let all_signed = |kinds: &[TargetKind]| {
            self.plan
                .targets
                .iter()
                .zip(&self.states)
                .filter(|(t, _)| kinds.contains(&t.kind))
                .all(|(_, s)| matches!(s, SealState::Signed(_)))
        };

        if !self.states.iter().any(|s| matches!(s, SealState::Signed(_))) {
            SigningPhase::Unsigned
        } else if !all_signed(&[TargetKind::FrameworkComponent, TargetKind::Framework]) {
            SigningPhase::Unsigned
        } else if !all_signed(&[TargetKind::Helper]) {
            SigningPhase::FrameworksSigned
        } else if !all_signed(&[TargetKind::Bundle]) {
            SigningPhase::HelpersSigned
        } else {
            SigningPhase::BundleSigned
        }
    }

    /// Fail with [`Error::SignatureOrder`] unless every target holds a
    /// current signature.
    pub fn check_order(&self) -> Result<()> {
        let offenders: Vec<String> = self
            .plan
            .targets
            .iter()
            .zip(&self.states)
            .filter_map(|(t, s)| match s {
                SealState::Signed(_) => None,
                SealState::Unsigned => Some(format!("{} (unsigned)", t.path.display())),
                SealState::Stale => Some(format!("{} (stale)", t.path.display())),
            })
            .collect();

        if offenders.is_empty() {
            Ok(())
        } else {
            Err(Error::SignatureOrder { offenders })
        }
    }

    fn bundle_path(&self) -> Option<&Path> {
        self.plan
            .targets
            .iter()
            .find(|t| t.kind == TargetKind::Bundle)
            .map(|t| t.path.as_path())
    }
}

/// How targets are signed.
#[derive(Debug, Clone)]
pub enum SigningMode {
    /// Local builds: `--sign -` with stable identifiers
    AdHoc {
        /// Bundle identifier; helpers get `<id>.<name>`
        bundle_identifier: String,
    },
    /// Distribution builds: hardened runtime and secure timestamp
    Release {
        /// Resolved identity name
        identity: String,
        /// Entitlements applied to the bundle
        entitlements: Option<PathBuf>,
    },
}

impl SigningMode {
    fn invocation(&self, target: &SigningTarget) -> Result<Invocation> {
        let mut inv = Invocation::new("codesign").arg("--force");
        match self {
            SigningMode::AdHoc { bundle_identifier } => {
                let identifier = match target.kind {
                    TargetKind::Bundle => bundle_identifier.clone(),
                    _ => {
                        let stem = target
                            .path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or("component");
                        format!("{bundle_identifier}.{stem}")
                    }
                };
                inv = inv.args(["--sign", "-", "--identifier"]).arg(identifier);
            }
            SigningMode::Release {
                identity,
                entitlements,
            } => {
                inv = inv
                    .args(["--options", "runtime", "--timestamp", "--sign"])
                    .arg(identity.as_str());
                if let (TargetKind::Bundle, Some(ent)) = (target.kind, entitlements) {
                    inv = inv.arg("--entitlements").path_arg(ent)?;
                }
            }
        }
        inv.path_arg(&target.path)
    }
}

/// Find a Developer ID identity with `security find-identity`.
///
/// `filter` narrows the match to identities whose name or hash contains it.
pub async fn resolve_identity<R: CommandRunner>(
    runner: &R,
    filter: Option<&str>,
) -> Result<String> {
    runner.require_tool("security", "macOS only")?;
    let output = runner
        .run_checked(
            &Invocation::new("security").args(["find-identity", "-v", "-p", "codesigning"]),
        )
        .await?;

    let identities = parse_identities(&output.stdout)?;
    identities
        .into_iter()
        .filter(|(_, name)| name.starts_with(DEVELOPER_ID_CLASS))
        .find(|(hash, name)| {
            filter.is_none_or(|f| name.contains(f) || hash.eq_ignore_ascii_case(f))
        })
        .map(|(_, name)| name)
        .ok_or_else(|| Error::NoSigningIdentity {
            class: DEVELOPER_ID_CLASS,
            filter: filter
                .map(|f| format!(" matching '{f}'"))
                .unwrap_or_default(),
        })
}

/// `(hash, name)` pairs from `security find-identity` output.
fn parse_identities(output: &str) -> Result<Vec<(String, String)>> {
    let re = Regex::new(r#"^\s*\d+\)\s+([0-9A-Fa-f]{40})\s+"([^"]+)""#)?;
    Ok(output
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect())
}

/// Sign every target of `plan` in order and return the session.
pub async fn sign_plan<R: CommandRunner>(
    runner: &R,
    plan: SigningPlan,
    mode: &SigningMode,
) -> Result<SigningSession> {
    runner.require_tool("codesign", "install Xcode Command Line Tools")?;
    let mut session = SigningSession::new(plan);

    let targets = session.plan().targets().to_vec();
    for target in &targets {
        log::info!("Signing {}", target.path.display());
        runner.run_checked(&mode.invocation(target)?).await?;
        session.record_signed(&target.path)?;
    }
    Ok(session)
}

/// Ad-hoc sign a bundle and verify it.
pub async fn sign_adhoc<R: CommandRunner>(
    runner: &R,
    bundle: &AppBundle,
    bundle_identifier: &str,
) -> Result<SigningSession> {
    log::info!("Ad-hoc signing {}", bundle.path.display());
    let mode = SigningMode::AdHoc {
        bundle_identifier: bundle_identifier.to_string(),
    };
    let mut session = sign_plan(runner, SigningPlan::for_bundle(bundle)?, &mode).await?;
    verify(runner, &mut session, false).await?;
    Ok(session)
}

/// Sign a bundle with a Developer ID identity and verify it.
pub async fn sign_release<R: CommandRunner>(
    runner: &R,
    bundle: &AppBundle,
    identity: &str,
    entitlements: Option<&Path>,
) -> Result<SigningSession> {
    log::info!("Signing {} as '{}'", bundle.path.display(), identity);
    let mode = SigningMode::Release {
        identity: identity.to_string(),
        entitlements: entitlements.map(Path::to_path_buf),
    };
    let mut session = sign_plan(runner, SigningPlan::for_bundle(bundle)?, &mode).await?;
    verify(runner, &mut session, true).await?;
    Ok(session)
}

/// Verify the bundle signature.
///
/// Stale or missing seals fail before `codesign` runs. With `gatekeeper`,
/// `spctl --assess` runs afterwards; its failure is only a warning.
pub async fn verify<R: CommandRunner>(
    runner: &R,
    session: &mut SigningSession,
    gatekeeper: bool,
) -> Result<()> {
    session.check_order()?;
    let bundle = session
        .bundle_path()
        .ok_or_else(|| Error::GenericError("signing plan has no bundle".into()))?
        .to_path_buf();

    runner
        .run_checked(
            &Invocation::new("codesign")
                .args(["--verify", "--deep", "--strict", "--verbose=2"])
                .path_arg(&bundle)?,
        )
        .await?;
    session.verified = true;
    log::info!("✓ Signature verified: {}", bundle.display());

    if gatekeeper {
        let assess = Invocation::new("spctl")
            .args(["--assess", "--type", "execute", "-vv"])
            .path_arg(&bundle)?;
        match runner.run(&assess).await {
            Ok(out) if out.success() => log::info!("✓ Gatekeeper accepted {}", bundle.display()),
            Ok(out) => log::warn!(
                "Gatekeeper assessment failed (expected before notarization): {}",
                out.stderr.trim()
            ),
            Err(e) => log::warn!("Gatekeeper assessment could not run: {}", e),
        }
    }
    Ok(())
}

/// Sign a disk image with the release identity.
pub async fn sign_image<R: CommandRunner>(runner: &R, image: &Path, identity: &str) -> Result<()> {
    runner.require_tool("codesign", "install Xcode Command Line Tools")?;
    log::info!("Signing {}", image.display());
    runner
        .run_checked(
            &Invocation::new("codesign")
                .args(["--force", "--timestamp", "--sign"])
                .arg(identity)
                .path_arg(image)?,
        )
        .await?;
    Ok(())
}
