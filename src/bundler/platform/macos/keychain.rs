//! Temporary keychain for CI signing.
//!
//! CI runners have no Developer ID certificate installed. The certificate
//! arrives base64-encoded in the environment, is imported into a throwaway
//! keychain that is placed on the user search list, and the keychain is
//! deleted when the release command finishes.

use crate::bundler::{
    error::{ErrorExt, Result},
    tools::{CommandRunner, Invocation},
};
use crate::config::SigningCertificate;
use base64::Engine;
use std::path::{Path, PathBuf};

/// A keychain created for one release run.
#[derive(Debug)]
pub struct TemporaryKeychain {
    path: PathBuf,
    password: String,
    _dir: tempfile::TempDir,
}

impl TemporaryKeychain {
    /// Keychain file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the keychain, import `certificate` and add it to the search list.
    ///
    /// On failure after creation the keychain is deleted again.
    pub async fn import<R: CommandRunner>(
        runner: &R,
        certificate: &SigningCertificate,
    ) -> Result<Self> {
        runner.require_tool("security", "macOS only")?;

        let compact: String = certificate
            .p12_base64
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let p12 = base64::engine::general_purpose::STANDARD.decode(compact)?;

        let dir = tempfile::tempdir()
            .fs_context("creating keychain directory", std::env::temp_dir())?;
        let p12_path = dir.path().join("certificate.p12");
        tokio::fs::write(&p12_path, &p12)
            .await
            .fs_context("writing certificate", &p12_path)?;

        let keychain = Self {
            path: dir
                .path()
                .join(format!("release-{}.keychain-db", uuid::Uuid::new_v4().simple())),
            password: uuid::Uuid::new_v4().to_string(),
            _dir: dir,
        };

        log::info!("Importing signing certificate into {}", keychain.path.display());
        let sec = || Invocation::new("security");
        runner
            .run_checked(
                &sec()
                    .args(["create-keychain", "-p"])
                    .secret_arg(keychain.password.as_str())
                    .path_arg(&keychain.path)?,
            )
            .await?;

        if let Err(e) = keychain.populate(runner, &p12_path, &certificate.password).await {
            keychain.delete(runner).await;
            return Err(e);
        }
        Ok(keychain)
    }

    async fn populate<R: CommandRunner>(
        &self,
        runner: &R,
        p12: &Path,
        p12_password: &str,
    ) -> Result<()> {
        let sec = || Invocation::new("security");

        runner
            .run_checked(
                &sec()
                    .args(["set-keychain-settings", "-lut", "21600"])
                    .path_arg(&self.path)?,
            )
            .await?;
        runner
            .run_checked(
                &sec()
                    .args(["unlock-keychain", "-p"])
                    .secret_arg(self.password.as_str())
                    .path_arg(&self.path)?,
            )
            .await?;
        runner
            .run_checked(
                &sec()
                    .arg("import")
                    .path_arg(p12)?
                    .arg("-k")
                    .path_arg(&self.path)?
                    .arg("-P")
                    .secret_arg(p12_password)
                    .args(["-T", "/usr/bin/codesign"]),
            )
            .await?;
        runner
            .run_checked(
                &sec()
                    .args([
                        "set-key-partition-list",
                        "-S",
                        "apple-tool:,apple:,codesign:",
                        "-s",
                        "-k",
                    ])
                    .secret_arg(self.password.as_str())
                    .path_arg(&self.path)?,
            )
            .await?;

        let existing = runner
            .run_checked(&sec().args(["list-keychains", "-d", "user"]))
            .await?;
        let mut search = sec().args(["list-keychains", "-d", "user", "-s"]).path_arg(&self.path)?;
        search = search.args(parse_keychain_list(&existing.stdout));
        runner.run_checked(&search).await?;

        Ok(())
    }

    /// Delete the keychain. Failures are logged, not returned.
    pub async fn delete<R: CommandRunner>(self, runner: &R) {
        let invocation = match Invocation::new("security")
            .arg("delete-keychain")
            .path_arg(&self.path)
        {
            Ok(inv) => inv,
            Err(e) => {
                log::warn!("Cannot delete temporary keychain: {}", e);
                return;
            }
        };
        match runner.run_checked(&invocation).await {
            Ok(_) => log::debug!("Deleted temporary keychain {}", self.path.display()),
            Err(e) => log::warn!("Failed to delete temporary keychain: {}", e),
        }
    }
}

/// Paths from `security list-keychains` output (one quoted path per line).
fn parse_keychain_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|l| l.trim().trim_matches('"'))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
