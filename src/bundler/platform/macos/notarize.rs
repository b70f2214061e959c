//! Apple notarization of a disk image.
//!
//! The image is signed with the release identity, submitted with
//! `notarytool submit --wait`, and stapled once Apple accepts it. Any other
//! verdict fetches the submission log, prints it and fails; the image is left
//! unstapled.

use crate::bundler::{
    error::{Context, Error, Result},
    platform::macos::sign,
    tools::{CommandRunner, Invocation},
};
use crate::config::NotaryCredentials;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Minutes `notarytool` is allowed to wait for a verdict.
pub const NOTARY_TIMEOUT_MINUTES: u64 = 30;

/// Extra time granted to the process beyond its own `--timeout`.
const TIMEOUT_GRACE: Duration = Duration::from_secs(120);

/// Verdict that allows stapling.
pub const ACCEPTED: &str = "Accepted";

/// `notarytool submit --output-format json` result.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Submission {
    /// Submission identifier
    pub id: String,
    /// `Accepted`, `Invalid`, `Rejected`, `In Progress`
    pub status: String,
    /// Free-form message from the service
    #[serde(default)]
    pub message: Option<String>,
}

impl Submission {
    /// Whether the image may be stapled.
    pub fn is_accepted(&self) -> bool {
        self.status == ACCEPTED
    }
}

/// Sign, submit, wait and staple.
pub async fn notarize<R: CommandRunner>(
    runner: &R,
    image: &Path,
    identity: &str,
    credentials: &NotaryCredentials,
) -> Result<Submission> {
    notarize_with_timeout(
        runner,
        image,
        identity,
        credentials,
        Duration::from_secs(NOTARY_TIMEOUT_MINUTES * 60) + TIMEOUT_GRACE,
    )
    .await
}

async fn notarize_with_timeout<R: CommandRunner>(
    runner: &R,
    image: &Path,
    identity: &str,
    credentials: &NotaryCredentials,
    timeout: Duration,
) -> Result<Submission> {
    runner.require_tool("xcrun", "install Xcode Command Line Tools")?;

    sign::sign_image(runner, image, identity).await?;

    log::info!("Submitting {} for notarization (this can take several minutes)", image.display());
    let submit = credentials
        .notarytool_auth(Invocation::new("xcrun").args(["notarytool", "submit"]).path_arg(image)?)
        .args(["--wait", "--timeout"])
        .arg(format!("{NOTARY_TIMEOUT_MINUTES}m"))
        .args(["--output-format", "json"]);

    let output = tokio::time::timeout(timeout, runner.run(&submit))
        .await
        .map_err(|_| Error::NotarizationTimeout {
            minutes: timeout.as_secs() / 60,
        })??;

    // notarytool exits non-zero for some verdicts but still prints JSON
    let submission: Submission = match serde_json::from_str(output.stdout.trim()) {
        Ok(s) => s,
        Err(parse_err) => {
            output.into_result(&submit)?;
            crate::bail!("unexpected notarytool output: {parse_err}");
        }
    };

    log::info!(
        "Notarization {} for submission {}",
        submission.status,
        submission.id
    );

    if !submission.is_accepted() {
        print_submission_log(runner, &submission.id, credentials).await;
        return Err(Error::NotarizationRejected {
            status: submission.status,
            id: submission.id,
        });
    }

    runner
        .run_checked(&Invocation::new("xcrun").args(["stapler", "staple"]).path_arg(image)?)
        .await
        .context("stapling notarization ticket")?;
    runner
        .run_checked(&Invocation::new("xcrun").args(["stapler", "validate"]).path_arg(image)?)
        .await
        .context("validating stapled ticket")?;

    log::info!("✓ Notarized and stapled {}", image.display());
    Ok(submission)
}

/// Fetch and print the submission log. Best-effort.
async fn print_submission_log<R: CommandRunner>(
    runner: &R,
    id: &str,
    credentials: &NotaryCredentials,
) {
    let invocation =
        credentials.notarytool_auth(Invocation::new("xcrun").args(["notarytool", "log", id]));

    match runner.run(&invocation).await {
        Ok(out) if out.success() => {
            log::error!("Notarization log for {}:\n{}", id, out.stdout.trim_end())
        }
        Ok(out) => log::warn!("Could not fetch notarization log: {}", out.stderr.trim()),
        Err(e) => log::warn!("Could not fetch notarization log: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::tools::{RecordingRunner, ToolOutput};

    const IDENTITY: &str = "Developer ID Application: Example Corp (ABCDE12345)";

    fn creds() -> NotaryCredentials {
        NotaryCredentials::AppleId {
            apple_id: "dev@example.com".into(),
            team_id: "ABCDE12345".into(),
            password: "app-specific".into(),
        }
    }

    fn verdict(status: &str) -> ToolOutput {
        ToolOutput::ok(format!(
            r#"{{"id":"2efe2717-52ef-43a5-96dc-0797e4ca1041","status":"{status}","message":"Processing complete"}}"#
        ))
    }

    #[tokio::test]
    async fn test_accepted_is_stapled_and_validated() {
        let runner = RecordingRunner::new().respond_to("xcrun", "notarytool", verdict("Accepted"));

        let sub = notarize(&runner, Path::new("/dist/Example-1.0.0.dmg"), IDENTITY, &creds())
            .await
            .unwrap();
        assert!(sub.is_accepted());

        let codesign = runner.calls_to("codesign");
        assert_eq!(codesign.len(), 1);
        assert!(codesign[0].has_arg(IDENTITY));

        let xcrun = runner.calls_to("xcrun");
        assert_eq!(xcrun.len(), 3);
        assert!(xcrun[0].has_arg("--wait") && xcrun[0].has_arg("30m") && xcrun[0].has_arg("json"));
        assert_eq!(xcrun[1].args[..2], ["stapler", "staple"]);
        assert_eq!(xcrun[2].args[..2], ["stapler", "validate"]);
    }

    #[tokio::test]
    async fn test_invalid_fetches_log_and_never_staples() {
        let runner = RecordingRunner::new()
            .respond_to("xcrun", "notarytool", verdict("Invalid"))
            .respond_to("xcrun", "notarytool", ToolOutput::ok(r#"{"issues":[]}"#));

        let err = notarize(&runner, Path::new("/dist/Example-1.0.0.dmg"), IDENTITY, &creds())
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::NotarizationRejected { ref status, .. } if status == "Invalid")
        );
        let xcrun = runner.calls_to("xcrun");
        assert!(xcrun.iter().all(|c| c.args[0] != "stapler"));
        assert!(
            xcrun
                .iter()
                .any(|c| c.has_arg("log") && c.has_arg("2efe2717-52ef-43a5-96dc-0797e4ca1041"))
        );
    }

    #[tokio::test]
    async fn test_staple_failure_is_fatal() {
        let runner = RecordingRunner::new()
            .respond_to("xcrun", "notarytool", verdict("Accepted"))
            .respond_to("xcrun", "stapler", ToolOutput::failed(65, "Could not validate ticket"));

        let err = notarize(&runner, Path::new("/dist/Example-1.0.0.dmg"), IDENTITY, &creds())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stapling"));
    }

    #[tokio::test]
    async fn test_garbage_output_with_failure_reports_command() {
        let runner = RecordingRunner::new()
            .respond_to("xcrun", "notarytool", ToolOutput::failed(69, "HTTP 401"));

        let err = notarize(&runner, Path::new("/dist/Example-1.0.0.dmg"), IDENTITY, &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandStatus { ref stderr, .. } if stderr == "HTTP 401"));
        let message = err.to_string();
        assert!(message.contains("--password ****"), "{message}");
        assert!(!message.contains("app-specific"), "{message}");
    }

    struct StalledRunner(RecordingRunner);

    impl CommandRunner for StalledRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            if invocation.has_arg("submit") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.0.run(invocation).await
        }

        fn require_tool(&self, program: &str, hint: &'static str) -> Result<()> {
            self.0.require_tool(program, hint)
        }
    }

    #[tokio::test]
    async fn test_stalled_submission_times_out() {
        let runner = StalledRunner(RecordingRunner::new());

        let err = notarize_with_timeout(
            &runner,
            Path::new("/dist/Example-1.0.0.dmg"),
            IDENTITY,
            &creds(),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NotarizationTimeout { .. }));
    }
}
