//! External tool invocation.
//!
//! Every program the pipeline shells out to (`cargo`, `lipo`, `codesign`,
//! `security`, `hdiutil`, `xcrun`, `git`, ...) goes through a
//! [`CommandRunner`]. [`SystemRunner`] spawns real processes;
//! [`RecordingRunner`] records invocations and replays scripted output so
//! the pipeline can be driven without the macOS toolchain.

use crate::bundler::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single external command line.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments, already UTF-8
    pub args: Vec<String>,
    /// Working directory, if not inherited
    pub cwd: Option<PathBuf>,
    /// Indices into `args` that are never displayed
    secrets: Vec<usize>,
}

/// Placeholder shown for secret arguments.
pub const REDACTED: &str = "****";

impl Invocation {
    /// Start a new invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            secrets: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that is passed to the program but shown as
    /// [`REDACTED`] in logs and errors.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secrets.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Mask every secret argument that occurs in `text`.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .map(|&i| self.args[i].as_str())
            .filter(|secret| !secret.is_empty())
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }

    /// Append a path argument. Fails on non-UTF-8 paths.
    pub fn path_arg(self, path: &Path) -> Result<Self> {
        let s = path_str(path)?;
        Ok(self.arg(s))
    }

    /// Run in `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// True if the argument list contains `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secrets.contains(&i) {
                write!(f, " {REDACTED}")?;
            } else if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.to_string())
            .field("cwd", &self.cwd)
            .finish()
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`Error::CommandStatus`].
    pub fn into_result(self, invocation: &Invocation) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandStatus {
                command: invocation.to_string(),
                code: self
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: invocation.redact(self.stderr.trim()),
            })
        }
    }
}

/// Runs external commands on behalf of pipeline steps.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run the invocation to completion and capture its output.
    ///
    /// A non-zero exit status is *not* an error at this level; callers decide
    /// whether the failure is fatal via [`ToolOutput::into_result`].
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;

    /// Run and require a zero exit status.
    async fn run_checked(&self, invocation: &Invocation) -> Result<ToolOutput> {
        self.run(invocation).await?.into_result(invocation)
    }

    /// Check that `program` can be found before a step relies on it.
    fn require_tool(&self, program: &str, hint: &'static str) -> Result<()>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        log::debug!("$ {}", invocation);

        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|error| Error::CommandFailed {
            command: invocation.to_string(),
            error,
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn require_tool(&self, program: &str, hint: &'static str) -> Result<()> {
        match which::which(program) {
            Ok(path) => {
                log::debug!("Found {} at {}", program, path.display());
                Ok(())
            }
            Err(_) => Err(Error::ToolNotFound {
                tool: program.to_string(),
                hint,
            }),
        }
    }
}

struct Script {
    program: String,
    first_arg: Option<String>,
    output: ToolOutput,
}

/// Records invocations and replays scripted outputs.
///
/// Responses are matched by program name and, optionally, the first
/// argument. Each scripted response is used once, in the order it was
/// added; unmatched invocations succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    scripts: Mutex<VecDeque<Script>>,
    missing_tools: Vec<String>,
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("calls", &self.calls().len())
            .finish()
    }
}

impl RecordingRunner {
    /// Create an empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next output for `program` (any arguments).
    pub fn respond(self, program: &str, output: ToolOutput) -> Self {
        self.push(program, None, output)
    }

    /// Script the next output for `program <first_arg> ...`.
    pub fn respond_to(self, program: &str, first_arg: &str, output: ToolOutput) -> Self {
        self.push(program, Some(first_arg.to_string()), output)
    }

    /// Pretend `program` is not installed.
    pub fn without_tool(mut self, program: &str) -> Self {
        self.missing_tools.push(program.to_string());
        self
    }

    fn push(self, program: &str, first_arg: Option<String>, output: ToolOutput) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(Script {
                program: program.to_string(),
                first_arg,
                output,
            });
        }
        self
    }

    /// All invocations seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Invocations of one program, in order.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| Error::GenericError("recording runner poisoned".into()))?;
        let position = scripts.iter().position(|s| {
            s.program == invocation.program
                && s.first_arg
                    .as_deref()
                    .is_none_or(|a| invocation.args.first().map(String::as_str) == Some(a))
        });

        Ok(match position.and_then(|p| scripts.remove(p)) {
            Some(script) => script.output,
            None => ToolOutput::ok(""),
        })
    }

    fn require_tool(&self, program: &str, hint: &'static str) -> Result<()> {
        if self.missing_tools.iter().any(|t| t == program) {
            return Err(Error::ToolNotFound {
                tool: program.to_string(),
                hint,
            });
        }
        Ok(())
    }
}

/// Convert a path to `&str`, failing on non-UTF-8 paths.
pub fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        Error::GenericError(format!(
            "path contains non-UTF8 characters: {}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_quotes_spaces() {
        let inv = Invocation::new("codesign")
            .args(["--sign", "Developer ID Application: Example (ABCDE12345)"])
            .arg("App.app");
        assert_eq!(
            inv.to_string(),
            "codesign --sign \"Developer ID Application: Example (ABCDE12345)\" App.app"
        );
    }

    #[test]
    fn test_into_result_reports_stderr() {
        let inv = Invocation::new("hdiutil").arg("create");
        let err = ToolOutput::failed(1, "  resource busy\n")
            .into_result(&inv)
            .unwrap_err();
        match err {
            Error::CommandStatus { code, stderr, .. } => {
                assert_eq!(code, "1");
                assert_eq!(stderr, "resource busy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_secret_args_are_masked_in_errors() {
        let inv = Invocation::new("security")
            .args(["unlock-keychain", "-p"])
            .secret_arg("hunter2")
            .arg("/tmp/release.keychain-db");
        assert_eq!(inv.args[2], "hunter2");
        assert_eq!(
            inv.to_string(),
            "security unlock-keychain -p **** /tmp/release.keychain-db"
        );

        let err = ToolOutput::failed(51, "bad password hunter2")
            .into_result(&inv)
            .unwrap_err()
            .to_string();
        assert!(!err.contains("hunter2"), "{err}");
        assert!(err.contains("-p ****"));
    }

    #[tokio::test]
    async fn test_recording_runner_matches_first_arg() {
        let runner = RecordingRunner::new()
            .respond_to("xcrun", "stapler", ToolOutput::failed(65, "no ticket"))
            .respond_to("xcrun", "notarytool", ToolOutput::ok("{}"));

        let submit = Invocation::new("xcrun").args(["notarytool", "submit"]);
        let staple = Invocation::new("xcrun").args(["stapler", "staple"]);

        assert_eq!(runner.run(&submit).await.unwrap().stdout, "{}");
        assert!(!runner.run(&staple).await.unwrap().success());
        // Script consumed; falls back to success
        assert!(runner.run(&staple).await.unwrap().success());
        assert_eq!(runner.calls_to("xcrun").len(), 3);
    }
}
