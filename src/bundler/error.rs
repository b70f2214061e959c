//! Error types for pipeline steps.
//!
//! Provides contextual error chaining, filesystem errors that carry the
//! offending path, and one variant per fatal condition the release pipeline
//! can hit (missing inputs, version mismatches, signing and notarization
//! failures).
//!
//! # Example
//!
//! ```no_run
//! use macos_bundler_release::bundler::error::{Context, ErrorExt, Result};
//! use std::path::Path;
//!
//! fn read_manifest(path: &Path) -> Result<serde_json::Value> {
//!     let text = std::fs::read_to_string(path).fs_context("reading manifest", path)?;
//!     let value = serde_json::from_str(&text)
//!         .map_err(Into::into)
//!         .context("parsing manifest JSON")?;
//!     Ok(value)
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by pipeline steps.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Operation being performed (e.g., "copying executable")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// An external program could not be spawned.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command line that failed to start
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// An external program ran and exited unsuccessfully.
    #[error("command `{command}` exited with {code}: {stderr}")]
    CommandStatus {
        /// Command line that was run
        command: String,
        /// Exit code, or "signal" when terminated by a signal
        code: String,
        /// Captured standard error (trimmed)
        stderr: String,
    },

    /// A required external program is not on PATH.
    #[error("required tool `{tool}` not found in PATH ({hint})")]
    ToolNotFound {
        /// Program name
        tool: String,
        /// Installation hint
        hint: &'static str,
    },

    /// A required input file or directory is absent.
    #[error("required {what} not found: {path}")]
    MissingInput {
        /// Human description of the input ("version manifest", "icon", ...)
        what: String,
        /// Path that was expected
        path: PathBuf,
    },

    /// A plugin's self-declared version disagrees with the version manifest.
    #[error(
        "version mismatch for plugin '{plugin}': {plugin_manifest} declares {plugin_version}, \
         but {version_manifest} field '{field}' is {manifest_version}"
    )]
    VersionMismatch {
        /// Plugin name
        plugin: String,
        /// Plugin manifest path
        plugin_manifest: PathBuf,
        /// Version declared by the plugin
        plugin_version: String,
        /// Central version manifest path
        version_manifest: PathBuf,
        /// Field looked up in the version manifest
        field: String,
        /// Version recorded in the version manifest
        manifest_version: String,
    },

    /// The numeric bundle version would go backwards.
    #[error(
        "bundle version regression: new CFBundleVersion {new} is lower than existing {previous}; \
         the update feed would not offer this build"
    )]
    VersionRegression {
        /// Bundle version of the bundle being replaced
        previous: String,
        /// Bundle version being written
        new: String,
    },

    /// No usable Developer ID identity in the keychain.
    #[error("no '{class}' signing identity found in the keychain{filter}")]
    NoSigningIdentity {
        /// Certificate class searched for
        class: &'static str,
        /// Description of an additional filter, if any
        filter: String,
    },

    /// Signatures were applied out of leaf-to-root order.
    #[error("signature order invalid, resign leaf-to-root: {}", offenders.join(", "))]
    SignatureOrder {
        /// Targets whose seal is stale or missing
        offenders: Vec<String>,
    },

    /// Required credentials are missing from the environment.
    #[error("missing notarization credentials: set {}", missing.join(", "))]
    MissingCredentials {
        /// Environment variables that must be set
        missing: Vec<String>,
    },

    /// Notarization returned a verdict other than `Accepted`.
    #[error("notarization {status} (submission {id})")]
    NotarizationRejected {
        /// Verdict reported by the service
        status: String,
        /// Submission identifier
        id: String,
    },

    /// Notarization did not reach a verdict in time.
    #[error("notarization did not finish within {minutes} minutes")]
    NotarizationTimeout {
        /// Timeout that elapsed
        minutes: u64,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a directory tree.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// ZIP archive creation error.
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error.
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// Property list read/write error.
    #[error("{0}")]
    Plist(#[from] plist::Error),

    /// Regular expression error.
    #[error("{0}")]
    RegexError(#[from] regex::Error),

    /// Base64 decoding error.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the bundler [`Error`].
/// Works with both `Result<T, Error>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError(format!($msg)))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
