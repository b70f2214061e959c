//! Top-level error types for macos_bundler_release.
//!
//! Pipeline steps fail with [`crate::bundler::Error`]; this module wraps
//! them together with configuration and I/O failures and attaches
//! actionable recovery suggestions.

use crate::bundler::Error as BundlerError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline step errors
    #[error("{0}")]
    Bundler(#[from] BundlerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// `release.toml` errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {reason}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error text
        reason: String,
    },

    /// File parsed but is not a valid configuration
    #[error("invalid {path}: {reason}")]
    Invalid {
        /// Config file path
        path: PathBuf,
        /// What is wrong
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Config(ConfigError::Read { .. }) => vec![
                "Run from the project root or pass --config <path>".to_string(),
                "Create release.toml in the project root".to_string(),
            ],
            ReleaseError::Config(ConfigError::Invalid { .. }) => vec![
                "Fix the reported key in release.toml; unknown keys are rejected".to_string(),
            ],
            ReleaseError::Bundler(e) => bundler_suggestions(e),
            _ => vec![],
        }
    }
}

fn bundler_suggestions(error: &BundlerError) -> Vec<String> {
    match error {
        BundlerError::Context(_, inner) => bundler_suggestions(inner),
        BundlerError::MissingInput { .. } => vec![
            "Run the build step first (omit --skip-build)".to_string(),
            "Check the paths in release.toml; they are relative to the project root".to_string(),
        ],
        BundlerError::VersionMismatch { .. } => vec![
            "Bump the plugin manifest or the version manifest so both agree".to_string(),
        ],
        BundlerError::VersionRegression { .. } => vec![
            "Tag a higher version, or drop --strict-versions to only warn".to_string(),
        ],
        BundlerError::NoSigningIdentity { .. } => vec![
            "Install a Developer ID Application certificate in the login keychain".to_string(),
            "In CI, set APPLE_CERTIFICATE and APPLE_CERTIFICATE_PASSWORD".to_string(),
            "Check: security find-identity -v -p codesigning".to_string(),
        ],
        BundlerError::SignatureOrder { .. } => vec![
            "Re-run signing; nested code must be signed before the enclosing bundle".to_string(),
        ],
        BundlerError::MissingCredentials { .. } => vec![
            "Export APPLE_ID, APPLE_TEAM_ID and APPLE_APP_PASSWORD".to_string(),
            "Or export APPLE_API_KEY, APPLE_API_ISSUER and APPLE_API_KEY_PATH".to_string(),
        ],
        BundlerError::NotarizationRejected { id, .. } => vec![format!(
            "Inspect the log again with: xcrun notarytool log {id} <credentials>"
        )],
        BundlerError::NotarizationTimeout { .. } => vec![
            "Check submission status with: xcrun notarytool history <credentials>".to_string(),
        ],
        BundlerError::ToolNotFound { .. } => {
            vec!["Install Xcode Command Line Tools: xcode-select --install".to_string()]
        }
        _ => vec![],
    }
}
