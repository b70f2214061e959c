//! # macos_bundler_release
//!
//! Release pipeline for a macOS menu-bar application: universal binaries,
//! `.app` assembly, code signing, disk image, notarization and checksum.
//!
//! ## Usage
//!
//! ```bash
//! macos_bundler_release release                  # local build, ad-hoc signed
//! ENABLE_SIGNING=1 macos_bundler_release release # Developer ID, notarized
//! macos_bundler_release version                  # resolved version numbers
//! macos_bundler_release package-plugin plugins/editor
//! ```
//!
//! Every external program is invoked through
//! [`bundler::CommandRunner`], so the pipeline can be driven against a
//! [`bundler::RecordingRunner`] in tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod version;

pub use bundler::{ArtifactState, Pipeline, Step};
pub use cli::Args;
pub use config::{PipelineOptions, ProjectConfig};
pub use error::{ConfigError, ReleaseError, Result};
pub use version::{ResolvedVersion, resolve_version};
