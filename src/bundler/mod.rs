//! macOS release packaging.
//!
//! This module turns compiled executables into a distributable, signed and
//! notarized disk image:
//!
//! 1. universal binaries via `lipo`
//! 2. `.app` assembly with a generated `Info.plist`
//! 3. ad-hoc or Developer ID signing, leaf-to-root
//! 4. a compressed DMG
//! 5. notarization and stapling
//! 6. a `.sha256` checksum file
//!
//! # Configuration
//!
//! Packaging is configured via `release.toml` in the project root:
//!
//! ```toml
//! app_name = "Example"
//! bundle_identifier = "com.example.app"
//! main_executable = "example"
//! helpers = ["example-daemon"]
//! version_manifest = "versions.json"
//! ```
//!
//! # External tools
//!
//! Every program the steps run goes through a [`CommandRunner`];
//! [`SystemRunner`] spawns real processes and [`RecordingRunner`] replays
//! scripted output.

#![warn(missing_docs)]

mod builder;
pub mod checksum;
pub mod error;
pub mod platform;
pub mod plugin;
pub mod tools;
pub(crate) mod utils;

// Public re-exports
pub use builder::{ArtifactState, Pipeline, Step};
pub use error::{Error, Result};
pub use platform::macos::app::AppBundle;
pub use tools::{CommandRunner, Invocation, RecordingRunner, SystemRunner, ToolOutput};
