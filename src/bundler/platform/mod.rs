//! Platform-specific packaging.
//!
//! Only macOS is targeted. The modules are compiled on every host so the
//! pipeline can be driven (and tested) through a scripted
//! [`CommandRunner`](crate::bundler::tools::CommandRunner) anywhere; the
//! real tools (`lipo`, `codesign`, `hdiutil`, `xcrun`) only exist on macOS.

pub mod macos;
