//! macOS application bundles, signing, disk images and notarization.
//!
//! # Build Requirements
//!
//! | Step | Required Tools | Notes |
//! |------|----------------|-------|
//! | build | `cargo`, `lipo` | both Apple targets installed via rustup |
//! | assemble | `install_name_tool` | only with an update framework |
//! | sign | `codesign`, `security` | Developer ID only for release signing |
//! | dmg | `hdiutil` | Built into macOS |
//! | notarize | `xcrun notarytool`, `xcrun stapler` | Xcode 13+ |
//!
//! # Output Location
//!
//! - `target/bundle/MyApp.app` - Application bundle
//! - `dist/MyApp-1.0.0.dmg` - Disk image
//! - `dist/MyApp-1.0.0.dmg.sha256` - Checksum
//!
//! Both locations are configurable in `release.toml`:
//!
//! ```toml
//! bundle_dir = "target/bundle"
//! dist_dir = "dist"
//! minimum_system_version = "13.0"
//! ```

pub mod app;
pub mod dmg;
pub mod info_plist;
pub mod keychain;
pub mod notarize;
pub mod sign;
pub mod universal;
