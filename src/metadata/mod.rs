//! Version manifest and plugin manifest handling.
//!
//! The version manifest is a flat JSON object mapping component names to
//! version strings. Each bundled plugin declares its own `version` in a
//! JSON manifest; the two must agree before a bundle is assembled.

use crate::bundler::error::{Error, ErrorExt, Result};
use crate::config::{PluginConfig, ProjectConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The central JSON version manifest.
#[derive(Debug, Clone)]
pub struct VersionManifest {
    /// Where it was read from
    pub path: PathBuf,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl VersionManifest {
    /// Read and parse the manifest. Absence is a [`Error::MissingInput`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingInput {
                what: "version manifest".into(),
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).fs_context("reading version manifest", path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        match value {
            serde_json::Value::Object(fields) => Ok(Self {
                path: path.to_path_buf(),
                fields,
            }),
            _ => Err(Error::GenericError(format!(
                "{} must contain a JSON object",
                path.display()
            ))),
        }
    }

    /// Version string stored under `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// A plugin's own manifest (`plugin.json`, `package.json`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// Plugin name, if declared
    #[serde(default)]
    pub name: Option<String>,
    /// Declared version
    pub version: String,
}

impl PluginManifest {
    /// Read and parse a plugin manifest. Absence is a [`Error::MissingInput`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingInput {
                what: "plugin manifest".into(),
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).fs_context("reading plugin manifest", path)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::GenericError(format!(
                "{} is not a valid plugin manifest: {}",
                path.display(),
                e
            ))
        })
    }
}

/// A plugin whose version has been checked against the version manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPlugin {
    /// Plugin name from the configuration
    pub name: String,
    /// Source directory
    pub source: PathBuf,
    /// Agreed version
    pub version: String,
}

/// Check one plugin against the version manifest.
pub fn verify_plugin(
    manifest: &VersionManifest,
    plugin: &PluginConfig,
    plugin_manifest_path: &Path,
    source: &Path,
) -> Result<VerifiedPlugin> {
    if !source.is_dir() {
        return Err(Error::MissingInput {
            what: format!("plugin directory for '{}'", plugin.name),
            path: source.to_path_buf(),
        });
    }

    let declared = PluginManifest::load(plugin_manifest_path)?;
    let recorded = manifest.field(&plugin.version_key).ok_or_else(|| {
        Error::GenericError(format!(
            "{} has no string field '{}' for plugin '{}'",
            manifest.path.display(),
            plugin.version_key,
            plugin.name
        ))
    })?;

    if declared.version != recorded {
        return Err(Error::VersionMismatch {
            plugin: plugin.name.clone(),
            plugin_manifest: plugin_manifest_path.to_path_buf(),
            plugin_version: declared.version,
            version_manifest: manifest.path.clone(),
            field: plugin.version_key.clone(),
            manifest_version: recorded.to_string(),
        });
    }

    Ok(VerifiedPlugin {
        name: plugin.name.clone(),
        source: source.to_path_buf(),
        version: declared.version,
    })
}

/// Load the version manifest and check every configured plugin against it.
pub fn verify_plugins(config: &ProjectConfig) -> Result<(VersionManifest, Vec<VerifiedPlugin>)> {
    let manifest = VersionManifest::load(&config.resolve(&config.version_manifest))?;

    let plugins = config
        .plugins
        .iter()
        .map(|p| {
            verify_plugin(
                &manifest,
                p,
                &config.plugin_manifest_path(p),
                &config.resolve(&p.source),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    for plugin in &plugins {
        log::info!("Plugin {} {} matches version manifest", plugin.name, plugin.version);
    }
    Ok((manifest, plugins))
}
