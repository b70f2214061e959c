//! Standalone plugin archives.
//!
//! Packages a plugin directory into `<name>-<version>.zip` next to a
//! `.sha256` file, for distribution outside the app bundle.

use crate::bundler::{
    checksum,
    error::{Error, ErrorExt, Result},
    utils::fs,
};
use crate::metadata::PluginManifest;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

/// Default plugin manifest file name.
pub const DEFAULT_MANIFEST: &str = "plugin.json";

/// A packaged plugin archive.
#[derive(Debug, Clone)]
pub struct PackagedPlugin {
    /// Plugin name
    pub name: String,
    /// Plugin version from its manifest
    pub version: String,
    /// `<out>/<name>-<version>.zip`
    pub archive: PathBuf,
    /// `<archive>.sha256`
    pub checksum: PathBuf,
}

impl PackagedPlugin {
    /// Manual follow-up steps for the operator.
    pub fn instructions(&self) -> Vec<String> {
        let file = self
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        vec![
            format!("Upload {} and {} to the release page", file, self.checksum.display()),
            format!("Verify the download with: shasum -a 256 -c {file}.sha256"),
            format!("Unpack into the host's plugin directory as '{}'", self.name),
        ]
    }
}

/// Archive `source` into `out_dir` and write its checksum.
///
/// `manifest` is relative to `source`.
pub async fn package_plugin(
    source: &Path,
    manifest: &Path,
    out_dir: &Path,
) -> Result<PackagedPlugin> {
    if !source.is_dir() {
        return Err(Error::MissingInput {
            what: "plugin directory".into(),
            path: source.to_path_buf(),
        });
    }
    let declared = PluginManifest::load(&source.join(manifest))?;
    let name = match declared.name {
        Some(name) => name,
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::GenericError("plugin has no name".into()))?,
    };

    fs::create_dir_all(out_dir, false).await?;
    let archive = out_dir.join(format!("{}-{}.zip", name, declared.version));
    fs::remove_file(&archive).await?;

    log::info!("Packaging plugin {} {} -> {}", name, declared.version, archive.display());
    let (src, dst) = (source.to_path_buf(), archive.clone());
    tokio::task::spawn_blocking(move || write_archive(&src, &dst))
        .await
        .map_err(|e| Error::GenericError(format!("archive task failed: {e}")))??;

    let checksum = checksum::write_checksum_file(&archive).await?;

    Ok(PackagedPlugin {
        name,
        version: declared.version,
        archive,
        checksum,
    })
}

fn is_excluded(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name();
    name == ".git" || name == ".DS_Store"
}

/// Write every file under `source` into a deflated zip at `archive`.
fn write_archive(source: &Path, archive: &Path) -> Result<()> {
    let file = std::fs::File::create(archive).fs_context("creating archive", archive)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let walker = walkdir::WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(source)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let bytes =
                std::fs::read(entry.path()).fs_context("reading plugin file", entry.path())?;
            zip.write_all(&bytes).fs_context("writing archive", archive)?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn plugin_dir(root: &Path, manifest: &str) -> PathBuf {
        let dir = root.join("editor");
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        std::fs::write(dir.join(".git/HEAD"), "ref").unwrap();
        std::fs::write(dir.join(".DS_Store"), "junk").unwrap();
        std::fs::write(dir.join("plugin.json"), manifest).unwrap();
        std::fs::write(dir.join("lib/main.js"), "export {}").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_archive_contents_and_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = plugin_dir(tmp.path(), r#"{"name": "editor-kit", "version": "0.4.0"}"#);
        let out = tmp.path().join("dist");

        let packaged = package_plugin(&dir, Path::new(DEFAULT_MANIFEST), &out)
            .await
            .unwrap();

        assert_eq!(packaged.archive, out.join("editor-kit-0.4.0.zip"));
        assert!(packaged.checksum.ends_with("editor-kit-0.4.0.zip.sha256"));

        let file = std::fs::File::open(&packaged.archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert!(names.contains(&"plugin.json".to_string()));
        assert!(names.contains(&"lib/main.js".to_string()));
        assert!(names.iter().all(|n| !n.starts_with(".git") && n != ".DS_Store"));

        let mut body = String::new();
        zip.by_name("lib/main.js").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "export {}");
    }

    #[tokio::test]
    async fn test_name_falls_back_to_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = plugin_dir(tmp.path(), r#"{"version": "1.0.0"}"#);

        let packaged = package_plugin(&dir, Path::new(DEFAULT_MANIFEST), tmp.path())
            .await
            .unwrap();
        assert_eq!(packaged.name, "editor");
        assert!(packaged.instructions().iter().any(|l| l.contains("editor-1.0.0.zip")));
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = plugin_dir(tmp.path(), "{}");
        let err = package_plugin(&dir, Path::new("package.json"), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput { .. }));
    }
}
