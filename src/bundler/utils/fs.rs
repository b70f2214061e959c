//! File system helpers for bundle assembly.
//!
//! Copies preserve symlinks (framework bundles depend on their
//! `Versions/Current` links) and every error carries the offending path.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::path::Path;
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_dir_all(path)
            .await
            .fs_context("removing directory", path)?;
    }
    Ok(())
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_file(path)
            .await
            .fs_context("removing file", path)?;
    }
    Ok(())
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        crate::bail!("{} is not a file or does not exist", from.display());
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file", to)?;
    Ok(())
}

/// Recursively copies a directory from one path to another, creating any
/// parent directories of the destination path as necessary.
///
/// Symlinks are recreated rather than followed.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    copy_dir_filtered(from, to, |_| true).await
}

/// Like [`copy_dir`], skipping entries (and their subtrees) for which
/// `keep` returns false.
pub async fn copy_dir_filtered<F>(from: &Path, to: &Path, keep: F) -> Result<()>
where
    F: Fn(&walkdir::DirEntry) -> bool,
{
    if !from.is_dir() {
        crate::bail!("{} is not a directory or does not exist", from.display());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .await
            .fs_context("creating directory", parent)?;
    }

    let walker = walkdir::WalkDir::new(from)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || keep(e));

    for entry in walker {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(from)?;
        let dest_path = to.join(rel_path);

        if entry.file_type().is_symlink() {
            let target = fs::read_link(entry.path())
                .await
                .fs_context("reading symlink", entry.path())?;
            symlink(&target, &dest_path)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .await
                .fs_context("creating directory", &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)
                .await
                .fs_context("copying file", &dest_path)?;
        }
    }

    Ok(())
}

/// Creates a symbolic link at `link` pointing to `target`.
pub fn symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).fs_context("creating symlink", link)
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        Err(Error::GenericError(format!(
            "symlinks are not supported on this platform: {}",
            link.display()
        )))
    }
}

/// Marks a file as executable (`0755`).
pub async fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("setting executable permissions", path)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
