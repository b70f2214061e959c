//! Artifact checksum files.
//!
//! Writes `<artifact>.sha256` in the `shasum -a 256` format:
//! `<hex digest>  <filename>\n`. Must run after the last mutation of the
//! artifact (stapling rewrites the image).

use crate::bundler::error::{Context, Error, ErrorExt, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Read buffer size.
const CHUNK_SIZE: usize = 8192;

/// Hex-encoded SHA-256 of a file, streamed in 8 KiB chunks.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::MissingInput {
            what: "file to checksum".into(),
            path: path.to_path_buf(),
        });
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Path of the checksum file for `artifact`.
pub fn checksum_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Hash `artifact` and write `<artifact>.sha256`, replacing any previous one.
pub async fn write_checksum_file(artifact: &Path) -> Result<PathBuf> {
    let digest = calculate_sha256(artifact).await?;
    let file_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .context("artifact file name is not valid UTF-8")?;

    let out = checksum_path(artifact);
    tokio::fs::write(&out, format!("{digest}  {file_name}\n"))
        .await
        .fs_context("writing checksum file", &out)?;

    log::info!("✓ SHA-256 {} -> {}", digest, out.display());
    Ok(out)
}
