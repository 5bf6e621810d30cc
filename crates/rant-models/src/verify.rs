//! Integrity checks for a cache entry

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ModelError;
use crate::registry::ArtifactDescriptor;

const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Label used in `HashMismatch` for the whole-directory check
pub const MANIFEST_LABEL: &str = "manifest";

/// Compute SHA256 hash of a file, streamed in 1 MiB chunks
pub async fn sha256_file(path: &Path) -> Result<String, ModelError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Digest of the sorted `relative/path:size` lines of every visible regular file.
///
/// Hidden entries are skipped, which keeps the verification marker and
/// in-flight `.part` files out of the manifest.
pub async fn compute_manifest_hash(dir: &Path) -> Result<String, ModelError> {
    let root = dir.to_path_buf();
    let lines = tokio::task::spawn_blocking(move || manifest_lines(&root))
        .await
        .map_err(|e| ModelError::IoError(std::io::Error::other(e)))??;

    let manifest = lines.join("\n");
    Ok(hex::encode(Sha256::digest(manifest.as_bytes())))
}

fn manifest_lines(root: &Path) -> Result<Vec<String>, ModelError> {
    let mut lines = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| ModelError::IoError(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ModelError::CacheDirectoryError(e.to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry
            .metadata()
            .map_err(|e| ModelError::IoError(std::io::Error::other(e)))?
            .len();

        lines.push(format!("{}:{}", relative, size));
    }

    lines.sort();
    Ok(lines)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Case-insensitive hex comparison
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// Every required path must exist; reports all absent paths at once
pub async fn check_completeness(
    dir: &Path,
    descriptor: &ArtifactDescriptor,
) -> Result<(), ModelError> {
    let mut missing = Vec::new();
    for required in &descriptor.required_paths {
        if fs::metadata(dir.join(required)).await.is_err() {
            missing.push(required.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ModelError::MissingFiles(missing))
    }
}

/// Compare the directory manifest against the pinned value, if any
pub async fn check_manifest(dir: &Path, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
    let Some(expected) = &descriptor.manifest_hash else {
        return Ok(());
    };

    let actual = compute_manifest_hash(dir).await?;
    if !digests_match(expected, &actual) {
        return Err(ModelError::HashMismatch {
            expected: expected.clone(),
            actual,
            path: MANIFEST_LABEL.to_string(),
        });
    }
    debug!("Manifest hash matches for {}", descriptor.repository);
    Ok(())
}

/// Stream-hash every pinned file and compare
pub async fn check_file_hashes(
    dir: &Path,
    descriptor: &ArtifactDescriptor,
) -> Result<(), ModelError> {
    for (relative, expected) in &descriptor.file_hashes {
        let path = dir.join(relative);
        let actual = match sha256_file(&path).await {
            Ok(actual) => actual,
            Err(ModelError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelError::MissingFiles(vec![relative.clone()]));
            }
            Err(e) => return Err(e),
        };

        if !digests_match(expected, &actual) {
            return Err(ModelError::HashMismatch {
                expected: expected.clone(),
                actual,
                path: relative.clone(),
            });
        }
    }
    Ok(())
}

/// Completeness, then manifest, then per-file hashes
pub async fn verify_artifact(dir: &Path, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
    check_completeness(dir, descriptor).await?;
    check_manifest(dir, descriptor).await?;
    check_file_hashes(dir, descriptor).await?;

    info!(
        "Verified {}@{} ({} pinned files)",
        descriptor.repository,
        descriptor.revision,
        descriptor.file_hashes.len()
    );
    Ok(())
}
