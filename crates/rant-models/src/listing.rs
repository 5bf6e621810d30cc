//! Remote file discovery
//!
//! Required paths may name single files or directories. Each one is listed
//! at the pinned revision; a "not found" listing means the path is a file,
//! a directory listing is expanded in place. The walk uses an explicit stack
//! so the number of remote calls is bounded and the order matches a
//! depth-first recursive expansion.
//!
//! Overlapping required paths yield each file once, at its first position.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::ModelError;
use crate::registry::{is_safe_relative_path, ArtifactDescriptor};
use crate::remote::{RemoteFile, RemoteRepository, TreeListing};

enum Pending {
    /// Not yet known whether this is a file or a directory
    Unresolved(String),
    /// Directory announced by a parent listing
    Directory(String),
    /// Ready to download
    File(RemoteFile),
}

/// Flatten every required path of `descriptor` into downloadable files
pub async fn list_files<R: RemoteRepository>(
    remote: &R,
    descriptor: &ArtifactDescriptor,
    max_requests: usize,
) -> Result<Vec<RemoteFile>, ModelError> {
    let mut stack: Vec<Pending> = descriptor
        .required_paths
        .iter()
        .rev()
        .map(|p| Pending::Unresolved(p.clone()))
        .collect();

    let mut files = Vec::new();
    let mut seen_files: HashSet<String> = HashSet::new();
    let mut listed: HashSet<String> = HashSet::new();
    let mut requests = 0usize;

    while let Some(item) = stack.pop() {
        let (path, announced_directory) = match item {
            Pending::File(file) => {
                if seen_files.insert(file.path.clone()) {
                    files.push(file);
                } else {
                    debug!("Skipping duplicate file {}", file.path);
                }
                continue;
            }
            Pending::Unresolved(path) if seen_files.contains(&path) => {
                debug!("Skipping duplicate file {}", path);
                continue;
            }
            Pending::Unresolved(path) => (path, false),
            Pending::Directory(path) => (path, true),
        };

        if !listed.insert(path.clone()) {
            debug!("Skipping already listed directory {}", path);
            continue;
        }

        requests += 1;
        if requests > max_requests {
            return Err(ModelError::ListingFailed(format!(
                "more than {} listing requests for {}",
                max_requests, descriptor.repository
            )));
        }

        let listing = remote
            .list_tree(&descriptor.repository, &descriptor.revision, &path)
            .await?;

        match listing {
            TreeListing::NotFound if announced_directory => {
                return Err(ModelError::InvalidRemoteResponse(format!(
                    "directory {} vanished while listing",
                    path
                )));
            }
            TreeListing::NotFound => {
                if seen_files.insert(path.clone()) {
                    files.push(RemoteFile::bare_file(path));
                }
            }
            TreeListing::Directory(entries) => {
                for entry in entries.into_iter().rev() {
                    check_entry(&path, &entry)?;
                    if entry.is_directory {
                        stack.push(Pending::Directory(entry.path));
                    } else {
                        stack.push(Pending::File(entry));
                    }
                }
            }
        }
    }

    info!(
        "Listed {} files for {}@{} in {} requests",
        files.len(),
        descriptor.repository,
        descriptor.revision,
        requests
    );
    Ok(files)
}

/// Entries must stay inside the listed directory
fn check_entry(parent: &str, entry: &RemoteFile) -> Result<(), ModelError> {
    let inside = entry
        .path
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1);

    if !is_safe_relative_path(&entry.path) || !inside {
        return Err(ModelError::InvalidRemoteResponse(format!(
            "entry {:?} is not inside {}",
            entry.path, parent
        )));
    }
    Ok(())
}

/// Sum of declared sizes, counting `placeholder` for files without one
pub fn total_bytes(files: &[RemoteFile], placeholder: u64) -> u64 {
    files.iter().map(|f| f.size.unwrap_or(placeholder)).sum()
}
