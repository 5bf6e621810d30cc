//! Remote repository trait and common types

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One entry produced by listing the remote repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Path relative to the repository root
    pub path: String,
    /// Whether the entry must be expanded further
    pub is_directory: bool,
    /// Size the remote declares, if any
    pub size: Option<u64>,
    /// SHA-256 hex for large/binary tracked files
    pub digest: Option<String>,
}

impl RemoteFile {
    /// A path the remote reported as "not a directory"
    pub fn bare_file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            size: None,
            digest: None,
        }
    }

    /// Last path segment, for status text
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Result of asking the remote for a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeListing {
    /// The path is a directory with these direct children
    Directory(Vec<RemoteFile>),
    /// The remote has no directory at this path, so it names a single file
    NotFound,
}

/// Raw file body, streamed
pub struct ContentStream {
    /// Length advertised by the transport, if any
    pub content_length: Option<u64>,
    /// Body chunks
    pub body: BoxStream<'static, Result<Bytes, ModelError>>,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Content repository seam
#[trait_variant::make(RemoteRepository: Send)]
pub trait LocalRemoteRepository {
    /// List the direct children of `path` at `revision`
    async fn list_tree(
        &self,
        repository: &str,
        revision: &str,
        path: &str,
    ) -> Result<TreeListing, ModelError>;

    /// Open the raw bytes of `path` at `revision`
    async fn open(
        &self,
        repository: &str,
        revision: &str,
        path: &str,
    ) -> Result<ContentStream, ModelError>;
}
