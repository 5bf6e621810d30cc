//! In-memory remote repository for acquisition tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use futures::StreamExt;
use rant_models::{
    ArtifactDescriptor, ContentStream, ModelError, RemoteFile, RemoteRepository, TreeListing,
};
use sha2::{Digest, Sha256};

pub const REVISION: &str = "ee09c569f73759e6d44c9bd16766f477b2b36d39";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn descriptor(required: &[&str]) -> ArtifactDescriptor {
    ArtifactDescriptor {
        id: "test".to_string(),
        name: "Test Model".to_string(),
        repository: "owner/test-model".to_string(),
        revision: REVISION.to_string(),
        required_paths: required.iter().map(|p| p.to_string()).collect(),
        manifest_hash: None,
        file_hashes: BTreeMap::new(),
    }
}

/// Listing entry for `content` with declared size and no digest
pub fn file_entry(path: &str, content: &[u8]) -> RemoteFile {
    RemoteFile {
        path: path.to_string(),
        is_directory: false,
        size: Some(content.len() as u64),
        digest: None,
    }
}

pub fn dir_entry(path: &str) -> RemoteFile {
    RemoteFile {
        path: path.to_string(),
        is_directory: true,
        size: None,
        digest: None,
    }
}

#[derive(Default)]
pub struct MockRepository {
    dirs: HashMap<String, Vec<RemoteFile>>,
    contents: HashMap<String, Vec<u8>>,
    failing: Mutex<HashSet<String>>,
    broken_bodies: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `entries` as the listing of `path`
    pub fn with_dir(mut self, path: &str, entries: Vec<RemoteFile>) -> Self {
        self.dirs.insert(path.to_string(), entries);
        self
    }

    /// Serve `content` for `path`
    pub fn with_content(mut self, path: &str, content: &[u8]) -> Self {
        self.contents.insert(path.to_string(), content.to_vec());
        self
    }

    pub fn fail_downloads_of(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Serve half of `path`, then fail the body stream
    pub fn break_body_of(&self, path: &str) {
        self.broken_bodies.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.broken_bodies.lock().unwrap().clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Paths opened so far, then forget them
    pub fn take_opened(&self) -> Vec<String> {
        std::mem::take(&mut *self.opened.lock().unwrap())
    }

    pub fn network_calls(&self) -> usize {
        self.list_calls() + self.opened.lock().unwrap().len()
    }
}

impl RemoteRepository for MockRepository {
    async fn list_tree(
        &self,
        _repository: &str,
        _revision: &str,
        path: &str,
    ) -> Result<TreeListing, ModelError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.dirs.get(path) {
            Some(entries) => TreeListing::Directory(entries.clone()),
            None => TreeListing::NotFound,
        })
    }

    async fn open(
        &self,
        _repository: &str,
        _revision: &str,
        path: &str,
    ) -> Result<ContentStream, ModelError> {
        self.opened.lock().unwrap().push(path.to_string());

        if self.failing.lock().unwrap().contains(path) {
            return Err(ModelError::DownloadFailed(format!("HTTP error: 503 for {}", path)));
        }
        let content = self
            .contents
            .get(path)
            .cloned()
            .ok_or_else(|| ModelError::DownloadFailed(format!("HTTP error: 404 for {}", path)))?;

        // Several chunks so progress ticks happen mid-file
        let chunk_size = (content.len() / 4).max(1);
        let mut chunks: Vec<Result<Bytes, ModelError>> = content
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        if self.broken_bodies.lock().unwrap().contains(path) {
            chunks.truncate(chunks.len() / 2);
            chunks.push(Err(ModelError::DownloadFailed(format!(
                "connection reset while reading {}",
                path
            ))));
        }

        Ok(ContentStream {
            content_length: Some(content.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
