//! HuggingFace-style hub client

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::error::ModelError;
use crate::remote::{ContentStream, RemoteFile, RemoteRepository, TreeListing};

/// HTTP session against one hub.
///
/// Built at the start of an acquisition and dropped when it returns, which
/// closes its connection pool on every path.
pub struct HubClient {
    client: Client,
    base_url: String,
}

impl HubClient {
    /// Create a client from configuration
    pub fn connect(config: &HubConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelError::ListingFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tree_url(&self, repository: &str, revision: &str, path: &str) -> String {
        format!(
            "{}/api/models/{}/tree/{}/{}",
            self.base_url, repository, revision, path
        )
    }

    fn resolve_url(&self, repository: &str, revision: &str, path: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.base_url, repository, revision, path
        )
    }
}

impl RemoteRepository for HubClient {
    async fn list_tree(
        &self,
        repository: &str,
        revision: &str,
        path: &str,
    ) -> Result<TreeListing, ModelError> {
        let url = self.tree_url(repository, revision, path);
        debug!("Listing {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelError::ListingFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{} is not a directory, treating it as a file", path);
            return Ok(TreeListing::NotFound);
        }
        if !status.is_success() {
            warn!("Listing {} failed: {}", path, status);
            return Err(ModelError::ListingFailed(format!("HTTP {} for {}", status, path)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ModelError::ListingFailed(e.to_string()))?;
        let entries: Vec<HubTreeEntry> = serde_json::from_slice(&body)
            .map_err(|e| ModelError::MalformedListing(format!("{}: {}", path, e)))?;

        entries
            .into_iter()
            .map(HubTreeEntry::into_remote_file)
            .collect::<Result<Vec<_>, _>>()
            .map(TreeListing::Directory)
    }

    async fn open(
        &self,
        repository: &str,
        revision: &str,
        path: &str,
    ) -> Result<ContentStream, ModelError> {
        let url = self.resolve_url(repository, revision, path);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::DownloadFailed(format!(
                "HTTP error: {} for {}",
                response.status(),
                path
            )));
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ModelError::DownloadFailed(e.to_string())))
            .boxed();

        Ok(ContentStream {
            content_length,
            body,
        })
    }
}

/// Wire shape of one tree-listing entry
#[derive(Deserialize)]
struct HubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
    lfs: Option<HubLfsInfo>,
    #[serde(rename = "contentDigest")]
    content_digest: Option<String>,
}

/// LFS pointer; `oid` is the SHA-256 of the content
#[derive(Deserialize)]
struct HubLfsInfo {
    oid: String,
    size: u64,
}

impl HubTreeEntry {
    fn into_remote_file(self) -> Result<RemoteFile, ModelError> {
        let is_directory = match self.kind.as_str() {
            "directory" => true,
            "file" => false,
            other => {
                return Err(ModelError::InvalidRemoteResponse(format!(
                    "unknown entry type {:?} for {}",
                    other, self.path
                )))
            }
        };

        let (size, digest) = match self.lfs {
            Some(lfs) => (Some(lfs.size), Some(lfs.oid)),
            None => (self.size, self.content_digest),
        };

        Ok(RemoteFile {
            path: self.path,
            is_directory,
            size,
            digest: digest.map(|d| d.to_ascii_lowercase()),
        })
    }
}
