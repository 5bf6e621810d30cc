//! Model acquisition error types

use thiserror::Error;

/// Number of digest characters shown in human-facing messages
const DIGEST_PREVIEW_LEN: usize = 16;

/// Model acquisition errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// Remote directory listing failed
    #[error("Listing failed: {0}")]
    ListingFailed(String),

    /// Content download failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// A downloaded file or the directory manifest does not match its pinned digest.
    ///
    /// `path` is the relative file path, or `"manifest"` for the whole-directory check.
    #[error(
        "Model verification failed for {}: expected hash {}..., got {}...",
        .path,
        preview(.expected),
        preview(.actual)
    )]
    HashMismatch {
        expected: String,
        actual: String,
        path: String,
    },

    /// Required paths absent from the cache entry after download
    #[error("Missing required files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// Remote answered with something the engine refuses to act on
    #[error("Invalid response from server: {0}")]
    InvalidRemoteResponse(String),

    /// Listing payload could not be decoded
    #[error("Malformed listing payload: {0}")]
    MalformedListing(String),

    /// Descriptor failed validation
    #[error("Invalid artifact descriptor: {0}")]
    InvalidDescriptor(String),

    /// Model not found in the registry
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Cache directory error
    #[error("Failed to access cache directory: {0}")]
    CacheDirectoryError(String),

    /// Acquisition was cancelled between files
    #[error("Download cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ModelError {
    /// Whether the caller should advise clearing the cache and retrying.
    ///
    /// Integrity and completeness failures mean network corruption or
    /// tampering; they must never be downgraded to "use anyway".
    pub fn requires_cache_reset(&self) -> bool {
        matches!(
            self,
            ModelError::HashMismatch { .. } | ModelError::MissingFiles(_)
        )
    }
}

fn preview(digest: &str) -> &str {
    match digest.char_indices().nth(DIGEST_PREVIEW_LEN) {
        Some((idx, _)) => &digest[..idx],
        None => digest,
    }
}
