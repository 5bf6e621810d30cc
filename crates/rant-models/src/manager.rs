//! Verified model cache manager

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::HubConfig;
use crate::download::{DownloadProgress, Downloader, ProgressReporter};
use crate::error::ModelError;
use crate::hub::HubClient;
use crate::listing::list_files;
use crate::registry::ArtifactDescriptor;
use crate::remote::RemoteRepository;
use crate::verify;

/// Marker file whose sole content is the verified revision
pub const VERIFICATION_MARKER: &str = ".verified";

/// Model download and cache manager.
///
/// Entries live at `cache_dir/{owner_repo}/{revision}/`. An entry is trusted
/// only while its marker holds exactly the descriptor's revision.
pub struct ModelManager {
    /// Cache directory path
    cache_dir: PathBuf,
    /// Hub settings used to open a session per acquisition
    hub: HubConfig,
}

impl ModelManager {
    /// Create a new ModelManager in the platform cache directory
    pub fn new() -> Result<Self, ModelError> {
        let dirs = ProjectDirs::from("com", "rant", "Rant").ok_or_else(|| {
            ModelError::CacheDirectoryError("Could not determine cache directory".to_string())
        })?;

        Ok(Self::with_cache_dir(dirs.cache_dir().join("models")))
    }

    /// Create ModelManager with custom cache directory
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self::with_config(cache_dir, HubConfig::default())
    }

    /// Create ModelManager with custom cache directory and hub settings
    pub fn with_config(cache_dir: PathBuf, hub: HubConfig) -> Self {
        Self { cache_dir, hub }
    }

    /// Get the cache directory path
    pub fn cache_directory(&self) -> &Path {
        &self.cache_dir
    }

    pub fn hub_config(&self) -> &HubConfig {
        &self.hub
    }

    /// Get the directory where an artifact would be stored
    pub fn model_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.cache_dir
            .join(descriptor.cache_key())
            .join(&descriptor.revision)
    }

    fn marker_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        self.model_path(descriptor).join(VERIFICATION_MARKER)
    }

    /// Whether the entry carries a marker for exactly this revision.
    ///
    /// Any I/O failure reads as "not verified".
    pub async fn is_verified(&self, descriptor: &ArtifactDescriptor) -> bool {
        match fs::read_to_string(self.marker_path(descriptor)).await {
            Ok(contents) => contents.trim() == descriptor.revision,
            Err(_) => false,
        }
    }

    /// Download and verify an artifact from the configured hub
    pub async fn acquire<F>(
        &self,
        descriptor: &ArtifactDescriptor,
        progress_callback: F,
    ) -> Result<PathBuf, ModelError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        self.acquire_cancellable(descriptor, progress_callback, &CancellationToken::new())
            .await
    }

    /// Like [`acquire`](Self::acquire), stopping before the next file once `cancel` fires
    pub async fn acquire_cancellable<F>(
        &self,
        descriptor: &ArtifactDescriptor,
        progress_callback: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ModelError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        // Session lives only for this call; building it opens no connection
        let hub = HubClient::connect(&self.hub)?;
        self.acquire_with(&hub, descriptor, progress_callback, cancel)
            .await
    }

    /// Acquire through an arbitrary remote
    pub async fn acquire_with<R, F>(
        &self,
        remote: &R,
        descriptor: &ArtifactDescriptor,
        progress_callback: F,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ModelError>
    where
        R: RemoteRepository + Sync,
        F: FnMut(DownloadProgress) + Send,
    {
        descriptor.validate()?;

        let mut reporter = ProgressReporter::new(progress_callback);
        if self.is_verified(descriptor).await {
            info!("Model {} already verified", descriptor.name);
            reporter.status(1.0, "Model already cached");
            return Ok(self.model_path(descriptor));
        }

        self.run_acquisition(remote, descriptor, &mut reporter, cancel)
            .await
    }

    async fn run_acquisition<R, F>(
        &self,
        remote: &R,
        descriptor: &ArtifactDescriptor,
        reporter: &mut ProgressReporter<F>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ModelError>
    where
        R: RemoteRepository + Sync,
        F: FnMut(DownloadProgress) + Send,
    {
        let model_dir = self.model_path(descriptor);
        info!(
            "Acquiring {} ({}@{}) into {}",
            descriptor.name,
            descriptor.repository,
            descriptor.revision,
            model_dir.display()
        );

        fs::create_dir_all(&model_dir).await?;
        // A stale or foreign marker must not survive a failed run
        self.remove_marker(descriptor).await?;

        reporter.status(0.0, "Fetching file list...");
        let files = list_files(remote, descriptor, self.hub.max_listing_requests).await?;

        Downloader::new(remote, descriptor, &model_dir, cancel)
            .download_all(&files, reporter)
            .await?;

        reporter.status(1.0, "Verifying model integrity...");
        verify::verify_artifact(&model_dir, descriptor).await?;

        self.mark_verified(descriptor).await?;
        reporter.status(1.0, "Download complete");

        info!("Model {} downloaded and verified", descriptor.name);
        Ok(model_dir)
    }

    /// Write the marker via temp file + rename
    async fn mark_verified(&self, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
        let marker = self.marker_path(descriptor);
        let temp = marker.with_file_name(format!("{}.tmp", VERIFICATION_MARKER));

        fs::write(&temp, descriptor.revision.as_bytes()).await?;
        fs::rename(&temp, &marker).await?;
        debug!("Wrote verification marker {}", marker.display());
        Ok(())
    }

    async fn remove_marker(&self, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
        match fs::remove_file(self.marker_path(descriptor)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-run every integrity check on a cached entry.
    ///
    /// The marker alone does not detect on-disk tampering after verification;
    /// this does, and withdraws the marker when a check fails.
    pub async fn revalidate(&self, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
        descriptor.validate()?;
        let model_dir = self.model_path(descriptor);

        match verify::verify_artifact(&model_dir, descriptor).await {
            Ok(()) => {
                self.mark_verified(descriptor).await?;
                Ok(())
            }
            Err(e) => {
                warn!("Revalidation of {} failed: {}", descriptor.name, e);
                self.remove_marker(descriptor).await?;
                Err(e)
            }
        }
    }

    /// Delete one cached revision
    pub async fn delete(&self, descriptor: &ArtifactDescriptor) -> Result<(), ModelError> {
        descriptor.validate()?;
        let path = self.model_path(descriptor);
        if fs::metadata(&path).await.is_ok() {
            fs::remove_dir_all(&path).await?;
            info!("Model {} deleted", descriptor.name);
        }
        Ok(())
    }

    /// Get pinned models whose cache entry is verified
    pub async fn list_verified(&self) -> Vec<ArtifactDescriptor> {
        let mut verified = Vec::new();

        for model in crate::registry::get_all_models() {
            if self.is_verified(&model).await {
                verified.push(model);
            }
        }

        verified
    }

    /// Compute the manifest hash of a directory, for pinning new revisions
    pub async fn compute_manifest_hash(&self, dir: &Path) -> Result<String, ModelError> {
        verify::compute_manifest_hash(dir).await
    }

    /// Total bytes of regular files under the cache root
    pub async fn total_cache_size(&self) -> u64 {
        let root = self.cache_dir.clone();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum::<u64>()
        })
        .await
        .unwrap_or(0)
    }

    /// Remove the whole cache root.
    ///
    /// Best effort: entries that cannot be removed are logged and left behind.
    pub async fn clear_cache(&self) {
        match fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {
                info!("Model cache cleared");
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => warn!("Bulk cache removal failed ({}), removing entries one by one", e),
        }

        let root = self.cache_dir.clone();
        let failed = tokio::task::spawn_blocking(move || remove_tree_best_effort(&root))
            .await
            .unwrap_or(0);
        if failed > 0 {
            warn!("Model cache partially cleared, {} entries left behind", failed);
        } else {
            info!("Model cache cleared");
        }
    }
}

/// Deepest entries first; returns how many could not be removed
fn remove_tree_best_effort(root: &Path) -> usize {
    let mut failed = 0;
    for entry in WalkDir::new(root).contents_first(true).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                failed += 1;
                continue;
            }
        };

        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                debug!("Could not remove {}: {}", entry.path().display(), e);
                failed += 1;
            }
        }
    }
    failed
}
