//! Sequential download of listed files into a cache entry

use std::path::{Path, PathBuf};

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::listing::total_bytes;
use crate::registry::ArtifactDescriptor;
use crate::remote::{RemoteFile, RemoteRepository};
use crate::verify::{digests_match, sha256_file};

/// Weight given to files whose size the remote does not declare
pub const PLACEHOLDER_SIZE: u64 = 1000;

/// Byte ticks buffered between the transfer and the progress forwarder
const TICK_BUFFER: usize = 64;

/// Download progress information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Human-readable status, e.g. "Downloading weight.bin..."
    pub status: String,
    /// File in flight, if any
    pub current_file: Option<String>,
    /// Weighted bytes completed so far
    pub bytes_completed: u64,
    /// Weighted bytes of the whole artifact
    pub total_bytes: u64,
    /// Progress fraction (0.0 - 1.0)
    pub fraction: f64,
}

impl DownloadProgress {
    /// A status-only update with no byte accounting
    pub fn status(fraction: f64, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            current_file: None,
            bytes_completed: 0,
            total_bytes: 0,
            fraction,
        }
    }
}

/// Forwards progress to the caller, clamped to [0, 1] and never decreasing.
///
/// Status-only updates carry the byte totals of the last reported tick.
pub struct ProgressReporter<F> {
    callback: F,
    last: f64,
    bytes_completed: u64,
    total_bytes: u64,
}

impl<F> ProgressReporter<F>
where
    F: FnMut(DownloadProgress),
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            last: 0.0,
            bytes_completed: 0,
            total_bytes: 0,
        }
    }

    pub fn report(&mut self, mut progress: DownloadProgress) {
        let fraction = if progress.fraction.is_nan() {
            self.last
        } else {
            progress.fraction.clamp(0.0, 1.0).max(self.last)
        };
        self.last = fraction;
        self.bytes_completed = progress.bytes_completed;
        self.total_bytes = progress.total_bytes;
        progress.fraction = fraction;
        (self.callback)(progress);
    }

    pub fn status(&mut self, fraction: f64, status: impl Into<String>) {
        let mut progress = DownloadProgress::status(fraction, status);
        progress.bytes_completed = self.bytes_completed;
        progress.total_bytes = self.total_bytes;
        self.report(progress);
    }

    /// Last fraction handed to the callback
    pub fn last_fraction(&self) -> f64 {
        self.last
    }
}

/// Byte accounting for one acquisition call
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub current_file: Option<String>,
}

impl DownloadSession {
    pub fn new(files: &[RemoteFile]) -> Self {
        Self {
            total_bytes: total_bytes(files, PLACEHOLDER_SIZE),
            completed_bytes: 0,
            current_file: None,
        }
    }

    /// Progress including the interpolated share of the file in flight
    fn snapshot(&self, in_flight: u64, status: String) -> DownloadProgress {
        let current = self.completed_bytes + in_flight;
        let fraction = if self.total_bytes == 0 {
            1.0
        } else {
            current as f64 / self.total_bytes as f64
        };

        DownloadProgress {
            status,
            current_file: self.current_file.clone(),
            bytes_completed: current,
            total_bytes: self.total_bytes,
            fraction,
        }
    }
}

/// `weight × written / expected`, capped at `weight`
fn interpolate(weight: u64, written: u64, expected: Option<u64>) -> u64 {
    match expected {
        Some(expected) if expected > 0 => {
            let share = (written as f64 / expected as f64).min(1.0);
            (weight as f64 * share) as u64
        }
        _ => 0,
    }
}

/// What a download pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Files fetched from the remote
    pub fetched: Vec<String>,
    /// Files already present with the declared size
    pub skipped: Vec<String>,
    /// Bytes actually transferred
    pub bytes_transferred: u64,
}

/// Fetches listed files one by one into `dest`
pub struct Downloader<'a, R> {
    remote: &'a R,
    descriptor: &'a ArtifactDescriptor,
    dest: &'a Path,
    cancel: &'a CancellationToken,
}

impl<'a, R: RemoteRepository> Downloader<'a, R> {
    pub fn new(
        remote: &'a R,
        descriptor: &'a ArtifactDescriptor,
        dest: &'a Path,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            remote,
            descriptor,
            dest,
            cancel,
        }
    }

    /// Download every file in listing order.
    ///
    /// Reaches exactly 1.0 after the last file when all files are handled.
    pub async fn download_all<F>(
        &self,
        files: &[RemoteFile],
        reporter: &mut ProgressReporter<F>,
    ) -> Result<DownloadSummary, ModelError>
    where
        F: FnMut(DownloadProgress),
    {
        let mut session = DownloadSession::new(files);
        let mut summary = DownloadSummary::default();

        for file in files {
            if self.cancel.is_cancelled() {
                info!("Download of {} cancelled", self.descriptor.repository);
                return Err(ModelError::Cancelled);
            }

            let target = self.dest.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }

            let weight = file.size.unwrap_or(PLACEHOLDER_SIZE);
            let status = format!("Downloading {}...", file.file_name());
            session.current_file = Some(file.path.clone());

            if self.already_present(file, &target).await? {
                debug!("{} already present, skipping", file.path);
                session.completed_bytes += weight;
                reporter.report(session.snapshot(0, status));
                summary.skipped.push(file.path.clone());
                continue;
            }

            let written = self
                .fetch_file(file, &target, weight, &session, &status, reporter)
                .await?;

            session.completed_bytes += weight;
            reporter.report(session.snapshot(0, status));
            summary.fetched.push(file.path.clone());
            summary.bytes_transferred += written;
        }

        info!(
            "Downloaded {} files ({} bytes), {} already present",
            summary.fetched.len(),
            summary.bytes_transferred,
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// Pinned descriptor hash first, then the digest the remote advertises
    fn expected_digest<'f>(&'f self, file: &'f RemoteFile) -> Option<&'f str> {
        self.descriptor
            .file_hashes
            .get(&file.path)
            .or(file.digest.as_ref())
            .map(String::as_str)
    }

    /// Size match with the declared size; hashed too when a digest is known
    async fn already_present(&self, file: &RemoteFile, target: &Path) -> Result<bool, ModelError> {
        let Some(declared) = file.size else {
            return Ok(false);
        };
        let Ok(meta) = fs::metadata(target).await else {
            return Ok(false);
        };
        if !meta.is_file() || meta.len() != declared {
            return Ok(false);
        }

        if let Some(expected) = self.expected_digest(file) {
            let actual = sha256_file(target).await?;
            if !digests_match(expected, &actual) {
                warn!("{} has the right size but wrong content, refetching", file.path);
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn fetch_file<F>(
        &self,
        file: &RemoteFile,
        target: &Path,
        weight: u64,
        session: &DownloadSession,
        status: &str,
        reporter: &mut ProgressReporter<F>,
    ) -> Result<u64, ModelError>
    where
        F: FnMut(DownloadProgress),
    {
        let content = self
            .remote
            .open(&self.descriptor.repository, &self.descriptor.revision, &file.path)
            .await?;
        let expected_len = file.size.or(content.content_length);
        let part = part_path(target);

        let (tx, mut rx) = mpsc::channel::<u64>(TICK_BUFFER);
        let transfer = write_stream(content.body, &part, tx);
        tokio::pin!(transfer);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(written) = rx.recv() => {
                    let in_flight = interpolate(weight, written, expected_len);
                    reporter.report(session.snapshot(in_flight, status.to_string()));
                }
                result = &mut transfer => break result,
            }
        };

        let (actual, written) = match outcome {
            Ok(done) => done,
            Err(e) => {
                discard(&part).await;
                return Err(e);
            }
        };

        if let Some(declared) = file.size {
            if written != declared {
                discard(&part).await;
                return Err(ModelError::DownloadFailed(format!(
                    "{}: received {} bytes, expected {}",
                    file.path, written, declared
                )));
            }
        }

        if let Some(expected) = self.expected_digest(file) {
            if !digests_match(expected, &actual) {
                warn!("Hash mismatch for {}, removing it", file.path);
                discard(&part).await;
                discard(target).await;
                return Err(ModelError::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                    path: file.path.clone(),
                });
            }
        }

        fs::rename(&part, target).await?;
        debug!("Installed {} ({} bytes)", file.path, written);
        Ok(written)
    }
}

/// Hidden sibling so the rename stays on one filesystem and the manifest ignores it
fn part_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.part", name))
}

async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Stream the body to disk, hashing as it goes; ticks are lossy
async fn write_stream(
    mut body: BoxStream<'static, Result<bytes::Bytes, ModelError>>,
    part: &Path,
    ticks: mpsc::Sender<u64>,
) -> Result<(String, u64), ModelError> {
    let mut file = fs::File::create(part).await?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        written += chunk.len() as u64;
        let _ = ticks.try_send(written);
    }

    file.flush().await?;
    file.sync_all().await?;

    Ok((hex::encode(hasher.finalize()), written))
}
