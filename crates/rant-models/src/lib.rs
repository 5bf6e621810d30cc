//! Pinned model acquisition for rant
//!
//! Fetches multi-file speech models from a HuggingFace-style hub at a
//! pinned revision, checks them against pinned SHA-256 digests, and keeps
//! them in a local cache guarded by a revision-keyed verification marker.

pub mod config;
pub mod download;
pub mod error;
pub mod hub;
pub mod listing;
pub mod manager;
pub mod registry;
pub mod remote;
pub mod verify;

pub use config::HubConfig;
pub use download::{DownloadProgress, DownloadSummary};
pub use error::ModelError;
pub use hub::HubClient;
pub use manager::{ModelManager, VERIFICATION_MARKER};
pub use registry::{ArtifactDescriptor, PINNED_MODELS};
pub use remote::{ContentStream, RemoteFile, RemoteRepository, TreeListing};
pub use tokio_util::sync::CancellationToken;
