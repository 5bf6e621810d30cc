//! Subcommand handlers

use std::future::Future;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rant_models::{registry, ArtifactDescriptor, CancellationToken, ModelError, ModelManager};
use tracing::{debug, info};

use crate::progress::{download_bar, format_size, reporter};

const RESET_HINT: &str =
    "The cached files are corrupted or were tampered with. Run `rant clear` and fetch again.";

/// Resolve a registry id, or read a JSON descriptor from disk
pub fn resolve_descriptor(model: &str) -> Result<ArtifactDescriptor> {
    if let Some(descriptor) = registry::get_model(model) {
        return Ok(descriptor);
    }

    let path = Path::new(model);
    if !path.is_file() {
        return Err(ModelError::ModelNotFound(model.to_string()).into());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
    let descriptor: ArtifactDescriptor = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse descriptor {}", path.display()))?;
    descriptor.validate()?;

    debug!("Loaded descriptor {} from {}", descriptor.id, path.display());
    Ok(descriptor)
}

pub async fn list(manager: &ModelManager) -> Result<()> {
    for model in registry::PINNED_MODELS.iter() {
        let state = if manager.is_verified(model).await {
            "verified"
        } else {
            "-"
        };
        println!(
            "{:<18} {:<10} {} ({}@{})",
            model.id,
            state,
            model.name,
            model.repository,
            &model.revision[..model.revision.len().min(8)]
        );
    }

    println!(
        "\nCache: {} ({})",
        manager.cache_directory().display(),
        format_size(manager.total_cache_size().await)
    );
    Ok(())
}

pub async fn fetch(manager: &ModelManager, descriptor: &ArtifactDescriptor) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
                eprintln!("Aborted");
                std::process::exit(130);
            }
        })
    };

    let pb = download_bar();
    let result = manager
        .acquire_cancellable(descriptor, reporter(pb.clone()), &cancel)
        .await;
    watcher.abort();

    match result {
        Ok(path) => {
            pb.finish_with_message("Download complete");
            info!("{} ready at {}", descriptor.name, path.display());
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            if e.requires_cache_reset() {
                eprintln!("{}", RESET_HINT);
            }
            Err(e.into())
        }
    }
}

/// Cancel on the first interrupt; true once a second one arrives
async fn watch_interrupts<S, Fut>(mut next_interrupt: S, cancel: CancellationToken) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    eprintln!("\nCancelling after the current file, press Ctrl-C again to abort");
    cancel.cancel();

    next_interrupt().await.is_ok()
}

pub async fn status(manager: &ModelManager, descriptor: &ArtifactDescriptor) -> Result<()> {
    let path = manager.model_path(descriptor);
    let state = if manager.is_verified(descriptor).await {
        "verified"
    } else if path.exists() {
        "incomplete or unverified"
    } else {
        "not downloaded"
    };

    println!("{}: {}", descriptor.name, state);
    println!("  repository: {}", descriptor.repository);
    println!("  revision:   {}", descriptor.revision);
    println!("  path:       {}", path.display());
    println!("  pinned:     {} file hashes", descriptor.file_hashes.len());
    Ok(())
}

pub async fn verify(manager: &ModelManager, descriptor: &ArtifactDescriptor) -> Result<()> {
    match manager.revalidate(descriptor).await {
        Ok(()) => {
            println!("{}: verified", descriptor.name);
            Ok(())
        }
        Err(e) => {
            if e.requires_cache_reset() {
                eprintln!("{}", RESET_HINT);
            }
            Err(e.into())
        }
    }
}

pub async fn path(manager: &ModelManager, descriptor: &ArtifactDescriptor) -> Result<()> {
    if !manager.is_verified(descriptor).await {
        bail!("{} is not downloaded; run `rant fetch {}`", descriptor.name, descriptor.id);
    }
    println!("{}", manager.model_path(descriptor).display());
    Ok(())
}

pub async fn remove(manager: &ModelManager, descriptor: &ArtifactDescriptor) -> Result<()> {
    manager.delete(descriptor).await?;
    println!("Removed {}", descriptor.name);
    Ok(())
}

pub async fn clear(manager: &ModelManager) -> Result<()> {
    manager.clear_cache().await;
    println!("Cleared {}", manager.cache_directory().display());
    Ok(())
}

pub async fn manifest(manager: &ModelManager, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    println!("{}", manager.compute_manifest_hash(dir).await?);
    Ok(())
}
