//! Pinned artifact descriptors
//!
//! To pin a new revision:
//! 1. Acquire the model at the new revision with an empty hash table
//! 2. Run `ModelManager::compute_manifest_hash` on the cache entry
//! 3. Copy the LFS digests from the hub listing into `file_hashes`
//! 4. Update `revision` and `manifest_hash`, then re-run the acquisition

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Refs that move over time and therefore cannot anchor trust
const MUTABLE_REFS: &[&str] = &["main", "master", "HEAD"];

/// Immutable description of one multi-file artifact at a pinned revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Registry identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Repository on the hub, e.g. `owner/name`
    pub repository: String,
    /// Commit hash; never a branch name
    pub revision: String,
    /// Top-level files or directories that must exist after acquisition
    pub required_paths: Vec<String>,
    /// Digest of the sorted `path:size` manifest of the whole entry
    pub manifest_hash: Option<String>,
    /// Relative path -> expected SHA-256 hex
    pub file_hashes: BTreeMap<String, String>,
}

impl ArtifactDescriptor {
    /// Last segment of the repository identifier
    pub fn repo_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// Single directory name for this repository inside the cache root
    pub fn cache_key(&self) -> String {
        self.repository.replace('/', "_")
    }

    /// Reject descriptors that cannot be trusted or would escape the cache entry
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.repository.trim().is_empty() {
            return Err(ModelError::InvalidDescriptor("empty repository".to_string()));
        }
        if self
            .repository
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'))
        {
            return Err(ModelError::InvalidDescriptor(format!(
                "bad repository identifier: {}",
                self.repository
            )));
        }

        // The revision is a cache directory name of its own
        if self.revision.is_empty()
            || self.revision == "."
            || self.revision == ".."
            || self.revision.contains(['/', '\\'])
            || self.revision.chars().any(char::is_whitespace)
        {
            return Err(ModelError::InvalidDescriptor(format!(
                "bad revision: {:?}",
                self.revision
            )));
        }
        if MUTABLE_REFS.contains(&self.revision.as_str()) {
            return Err(ModelError::InvalidDescriptor(format!(
                "revision {} is a mutable ref; pin a commit hash",
                self.revision
            )));
        }

        if self.required_paths.is_empty() {
            return Err(ModelError::InvalidDescriptor("no required paths".to_string()));
        }
        for path in self.required_paths.iter().chain(self.file_hashes.keys()) {
            if !is_safe_relative_path(path) {
                return Err(ModelError::InvalidDescriptor(format!("unsafe path: {}", path)));
            }
        }

        let pinned = self.manifest_hash.iter().chain(self.file_hashes.values());
        for digest in pinned {
            if !is_sha256_hex(digest) {
                return Err(ModelError::InvalidDescriptor(format!(
                    "not a SHA-256 hex digest: {}",
                    digest
                )));
            }
        }

        Ok(())
    }
}

/// True for `a/b/c` style paths with no root, `..`, `.` or empty segment
pub(crate) fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

pub(crate) fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
}

fn pinned(
    id: &str,
    name: &str,
    repository: &str,
    revision: &str,
    required_paths: &[&str],
    file_hashes: &[(&str, &str)],
) -> ArtifactDescriptor {
    ArtifactDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        repository: repository.to_string(),
        revision: revision.to_string(),
        required_paths: required_paths.iter().map(|p| p.to_string()).collect(),
        manifest_hash: None,
        file_hashes: file_hashes
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect(),
    }
}

const PARAKEET_REQUIRED: &[&str] = &[
    "Decoder.mlmodelc",
    "Encoder.mlmodelc",
    "JointDecision.mlmodelc",
    "Preprocessor.mlmodelc",
    "parakeet_vocab.json",
];

/// Available speech models, pinned 2025-01-28
pub static PINNED_MODELS: LazyLock<Vec<ArtifactDescriptor>> = LazyLock::new(|| {
    vec![
        pinned(
            "parakeet-v2",
            "Parakeet TDT 0.6B v2 (English)",
            "FluidInference/parakeet-tdt-0.6b-v2-coreml",
            "ee09c569f73759e6d44c9bd16766f477b2b36d39",
            PARAKEET_REQUIRED,
            &[
                ("Decoder.mlmodelc/coremldata.bin", "d200ca07694a347f6d02a3886a062ae839831e094e443222f2e48a14945966a8"),
                ("Encoder.mlmodelc/coremldata.bin", "4def7aa848599ad0e17a8b9a982edcdbf33cf92e1f4b798de32e2ca0bc74b030"),
                ("Encoder.mlmodelc/weights/weight.bin", "4adc7ad44f9d05e1bffeb2b06d3bb02861a5c7602dff63a6b494aed3bf8a6c3e"),
                ("JointDecision.mlmodelc/coremldata.bin", "e2c6752f1c8cf2d3f6f26ec93195c9bfa759ad59edf9f806696a138154f96f11"),
                ("Preprocessor.mlmodelc/coremldata.bin", "d88ea1fc349459c9e100d6a96688c5b29a1f0d865f544be103001724b986b6d6"),
            ],
        ),
        pinned(
            "parakeet-v3",
            "Parakeet TDT 0.6B v3 (Multilingual)",
            "FluidInference/parakeet-tdt-0.6b-v3-coreml",
            "dc730587467ddc9f7ea93b6e3ad5caef8b4222f4",
            PARAKEET_REQUIRED,
            &[
                ("Decoder.mlmodelc/coremldata.bin", "18647af085d87bd8f3121c8a9b4d4564c1ede038dab63d295b4e745cf2d7fb99"),
                ("Encoder.mlmodelc/coremldata.bin", "d48034a167a82e88fc3df64f60af963ab3983538271175b8319e7d5720a0fb86"),
                ("Encoder.mlmodelc/weights/weight.bin", "e2020f323703477a5b21d7c2d282c403e371afb5962e79877e3033e73ba6f421"),
                ("JointDecision.mlmodelc/coremldata.bin", "f56ded0404498e666ffcd84dda0c393924fc3581345ad03e41429ff560cb97b6"),
                ("Preprocessor.mlmodelc/coremldata.bin", "dbde3f2300842c1fd51ef3ff948a0bcffe65ffd2dca10707f2509f32c1d65b1d"),
            ],
        ),
        pinned(
            "whisper-v3-turbo",
            "Whisper Large V3 Turbo",
            "argmaxinc/whisperkit-coreml",
            "1f92e0a7895c30ff3448ec31a65eb4acffcfd7de",
            &["openai_whisper-large-v3_turbo_954MB"],
            &[
                ("openai_whisper-large-v3_turbo_954MB/AudioEncoder.mlmodelc/coremldata.bin", "63b4db8a854c7a64a10b0a0b97048d6d8ee557536367f44dc9fb95fad4bffcf6"),
                ("openai_whisper-large-v3_turbo_954MB/AudioEncoder.mlmodelc/weights/weight.bin", "3c844b37855e47858a41d36ff89f6c6b39352e2455ea1a836b9f3d327113b1e9"),
                ("openai_whisper-large-v3_turbo_954MB/MelSpectrogram.mlmodelc/coremldata.bin", "a888718e98af679eee42db9e3609627472c32f77e4fdda28f3735960cbf526b3"),
                ("openai_whisper-large-v3_turbo_954MB/TextDecoder.mlmodelc/coremldata.bin", "481a53117fe757fd91e9d754ff31e4a0631a8baaef2f8b9ef91832e840974332"),
                ("openai_whisper-large-v3_turbo_954MB/TextDecoder.mlmodelc/weights/weight.bin", "2cfb2d5996273fada9ecac14219766a3b5d1c3b0f0f13039c2bc177cbef18eeb"),
                ("openai_whisper-large-v3_turbo_954MB/TextDecoderContextPrefill.mlmodelc/coremldata.bin", "a91550bdd77216fd43a9b00251b6b5aebbcb2a2eee5ca92b2b3cdd0b8aa75971"),
                ("openai_whisper-large-v3_turbo_954MB/TextDecoderContextPrefill.mlmodelc/weights/weight.bin", "8eab25e68c8eab6f023e2dd2964794c2133fe4af042978e6fbd2b3c8a0f6714e"),
            ],
        ),
    ]
});

/// Get a pinned descriptor by ID
pub fn get_model(id: &str) -> Option<ArtifactDescriptor> {
    PINNED_MODELS.iter().find(|m| m.id == id).cloned()
}

/// Get all pinned descriptors
pub fn get_all_models() -> Vec<ArtifactDescriptor> {
    PINNED_MODELS.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ArtifactDescriptor {
        ArtifactDescriptor {
            id: "test".to_string(),
            name: "Test".to_string(),
            repository: "owner/test-model".to_string(),
            revision: "ee09c569f73759e6d44c9bd16766f477b2b36d39".to_string(),
            required_paths: vec!["a.bin".to_string()],
            manifest_hash: None,
            file_hashes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_pinned_models_validate() {
        for model in PINNED_MODELS.iter() {
            model.validate().unwrap();
        }
        assert!(get_model("parakeet-v3").is_some());
        assert!(get_model("whisper-tiny").is_none());
        assert_eq!(get_all_models().len(), 3);
    }

    #[test]
    fn test_repo_name_and_cache_key() {
        let d = descriptor();
        assert_eq!(d.repo_name(), "test-model");
        assert_eq!(d.cache_key(), "owner_test-model");
    }

    #[test]
    fn test_rejects_mutable_revision() {
        let mut d = descriptor();
        d.revision = "main".to_string();
        assert!(matches!(d.validate(), Err(ModelError::InvalidDescriptor(_))));

        d.revision = "refs/heads/dev".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_revision_naming_parent_directory() {
        let mut d = descriptor();
        for revision in ["..", ".", "abc\\..", "..\\x"] {
            d.revision = revision.to_string();
            assert!(
                matches!(d.validate(), Err(ModelError::InvalidDescriptor(_))),
                "{revision} accepted"
            );
        }

        let mut d = descriptor();
        d.repository = "owner\\..".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let mut d = descriptor();
        d.required_paths = vec!["../etc/passwd".to_string()];
        assert!(d.validate().is_err());

        let mut d = descriptor();
        d.file_hashes.insert("/abs.bin".to_string(), "0".repeat(64));
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_digest() {
        let mut d = descriptor();
        d.file_hashes.insert("a.bin".to_string(), "xyz".to_string());
        assert!(d.validate().is_err());

        d.file_hashes.insert("a.bin".to_string(), "AB".repeat(32));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_safe_relative_path() {
        assert!(is_safe_relative_path("Encoder.mlmodelc/weights/weight.bin"));
        assert!(!is_safe_relative_path(""));
        assert!(!is_safe_relative_path("a//b"));
        assert!(!is_safe_relative_path("a/./b"));
        assert!(!is_safe_relative_path("a\\b"));
    }
}
