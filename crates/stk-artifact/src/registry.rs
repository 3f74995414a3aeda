//! Registry collaborator
//!
//! [`ArtifactRegistry`] is the seam between the publisher and whatever
//! actually stores images. [`LocalRegistry`] is a directory-backed
//! implementation used by the CLI and by tests.

use crate::artifact::RegistryRef;
use crate::fingerprint::{fingerprint, Fingerprint, HashError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";

/// Storage for fingerprinted artifacts
///
/// # Contract
/// - `exists` is read-only and idempotent
/// - after `publish` returns `Ok`, the artifact is retrievable under exactly
///   the given tag
/// - neither operation retries internally
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactRegistry {
    /// Whether an artifact tagged `tag` is present in `repository`
    ///
    /// # Errors
    /// Returns error if the registry cannot be queried
    fn exists(&self, repository: &RegistryRef, tag: &Fingerprint) -> Result<bool, RegistryError>;

    /// Build and push an artifact from `source` under `tag`
    ///
    /// # Errors
    /// Returns error if the transfer fails or the tag is already taken
    fn publish(
        &self,
        source: &Path,
        repository: &RegistryRef,
        tag: &Fingerprint,
    ) -> Result<(), RegistryError>;
}

impl<R: ArtifactRegistry + ?Sized> ArtifactRegistry for &R {
    fn exists(&self, repository: &RegistryRef, tag: &Fingerprint) -> Result<bool, RegistryError> {
        (**self).exists(repository, tag)
    }

    fn publish(
        &self,
        source: &Path,
        repository: &RegistryRef,
        tag: &Fingerprint,
    ) -> Result<(), RegistryError> {
        (**self).publish(source, repository, tag)
    }
}

/// Errors raised by registry implementations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Underlying storage I/O failed
    #[error("registry I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Tags are immutable
    #[error("tag {tag} already exists in {repository}")]
    TagExists { repository: String, tag: Fingerprint },

    /// No artifact under that tag
    #[error("tag {tag} not found in {repository}")]
    NotFound { repository: String, tag: Fingerprint },

    /// Repository name cannot be mapped to storage
    #[error("invalid repository name: {0:?}")]
    InvalidRepository(String),

    /// Reading the source directory failed
    #[error("source error: {0}")]
    Source(#[from] HashError),

    /// Manifest could not be encoded or decoded
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The staged copy does not hash to the tag it was published under
    #[error("content of {repository} hashes to {actual}, not to tag {expected}")]
    TagMismatch {
        repository: String,
        expected: Fingerprint,
        actual: Fingerprint,
    },

    /// Remote/transport failure reported by a collaborator
    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl RegistryError {
    /// Whether a later attempt of the whole run could succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Transfer(_))
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Metadata stored next to each published artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub repository: String,
    pub tag: Fingerprint,
    pub files: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// Directory-backed registry
///
/// Layout: `<root>/<repository>/<tag>/` holds copies of the source
/// directory's top-level files plus `manifest.json`. Tags are never
/// overwritten or removed.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All tags stored for a repository, sorted
    ///
    /// # Errors
    /// Returns error if the repository directory cannot be read
    pub fn tags(&self, repository: &RegistryRef) -> Result<Vec<Fingerprint>, RegistryError> {
        let dir = self.repository_dir(repository)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut tags = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| RegistryError::io(&dir, e))? {
            let entry = entry.map_err(|e| RegistryError::io(&dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Ok(tag) = name.parse::<Fingerprint>() {
                if entry.path().join(MANIFEST_FILE).is_file() {
                    tags.push(tag);
                }
            }
        }
        tags.sort();
        Ok(tags)
    }

    /// Read the manifest of a stored artifact
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] if the tag is absent
    pub fn manifest(
        &self,
        repository: &RegistryRef,
        tag: &Fingerprint,
    ) -> Result<ArtifactManifest, RegistryError> {
        let path = self.tag_dir(repository, tag)?.join(MANIFEST_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound {
                    repository: repository.repository.clone(),
                    tag: *tag,
                })
            }
            Err(e) => return Err(RegistryError::io(&path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn repository_dir(&self, repository: &RegistryRef) -> Result<PathBuf, RegistryError> {
        let name = repository.repository.as_str();
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(RegistryError::InvalidRepository(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn tag_dir(&self, repository: &RegistryRef, tag: &Fingerprint) -> Result<PathBuf, RegistryError> {
        Ok(self.repository_dir(repository)?.join(tag.to_string()))
    }
}

impl ArtifactRegistry for LocalRegistry {
    fn exists(&self, repository: &RegistryRef, tag: &Fingerprint) -> Result<bool, RegistryError> {
        Ok(self.tag_dir(repository, tag)?.join(MANIFEST_FILE).is_file())
    }

    fn publish(
        &self,
        source: &Path,
        repository: &RegistryRef,
        tag: &Fingerprint,
    ) -> Result<(), RegistryError> {
        let repo_dir = self.repository_dir(repository)?;
        let target = repo_dir.join(tag.to_string());
        if target.exists() {
            return Err(RegistryError::TagExists {
                repository: repository.repository.clone(),
                tag: *tag,
            });
        }

        fs::create_dir_all(&repo_dir).map_err(|e| RegistryError::io(&repo_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&repo_dir)
            .map_err(|e| RegistryError::io(&repo_dir, e))?;

        let mut files = Vec::new();
        copy_tree(source, staging.path(), "", &mut files)?;
        files.sort();

        // Only top-level files feed the tag, and the manifest is not written yet
        let actual = fingerprint(staging.path())?;
        if actual != *tag {
            return Err(RegistryError::TagMismatch {
                repository: repository.repository.clone(),
                expected: *tag,
                actual,
            });
        }

        let manifest = ArtifactManifest {
            repository: repository.repository.clone(),
            tag: *tag,
            files,
            published_at: Utc::now(),
        };
        let manifest_path = staging.path().join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
            .map_err(|e| RegistryError::io(&manifest_path, e))?;

        commit(staging, &target)?;

        tracing::info!(
            repository = %repository,
            tag = %tag.short(),
            files = manifest.files.len(),
            "stored artifact in local registry"
        );
        Ok(())
    }
}

/// Copy `src` into `dst` recursively, following symlinks. Relative paths of
/// copied files are pushed onto `files` with `/` separators.
fn copy_tree(
    src: &Path,
    dst: &Path,
    prefix: &str,
    files: &mut Vec<String>,
) -> Result<(), RegistryError> {
    let entries = fs::read_dir(src).map_err(|e| RegistryError::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RegistryError::io(src, e))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let relative = if prefix.is_empty() {
            name.into_owned()
        } else {
            format!("{prefix}/{name}")
        };
        let dest = dst.join(entry.file_name());

        let metadata = fs::metadata(&path).map_err(|e| RegistryError::io(&path, e))?;
        if metadata.is_dir() {
            fs::create_dir(&dest).map_err(|e| RegistryError::io(&dest, e))?;
            copy_tree(&path, &dest, &relative, files)?;
        } else {
            fs::copy(&path, &dest).map_err(|e| RegistryError::io(&path, e))?;
            files.push(relative);
        }
    }
    Ok(())
}

/// Move a fully staged artifact into place. On failure the staging
/// directory is removed when `staging` drops.
fn commit(staging: tempfile::TempDir, target: &Path) -> Result<(), RegistryError> {
    fs::rename(staging.path(), target).map_err(|e| RegistryError::io(target, e))?;
    // moved away; nothing left to clean up
    let _ = staging.keep();
    Ok(())
}
