//! Idempotent artifact publishing
//!
//! [`ArtifactPublisher::ensure_published`] binds a source directory's
//! fingerprint to a registry entry, pushing only when the tag is absent.

use crate::artifact::{ArtifactRef, RegistryRef};
use crate::fingerprint::{fingerprint, HashError};
use crate::registry::{ArtifactRegistry, RegistryError};
use std::path::Path;

/// What `ensure_published` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The tag was absent and a fresh artifact was pushed
    Published,
    /// The tag was already present; no transfer happened
    AlreadyPresent,
}

/// Result of a publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub artifact: ArtifactRef,
    pub outcome: PublishOutcome,
}

/// Errors from publishing, always fatal to the current run
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Fingerprinting the source directory failed
    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] HashError),

    /// Existence check or publish failed
    #[error("registry failed: {0}")]
    Registry(#[from] RegistryError),
}

impl PublishError {
    /// Whether rerunning the whole provisioning run could help
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Registry(e) if e.is_transient())
    }
}

/// Publishes content-addressed artifacts through a registry collaborator
#[derive(Debug)]
pub struct ArtifactPublisher<R> {
    registry: R,
}

impl<R: ArtifactRegistry> ArtifactPublisher<R> {
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Ensure an artifact tagged with `source_dir`'s fingerprint exists.
    ///
    /// Calling this repeatedly with an unchanged directory never re-uploads.
    /// A changed directory yields a new tag; existing tags are never
    /// overwritten.
    ///
    /// # Errors
    /// Hashing and registry failures propagate immediately without retry.
    pub fn ensure_published(
        &self,
        source_dir: &Path,
        repository: &RegistryRef,
    ) -> Result<ArtifactRef, PublishError> {
        self.publish_if_absent(source_dir, repository)
            .map(|publication| publication.artifact)
    }

    /// Same as [`ensure_published`](Self::ensure_published) but also
    /// reports whether a transfer took place.
    ///
    /// # Errors
    /// Hashing and registry failures propagate immediately without retry.
    pub fn publish_if_absent(
        &self,
        source_dir: &Path,
        repository: &RegistryRef,
    ) -> Result<Publication, PublishError> {
        let tag = fingerprint(source_dir)?;
        let artifact = repository.artifact(tag);

        let outcome = if self.registry.exists(repository, &tag)? {
            tracing::info!(artifact = %artifact, "artifact already present, skipping publish");
            PublishOutcome::AlreadyPresent
        } else {
            tracing::info!(
                artifact = %artifact,
                source = %source_dir.display(),
                "publishing artifact"
            );
            self.registry.publish(source_dir, repository, &tag)?;
            PublishOutcome::Published
        };

        Ok(Publication { artifact, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::registry::MockArtifactRegistry;
    use mockall::predicate::always;
    use std::fs;

    fn source(data: &[u8]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), data).unwrap();
        dir
    }

    fn repo() -> RegistryRef {
        RegistryRef::new("registry.local", "service/chatbot")
    }

    #[test]
    fn publishes_when_tag_absent() {
        let dir = source(b"v1");
        let expected = Fingerprint::of_bytes(b"v1");

        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_exists()
            .withf(move |_, tag| *tag == expected)
            .times(1)
            .returning(|_, _| Ok(false));
        registry
            .expect_publish()
            .withf(move |_, _, tag| *tag == expected)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let publication = ArtifactPublisher::new(registry)
            .publish_if_absent(dir.path(), &repo())
            .unwrap();
        assert_eq!(publication.outcome, PublishOutcome::Published);
        assert_eq!(publication.artifact.tag, expected);
    }

    #[test]
    fn skips_publish_when_tag_present() {
        let dir = source(b"v1");

        let mut registry = MockArtifactRegistry::new();
        registry.expect_exists().times(1).returning(|_, _| Ok(true));
        registry.expect_publish().times(0);

        let artifact = ArtifactPublisher::new(registry)
            .ensure_published(dir.path(), &repo())
            .unwrap();
        assert_eq!(artifact.registry, repo());
    }

    #[test]
    fn registry_failure_propagates_without_retry() {
        let dir = source(b"v1");

        let mut registry = MockArtifactRegistry::new();
        registry
            .expect_exists()
            .times(1)
            .returning(|_, _| Err(RegistryError::Transfer("connection reset".into())));
        registry.expect_publish().times(0);

        let err = ArtifactPublisher::new(registry)
            .ensure_published(dir.path(), &repo())
            .unwrap_err();
        assert!(matches!(err, PublishError::Registry(RegistryError::Transfer(_))));
        assert!(err.is_transient());
    }

    #[test]
    fn publish_failure_propagates() {
        let dir = source(b"v1");

        let mut registry = MockArtifactRegistry::new();
        registry.expect_exists().returning(|_, _| Ok(false));
        registry
            .expect_publish()
            .with(always(), always(), always())
            .times(1)
            .returning(|_, _, _| Err(RegistryError::Transfer("denied".into())));

        let result = ArtifactPublisher::new(registry).ensure_published(dir.path(), &repo());
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_source_never_touches_registry() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let mut registry = MockArtifactRegistry::new();
        registry.expect_exists().times(0);
        registry.expect_publish().times(0);

        let err = ArtifactPublisher::new(registry)
            .ensure_published(&missing, &repo())
            .unwrap_err();
        assert!(matches!(err, PublishError::Fingerprint(HashError::Io { .. })));
        assert!(!err.is_transient());
    }
}
