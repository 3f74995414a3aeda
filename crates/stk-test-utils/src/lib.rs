//! Testing utilities for stackkit workspace
//!
//! Shared test helpers, fixtures, and recording collaborators.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use stk_artifact::{ArtifactRegistry, Fingerprint, RegistryError, RegistryRef};
use stk_construct::{RemovalPolicy, Resource, SupportsAutoClean, SupportsRemovalPolicy};
use tempfile::TempDir;

/// Resource that records every capability call made on it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingResource {
    pub name: String,
    supports_removal: bool,
    supports_auto_clean: bool,
    pub removal_policy: Option<RemovalPolicy>,
    pub auto_clean: bool,
    pub removal_calls: u32,
    pub auto_clean_calls: u32,
}

impl RecordingResource {
    fn with_caps(name: &str, supports_removal: bool, supports_auto_clean: bool) -> Self {
        Self {
            name: name.to_string(),
            supports_removal,
            supports_auto_clean,
            ..Self::default()
        }
    }

    /// Exposes both capabilities, like a content store
    pub fn content_store(name: &str) -> Self {
        Self::with_caps(name, true, true)
    }

    /// Exposes only the removal-policy capability, like a primitive
    pub fn primitive(name: &str) -> Self {
        Self::with_caps(name, true, false)
    }

    /// Exposes only the auto-clean capability
    pub fn auto_clean_only(name: &str) -> Self {
        Self::with_caps(name, false, true)
    }

    /// Exposes no capabilities
    pub fn inert(name: &str) -> Self {
        Self::with_caps(name, false, false)
    }

    /// Total mutation calls received
    pub fn mutation_calls(&self) -> u32 {
        self.removal_calls + self.auto_clean_calls
    }

    /// Final policy state, for comparing across runs
    pub fn state(&self) -> (Option<RemovalPolicy>, bool) {
        (self.removal_policy, self.auto_clean)
    }
}

impl SupportsRemovalPolicy for RecordingResource {
    fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.removal_calls += 1;
        self.removal_policy = Some(policy);
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

impl SupportsAutoClean for RecordingResource {
    fn enable_auto_clean(&mut self) {
        self.auto_clean_calls += 1;
        self.auto_clean = true;
    }

    fn auto_clean_enabled(&self) -> bool {
        self.auto_clean
    }
}

impl Resource for RecordingResource {
    fn kind(&self) -> &str {
        "Test::Recording"
    }

    fn properties(&self) -> Option<serde_json::Value> {
        None
    }

    fn as_removal_policy(&self) -> Option<&dyn SupportsRemovalPolicy> {
        self.supports_removal.then_some(self as &dyn SupportsRemovalPolicy)
    }

    fn as_removal_policy_mut(&mut self) -> Option<&mut dyn SupportsRemovalPolicy> {
        if self.supports_removal {
            Some(self)
        } else {
            None
        }
    }

    fn as_auto_clean(&self) -> Option<&dyn SupportsAutoClean> {
        self.supports_auto_clean.then_some(self as &dyn SupportsAutoClean)
    }

    fn as_auto_clean_mut(&mut self) -> Option<&mut dyn SupportsAutoClean> {
        if self.supports_auto_clean {
            Some(self)
        } else {
            None
        }
    }
}

/// In-memory registry that counts calls and keeps every tag forever
#[derive(Debug, Default)]
pub struct CountingRegistry {
    tags: Mutex<BTreeSet<(String, Fingerprint)>>,
    exists_calls: Mutex<usize>,
    publishes: Mutex<Vec<Fingerprint>>,
    fail_publish: Mutex<Option<String>>,
}

impl CountingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transfer error
    pub fn fail_publishes(&self, reason: &str) {
        *self.fail_publish.lock() = Some(reason.to_string());
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.lock().len()
    }

    pub fn exists_count(&self) -> usize {
        *self.exists_calls.lock()
    }

    /// Tags published, in call order
    pub fn published_tags(&self) -> Vec<Fingerprint> {
        self.publishes.lock().clone()
    }

    /// Whether a tag is retrievable
    pub fn contains(&self, repository: &RegistryRef, tag: &Fingerprint) -> bool {
        self.tags
            .lock()
            .contains(&(repository.repository.clone(), *tag))
    }
}

impl ArtifactRegistry for CountingRegistry {
    fn exists(&self, repository: &RegistryRef, tag: &Fingerprint) -> Result<bool, RegistryError> {
        *self.exists_calls.lock() += 1;
        Ok(self.contains(repository, tag))
    }

    fn publish(
        &self,
        _source: &Path,
        repository: &RegistryRef,
        tag: &Fingerprint,
    ) -> Result<(), RegistryError> {
        if let Some(reason) = self.fail_publish.lock().clone() {
            return Err(RegistryError::Transfer(reason));
        }
        let inserted = self
            .tags
            .lock()
            .insert((repository.repository.clone(), *tag));
        if !inserted {
            return Err(RegistryError::TagExists {
                repository: repository.repository.clone(),
                tag: *tag,
            });
        }
        self.publishes.lock().push(*tag);
        Ok(())
    }
}

/// Create a temporary source directory holding the given top-level files
pub fn source_dir(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (name, data) in files {
        fs::write(dir.path().join(name), data).expect("write fixture file");
    }
    dir
}

/// Overwrite one fixture file
pub fn rewrite(dir: &Path, name: &str, data: &[u8]) {
    fs::write(dir.join(name), data).expect("rewrite fixture file");
}
