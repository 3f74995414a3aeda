use crate::resource::Resource;
use serde_json::{json, Value};
use stk_artifact::ArtifactRef;
use std::path::PathBuf;

/// Records that a fingerprinted image was pushed from a source directory
///
/// The transfer itself already happened through the publisher; this node
/// only carries the binding into the plan so dependents can order after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDeployment {
    source: PathBuf,
    artifact: ArtifactRef,
}

impl ImageDeployment {
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, artifact: ArtifactRef) -> Self {
        Self {
            source: source.into(),
            artifact,
        }
    }

    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }
}

impl Resource for ImageDeployment {
    fn kind(&self) -> &str {
        "Custom::ImageDeployment"
    }

    fn properties(&self) -> Option<Value> {
        Some(json!({
            "Source": self.source.display().to_string(),
            "Repository": self.artifact.registry.repository,
            "Tag": self.artifact.tag,
            "ImageUri": self.artifact.image_uri(),
        }))
    }
}
