//! Registry and artifact references

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of an image repository inside a registry
///
/// `host` is the registry endpoint (for example
/// `123456789012.dkr.ecr.us-west-2.amazonaws.com`), `repository` the
/// repository name within it (for example `service/chatbot`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistryRef {
    pub host: String,
    pub repository: String,
}

impl RegistryRef {
    #[must_use]
    pub fn new(host: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            repository: repository.into(),
        }
    }

    /// Reference an artifact in this repository by tag
    #[inline]
    #[must_use]
    pub fn artifact(&self, tag: Fingerprint) -> ArtifactRef {
        ArtifactRef {
            registry: self.clone(),
            tag,
        }
    }
}

impl Display for RegistryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.repository)
    }
}

/// A fingerprinted artifact in a repository
///
/// The fingerprint *is* the tag, so consumers always reference the exact
/// content that was published rather than a moving `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub registry: RegistryRef,
    pub tag: Fingerprint,
}

impl ArtifactRef {
    /// Full image URI, `<host>/<repository>:<tag>`
    #[must_use]
    pub fn image_uri(&self) -> String {
        self.to_string()
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.registry, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_uri_uses_fingerprint_as_tag() {
        let tag = Fingerprint::of_bytes(b"image");
        let artifact = RegistryRef::new("registry.local", "service/chatbot").artifact(tag);

        assert_eq!(
            artifact.image_uri(),
            format!("registry.local/service/chatbot:{tag}")
        );
    }

    #[test]
    fn artifact_ref_roundtrips_through_json() {
        let artifact = RegistryRef::new("r", "repo").artifact(Fingerprint::of_bytes(b"x"));
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["tag"], artifact.tag.to_string());
        let back: ArtifactRef = serde_json::from_value(json).unwrap();
        assert_eq!(artifact, back);
    }
}
