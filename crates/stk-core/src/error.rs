//! Error types for a provisioning run

use crate::config::ConfigError;
use std::io;
use std::path::PathBuf;
use stk_artifact::{PublishError, RegistryError};
use stk_construct::ConstructError;

/// Main stackkit error type
#[derive(Debug, thiserror::Error)]
pub enum StkError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fingerprinting or publishing the image failed
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    /// Registry inspection failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Declaring or synthesizing the stack failed
    #[error("construction failed: {0}")]
    Construct(#[from] ConstructError),

    /// Plan could not be encoded
    #[error("plan encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StkError {
    /// Whether an outer orchestrator may rerun the whole run
    ///
    /// The run itself never retries.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Publish(e) => e.is_transient(),
            Self::Registry(e) => e.is_transient(),
            Self::Io { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stk_artifact::Fingerprint;

    #[test]
    fn registry_io_is_retryable() {
        let err = StkError::from(PublishError::from(RegistryError::Transfer("timeout".into())));
        assert!(err.is_retryable());
    }

    #[test]
    fn tag_conflicts_and_construction_errors_are_not() {
        let err = StkError::from(PublishError::from(RegistryError::TagExists {
            repository: "service/chatbot".into(),
            tag: Fingerprint::of_bytes(b""),
        }));
        assert!(!err.is_retryable());

        let err = StkError::from(ConstructError::InvalidId(String::new()));
        assert!(!err.is_retryable());
    }
}
