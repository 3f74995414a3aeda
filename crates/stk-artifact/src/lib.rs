//! stackkit Artifact System
//!
//! Content-addressed image tags and idempotent publishing.
//!
//! # Core Concepts
//!
//! - [`Fingerprint`]: SHA-256 over a directory's top-level file bytes, used
//!   as the image tag
//! - [`ArtifactRef`]: a repository plus a fingerprint tag
//! - [`ArtifactRegistry`]: collaborator that checks for and stores tags
//! - [`ArtifactPublisher`]: publishes a source directory only when its tag
//!   is absent
//!
//! # Example
//!
//! ```rust,ignore
//! use stk_artifact::{ArtifactPublisher, LocalRegistry, RegistryRef};
//!
//! let publisher = ArtifactPublisher::new(LocalRegistry::new(".stk/registry"));
//! let repo = RegistryRef::new("localhost", "service/chatbot");
//! let artifact = publisher.ensure_published("./src/chatbot".as_ref(), &repo)?;
//! println!("image: {}", artifact.image_uri());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod fingerprint;
mod publisher;
mod registry;

pub use artifact::{ArtifactRef, RegistryRef};
pub use fingerprint::{fingerprint, top_level_files, Fingerprint, HashError, FINGERPRINT_LEN};
pub use publisher::{ArtifactPublisher, Publication, PublishError, PublishOutcome};
pub use registry::{ArtifactManifest, ArtifactRegistry, LocalRegistry, RegistryError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
