//! Built-in resource kinds
//!
//! Each kind declares which capabilities it exposes. Everything else about
//! it is opaque configuration carried through to the deployment plan.

mod bucket;
mod cfn;
mod group;
mod image;
mod repository;

pub use bucket::Bucket;
pub use cfn::CfnResource;
pub use group::Group;
pub use image::ImageDeployment;
pub use repository::{LifecycleRule, Repository, TagStatus};
