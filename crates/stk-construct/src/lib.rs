//! stackkit Constructs
//!
//! Construct tree, capability-dispatch aspects and plan synthesis.
//!
//! # Core Concepts
//!
//! - [`Resource`]: a node; exposes capabilities through `as_*` accessors
//! - [`SupportsRemovalPolicy`] / [`SupportsAutoClean`]: the capabilities
//!   policy aspects dispatch on
//! - [`Aspect`]: visitor applied once per node before synthesis
//! - [`DeletionPolicySetter`]: applies a [`PolicyDirective`] stack-wide
//! - [`StackBuilder`] → [`Stack`] → [`Synthesis`]: build, freeze, visit, plan
//!
//! # Example
//!
//! ```rust,ignore
//! use stk_construct::prelude::*;
//!
//! let mut builder = StackBuilder::new("ServiceStack")?;
//! builder.add(builder.root(), "Assets", Bucket::new())?;
//! builder.add_aspect(DeletionPolicySetter::new(PolicyDirective::destroy()));
//!
//! let synthesis = builder.build().synthesize()?;
//! println!("{}", synthesis.plan.to_json_pretty()?);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod aspect;
mod path;
mod plan;
mod policy;
mod resource;
mod stack;

pub mod resources;

pub use aspect::{Aspect, DeletionPolicySetter};
pub use path::{ConstructPath, PATH_SEPARATOR};
pub use plan::{DeploymentPlan, PlannedResource};
pub use policy::{
    PolicyDirective, RemovalPolicy, SupportsAutoClean, SupportsRemovalPolicy, UnknownRemovalPolicy,
};
pub use resource::Resource;
pub use stack::{ConstructError, NodeId, Stack, StackBuilder, Synthesis};

/// Common imports for declaring stacks
pub mod prelude {
    pub use crate::resources::{Bucket, CfnResource, Group, ImageDeployment, LifecycleRule, Repository, TagStatus};
    pub use crate::{
        Aspect, ConstructError, DeletionPolicySetter, DeploymentPlan, NodeId, PolicyDirective,
        RemovalPolicy, Resource, Stack, StackBuilder, SupportsAutoClean, SupportsRemovalPolicy,
        Synthesis,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
