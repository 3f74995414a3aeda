//! stackkit Core
//!
//! Configuration, the service stack definition and the provisioning run
//! that ties artifact publishing to stack synthesis.
//!
//! # Architecture
//!
//! ```text
//! StackConfig ──► Provisioner::run
//!                   ├─ ArtifactPublisher::publish_if_absent   (stk-artifact)
//!                   ├─ define_stack ──► StackBuilder           (stk-construct)
//!                   ├─ add_aspect(DeletionPolicySetter)
//!                   └─ build().synthesize() ──► DeploymentPlan
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use stk_artifact::LocalRegistry;
//! use stk_core::{Provisioner, StackConfig};
//!
//! let config = StackConfig::load("stack.toml")?;
//! let provisioner = Provisioner::new(LocalRegistry::new(&config.image.registry_root));
//! let report = provisioner.run(&config)?;
//! println!("{}", report.plan.to_json_pretty()?);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
mod error;
mod provisioner;
mod stack_def;

pub use config::{ConfigError, StackConfig, REMOVAL_POLICY_ENV};
pub use error::StkError;
pub use provisioner::{ProvisionReport, Provisioner};
pub use stack_def::define_stack;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
