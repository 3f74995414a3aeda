//! The node type of a construct tree

use crate::policy::{SupportsAutoClean, SupportsRemovalPolicy};
use std::fmt::Debug;

/// A declared resource or grouping construct
///
/// Capabilities are discovered through the `as_*` accessors, which default
/// to `None`. A new resource kind becomes visible to every policy aspect by
/// implementing the capability trait and overriding the matching pair of
/// accessors; no aspect needs to change.
///
/// # Example
/// ```rust,ignore
/// impl Resource for Queue {
///     fn kind(&self) -> &str { "AWS::SQS::Queue" }
///     fn as_removal_policy(&self) -> Option<&dyn SupportsRemovalPolicy> { Some(self) }
///     fn as_removal_policy_mut(&mut self) -> Option<&mut dyn SupportsRemovalPolicy> { Some(self) }
///     fn properties(&self) -> Option<serde_json::Value> { Some(json!({ "QueueName": self.name })) }
/// }
/// ```
pub trait Resource: Debug {
    /// Resource type name as understood by the provisioning engine
    fn kind(&self) -> &str;

    /// Properties to materialize, or `None` for pure grouping constructs
    /// that do not appear in the deployment plan
    fn properties(&self) -> Option<serde_json::Value>;

    fn as_removal_policy(&self) -> Option<&dyn SupportsRemovalPolicy> {
        None
    }

    fn as_removal_policy_mut(&mut self) -> Option<&mut dyn SupportsRemovalPolicy> {
        None
    }

    fn as_auto_clean(&self) -> Option<&dyn SupportsAutoClean> {
        None
    }

    fn as_auto_clean_mut(&mut self) -> Option<&mut dyn SupportsAutoClean> {
        None
    }
}
