//! Aspects: visitors applied once to every node before synthesis

use crate::policy::PolicyDirective;
use crate::resource::Resource;
use std::fmt::Debug;

/// Cross-cutting mutation applied to every node of a built stack
///
/// # Contract
/// - invoked exactly once per node, in unspecified order
/// - must be total: nodes it does not care about are silently skipped
/// - the mutation of one node must not depend on any other node
pub trait Aspect: Debug {
    fn visit(&self, node: &mut dyn Resource);
}

/// Applies a [`PolicyDirective`] to every capable node
///
/// 1. Nodes with the removal-policy capability get the directive's policy.
/// 2. Under `Destroy` (with auto-clean on), nodes with the auto-clean
///    capability additionally get auto-clean enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionPolicySetter {
    directive: PolicyDirective,
}

impl DeletionPolicySetter {
    #[must_use]
    pub const fn new(directive: PolicyDirective) -> Self {
        Self { directive }
    }

    #[inline]
    #[must_use]
    pub const fn directive(&self) -> PolicyDirective {
        self.directive
    }
}

impl Aspect for DeletionPolicySetter {
    fn visit(&self, node: &mut dyn Resource) {
        if let Some(target) = node.as_removal_policy_mut() {
            target.apply_removal_policy(self.directive.removal);
        }

        if self.directive.cleans_on_destroy() {
            if let Some(target) = node.as_auto_clean_mut() {
                target.enable_auto_clean();
            }
        }
    }
}
