//! Deployment plan handed to the external provisioning engine

use crate::policy::RemovalPolicy;
use serde::{Deserialize, Serialize};

/// One materializable resource, after all aspects ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedResource {
    pub logical_id: String,
    pub path: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,
    #[serde(default)]
    pub auto_clean: bool,
    pub properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Ordered resources of a synthesized stack
///
/// Every resource appears after everything it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    pub stack_name: String,
    pub resources: Vec<PlannedResource>,
}

impl DeploymentPlan {
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Look up a resource by construct path (`Stack/Vpc/Resource`)
    #[must_use]
    pub fn by_path(&self, path: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// Index of a resource in deployment order
    #[must_use]
    pub fn position(&self, logical_id: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.logical_id == logical_id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Pretty JSON rendering, as written to disk by the CLI
    ///
    /// # Errors
    /// Returns error if a property value cannot be serialized
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
