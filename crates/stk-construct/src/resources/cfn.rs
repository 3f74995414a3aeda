use crate::policy::{RemovalPolicy, SupportsRemovalPolicy};
use crate::resource::Resource;
use serde_json::{Map, Value};

/// Low-level provisioning primitive
///
/// Carries a type name understood by the provisioning engine and its raw
/// properties. Every primitive supports a removal-policy override.
#[derive(Debug, Clone, PartialEq)]
pub struct CfnResource {
    type_name: String,
    properties: Map<String, Value>,
    removal_policy: Option<RemovalPolicy>,
}

impl CfnResource {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Map::new(),
            removal_policy: None,
        }
    }

    /// Set a property, builder style
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl SupportsRemovalPolicy for CfnResource {
    fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.removal_policy = Some(policy);
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

impl Resource for CfnResource {
    fn kind(&self) -> &str {
        &self.type_name
    }

    fn properties(&self) -> Option<Value> {
        Some(Value::Object(self.properties.clone()))
    }

    fn as_removal_policy(&self) -> Option<&dyn SupportsRemovalPolicy> {
        Some(self)
    }

    fn as_removal_policy_mut(&mut self) -> Option<&mut dyn SupportsRemovalPolicy> {
        Some(self)
    }
}
