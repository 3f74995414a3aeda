use crate::policy::{RemovalPolicy, SupportsAutoClean, SupportsRemovalPolicy};
use crate::resource::Resource;
use serde_json::{json, Value};

/// Object store; refuses deletion while non-empty unless auto-clean is on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    bucket_name: Option<String>,
    removal_policy: Option<RemovalPolicy>,
    auto_delete_objects: bool,
}

impl Bucket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            bucket_name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl SupportsRemovalPolicy for Bucket {
    fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.removal_policy = Some(policy);
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

impl SupportsAutoClean for Bucket {
    fn enable_auto_clean(&mut self) {
        self.auto_delete_objects = true;
    }

    fn auto_clean_enabled(&self) -> bool {
        self.auto_delete_objects
    }
}

impl Resource for Bucket {
    fn kind(&self) -> &str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Option<Value> {
        let mut props = json!({});
        if let Some(name) = &self.bucket_name {
            props["BucketName"] = json!(name);
        }
        Some(props)
    }

    fn as_removal_policy(&self) -> Option<&dyn SupportsRemovalPolicy> {
        Some(self)
    }

    fn as_removal_policy_mut(&mut self) -> Option<&mut dyn SupportsRemovalPolicy> {
        Some(self)
    }

    fn as_auto_clean(&self) -> Option<&dyn SupportsAutoClean> {
        Some(self)
    }

    fn as_auto_clean_mut(&mut self) -> Option<&mut dyn SupportsAutoClean> {
        Some(self)
    }
}
