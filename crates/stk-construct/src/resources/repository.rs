use crate::policy::{RemovalPolicy, SupportsAutoClean, SupportsRemovalPolicy};
use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Which image tags a lifecycle rule counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Any,
    Tagged,
    Untagged,
}

/// Declarative retention rule, enforced by the registry itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub max_image_count: u32,
    pub tag_status: TagStatus,
}

impl LifecycleRule {
    /// Keep at most `count` images of any tag status
    #[must_use]
    pub const fn keep_last(count: u32) -> Self {
        Self {
            max_image_count: count,
            tag_status: TagStatus::Any,
        }
    }
}

/// Image repository; refuses deletion while it holds images unless
/// auto-clean is on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    repository_name: String,
    lifecycle_rules: Vec<LifecycleRule>,
    removal_policy: Option<RemovalPolicy>,
    auto_delete_images: bool,
}

impl Repository {
    #[must_use]
    pub fn new(repository_name: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            lifecycle_rules: Vec::new(),
            removal_policy: None,
            auto_delete_images: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn add_lifecycle_rule(&mut self, rule: LifecycleRule) {
        self.lifecycle_rules.push(rule);
    }

    #[must_use]
    pub fn with_lifecycle_rule(mut self, rule: LifecycleRule) -> Self {
        self.add_lifecycle_rule(rule);
        self
    }

    #[inline]
    #[must_use]
    pub fn lifecycle_rules(&self) -> &[LifecycleRule] {
        &self.lifecycle_rules
    }
}

impl SupportsRemovalPolicy for Repository {
    fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.removal_policy = Some(policy);
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

impl SupportsAutoClean for Repository {
    fn enable_auto_clean(&mut self) {
        self.auto_delete_images = true;
    }

    fn auto_clean_enabled(&self) -> bool {
        self.auto_delete_images
    }
}

impl Resource for Repository {
    fn kind(&self) -> &str {
        "AWS::ECR::Repository"
    }

    fn properties(&self) -> Option<Value> {
        let rules: Vec<Value> = self
            .lifecycle_rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                json!({
                    "rulePriority": i + 1,
                    "selection": {
                        "tagStatus": rule.tag_status,
                        "countType": "imageCountMoreThan",
                        "countNumber": rule.max_image_count,
                    },
                    "action": { "type": "expire" },
                })
            })
            .collect();

        let mut props = json!({ "RepositoryName": self.repository_name });
        if !rules.is_empty() {
            props["LifecyclePolicy"] = json!({ "rules": rules });
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_rules_render_in_priority_order() {
        let repo = Repository::new("service/chatbot")
            .with_lifecycle_rule(LifecycleRule::keep_last(3))
            .with_lifecycle_rule(LifecycleRule {
                max_image_count: 1,
                tag_status: TagStatus::Untagged,
            });

        let props = repo.properties().unwrap();
        let rules = props["LifecyclePolicy"]["rules"].as_array().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["rulePriority"], 1);
        assert_eq!(rules[0]["selection"]["tagStatus"], "any");
        assert_eq!(rules[0]["selection"]["countNumber"], 3);
        assert_eq!(rules[1]["selection"]["tagStatus"], "untagged");
    }

    #[test]
    fn no_rules_no_policy() {
        let props = Repository::new("bare").properties().unwrap();
        assert!(props.get("LifecyclePolicy").is_none());
    }
}
