//! Stack configuration
//!
//! Loaded from TOML. Every section and field is optional; omitted values
//! take the defaults below.
//!
//! ```toml
//! stack_name = "ServiceStack"
//! region = "us-west-2"
//!
//! [policy]
//! removal = "destroy"
//! auto_clean = true
//!
//! [image]
//! source_dir = "./src/chatbot"
//! repository = "service/chatbot"
//! max_image_count = 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use stk_artifact::RegistryRef;
use stk_construct::{PolicyDirective, RemovalPolicy, UnknownRemovalPolicy};

/// Environment variable overriding `policy.removal`
pub const REMOVAL_POLICY_ENV: &str = "STK_REMOVAL_POLICY";

/// Zones the VPC address plan has room for
pub const MAX_AZS: u32 = 8;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the stack cannot be built from
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid {var}: {source}")]
    Override {
        var: &'static str,
        #[source]
        source: UnknownRemovalPolicy,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level stack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub stack_name: String,
    pub region: String,
    /// SSM parameter names the task and function may read
    pub secret_parameters: Vec<String>,
    pub policy: PolicyConfig,
    pub network: NetworkConfig,
    pub image: ImageConfig,
    pub task: TaskConfig,
    pub schedule: ScheduleConfig,
}

/// Teardown policy applied to every capable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub removal: RemovalPolicy,
    pub auto_clean: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub max_azs: u32,
    pub nat_instance_type: String,
}

/// Container image source and its repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Directory whose top-level files are fingerprinted and shipped
    pub source_dir: PathBuf,
    pub registry_host: String,
    pub repository: String,
    /// Root of the local registry
    pub registry_root: PathBuf,
    /// Lifecycle rule: number of images the registry keeps
    pub max_image_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    pub container_name: String,
    pub memory_mib: u32,
    pub cpu: u32,
    pub environment: BTreeMap<String, String>,
}

/// Scheduled function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Six-field cron expression, evaluated in UTC
    pub cron: String,
    pub function_entry: PathBuf,
    pub runtime: String,
    pub handler: String,
    pub function_memory_mib: u32,
    /// Parameter holding the channel the function posts to, exposed to it
    /// as `CHANNEL_ID`
    pub channel_parameter: Option<String>,
    pub environment: BTreeMap<String, String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "ServiceStack".into(),
            region: "us-west-2".into(),
            secret_parameters: vec![
                "/service/discord-token".into(),
                "/service/openai-secret".into(),
            ],
            policy: PolicyConfig::default(),
            network: NetworkConfig::default(),
            image: ImageConfig::default(),
            task: TaskConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let directive = PolicyDirective::default();
        Self {
            removal: directive.removal,
            auto_clean: directive.auto_clean,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_azs: 1,
            nat_instance_type: "t3.nano".into(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./src/chatbot"),
            registry_host: "localhost".into(),
            repository: "service/chatbot".into(),
            registry_root: PathBuf::from(".stk/registry"),
            max_image_count: 3,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            container_name: "chatbot".into(),
            memory_mib: 512,
            cpu: 256,
            environment: BTreeMap::new(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 23 ? * SUN-THU *".into(),
            function_entry: PathBuf::from("./src/post_indicators"),
            runtime: "python3.8".into(),
            handler: "main.handler".into(),
            function_memory_mib: 1024,
            channel_parameter: Some("/service/fx-channel-id".into()),
            environment: BTreeMap::from([("IMPORTANCE_LEVEL".to_string(), "3".to_string())]),
        }
    }
}

impl StackConfig {
    /// Read, apply environment overrides and validate
    ///
    /// # Errors
    /// Fails if the file is missing or unreadable, is not valid TOML, or
    /// holds invalid values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides()?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            stack = %config.stack_name,
            removal = %config.policy.removal,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse TOML without overrides or validation
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Fails when an override variable holds an unparseable value
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// # Errors
    /// Fails when an override variable holds an unparseable value
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(REMOVAL_POLICY_ENV) {
            self.policy.removal = value.parse().map_err(|source| ConfigError::Override {
                var: REMOVAL_POLICY_ENV,
                source,
            })?;
            tracing::debug!(removal = %self.policy.removal, "removal policy overridden from environment");
        }
        Ok(())
    }

    /// Check values that would otherwise fail late, during synthesis or
    /// in the provisioning engine
    ///
    /// # Errors
    /// Returns the first [`ConfigError::Invalid`] found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_name.trim().is_empty() || self.stack_name.contains('/') {
            return Err(ConfigError::invalid(
                "stack_name",
                "must be non-empty and contain no '/'",
            ));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::invalid("region", "must be non-empty"));
        }
        if !(1..=MAX_AZS).contains(&self.network.max_azs) {
            return Err(ConfigError::invalid(
                "network.max_azs",
                format!("must be between 1 and {MAX_AZS}"),
            ));
        }
        if self.image.repository.trim().is_empty() {
            return Err(ConfigError::invalid("image.repository", "must be non-empty"));
        }
        if self.image.registry_host.trim().is_empty() {
            return Err(ConfigError::invalid("image.registry_host", "must be non-empty"));
        }
        if self.image.max_image_count == 0 {
            return Err(ConfigError::invalid("image.max_image_count", "must be at least 1"));
        }
        if self.task.container_name.trim().is_empty() {
            return Err(ConfigError::invalid("task.container_name", "must be non-empty"));
        }
        if self.task.memory_mib == 0 {
            return Err(ConfigError::invalid("task.memory_mib", "must be greater than 0"));
        }
        if self.task.cpu == 0 {
            return Err(ConfigError::invalid("task.cpu", "must be greater than 0"));
        }
        if self.schedule.function_memory_mib == 0 {
            return Err(ConfigError::invalid(
                "schedule.function_memory_mib",
                "must be greater than 0",
            ));
        }
        let fields = self.schedule.cron.split_whitespace().count();
        if fields != 6 {
            return Err(ConfigError::invalid(
                "schedule.cron",
                format!("expected 6 fields, found {fields}"),
            ));
        }
        Ok(())
    }

    /// The repository the image is published to
    #[must_use]
    pub fn registry_ref(&self) -> RegistryRef {
        RegistryRef::new(&self.image.registry_host, &self.image.repository)
    }

    /// The directive the deletion policy aspect applies
    #[inline]
    #[must_use]
    pub fn directive(&self) -> PolicyDirective {
        PolicyDirective {
            removal: self.policy.removal,
            auto_clean: self.policy.auto_clean,
        }
    }

    #[must_use]
    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = name.into();
        self
    }

    #[must_use]
    pub fn with_removal_policy(mut self, removal: RemovalPolicy) -> Self {
        self.policy.removal = removal;
        self
    }

    #[must_use]
    pub fn with_auto_clean(mut self, auto_clean: bool) -> Self {
        self.policy.auto_clean = auto_clean;
        self
    }

    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image.source_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_registry_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.image.registry_root = root.into();
        self
    }

    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.image.repository = repository.into();
        self
    }

    #[must_use]
    pub fn with_max_image_count(mut self, count: u32) -> Self {
        self.image.max_image_count = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = StackConfig::from_toml_str("").unwrap();
        assert_eq!(config, StackConfig::default());
        assert_eq!(config.stack_name, "ServiceStack");
        assert_eq!(config.directive(), PolicyDirective::destroy());
        assert_eq!(config.image.max_image_count, 3);
        assert_eq!(config.task.memory_mib, 512);
        assert_eq!(config.task.cpu, 256);
        assert_eq!(config.schedule.function_memory_mib, 1024);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StackConfig::from_toml_str(
            r#"
            stack_name = "Staging"

            [policy]
            removal = "retain"

            [task.environment]
            MODE = "staging"
            "#,
        )
        .unwrap();

        assert_eq!(config.stack_name, "Staging");
        assert_eq!(config.policy.removal, RemovalPolicy::Retain);
        assert!(config.policy.auto_clean);
        assert_eq!(config.task.cpu, 256);
        assert_eq!(config.task.environment.get("MODE").map(String::as_str), Some("staging"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StackConfig::from_toml_str("[image]\nmax_images = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases = [
            (StackConfig::default().with_stack_name(""), "stack_name"),
            (StackConfig::default().with_stack_name("a/b"), "stack_name"),
            (StackConfig::default().with_repository(" "), "image.repository"),
            (StackConfig::default().with_max_image_count(0), "image.max_image_count"),
        ];
        for (config, expected) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }

        let mut config = StackConfig::default();
        config.task.memory_mib = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "task.memory_mib", .. })
        ));

        let mut config = StackConfig::default();
        config.schedule.cron = "0 23 * * *".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "schedule.cron", .. })
        ));
    }

    #[test]
    fn env_override_replaces_removal_policy() {
        let mut config = StackConfig::default();
        config
            .apply_env_overrides_from(|key| (key == REMOVAL_POLICY_ENV).then(|| "RETAIN".to_string()))
            .unwrap();
        assert_eq!(config.policy.removal, RemovalPolicy::Retain);

        let err = config
            .apply_env_overrides_from(|_| Some("keep".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Override { var: REMOVAL_POLICY_ENV, .. }));
        assert_eq!(config.policy.removal, RemovalPolicy::Retain);
    }

    #[test]
    fn absent_override_changes_nothing() {
        let mut config = StackConfig::default();
        config.apply_env_overrides_from(|_| None).unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("stack.toml");
        let err = StackConfig::load(&missing).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.toml");
        fs::write(&path, "[image]\nmax_image_count = 0\n").unwrap();
        assert!(matches!(StackConfig::load(&path), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn registry_ref_uses_image_section() {
        let config = StackConfig::default().with_repository("team/app");
        assert_eq!(config.registry_ref(), RegistryRef::new("localhost", "team/app"));
    }
}
