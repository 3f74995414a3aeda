//! One provisioning run: fingerprint, publish, declare, visit, plan

use crate::config::StackConfig;
use crate::error::StkError;
use crate::stack_def::define_stack;
use stk_artifact::{ArtifactPublisher, ArtifactRef, ArtifactRegistry, PublishOutcome};
use stk_construct::{DeletionPolicySetter, DeploymentPlan};

/// Outcome of [`Provisioner::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionReport {
    /// The image the plan references
    pub artifact: ArtifactRef,
    pub outcome: PublishOutcome,
    pub plan: DeploymentPlan,
    /// Aspect invocations performed during synthesis
    pub visits: usize,
}

impl ProvisionReport {
    /// Whether this run pushed a new image
    #[inline]
    #[must_use]
    pub fn published(&self) -> bool {
        self.outcome == PublishOutcome::Published
    }
}

/// Drives a full run against a registry collaborator
#[derive(Debug)]
pub struct Provisioner<R> {
    publisher: ArtifactPublisher<R>,
}

impl<R: ArtifactRegistry> Provisioner<R> {
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self {
            publisher: ArtifactPublisher::new(registry),
        }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &R {
        self.publisher.registry()
    }

    /// Run once for `config`
    ///
    /// The image is published (if absent) before any construct is declared,
    /// so a hashing or registry failure aborts with no graph built and no
    /// policy applied.
    ///
    /// # Errors
    /// Invalid configuration, publish failures and construction errors are
    /// all fatal to the run.
    pub fn run(&self, config: &StackConfig) -> Result<ProvisionReport, StkError> {
        config.validate()?;

        let publication = self
            .publisher
            .publish_if_absent(&config.image.source_dir, &config.registry_ref())?;
        tracing::info!(
            artifact = %publication.artifact,
            outcome = ?publication.outcome,
            "image ready"
        );

        let mut builder = define_stack(config, &publication.artifact)?;
        builder.add_aspect(DeletionPolicySetter::new(config.directive()));
        let synthesis = builder.build().synthesize()?;

        tracing::info!(
            stack = %config.stack_name,
            resources = synthesis.plan.len(),
            removal = %config.policy.removal,
            "provisioning run complete"
        );
        Ok(ProvisionReport {
            artifact: publication.artifact,
            outcome: publication.outcome,
            plan: synthesis.plan,
            visits: synthesis.visits,
        })
    }
}
