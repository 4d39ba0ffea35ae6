//! Sequencing of contract deployments.
//!
//! Plans run in the order they are given. A plan that needs the address of another
//! contract names it in `depends_on`, and that contract must appear earlier in the
//! list: the order is fixed up front and checked by [`validate_plans`], it is
//! never computed at runtime.

use std::collections::HashSet;

use crate::{
    ContractPlan, ContractStep, DeployError, DeploymentManifest, ManifestEntry, RetryPolicy,
    Toolchain,
};

/// Settings threaded into the orchestrator when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Retry policy applied to every deploy and verify call.
    pub retry: RetryPolicy,
    /// Whether contracts declaring verification arguments are verified.
    pub verify: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            verify: true,
        }
    }
}

/// Check that `plans` can be deployed in the given order.
///
/// Every name must be unique, every `depends_on` entry must name an earlier plan and
/// every address an argument reads must be listed in `depends_on`.
pub fn validate_plans(plans: &[ContractPlan]) -> Result<(), DeployError> {
    let mut seen: HashSet<&str> = HashSet::new();

    for plan in plans {
        for dependency in &plan.depends_on {
            if dependency == &plan.name {
                return Err(DeployError::configuration(format!(
                    "{} depends on itself",
                    plan.name
                )));
            }
            if !seen.contains(dependency.as_str()) {
                return Err(DeployError::configuration(format!(
                    "{} depends on {dependency}, which is not deployed before it",
                    plan.name
                )));
            }
        }

        if let Some(reference) = plan
            .references()
            .into_iter()
            .find(|reference| !plan.depends_on.iter().any(|dep| dep == reference))
        {
            return Err(DeployError::configuration(format!(
                "{} reads the address of {reference} but does not list it in depends_on",
                plan.name
            )));
        }

        if !seen.insert(plan.name.as_str()) {
            return Err(DeployError::configuration(format!(
                "{} is deployed more than once",
                plan.name
            )));
        }
    }

    Ok(())
}

/// Drives [`ContractStep`]s in dependency order and collects their outcomes.
pub struct Orchestrator<T> {
    toolchain: T,
    config: OrchestratorConfig,
}

impl<T: Toolchain> Orchestrator<T> {
    pub fn new(toolchain: T, config: OrchestratorConfig) -> Self {
        Self { toolchain, config }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Deploy every plan and return the resulting manifest.
    ///
    /// Stops at the first plan that fails to deploy; what was deployed before it is
    /// dropped. Use [`Orchestrator::run_into`] to keep it.
    pub async fn run(&self, plans: &[ContractPlan]) -> Result<DeploymentManifest, DeployError> {
        let mut manifest = DeploymentManifest::default();
        self.run_into(plans, &mut manifest).await?;
        Ok(manifest)
    }

    /// Deploy every plan, appending each outcome to `manifest` as soon as it is known.
    ///
    /// On failure `manifest` holds the contracts deployed so far.
    pub async fn run_into(
        &self,
        plans: &[ContractPlan],
        manifest: &mut DeploymentManifest,
    ) -> Result<(), DeployError> {
        validate_plans(plans)?;

        let step = ContractStep::new(&self.toolchain, self.config.retry).verify(self.config.verify);

        tracing::info!(
            contracts = plans.len(),
            max_attempts = self.config.retry.attempts(),
            verify = self.config.verify,
            "Starting deployment..."
        );

        for (index, plan) in plans.iter().enumerate() {
            // Predecessor addresses are read from the manifest, so a plan can only be
            // resolved once they have been deployed.
            let spec = plan.resolve(manifest)?;

            tracing::info!(
                step = index + 1,
                total = plans.len(),
                contract = %plan.name,
                depends_on = ?plan.depends_on,
                "Running deployment step"
            );

            let outcome = step.run_step(&spec).await.inspect_err(|err| {
                tracing::error!(
                    contract = %plan.name,
                    error = %err,
                    deployed = manifest.len(),
                    remaining = plans.len() - index - 1,
                    "Aborting deployment"
                );
            })?;

            manifest.insert(
                plan.name.clone(),
                ManifestEntry {
                    location: spec.location,
                    args: spec.args,
                    deploy: outcome.deploy,
                    verification: outcome.verification,
                },
            )?;
        }

        tracing::info!(contracts = manifest.len(), "Deployment complete");

        Ok(())
    }
}
