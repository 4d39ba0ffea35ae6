//! Deployment of a single contract.

use crate::{
    ContractSpec, DeployError, DeployResult, RetryPolicy, Toolchain, VerificationStatus,
    retry::{RetryExhausted, with_retry},
};

/// Result of a step: the deployment, and what happened to its verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub deploy: DeployResult,
    pub verification: VerificationStatus,
}

/// Deploys one contract and optionally verifies it.
///
/// A step receives a fully resolved [`ContractSpec`]; it never looks at other steps.
pub struct ContractStep<'a, T> {
    toolchain: &'a T,
    retry: RetryPolicy,
    verify: bool,
}

impl<'a, T: Toolchain> ContractStep<'a, T> {
    pub fn new(toolchain: &'a T, retry: RetryPolicy) -> Self {
        Self {
            toolchain,
            retry,
            verify: true,
        }
    }

    /// Enable or disable block explorer verification.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Deploy `spec`, then verify it if it declares verification arguments.
    ///
    /// Fails only if the deployment itself fails on every attempt. A verification that
    /// fails on every attempt is logged and reported as [`VerificationStatus::Failed`].
    pub async fn run_step(&self, spec: &ContractSpec) -> Result<StepOutcome, DeployError> {
        let toolchain = self.toolchain;

        tracing::info!(contract = %spec.name, location = %spec.location, "[deploying]");

        let deploy = with_retry(
            &self.retry,
            &format!("deploy {}", spec.name),
            move || toolchain.deploy(spec),
        )
        .await
        .map_err(|RetryExhausted { attempts, source, .. }| DeployError::Deployment {
            contract: spec.name.clone(),
            location: spec.location.clone(),
            attempts,
            source,
        })?;

        let address = deploy.deployed_address;
        tracing::info!(contract = %spec.name, %address, "[deployed]");

        for note in &spec.notes {
            tracing::warn!(contract = %spec.name, "{note}");
        }

        let verification = if !self.verify || spec.verify_args.is_none() {
            tracing::debug!(contract = %spec.name, "Skipping verification");
            VerificationStatus::Skipped
        } else {
            match with_retry(
                &self.retry,
                &format!("verify {}", spec.name),
                move || toolchain.verify(spec, address),
            )
            .await
            {
                Ok(verified) => {
                    tracing::info!(contract = %spec.name, %address, "[verified]");
                    VerificationStatus::Verified {
                        reference: verified.reference,
                    }
                }
                Err(RetryExhausted {
                    attempts, source, ..
                }) => {
                    let error = format!("{source:#}");
                    let err = DeployError::Verification {
                        contract: spec.name.clone(),
                        address,
                        attempts,
                        source,
                    };
                    tracing::error!(
                        contract = %spec.name,
                        %address,
                        error = %err,
                        cause = %error,
                        "Verification failed, continuing with the deployed contract"
                    );
                    VerificationStatus::Failed { attempts, error }
                }
            }
        };

        Ok(StepOutcome {
            deploy,
            verification,
        })
    }
}
