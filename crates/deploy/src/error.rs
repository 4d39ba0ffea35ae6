//! Error taxonomy for a deployment run.

use std::path::PathBuf;

use alloy_core::primitives::Address;
use thiserror::Error;

/// Errors surfaced by the deployment pipeline.
///
/// Only [`DeployError::Deployment`] and [`DeployError::Configuration`] abort a run.
/// [`DeployError::Verification`] is logged by the step that produced it and
/// [`DeployError::Persistence`] is raised once all on-chain work is done.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The toolchain deploy call failed on every attempt.
    #[error("Failed to deploy {contract} ({location}) after {attempts} attempt(s)")]
    Deployment {
        contract: String,
        location: String,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The toolchain verify call failed on every attempt.
    #[error("Failed to verify {contract} at {address} after {attempts} attempt(s)")]
    Verification {
        contract: String,
        address: Address,
        attempts: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The manifest could not be written.
    #[error("Failed to write deployment manifest to {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A value the run depends on is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeployError {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
