//! kiln-deploy - Ordered deployment and verification of interdependent contracts.
//!
//! A run takes an ordered list of [`ContractPlan`]s, deploys them one after the other
//! through a [`Toolchain`], wires the address of each deployed contract into the
//! constructor arguments of the contracts that depend on it, and records every outcome
//! in a [`DeploymentManifest`] written by a [`ManifestWriter`].

mod config;
pub use config::{ConfigFile, DEFAULT_CONFIG_FILENAME, DeployConfig, ENV_PREFIX, NetworkConfig};

mod contract;
pub use contract::{ArgValue, ConstructorArg, ContractPlan, ContractSpec};

mod error;
pub use error::DeployError;

mod manifest;
pub use manifest::{
    DEFAULT_DEPLOYMENTS_DIR, DeploymentManifest, ManifestEntry, ManifestWriter,
    VerificationStatus,
};

mod orchestrator;
pub use orchestrator::{Orchestrator, OrchestratorConfig, validate_plans};

pub mod retry;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

mod step;
pub use step::{ContractStep, StepOutcome};

pub mod toolchain;
pub use toolchain::{DeployResult, ForgeConfig, ForgeToolchain, Toolchain, VerifyResult};
