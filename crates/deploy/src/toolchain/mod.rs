//! Boundary to the external compile/deploy/verify toolchain.
//!
//! The orchestrator only ever talks to a [`Toolchain`]. Calls are treated as opaque,
//! blocking and possibly flaky: any error is a failed attempt and is retried by the
//! caller.

mod forge;

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use forge::{DEFAULT_FORGE_PROGRAM, ForgeConfig, ForgeToolchain};

use crate::ContractSpec;

/// Outcome of a successful deployment, as reported by the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Address of the deployed contract.
    #[serde(rename = "deployedTo")]
    pub deployed_address: Address,
    /// Account that sent the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// Hash of the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Any other field reported by the toolchain, kept verbatim.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DeployResult {
    pub fn new(deployed_address: Address) -> Self {
        Self {
            deployed_address,
            deployer: None,
            transaction_hash: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Outcome of a successful verification. Nothing downstream depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Explorer submission GUID or URL, when the toolchain reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// The compile/deploy/verify capability driven by the orchestrator.
pub trait Toolchain: Send + Sync {
    /// Compile and deploy `spec` with its constructor arguments.
    fn deploy(&self, spec: &ContractSpec) -> impl Future<Output = Result<DeployResult>> + Send;

    /// Verify the contract deployed at `address` using the spec's verification arguments.
    fn verify(
        &self,
        spec: &ContractSpec,
        address: Address,
    ) -> impl Future<Output = Result<VerifyResult>> + Send;
}
