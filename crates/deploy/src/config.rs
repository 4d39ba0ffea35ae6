//! Deployment configuration.
//!
//! Configuration is layered: the TOML file first, then the secrets of an optional
//! `.env.<network>` file next to it, then `KILN_*` environment variables (nested keys
//! separated by `__`, e.g. `KILN_NETWORKS__GOERLI__RPC_URL`). Secrets are expected to
//! come from the environment or the network's env file. The result is resolved once for the selected
//! network into a [`DeployConfig`], which is the only place values are read from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    ContractPlan, DEFAULT_DEPLOYMENTS_DIR, ForgeConfig, ManifestWriter, OrchestratorConfig,
    RetryPolicy, toolchain::DEFAULT_FORGE_PROGRAM,
};

/// The default name for the configuration file.
pub const DEFAULT_CONFIG_FILENAME: &str = "Kiln.toml";

/// Prefix of environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "KILN_";

/// Keys read from a `.env.<network>` file, with or without the [`ENV_PREFIX`].
const ENV_FILE_KEYS: [&str; 2] = ["private_key", "etherscan_api_key"];

/// Settings of one target network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Whether contracts are verified on this network's block explorer.
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Overrides the top-level `private_key` for this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Overrides the top-level `etherscan_api_key` for this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etherscan_api_key: Option<String>,
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}

fn default_verify() -> bool {
    true
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DEPLOYMENTS_DIR)
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_forge() -> PathBuf {
    PathBuf::from(DEFAULT_FORGE_PROGRAM)
}

/// The configuration file, as written.
#[derive(Clone, Deserialize)]
pub struct ConfigFile {
    /// Where manifests are written.
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
    /// The Foundry project contract locations are relative to.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// The `forge` executable.
    #[serde(default = "default_forge")]
    pub forge: PathBuf,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub etherscan_api_key: Option<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Contracts to deploy, in deployment order.
    #[serde(default)]
    pub contracts: Vec<ContractPlan>,
}

/// Configuration of a run, resolved for a single network.
#[derive(Clone)]
pub struct DeployConfig {
    /// Name of the target network, used in the manifest file name.
    pub network: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub verify: bool,
    pub private_key: Option<String>,
    pub etherscan_api_key: Option<String>,
    pub deployments_dir: PathBuf,
    pub project_root: PathBuf,
    pub forge: PathBuf,
    pub retry: RetryPolicy,
    pub contracts: Vec<ContractPlan>,
}

impl std::fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployConfig")
            .field("network", &self.network)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .field("verify", &self.verify)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_etherscan_api_key", &self.etherscan_api_key.is_some())
            .field("deployments_dir", &self.deployments_dir)
            .field("project_root", &self.project_root)
            .field("forge", &self.forge)
            .field("retry", &self.retry)
            .field("contracts", &self.contracts.len())
            .finish()
    }
}

impl DeployConfig {
    /// Load the configuration file at `path` (or `Kiln.toml` inside it, if it is a
    /// directory), apply environment overrides and resolve it for `network`.
    pub fn load(path: &Path, network: &str) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file or directory not found: {}",
                path.display()
            );
        }

        let config_path = if path.is_dir() {
            path.join(DEFAULT_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut figment = Figment::new().merge(Toml::file(&config_path));

        let env_file = config_path.with_file_name(format!(".env.{network}"));
        if env_file.is_file() {
            figment = figment.merge(Serialized::globals(read_env_file(&env_file)?));
        }

        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = Self::from_figment(figment, network)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        tracing::info!(
            path = %config_path.display(),
            network = %config.network,
            chain_id = config.chain_id,
            contracts = config.contracts.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Resolve the configuration provided by `figment` for `network`.
    pub fn from_figment(figment: Figment, network: &str) -> Result<Self> {
        let file: ConfigFile = figment
            .extract()
            .context("Failed to parse deployment configuration")?;

        Self::resolve(file, network)
    }

    fn resolve(mut file: ConfigFile, network: &str) -> Result<Self> {
        let network_config = file.networks.remove(network).with_context(|| {
            let known = file.networks.keys().cloned().collect::<Vec<_>>().join(", ");
            format!("Unknown network {network}. Configured networks: [{known}]")
        })?;

        if file.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        Ok(Self {
            network: network.to_string(),
            chain_id: network_config.chain_id,
            rpc_url: network_config.rpc_url,
            verify: network_config.verify,
            private_key: network_config.private_key.or(file.private_key),
            etherscan_api_key: network_config.etherscan_api_key.or(file.etherscan_api_key),
            deployments_dir: file.deployments_dir,
            project_root: file.project_root,
            forge: file.forge,
            retry: file.retry,
            contracts: file.contracts,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry,
            verify: self.verify,
        }
    }

    pub fn forge_config(&self) -> ForgeConfig {
        ForgeConfig {
            program: self.forge.clone(),
            project_root: self.project_root.clone(),
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            private_key: self.private_key.clone(),
            etherscan_api_key: self.etherscan_api_key.clone(),
        }
    }

    pub fn manifest_writer(&self) -> ManifestWriter {
        ManifestWriter::new(&self.deployments_dir)
    }
}

/// Read the secrets of a per-network env file.
///
/// Other variables in the file are ignored.
fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    let entries = dotenv::from_path_iter(path)
        .with_context(|| format!("Failed to open env file {}", path.display()))?;

    for entry in entries {
        let (key, value) =
            entry.with_context(|| format!("Failed to parse env file {}", path.display()))?;
        let key = key.strip_prefix(ENV_PREFIX).unwrap_or(&key).to_lowercase();
        if ENV_FILE_KEYS.contains(&key.as_str()) {
            values.insert(key, value);
        }
    }

    tracing::debug!(path = %path.display(), keys = ?values.keys().collect::<Vec<_>>(), "Env file loaded");

    Ok(values)
}
