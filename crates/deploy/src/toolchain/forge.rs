//! [`Toolchain`] backed by the Foundry `forge` CLI.

use std::path::PathBuf;
use std::process::Stdio;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use tokio::process::Command;

use super::{DeployResult, Toolchain, VerifyResult};
use crate::ContractSpec;

/// Default program used to compile, deploy and verify contracts.
pub const DEFAULT_FORGE_PROGRAM: &str = "forge";

/// Name of the file holding verification arguments, passed to `--constructor-args-path`.
///
/// forge reads a `.json` file as an array with one element per argument. Any other file
/// is split on whitespace, which breaks arguments containing spaces.
const VERIFY_ARGS_FILENAME: &str = "constructor-args.json";

/// Resolved values forwarded to `forge`.
///
/// Nothing here is read from the environment: the values come from the loaded
/// deployment configuration.
#[derive(Clone)]
pub struct ForgeConfig {
    /// The `forge` executable.
    pub program: PathBuf,
    /// The Foundry project the contract locations are relative to.
    pub project_root: PathBuf,
    /// RPC endpoint of the target network.
    pub rpc_url: String,
    /// Chain ID of the target network, used by the block explorer.
    pub chain_id: u64,
    /// Key used to sign deployment transactions.
    pub private_key: Option<String>,
    /// Block explorer API key used for verification.
    pub etherscan_api_key: Option<String>,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("program", &self.program)
            .field("project_root", &self.project_root)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field(
                "etherscan_api_key",
                &self.etherscan_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Drives `forge create` and `forge verify-contract` as child processes.
#[derive(Debug, Clone)]
pub struct ForgeToolchain {
    config: ForgeConfig,
}

impl ForgeToolchain {
    pub fn new(config: ForgeConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.current_dir(&self.config.project_root)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run `cmd` to completion and return its stdout.
    async fn run(&self, mut cmd: Command, what: &str) -> Result<String> {
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.config.program.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{what} exited with {}: {}", output.status, stderr.trim());
        }

        tracing::trace!(what, stdout = %stdout, "Toolchain command completed");

        Ok(stdout)
    }
}

impl Toolchain for ForgeToolchain {
    async fn deploy(&self, spec: &ContractSpec) -> Result<DeployResult> {
        let args = spec.rendered_args();

        let mut cmd = self.command();
        cmd.arg("create")
            .arg(&spec.location)
            .arg("--rpc-url")
            .arg(&self.config.rpc_url)
            .arg("--broadcast")
            .arg("--json");

        if let Some(private_key) = &self.config.private_key {
            cmd.arg("--private-key").arg(private_key);
        }

        // `--constructor-args` is variadic and must come last.
        if !args.is_empty() {
            cmd.arg("--constructor-args").args(&args);
        }

        tracing::debug!(
            contract = %spec.name,
            location = %spec.location,
            args = ?args,
            "Running forge create"
        );

        let stdout = self.run(cmd, "forge create").await?;
        parse_deploy_output(&stdout)
    }

    async fn verify(&self, spec: &ContractSpec, address: Address) -> Result<VerifyResult> {
        let args = spec.rendered_verify_args().unwrap_or_default();

        let args_dir = tempdir::TempDir::new("kiln-verify")
            .context("Failed to create directory for verification arguments")?;
        let args_path = args_dir.path().join(VERIFY_ARGS_FILENAME);
        let encoded =
            serde_json::to_string(&args).context("Failed to encode verification arguments")?;
        tokio::fs::write(&args_path, encoded)
            .await
            .context("Failed to write verification arguments")?;

        let mut cmd = self.command();
        cmd.arg("verify-contract")
            .arg(address.to_string())
            .arg(&spec.location)
            .arg("--chain")
            .arg(self.config.chain_id.to_string())
            .arg("--watch");

        if let Some(api_key) = &self.config.etherscan_api_key {
            cmd.arg("--etherscan-api-key").arg(api_key);
        }

        if !args.is_empty() {
            cmd.arg("--constructor-args-path").arg(&args_path);
        }

        tracing::debug!(
            contract = %spec.name,
            %address,
            chain_id = self.config.chain_id,
            args = ?args,
            "Running forge verify-contract"
        );

        let stdout = self.run(cmd, "forge verify-contract").await?;

        Ok(VerifyResult {
            reference: parse_verify_reference(&stdout),
        })
    }
}

/// Extract the deployment JSON from `forge create --json` output.
///
/// Compiler progress may precede the JSON object, so the last line that parses wins.
fn parse_deploy_output(stdout: &str) -> Result<DeployResult> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<DeployResult>(line).ok())
        .with_context(|| format!("No deployment result in forge output: {}", stdout.trim()))
}

/// Pick the explorer URL (or GUID) out of `forge verify-contract` output.
fn parse_verify_reference(stdout: &str) -> Option<String> {
    let field = |name: &str| {
        stdout.lines().find_map(|line| {
            line.trim()
                .strip_prefix(name)
                .map(|rest| rest.trim().trim_matches('`').to_string())
                .filter(|value| !value.is_empty())
        })
    };

    field("URL:").or_else(|| field("GUID:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYED: &str = "0x68C885f0954094C59847E6FeB252Fe5B4b0451Ba";
    const DEPLOYER: &str = "0x4D977d9aEceC3776DD73F2f9080C9AF3BC31f505";

    fn config_for(project_root: PathBuf) -> ForgeConfig {
        // `sh <subcommand> ...` runs the script named after the forge subcommand.
        ForgeConfig {
            program: PathBuf::from("sh"),
            project_root,
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 5,
            private_key: Some("0xdeadbeef".to_string()),
            etherscan_api_key: Some("api-key".to_string()),
        }
    }

    #[test]
    fn test_parse_deploy_output_skips_compiler_noise() {
        let stdout = format!(
            "[⠊] Compiling...\nNo files changed, compilation skipped\n{{\"deployer\":\"{DEPLOYER}\",\"deployedTo\":\"{DEPLOYED}\",\"transactionHash\":\"0xabc\"}}\n"
        );

        let result = parse_deploy_output(&stdout).unwrap();
        assert_eq!(result.deployed_address, DEPLOYED.parse::<Address>().unwrap());
        assert_eq!(result.deployer, Some(DEPLOYER.parse().unwrap()));
        assert_eq!(result.transaction_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_parse_deploy_output_keeps_unknown_fields() {
        let stdout = format!("{{\"deployedTo\":\"{DEPLOYED}\",\"gasUsed\":123}}");
        let result = parse_deploy_output(&stdout).unwrap();
        assert_eq!(result.metadata.get("gasUsed"), Some(&serde_json::json!(123)));
    }

    #[test]
    fn test_parse_deploy_output_without_json() {
        let err = parse_deploy_output("Error: insufficient funds").unwrap_err();
        assert!(err.to_string().contains("No deployment result"));
    }

    #[test]
    fn test_parse_verify_reference() {
        let stdout = "Submitting verification...\n\tResponse: `OK`\n\tGUID: `abc123`\n\tURL: https://goerli.etherscan.io/address/0x68c8\n";
        assert_eq!(
            parse_verify_reference(stdout).as_deref(),
            Some("https://goerli.etherscan.io/address/0x68c8")
        );
        assert_eq!(
            parse_verify_reference("\tGUID: `abc123`").as_deref(),
            Some("abc123")
        );
        assert_eq!(parse_verify_reference("Contract is already verified."), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_for(PathBuf::from("."));
        let debug = format!("{config:?}");
        assert!(!debug.contains("0xdeadbeef"));
        assert!(!debug.contains("api-key"));
    }

    #[tokio::test]
    async fn test_deploy_and_verify_through_child_process() {
        let project = tempdir::TempDir::new("kiln-forge").unwrap();
        std::fs::write(
            project.path().join("create"),
            format!(
                "printf '%s\\n' \"$@\" > create-args.txt\necho 'Compiling 1 files'\necho '{{\"deployer\":\"{DEPLOYER}\",\"deployedTo\":\"{DEPLOYED}\",\"transactionHash\":\"0xabc\"}}'\n"
            ),
        )
        .unwrap();
        std::fs::write(
            project.path().join("verify-contract"),
            "printf '%s\\n' \"$@\" > verify-args.txt\necho 'GUID: `guid-1`'\n",
        )
        .unwrap();

        let toolchain = ForgeToolchain::new(config_for(project.path().to_path_buf()));
        let spec = ContractSpec::new("cre8ors", "src/Cre8ors.sol:Cre8ors")
            .with_args(vec![
                crate::ConstructorArg::literal("cre8ors"),
                crate::ConstructorArg::literal("CRE8"),
            ])
            .with_verify_args(vec![crate::ConstructorArg::literal("cre8ors")]);

        let deployed = toolchain.deploy(&spec).await.unwrap();
        assert_eq!(deployed.deployed_address, DEPLOYED.parse::<Address>().unwrap());

        let create_args = std::fs::read_to_string(project.path().join("create-args.txt")).unwrap();
        let create_args: Vec<&str> = create_args.lines().collect();
        assert_eq!(create_args[0], "src/Cre8ors.sol:Cre8ors");
        assert!(create_args.contains(&"--broadcast"));
        assert_eq!(&create_args[create_args.len() - 3..], ["--constructor-args", "cre8ors", "CRE8"]);

        let verified = toolchain
            .verify(&spec, deployed.deployed_address)
            .await
            .unwrap();
        assert_eq!(verified.reference.as_deref(), Some("guid-1"));

        let verify_args = std::fs::read_to_string(project.path().join("verify-args.txt")).unwrap();
        assert!(verify_args.contains("--constructor-args-path"));
        assert!(verify_args.contains("--chain\n5\n"));
    }

    #[tokio::test]
    async fn test_verify_args_keep_spaces() {
        let project = tempdir::TempDir::new("kiln-forge").unwrap();
        let toolchain = ForgeToolchain::new(config_for(project.path().to_path_buf()));
        let address = DEPLOYED.parse::<Address>().unwrap();

        let mut written = Vec::new();
        for (copy, args) in [("first.json", ["A Token", "ATK"]), ("second.json", ["A", "Token ATK"])] {
            // The arguments file is the last argument and is removed once verify returns.
            std::fs::write(
                project.path().join("verify-contract"),
                format!("for arg in \"$@\"; do last=\"$arg\"; done\ncp \"$last\" {copy}\n"),
            )
            .unwrap();

            let spec = ContractSpec::new("token", "src/Token.sol:Token").with_verify_args(
                args.iter().map(|arg| crate::ConstructorArg::literal(*arg)).collect(),
            );
            toolchain.verify(&spec, address).await.unwrap();

            let content = std::fs::read_to_string(project.path().join(copy)).unwrap();
            let decoded: Vec<String> = serde_json::from_str(&content).unwrap();
            assert_eq!(decoded, args);
            written.push(content);
        }

        assert_ne!(written[0], written[1]);
    }

    #[tokio::test]
    async fn test_deploy_fails_on_non_zero_exit() {
        let project = tempdir::TempDir::new("kiln-forge").unwrap();
        std::fs::write(
            project.path().join("create"),
            "echo 'nonce too low' >&2\nexit 1\n",
        )
        .unwrap();

        let toolchain = ForgeToolchain::new(config_for(project.path().to_path_buf()));
        let spec = ContractSpec::new("staking", "src/Staking.sol:Staking");

        let err = toolchain.deploy(&spec).await.unwrap_err();
        assert!(err.to_string().contains("nonce too low"));
    }
}
