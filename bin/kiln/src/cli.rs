use std::path::PathBuf;

use clap::Parser;
use kiln_deploy::{DEFAULT_CONFIG_FILENAME, DeployConfig};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(
    author,
    version,
    about = "Deploy and verify a chain of interdependent contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "KILN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file, or to a directory containing `Kiln.toml`.
    #[arg(short, long, alias = "conf", env = "KILN_CONFIG", default_value = DEFAULT_CONFIG_FILENAME)]
    pub config: PathBuf,

    /// The network to deploy to. Must match a `[networks.<name>]` table of the configuration.
    #[arg(short, long, visible_alias = "chain", env = "CHAIN")]
    pub network: String,

    /// Skip block explorer verification for every contract.
    #[arg(long, env = "KILN_NO_VERIFY")]
    pub no_verify: bool,

    /// How many times each deploy and verify call is attempted.
    ///
    /// Overrides `retry.max_attempts` from the configuration (2 if unset).
    #[arg(long, alias = "attempts", env = "KILN_MAX_ATTEMPTS")]
    pub max_attempts: Option<usize>,

    /// Directory the deployment manifest is written to.
    ///
    /// Overrides `deployments_dir` from the configuration (./deployments if unset).
    #[arg(long, env = "KILN_DEPLOYMENTS_DIR")]
    pub deployments_dir: Option<PathBuf>,

    /// Validate the configuration and print the deployment order without deploying.
    #[arg(long)]
    pub check: bool,

    /// When a run fails, save what was deployed to `<date>.<network>.partial.json`.
    #[arg(long, env = "KILN_SAVE_PARTIAL")]
    pub save_partial: bool,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut DeployConfig) -> anyhow::Result<()> {
        if self.no_verify {
            config.verify = false;
        }

        if let Some(max_attempts) = self.max_attempts {
            anyhow::ensure!(max_attempts > 0, "--max-attempts must be at least 1");
            config.retry.max_attempts = max_attempts;
        }

        if let Some(deployments_dir) = &self.deployments_dir {
            config.deployments_dir = deployments_dir.clone();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kiln_deploy::RetryPolicy;

    use super::*;

    fn config() -> DeployConfig {
        DeployConfig {
            network: "goerli".to_string(),
            chain_id: 5,
            rpc_url: "https://goerli.example".to_string(),
            verify: true,
            private_key: None,
            etherscan_api_key: None,
            deployments_dir: PathBuf::from("deployments"),
            project_root: PathBuf::from("."),
            forge: PathBuf::from("forge"),
            retry: RetryPolicy::default(),
            contracts: Vec::new(),
        }
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(["kiln", "--network", "goerli"].iter().chain(args)).unwrap()
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = config();
        parse(&[]).apply_overrides(&mut config).unwrap();

        assert!(config.verify);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.deployments_dir, PathBuf::from("deployments"));
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = config();
        parse(&[
            "--no-verify",
            "--max-attempts",
            "5",
            "--deployments-dir",
            "out/deployments",
        ])
        .apply_overrides(&mut config)
        .unwrap();

        assert!(!config.verify);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.deployments_dir, PathBuf::from("out/deployments"));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let mut config = config();
        let err = parse(&["--max-attempts", "0"])
            .apply_overrides(&mut config)
            .unwrap_err();

        assert!(err.to_string().contains("at least 1"));
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
