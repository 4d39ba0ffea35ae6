//! kiln deploys a chain of interdependent contracts, wiring the address of each one into
//! the contracts that need it, and records the outcome in a dated manifest.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;

use cli::Cli;
use kiln_deploy::{
    DeployConfig, DeploymentManifest, ForgeToolchain, ManifestWriter, Orchestrator,
    validate_plans,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = DeployConfig::load(&cli.config, &cli.network)?;
    cli.apply_overrides(&mut config)?;

    validate_plans(&config.contracts)?;

    if cli.check {
        for (index, plan) in config.contracts.iter().enumerate() {
            tracing::info!(
                step = index + 1,
                contract = %plan.name,
                location = %plan.location,
                depends_on = ?plan.depends_on,
                verify = plan.verify_args.is_some() && config.verify,
                "Planned deployment"
            );
        }
        tracing::info!(
            network = %config.network,
            contracts = config.contracts.len(),
            "Deployment plan is valid"
        );
        return Ok(());
    }

    let writer = config.manifest_writer();
    let orchestrator = Orchestrator::new(
        ForgeToolchain::new(config.forge_config()),
        config.orchestrator_config(),
    );

    // The manifest is named after the day the run started.
    let date = chrono::Utc::now().date_naive();

    let mut manifest = DeploymentManifest::default();
    if let Err(err) = orchestrator.run_into(&config.contracts, &mut manifest).await {
        save_partial(cli.save_partial, &writer, &manifest, &config.network, date);
        return Err(err.into());
    }

    let path = writer.write(&manifest, &config.network, date)?;

    println!("{}", manifest.summary_table());
    tracing::info!(
        path = %path.display(),
        network = %config.network,
        contracts = manifest.len(),
        "Deployment finished"
    );

    Ok(())
}

/// Save what a failed run deployed, if requested and if anything was deployed.
///
/// A failure to save is logged so that the deployment error stays the one reported.
fn save_partial(
    enabled: bool,
    writer: &ManifestWriter,
    manifest: &DeploymentManifest,
    network: &str,
    date: NaiveDate,
) -> Option<PathBuf> {
    if !enabled || manifest.is_empty() {
        return None;
    }

    writer
        .write_partial(manifest, network, date)
        .inspect_err(|err| {
            tracing::error!(error = %err, "Failed to save partial deployment manifest")
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;
    use kiln_deploy::{DeployResult, ManifestEntry, VerificationStatus};
    use tempdir::TempDir;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 8, 5).unwrap()
    }

    fn deployed_one() -> DeploymentManifest {
        let mut manifest = DeploymentManifest::default();
        manifest
            .insert(
                "cre8ors",
                ManifestEntry {
                    location: "src/Cre8ors.sol:Cre8ors".to_string(),
                    args: Vec::new(),
                    deploy: DeployResult::new(Address::repeat_byte(0x11)),
                    verification: VerificationStatus::Skipped,
                },
            )
            .unwrap();
        manifest
    }

    #[test]
    fn test_save_partial_writes_partial_file() {
        let dir = TempDir::new("kiln-bin").unwrap();
        let writer = ManifestWriter::new(dir.path());

        let path = save_partial(true, &writer, &deployed_one(), "goerli", date()).unwrap();

        assert_eq!(path, writer.partial_path_for("goerli", date()));
        assert!(path.exists());
        assert!(!writer.path_for("goerli", date()).exists());
    }

    #[test]
    fn test_save_partial_disabled_or_empty() {
        let dir = TempDir::new("kiln-bin").unwrap();
        let writer = ManifestWriter::new(dir.path().join("deployments"));

        assert!(save_partial(false, &writer, &deployed_one(), "goerli", date()).is_none());
        assert!(
            save_partial(true, &writer, &DeploymentManifest::default(), "goerli", date())
                .is_none()
        );
        assert!(!writer.dir().exists());
    }
}
