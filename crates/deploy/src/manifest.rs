//! The record of a deployment run and its on-disk form.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::Context;
use chrono::NaiveDate;
use comfy_table::Table;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::{ConstructorArg, DeployError, DeployResult};

/// Default directory deployment manifests are written to.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// Whether the contract of a step was verified on the block explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum::Display)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum VerificationStatus {
    Verified {
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    /// No verification arguments were declared, or verification is disabled.
    Skipped,
    Failed {
        attempts: usize,
        error: String,
    },
}

/// What the manifest records for one deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub location: String,
    /// Constructor arguments the contract was deployed with.
    pub args: Vec<ConstructorArg>,
    pub deploy: DeployResult,
    pub verification: VerificationStatus,
}

/// Deployment outcomes of one run, keyed by logical contract name.
///
/// Entries keep the order in which steps completed, and that order is preserved
/// when the manifest is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentManifest {
    entries: Vec<(String, ManifestEntry)>,
}

impl DeploymentManifest {
    /// Record the outcome of a completed step.
    ///
    /// A name can only be recorded once per run.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        entry: ManifestEntry,
    ) -> Result<(), DeployError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(DeployError::configuration(format!(
                "{name} was already deployed in this run"
            )));
        }
        self.entries.push((name, entry));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, entry)| entry)
    }

    /// Deployed address of the step named `name`.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|entry| entry.deploy.deployed_address)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    /// A human-readable overview of the run.
    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec!["Contract", "Location", "Address", "Verification"]);
        for (name, entry) in self.iter() {
            table.add_row(vec![
                name.to_string(),
                entry.location.clone(),
                entry.deploy.deployed_address.to_string(),
                entry.verification.to_string(),
            ]);
        }
        table
    }
}

impl Serialize for DeploymentManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

/// Writes manifests under a deployments directory.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    dir: PathBuf,
}

impl ManifestWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<YYYY-MM-DD>.<network>.json`
    pub fn path_for(&self, network: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{network}.json", date.format("%Y-%m-%d")))
    }

    /// `<dir>/<YYYY-MM-DD>.<network>.partial.json`, used for runs that did not complete.
    pub fn partial_path_for(&self, network: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{network}.partial.json", date.format("%Y-%m-%d")))
    }

    /// Write the manifest of a completed run, replacing any manifest of the same day.
    pub fn write(
        &self,
        manifest: &DeploymentManifest,
        network: &str,
        date: NaiveDate,
    ) -> Result<PathBuf, DeployError> {
        let path = self.path_for(network, date);
        Self::write_to(manifest, &path)?;
        tracing::info!(path = %path.display(), contracts = manifest.len(), "Deployment manifest saved");
        Ok(path)
    }

    /// Write what a failed run managed to deploy.
    pub fn write_partial(
        &self,
        manifest: &DeploymentManifest,
        network: &str,
        date: NaiveDate,
    ) -> Result<PathBuf, DeployError> {
        let path = self.partial_path_for(network, date);
        Self::write_to(manifest, &path)?;
        tracing::warn!(path = %path.display(), contracts = manifest.len(), "Partial deployment manifest saved");
        Ok(path)
    }

    fn write_to(manifest: &DeploymentManifest, path: &Path) -> Result<(), DeployError> {
        let persist = || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create deployments directory")?;
            }
            let json = serde_json::to_string_pretty(manifest)
                .context("Failed to serialize deployment manifest")?;
            std::fs::write(path, json).context("Failed to write deployment manifest")?;
            Ok(())
        };

        persist().map_err(|source| DeployError::Persistence {
            path: path.to_path_buf(),
            source,
        })
    }
}
