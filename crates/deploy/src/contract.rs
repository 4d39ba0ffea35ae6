//! Contract plans (as configured) and contract specs (as deployed).
//!
//! A [`ContractPlan`] may reference the address of a contract deployed earlier in the
//! same run. The orchestrator turns it into a [`ContractSpec`] only once every
//! referenced address is present in the manifest, so a step always receives literal
//! values.

use std::fmt;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeploymentManifest};

/// A constructor argument as written in the configuration file.
///
/// In TOML:
/// - `"cre8ors"`, `8888`, `true` are literals,
/// - `["0xabc…", "0xdef…"]` is a list (rendered `[a,b]`),
/// - `{ tuple = [1, 2] }` is a tuple (rendered `(1,2)`),
/// - `{ deployed = "cre8ors" }` is the address of the `cre8ors` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Deployed { deployed: String },
    Tuple { tuple: Vec<ArgValue> },
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Reference to the address deployed by the step named `name`.
    pub fn deployed(name: impl Into<String>) -> Self {
        Self::Deployed {
            deployed: name.into(),
        }
    }

    pub fn tuple(items: impl IntoIterator<Item = ArgValue>) -> Self {
        Self::Tuple {
            tuple: items.into_iter().collect(),
        }
    }

    pub fn list(items: impl IntoIterator<Item = ArgValue>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Names of the steps this value reads an address from.
    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Deployed { deployed } => out.push(deployed),
            Self::Tuple { tuple: items } | Self::List(items) => {
                items.iter().for_each(|item| item.collect_references(out))
            }
            Self::Bool(_) | Self::Integer(_) | Self::Text(_) => {}
        }
    }

    fn resolve(
        &self,
        plan: &ContractPlan,
        manifest: &DeploymentManifest,
    ) -> Result<ConstructorArg, DeployError> {
        let arg = match self {
            Self::Deployed { deployed } => {
                if !plan.depends_on.iter().any(|dep| dep == deployed) {
                    return Err(DeployError::configuration(format!(
                        "{} reads the address of {deployed} but does not list it in depends_on",
                        plan.name
                    )));
                }
                let address = manifest.address_of(deployed).ok_or_else(|| {
                    DeployError::configuration(format!(
                        "{} requires the address of {deployed}, which has not been deployed",
                        plan.name
                    ))
                })?;
                ConstructorArg::Address(address)
            }
            Self::Tuple { tuple } => ConstructorArg::Tuple(
                tuple
                    .iter()
                    .map(|item| item.resolve(plan, manifest))
                    .collect::<Result<_, _>>()?,
            ),
            Self::List(items) => ConstructorArg::List(
                items
                    .iter()
                    .map(|item| item.resolve(plan, manifest))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Bool(value) => ConstructorArg::Literal(value.to_string()),
            Self::Integer(value) => ConstructorArg::Literal(value.to_string()),
            Self::Text(value) => ConstructorArg::Literal(value.clone()),
        };
        Ok(arg)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A resolved constructor argument, ready to be handed to the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConstructorArg {
    Literal(String),
    Address(Address),
    List(Vec<ConstructorArg>),
    Tuple(Vec<ConstructorArg>),
}

impl ConstructorArg {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[ConstructorArg]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.write_str(value),
            Self::Address(address) => write!(f, "{address}"),
            Self::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                f.write_str(")")
            }
        }
    }
}

/// One configured deployment, before predecessor addresses are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPlan {
    /// Logical name, used as the manifest key.
    pub name: String,
    /// Compilation unit and contract name, e.g. `src/Cre8ors.sol:Cre8ors`.
    pub location: String,
    /// Steps whose deployed address this plan reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Constructor arguments for the deploy call.
    #[serde(default)]
    pub args: Vec<ArgValue>,
    /// Constructor arguments for the verify call, encoded for the block explorer.
    ///
    /// When absent the contract is not verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_args: Option<Vec<ArgValue>>,
    /// Reminders logged once the contract is deployed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ContractPlan {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            depends_on: Vec::new(),
            args: Vec::new(),
            verify_args: None,
            notes: Vec::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = ArgValue>) -> Self {
        self.args.extend(values);
        self
    }

    pub fn verify_args(mut self, values: impl IntoIterator<Item = ArgValue>) -> Self {
        self.verify_args = Some(values.into_iter().collect());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Names of all steps referenced by the deploy and verify arguments.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.args
            .iter()
            .chain(self.verify_args.iter().flatten())
            .for_each(|arg| arg.collect_references(&mut refs));
        refs
    }

    /// Build the [`ContractSpec`] for this plan from the addresses deployed so far.
    pub fn resolve(&self, manifest: &DeploymentManifest) -> Result<ContractSpec, DeployError> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.resolve(self, manifest))
            .collect::<Result<Vec<_>, _>>()?;

        let verify_args = self
            .verify_args
            .as_ref()
            .map(|values| {
                values
                    .iter()
                    .map(|arg| arg.resolve(self, manifest))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(ContractSpec {
            name: self.name.clone(),
            location: self.location.clone(),
            args,
            verify_args,
            notes: self.notes.clone(),
        })
    }
}

/// A fully resolved deployment handed to a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSpec {
    pub name: String,
    pub location: String,
    pub args: Vec<ConstructorArg>,
    pub verify_args: Option<Vec<ConstructorArg>>,
    pub notes: Vec<String>,
}

impl ContractSpec {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            args: Vec::new(),
            verify_args: None,
            notes: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<ConstructorArg>) -> Self {
        self.args = args;
        self
    }

    pub fn with_verify_args(mut self, args: Vec<ConstructorArg>) -> Self {
        self.verify_args = Some(args);
        self
    }

    /// Deploy arguments as the toolchain expects them on the command line.
    pub fn rendered_args(&self) -> Vec<String> {
        self.args.iter().map(ToString::to_string).collect()
    }

    /// Verify arguments as the toolchain expects them, if verification is requested.
    pub fn rendered_verify_args(&self) -> Option<Vec<String>> {
        self.verify_args
            .as_ref()
            .map(|args| args.iter().map(ToString::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeployResult, ManifestEntry, VerificationStatus};

    fn manifest_with(name: &str, address: Address) -> DeploymentManifest {
        let mut manifest = DeploymentManifest::default();
        manifest
            .insert(
                name,
                ManifestEntry {
                    location: format!("src/{name}.sol:{name}"),
                    args: Vec::new(),
                    deploy: DeployResult::new(address),
                    verification: VerificationStatus::Skipped,
                },
            )
            .unwrap();
        manifest
    }

    #[test]
    fn test_resolve_injects_predecessor_address() {
        let cre8ors = Address::repeat_byte(0x11);
        let manifest = manifest_with("cre8ors", cre8ors);

        let plan = ContractPlan::new("transfers", "src/hooks/Transfersv0_1.sol:TransferHookv0_1")
            .depends_on("cre8ors")
            .arg(ArgValue::deployed("cre8ors"))
            .arg("0x0000000000000000000000000000000000000000");

        let spec = plan.resolve(&manifest).unwrap();
        assert_eq!(spec.args[0], ConstructorArg::Address(cre8ors));
        assert!(spec.verify_args.is_none());
    }

    #[test]
    fn test_resolve_rejects_undeclared_dependency() {
        let manifest = manifest_with("cre8ors", Address::repeat_byte(0x11));
        let plan = ContractPlan::new("transfers", "src/T.sol:T").arg(ArgValue::deployed("cre8ors"));

        let err = plan.resolve(&manifest).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_missing_predecessor() {
        let plan = ContractPlan::new("transfers", "src/T.sol:T")
            .depends_on("cre8ors")
            .arg(ArgValue::deployed("cre8ors"));

        let err = plan.resolve(&DeploymentManifest::default()).unwrap_err();
        assert!(err.to_string().contains("has not been deployed"));
    }

    #[test]
    fn test_deploy_and_verify_encodings_are_independent() {
        let plan = ContractPlan::new("cre8ors", "src/Cre8ors.sol:Cre8ors")
            .arg("\"(150000000000000000,0x0000000000000000000000000000000000000000,18)\"")
            .verify_args([ArgValue::list([
                ArgValue::from("150000000000000000"),
                ArgValue::from("0x0000000000000000000000000000000000000000"),
                ArgValue::Integer(18),
            ])]);

        let spec = plan.resolve(&DeploymentManifest::default()).unwrap();
        assert_eq!(
            spec.rendered_args(),
            vec!["\"(150000000000000000,0x0000000000000000000000000000000000000000,18)\""]
        );
        assert_eq!(
            spec.rendered_verify_args().unwrap(),
            vec!["[150000000000000000,0x0000000000000000000000000000000000000000,18]"]
        );
    }

    #[test]
    fn test_tuple_rendering() {
        let arg = ConstructorArg::Tuple(vec![
            ConstructorArg::literal("1"),
            ConstructorArg::List(vec![ConstructorArg::literal("2"), ConstructorArg::literal("3")]),
        ]);
        assert_eq!(arg.to_string(), "(1,[2,3])");
    }

    #[test]
    fn test_references_cover_verify_args() {
        let plan = ContractPlan::new("minter", "src/M.sol:M")
            .depends_on("cre8ors")
            .depends_on("utilities")
            .arg(ArgValue::deployed("cre8ors"))
            .verify_args([ArgValue::tuple([ArgValue::deployed("utilities")])]);

        assert_eq!(plan.references(), vec!["cre8ors", "utilities"]);
    }

    #[test]
    fn test_arg_values_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            args: Vec<ArgValue>,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"args = ["cre8ors", 8888, true, { deployed = "staking" }, { tuple = [1, "x"] }, ["a", "b"]]"#,
        )
        .unwrap();

        assert_eq!(
            wrapper.args,
            vec![
                ArgValue::Text("cre8ors".to_string()),
                ArgValue::Integer(8888),
                ArgValue::Bool(true),
                ArgValue::deployed("staking"),
                ArgValue::tuple([ArgValue::Integer(1), "x".into()]),
                ArgValue::list([ArgValue::from("a"), ArgValue::from("b")]),
            ]
        );
    }
}
