//! Schema and module definition types.
//!
//! This module defines the structs that map to a `converge.module.yaml`
//! file: the parameter schema, cross-parameter constraints, the caller's
//! desired values, and the target connection settings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, ValidationError};
use crate::model::ParamValue;

/// Name of the reserved presence selector.
///
/// Every module accepts `state: present|absent`; it is handled by the
/// engine and must not be declared as a schema parameter.
pub const STATE_PARAM: &str = "state";

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// String.
    Str,
    /// List of values.
    List,
    /// Nested mapping.
    Map,
}

impl ParamKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

/// How a parameter relates to the remote object's lifecycle.
///
/// Only mutable parameters participate in diffing; creation-only and
/// write-only parameters are excluded from comparison so they never
/// produce perpetual false-positive diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    /// Observable and changeable after creation; compared during diffing.
    #[default]
    Mutable,
    /// Fixed at creation time (e.g., a region); never compared.
    CreateOnly,
    /// Sent to the target but never readable back (e.g., an initial
    /// password); never compared.
    WriteOnly,
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: ParamKind,
    /// Whether the caller must supply a value.
    #[serde(default)]
    pub required: bool,
    /// Default applied when the caller supplies no value.
    #[serde(default)]
    pub default: Option<ParamValue>,
    /// Allowed values; empty means unrestricted.
    #[serde(default)]
    pub choices: Vec<ParamValue>,
    /// Whether this parameter identifies the resource during lookup.
    #[serde(default)]
    pub identity: bool,
    /// Lifecycle annotation controlling diff participation.
    #[serde(default)]
    pub mutability: Mutability,
}

/// Cross-parameter constraint groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Constraints {
    /// Groups where at most one member may be supplied.
    #[serde(default)]
    pub mutually_exclusive: Vec<Vec<String>>,
    /// Groups where supplying any member requires all members.
    #[serde(default)]
    pub required_together: Vec<Vec<String>>,
}

/// A complete parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
    /// Constraint groups.
    #[serde(default)]
    pub constraints: Constraints,
}

impl Schema {
    /// Looks up a parameter declaration by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Returns the parameters that identify the resource during lookup.
    pub fn identity_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.identity)
    }

    /// Returns the parameters that participate in diffing.
    pub fn comparable_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params
            .iter()
            .filter(|p| p.mutability == Mutability::Mutable)
    }

    /// Checks the schema declaration itself for structural problems.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names, a declared `state` parameter,
    /// a missing identity parameter, a default outside the declared
    /// choices, or a constraint naming an undeclared parameter.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for param in &self.params {
            if param.name == STATE_PARAM {
                return Err(ValidationError::schema(
                    "'state' is reserved and handled by the engine",
                )
                .into());
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ValidationError::schema(format!(
                    "duplicate parameter declaration: {}",
                    param.name
                ))
                .into());
            }
            if let Some(default) = &param.default
                && !param.choices.is_empty()
                && !param.choices.contains(default)
            {
                return Err(ValidationError::schema(format!(
                    "default for '{}' is not among its choices",
                    param.name
                ))
                .into());
            }
        }

        if self.identity_params().next().is_none() {
            return Err(ValidationError::schema(
                "schema declares no identity parameter; lookups would be unkeyed",
            )
            .into());
        }

        for group in self
            .constraints
            .mutually_exclusive
            .iter()
            .chain(&self.constraints.required_together)
        {
            for name in group {
                if self.param(name).is_none() {
                    return Err(ValidationError::schema(format!(
                        "constraint references undeclared parameter: {name}"
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }
}

/// Supported target system kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// REST CRUD endpoint over HTTP.
    #[default]
    Http,
    /// In-process target for tests and dry experiments.
    Memory,
}

/// Target connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target kind.
    #[serde(default)]
    pub kind: TargetKind,
    /// Base URL of the resource collection (required for http targets).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_auth_env")]
    pub auth_env: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_auth_env() -> String {
    String::from("CONVERGE_API_TOKEN")
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::default(),
            base_url: None,
            auth_env: default_auth_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TargetConfig {
    /// Checks the target settings for structural problems.
    ///
    /// # Errors
    ///
    /// Returns an error if an http target has no base URL.
    pub fn validate(&self) -> Result<()> {
        if self.kind == TargetKind::Http
            && self.base_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(ValidationError::schema(
                "http targets require target.base_url",
            )
            .into());
        }
        Ok(())
    }
}

/// The root structure of a `converge.module.yaml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Module name, used in logs and result documents.
    pub module: String,
    /// Target connection settings.
    #[serde(default)]
    pub target: TargetConfig,
    /// Parameter schema.
    #[serde(flatten)]
    pub schema: Schema,
    /// The caller's desired values, validated against the schema.
    #[serde(default)]
    pub values: BTreeMap<String, ParamValue>,
}

impl ModuleDefinition {
    /// Checks the definition for structural problems (schema and target).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema or target settings are invalid.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()?;
        self.target.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_schema() -> Schema {
        Schema {
            params: vec![ParamSpec {
                name: String::from("name"),
                kind: ParamKind::Str,
                required: true,
                default: None,
                choices: vec![],
                identity: true,
                mutability: Mutability::CreateOnly,
            }],
            constraints: Constraints::default(),
        }
    }

    #[test]
    fn test_minimal_schema_is_valid() {
        assert!(minimal_schema().validate().is_ok());
    }

    #[test]
    fn test_reserved_state_param_rejected() {
        let mut schema = minimal_schema();
        schema.params.push(ParamSpec {
            name: String::from("state"),
            kind: ParamKind::Str,
            required: false,
            default: None,
            choices: vec![],
            identity: false,
            mutability: Mutability::Mutable,
        });
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let mut schema = minimal_schema();
        schema.params.push(schema.params[0].clone());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_missing_identity_rejected() {
        let mut schema = minimal_schema();
        schema.params[0].identity = false;
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_default_outside_choices_rejected() {
        let mut schema = minimal_schema();
        schema.params.push(ParamSpec {
            name: String::from("tier"),
            kind: ParamKind::Str,
            required: false,
            default: Some(ParamValue::Str(String::from("gold"))),
            choices: vec![
                ParamValue::Str(String::from("standard")),
                ParamValue::Str(String::from("premium")),
            ],
            identity: false,
            mutability: Mutability::Mutable,
        });
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_constraint_must_name_declared_params() {
        let mut schema = minimal_schema();
        schema.constraints.mutually_exclusive =
            vec![vec![String::from("name"), String::from("ghost")]];
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_http_target_requires_base_url() {
        let config = TargetConfig::default();
        assert!(config.validate().is_err());

        let config = TargetConfig {
            base_url: Some(String::from("https://api.example.net/v1/records")),
            ..TargetConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
