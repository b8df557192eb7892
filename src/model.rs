//! Core data model for one reconciliation invocation.
//!
//! All four entities (desired state, current state, delta, fetch outcome)
//! are created fresh at the start of an invocation and discarded at the
//! end; nothing here persists or is shared between invocations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically shaped parameter value.
///
/// Values arrive untyped from YAML/JSON and are coerced to the schema's
/// declared type by the normalizer; after that, all access goes through
/// this enum rather than raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
    /// Homogeneous or mixed list of values.
    List(Vec<ParamValue>),
    /// Nested mapping of values.
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Returns the name of this value's type, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns the string content if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content if this is an integer value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean content if this is a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(_) | Self::Map(_) => {
                let json = serde_json::to_string(self).unwrap_or_else(|_| String::from("?"));
                write!(f, "{json}")
            }
        }
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Str(String::new()),
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Self::Float(n.as_f64().unwrap_or(0.0)),
                Self::Int,
            ),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&ParamValue> for serde_json::Value {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => Self::Bool(*b),
            ParamValue::Int(i) => Self::from(*i),
            ParamValue::Float(x) => Self::from(*x),
            ParamValue::Str(s) => Self::String(s.clone()),
            ParamValue::List(items) => Self::Array(items.iter().map(Self::from).collect()),
            ParamValue::Map(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The universal `state` selector carried by every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// The resource should exist.
    #[default]
    Present,
    /// The resource should not exist.
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// The caller's requested configuration, validated and defaulted.
///
/// Produced once by the normalizer and treated as immutable for the rest
/// of the pipeline; there are no mutating accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredState {
    presence: Presence,
    values: BTreeMap<String, ParamValue>,
}

impl DesiredState {
    /// Creates a desired state from already-normalized values.
    #[must_use]
    pub const fn new(presence: Presence, values: BTreeMap<String, ParamValue>) -> Self {
        Self { presence, values }
    }

    /// Returns the requested presence.
    #[must_use]
    pub const fn presence(&self) -> Presence {
        self.presence
    }

    /// Looks up a parameter value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Returns all parameter values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }
}

/// The resource's observed configuration on the target at fetch time.
///
/// Fetched fresh per invocation, never cached across invocations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentState {
    /// Opaque identifier assigned by the target system, if known.
    pub id: Option<String>,
    /// Observed attribute values.
    pub attributes: BTreeMap<String, ParamValue>,
}

impl CurrentState {
    /// Creates a current state with the given id and attributes.
    #[must_use]
    pub const fn new(id: Option<String>, attributes: BTreeMap<String, ParamValue>) -> Self {
        Self { id, attributes }
    }

    /// Returns a short label for this resource, preferring the remote id.
    #[must_use]
    pub fn label(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            self.attributes
                .get("name")
                .map_or_else(|| String::from("<unidentified>"), ToString::to_string)
        })
    }
}

/// Outcome of a remote state fetch.
///
/// Absence is a valid, expected outcome represented by this sentinel; the
/// fetcher never raises an error for a missing resource.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Exactly one matching resource was observed.
    Found(CurrentState),
    /// No matching resource exists on the target.
    NotFound,
}

impl FetchOutcome {
    /// Returns true if a resource was observed.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns the observed state, if any.
    #[must_use]
    pub const fn state(&self) -> Option<&CurrentState> {
        match self {
            Self::Found(state) => Some(state),
            Self::NotFound => None,
        }
    }
}

/// The subset of comparable fields whose desired value differs from the
/// observed value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Delta {
    /// Differing keys mapped to their desired values.
    pub changes: BTreeMap<String, ParamValue>,
}

impl Delta {
    /// Returns true if no comparable field differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of differing fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns the names of the differing fields.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.keys().collect();
        write!(f, "{{{}}}", keys.join(", "))
    }
}

/// The identifying subset of desired state used to look a resource up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceIdentity {
    /// Identity parameter names mapped to their desired values.
    pub values: BTreeMap<String, ParamValue>,
}

impl ResourceIdentity {
    /// Creates an identity from the given key/value pairs.
    #[must_use]
    pub const fn new(values: BTreeMap<String, ParamValue>) -> Self {
        Self { values }
    }

    /// Returns true if the given attributes match every identity value
    /// exactly.
    #[must_use]
    pub fn matches(&self, attributes: &BTreeMap<String, ParamValue>) -> bool {
        self.values
            .iter()
            .all(|(key, value)| attributes.get(key) == Some(value))
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}
