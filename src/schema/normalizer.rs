//! Parameter normalization against a declared schema.
//!
//! The normalizer turns the caller's raw key/value mapping into a
//! fully-populated, immutable desired state: types coerced, defaults
//! applied, choices and constraint groups enforced. It performs no IO and
//! has no side effects.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ConvergeError, Result, ValidationError};
use crate::model::{DesiredState, ParamValue, Presence};

use super::spec::{ParamKind, ParamSpec, Schema, STATE_PARAM};

/// Normalizer for caller-supplied parameters.
#[derive(Debug)]
pub struct Normalizer<'a> {
    /// Schema the parameters are validated against.
    schema: &'a Schema,
}

/// Outcome of a successful normalization.
#[derive(Debug)]
pub struct Normalized {
    /// The validated, defaulted desired state.
    pub desired: DesiredState,
    /// Non-fatal advisories gathered during validation.
    pub warnings: Vec<String>,
}

impl<'a> Normalizer<'a> {
    /// Creates a normalizer for the given schema.
    #[must_use]
    pub const fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Validates and defaults the raw parameter mapping.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a required key is missing, a value
    /// cannot be coerced to its declared type, a value is outside its
    /// choices, or a constraint group is violated.
    pub fn normalize(&self, raw: &BTreeMap<String, ParamValue>) -> Result<Normalized> {
        let mut warnings = Vec::new();

        for name in raw.keys() {
            if name != STATE_PARAM && self.schema.param(name).is_none() {
                return Err(ValidationError::UnknownParameter { name: name.clone() }.into());
            }
        }

        let presence = Self::parse_presence(raw.get(STATE_PARAM))?;

        let mut values = BTreeMap::new();
        for spec in &self.schema.params {
            match raw.get(&spec.name) {
                Some(value) => {
                    let coerced = Self::coerce(spec, value)?;
                    Self::check_choices(spec, &coerced)?;
                    values.insert(spec.name.clone(), coerced);
                }
                None => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.clone(), default.clone());
                    } else if spec.required && presence == Presence::Present {
                        return Err(ValidationError::MissingRequired {
                            name: spec.name.clone(),
                        }
                        .into());
                    } else if spec.required {
                        // Deletion only needs the identity subset.
                        if spec.identity {
                            return Err(ValidationError::MissingRequired {
                                name: spec.name.clone(),
                            }
                            .into());
                        }
                        warnings.push(format!(
                            "required parameter '{}' omitted; ignored for state=absent",
                            spec.name
                        ));
                    }
                }
            }
        }

        self.check_mutually_exclusive(raw)?;
        self.check_required_together(raw)?;

        debug!(
            "Normalized {} parameters ({} supplied, presence={presence})",
            values.len(),
            raw.len()
        );

        Ok(Normalized {
            desired: DesiredState::new(presence, values),
            warnings,
        })
    }

    /// Parses the reserved `state` selector.
    fn parse_presence(value: Option<&ParamValue>) -> Result<Presence> {
        let Some(value) = value else {
            return Ok(Presence::Present);
        };

        match value.as_str() {
            Some("present") => Ok(Presence::Present),
            Some("absent") => Ok(Presence::Absent),
            Some(other) => Err(ValidationError::InvalidChoice {
                name: String::from(STATE_PARAM),
                allowed: String::from("present, absent"),
                value: other.to_string(),
            }
            .into()),
            None => Err(ValidationError::TypeMismatch {
                name: String::from(STATE_PARAM),
                expected: String::from("str"),
                found: String::from(value.type_name()),
            }
            .into()),
        }
    }

    /// Coerces a raw value to the declared parameter kind.
    fn coerce(spec: &ParamSpec, value: &ParamValue) -> Result<ParamValue> {
        let mismatch = || {
            ConvergeError::Validation(ValidationError::TypeMismatch {
                name: spec.name.clone(),
                expected: String::from(spec.kind.name()),
                found: String::from(value.type_name()),
            })
        };

        let coerced = match (spec.kind, value) {
            (ParamKind::Bool, ParamValue::Bool(b)) => ParamValue::Bool(*b),
            (ParamKind::Bool, ParamValue::Str(s)) => {
                ParamValue::Bool(parse_bool(s).ok_or_else(mismatch)?)
            }
            (ParamKind::Bool, ParamValue::Int(0)) => ParamValue::Bool(false),
            (ParamKind::Bool, ParamValue::Int(1)) => ParamValue::Bool(true),

            (ParamKind::Int, ParamValue::Int(i)) => ParamValue::Int(*i),
            (ParamKind::Int, ParamValue::Str(s)) => {
                ParamValue::Int(s.trim().parse().map_err(|_| mismatch())?)
            }

            (ParamKind::Float, ParamValue::Float(x)) => ParamValue::Float(*x),
            #[allow(clippy::cast_precision_loss)]
            (ParamKind::Float, ParamValue::Int(i)) => ParamValue::Float(*i as f64),
            (ParamKind::Float, ParamValue::Str(s)) => {
                ParamValue::Float(s.trim().parse().map_err(|_| mismatch())?)
            }

            (ParamKind::Str, ParamValue::Str(s)) => ParamValue::Str(s.clone()),
            (ParamKind::Str, ParamValue::Int(i)) => ParamValue::Str(i.to_string()),
            (ParamKind::Str, ParamValue::Bool(b)) => ParamValue::Str(b.to_string()),
            (ParamKind::Str, ParamValue::Float(x)) => ParamValue::Str(x.to_string()),

            (ParamKind::List, ParamValue::List(items)) => ParamValue::List(items.clone()),
            (ParamKind::Map, ParamValue::Map(map)) => ParamValue::Map(map.clone()),

            _ => return Err(mismatch()),
        };

        Ok(coerced)
    }

    /// Checks a coerced value against the declared choices.
    fn check_choices(spec: &ParamSpec, value: &ParamValue) -> Result<()> {
        if spec.choices.is_empty() || spec.choices.contains(value) {
            return Ok(());
        }

        let allowed = spec
            .choices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        Err(ValidationError::InvalidChoice {
            name: spec.name.clone(),
            allowed,
            value: value.to_string(),
        }
        .into())
    }

    /// Enforces mutually-exclusive groups against supplied keys.
    fn check_mutually_exclusive(&self, raw: &BTreeMap<String, ParamValue>) -> Result<()> {
        for group in &self.schema.constraints.mutually_exclusive {
            let supplied: Vec<&str> = group
                .iter()
                .filter(|name| raw.contains_key(*name))
                .map(String::as_str)
                .collect();

            if supplied.len() > 1 {
                return Err(ValidationError::MutuallyExclusive {
                    names: supplied.join(", "),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Enforces required-together groups against supplied keys.
    fn check_required_together(&self, raw: &BTreeMap<String, ParamValue>) -> Result<()> {
        for group in &self.schema.constraints.required_together {
            let any_supplied = group.iter().any(|name| raw.contains_key(name));
            if !any_supplied {
                continue;
            }

            if let Some(missing) = group.iter().find(|name| !raw.contains_key(*name)) {
                return Err(ValidationError::RequiredTogether {
                    names: group.join(", "),
                    missing: missing.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Parses the boolean spellings accepted for bool parameters.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
