//! Action decision and delta computation.
//!
//! [`reconcile`] is a pure function of the schema, the desired state,
//! and the fetch outcome. It performs no IO and holds no state, so the
//! same inputs always produce the same action. Side effects live in the
//! executor, never here.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::model::{CurrentState, Delta, DesiredState, FetchOutcome, Presence};
use crate::schema::Schema;

/// The action required to make the target match the desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Current state already matches; touch nothing.
    NoOp,
    /// The resource must be created from the desired state.
    Create,
    /// The resource exists but the listed fields differ.
    Update(Delta),
    /// The resource exists and must be removed.
    Delete,
}

impl Action {
    /// Returns the kind of this action, without its payload.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::NoOp => ActionKind::NoOp,
            Self::Create => ActionKind::Create,
            Self::Update(_) => ActionKind::Update,
            Self::Delete => ActionKind::Delete,
        }
    }

    /// Returns true if carrying this action out would mutate the target.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update(delta) => write!(f, "update {delta}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Payload-free action discriminant, for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// No change required.
    NoOp,
    /// Resource will be created.
    Create,
    /// Resource will be updated.
    Update,
    /// Resource will be deleted.
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Decides the action that converges the target onto the desired state.
///
/// The four-way decision:
///
/// | presence | fetched   | action            |
/// |----------|-----------|-------------------|
/// | absent   | not found | no-op             |
/// | absent   | found     | delete            |
/// | present  | not found | create            |
/// | present  | found     | no-op or update   |
#[must_use]
pub fn reconcile(schema: &Schema, desired: &DesiredState, outcome: &FetchOutcome) -> Action {
    let action = match (desired.presence(), outcome) {
        (Presence::Absent, FetchOutcome::NotFound) => Action::NoOp,
        (Presence::Absent, FetchOutcome::Found(_)) => Action::Delete,
        (Presence::Present, FetchOutcome::NotFound) => Action::Create,
        (Presence::Present, FetchOutcome::Found(current)) => {
            let delta = compute_delta(schema, desired, current);
            if delta.is_empty() {
                Action::NoOp
            } else {
                Action::Update(delta)
            }
        }
    };

    debug!("Reconciled to: {action}");
    action
}

/// Computes the minimal set of field changes.
///
/// Only mutable parameters the caller actually supplied participate;
/// creation-only and write-only parameters never do, and attributes the
/// caller did not mention are left alone even when they differ remotely.
#[must_use]
pub fn compute_delta(schema: &Schema, desired: &DesiredState, current: &CurrentState) -> Delta {
    let mut changes = BTreeMap::new();

    for spec in schema.comparable_params() {
        let Some(wanted) = desired.get(&spec.name) else {
            continue;
        };
        if current.attributes.get(&spec.name) != Some(wanted) {
            changes.insert(spec.name.clone(), wanted.clone());
        }
    }

    Delta { changes }
}
