//! Action execution and check-mode projection.
//!
//! The executor is the only component that mutates the target. In check
//! mode it performs zero mutating calls and instead projects the state
//! the action would have produced, so callers still get an accurate
//! `changed` verdict and a preview of the result.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{ConvergeError, Result};
use crate::model::{CurrentState, DesiredState, FetchOutcome};
use crate::schema::{Mutability, Schema};
use crate::target::TargetSystem;

use super::{Action, ActionKind};

/// Outcome of executing (or projecting) one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The kind of action that was carried out.
    pub kind: ActionKind,
    /// Whether the target was (or, in check mode, would be) changed.
    pub changed: bool,
    /// Resulting resource state; `None` after a delete.
    pub state: Option<CurrentState>,
    /// Whether this outcome is a check-mode projection.
    pub check_mode: bool,
}

/// Carries decided actions out against the target.
#[derive(Debug)]
pub struct Executor<'a, T: TargetSystem> {
    schema: &'a Schema,
    target: &'a T,
    check_mode: bool,
}

impl<'a, T: TargetSystem> Executor<'a, T> {
    /// Creates an executor over the given schema and target handle.
    #[must_use]
    pub const fn new(schema: &'a Schema, target: &'a T, check_mode: bool) -> Self {
        Self {
            schema,
            target,
            check_mode,
        }
    }

    /// Executes the action, or projects it in check mode.
    ///
    /// A no-op performs zero target calls in either mode.
    ///
    /// # Errors
    ///
    /// Returns an action error verbatim from the target when a mutation
    /// is rejected, and an internal error when an update or delete is
    /// requested for a resource whose remote id is unknown.
    pub async fn execute(
        &self,
        action: Action,
        desired: &DesiredState,
        outcome: &FetchOutcome,
    ) -> Result<Applied> {
        let kind = action.kind();

        if !action.is_mutation() {
            debug!("Nothing to do");
            return Ok(Applied {
                kind,
                changed: false,
                state: outcome.state().cloned(),
                check_mode: self.check_mode,
            });
        }

        if self.check_mode {
            info!("Check mode: would {kind}");
            return Ok(Applied {
                kind,
                changed: true,
                state: self.project(&action, desired, outcome),
                check_mode: true,
            });
        }

        let state = match action {
            Action::NoOp => outcome.state().cloned(),
            Action::Create => {
                info!("Creating resource on {}", self.target.name());
                Some(self.target.create(desired).await?)
            }
            Action::Update(delta) => {
                let id = self.known_id(outcome, "update")?;
                info!("Updating resource {id} ({delta})");
                Some(self.target.update(&id, &delta).await?)
            }
            Action::Delete => {
                let id = self.known_id(outcome, "delete")?;
                info!("Deleting resource {id}");
                self.target.delete(&id).await?;
                None
            }
        };

        Ok(Applied {
            kind,
            changed: true,
            state,
            check_mode: false,
        })
    }

    /// Projects the state an action would produce, without target calls.
    fn project(
        &self,
        action: &Action,
        desired: &DesiredState,
        outcome: &FetchOutcome,
    ) -> Option<CurrentState> {
        match action {
            Action::NoOp => outcome.state().cloned(),
            Action::Create => {
                // Write-only values are never readable back, so the
                // projection omits them just as a real fetch would.
                let attributes: BTreeMap<_, _> = desired
                    .values()
                    .iter()
                    .filter(|(name, _)| {
                        self.schema
                            .param(name)
                            .is_none_or(|spec| spec.mutability != Mutability::WriteOnly)
                    })
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Some(CurrentState::new(None, attributes))
            }
            Action::Update(delta) => outcome.state().map(|current| {
                let mut projected = current.clone();
                for (name, value) in &delta.changes {
                    projected.attributes.insert(name.clone(), value.clone());
                }
                projected
            }),
            Action::Delete => None,
        }
    }

    /// Returns the remote id of the fetched resource.
    fn known_id(&self, outcome: &FetchOutcome, operation: &str) -> Result<String> {
        outcome
            .state()
            .and_then(|state| state.id.clone())
            .ok_or_else(|| {
                ConvergeError::internal(format!(
                    "cannot {operation}: fetched resource has no remote id"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Delta, ParamValue, Presence};
    use crate::schema::{Constraints, ParamKind, ParamSpec};
    use crate::target::MockTargetSystem;

    fn schema() -> Schema {
        Schema {
            params: vec![
                ParamSpec {
                    name: String::from("name"),
                    kind: ParamKind::Str,
                    required: true,
                    default: None,
                    choices: vec![],
                    identity: true,
                    mutability: Mutability::CreateOnly,
                },
                ParamSpec {
                    name: String::from("size"),
                    kind: ParamKind::Int,
                    required: false,
                    default: None,
                    choices: vec![],
                    identity: false,
                    mutability: Mutability::Mutable,
                },
                ParamSpec {
                    name: String::from("password"),
                    kind: ParamKind::Str,
                    required: false,
                    default: None,
                    choices: vec![],
                    identity: false,
                    mutability: Mutability::WriteOnly,
                },
            ],
            constraints: Constraints::default(),
        }
    }

    fn desired() -> DesiredState {
        DesiredState::new(
            Presence::Present,
            BTreeMap::from([
                (String::from("name"), ParamValue::Str(String::from("web"))),
                (String::from("size"), ParamValue::Int(10)),
                (
                    String::from("password"),
                    ParamValue::Str(String::from("hunter2")),
                ),
            ]),
        )
    }

    fn found() -> FetchOutcome {
        FetchOutcome::Found(CurrentState::new(
            Some(String::from("r-1")),
            BTreeMap::from([
                (String::from("name"), ParamValue::Str(String::from("web"))),
                (String::from("size"), ParamValue::Int(5)),
            ]),
        ))
    }

    #[tokio::test]
    async fn test_noop_performs_zero_target_calls() {
        let target = MockTargetSystem::new();
        let schema = schema();
        let executor = Executor::new(&schema, &target, false);

        let applied = executor
            .execute(Action::NoOp, &desired(), &found())
            .await
            .unwrap();

        assert!(!applied.changed);
        assert_eq!(applied.kind, ActionKind::NoOp);
        assert!(applied.state.is_some());
    }

    #[tokio::test]
    async fn test_check_mode_never_mutates() {
        let target = MockTargetSystem::new();
        let schema = schema();
        let executor = Executor::new(&schema, &target, true);

        let applied = executor
            .execute(Action::Create, &desired(), &FetchOutcome::NotFound)
            .await
            .unwrap();

        assert!(applied.changed);
        assert!(applied.check_mode);
    }

    #[tokio::test]
    async fn test_check_mode_projection_omits_write_only() {
        let target = MockTargetSystem::new();
        let schema = schema();
        let executor = Executor::new(&schema, &target, true);

        let applied = executor
            .execute(Action::Create, &desired(), &FetchOutcome::NotFound)
            .await
            .unwrap();

        let state = applied.state.unwrap();
        assert!(state.attributes.contains_key("size"));
        assert!(!state.attributes.contains_key("password"));
    }

    #[tokio::test]
    async fn test_check_mode_projects_update_result() {
        let target = MockTargetSystem::new();
        let schema = schema();
        let executor = Executor::new(&schema, &target, true);

        let delta = Delta {
            changes: BTreeMap::from([(String::from("size"), ParamValue::Int(10))]),
        };
        let applied = executor
            .execute(Action::Update(delta), &desired(), &found())
            .await
            .unwrap();

        let state = applied.state.unwrap();
        assert_eq!(state.attributes.get("size"), Some(&ParamValue::Int(10)));
        assert_eq!(state.id.as_deref(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_create_calls_target() {
        let mut target = MockTargetSystem::new();
        target.expect_create().times(1).returning(|desired| {
            Ok(CurrentState::new(
                Some(String::from("r-9")),
                desired.values().clone(),
            ))
        });

        let schema = schema();
        let executor = Executor::new(&schema, &target, false);

        let applied = executor
            .execute(Action::Create, &desired(), &FetchOutcome::NotFound)
            .await
            .unwrap();

        assert!(applied.changed);
        assert_eq!(applied.state.unwrap().id.as_deref(), Some("r-9"));
    }

    #[tokio::test]
    async fn test_update_uses_fetched_id() {
        let mut target = MockTargetSystem::new();
        target
            .expect_update()
            .times(1)
            .withf(|id, delta| id == "r-1" && delta.len() == 1)
            .returning(|id, _| Ok(CurrentState::new(Some(id.to_string()), BTreeMap::new())));

        let schema = schema();
        let executor = Executor::new(&schema, &target, false);

        let delta = Delta {
            changes: BTreeMap::from([(String::from("size"), ParamValue::Int(10))]),
        };
        let applied = executor
            .execute(Action::Update(delta), &desired(), &found())
            .await
            .unwrap();
        assert!(applied.changed);
    }

    #[tokio::test]
    async fn test_delete_clears_state() {
        let mut target = MockTargetSystem::new();
        target.expect_delete().times(1).returning(|_| Ok(()));

        let schema = schema();
        let executor = Executor::new(&schema, &target, false);

        let applied = executor
            .execute(Action::Delete, &desired(), &found())
            .await
            .unwrap();

        assert!(applied.changed);
        assert!(applied.state.is_none());
    }

    #[tokio::test]
    async fn test_update_without_id_is_an_error() {
        let target = MockTargetSystem::new();
        let schema = schema();
        let executor = Executor::new(&schema, &target, false);

        let outcome = FetchOutcome::Found(CurrentState::new(None, BTreeMap::new()));
        let delta = Delta {
            changes: BTreeMap::from([(String::from("size"), ParamValue::Int(10))]),
        };
        let err = executor
            .execute(Action::Update(delta), &desired(), &outcome)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");
    }
}
