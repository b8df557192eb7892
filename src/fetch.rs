//! Current-state fetch and resource lookup.
//!
//! The fetcher observes the target read-only: it builds the resource
//! identity from the schema's identity parameters, asks the target for
//! candidates, and applies the exact-match disambiguation rule. Absence
//! is a normal outcome, not an error; matching more than one object is a
//! hard error rather than a silent first-match pick.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ConvergeError, Result};
use crate::model::{CurrentState, DesiredState, FetchOutcome, ResourceIdentity};
use crate::schema::Schema;
use crate::target::TargetSystem;

/// Read-only observer of the target system.
#[derive(Debug)]
pub struct StateFetcher<'a, T: TargetSystem> {
    schema: &'a Schema,
    target: &'a T,
}

impl<'a, T: TargetSystem> StateFetcher<'a, T> {
    /// Creates a fetcher over the given schema and target handle.
    #[must_use]
    pub const fn new(schema: &'a Schema, target: &'a T) -> Self {
        Self { schema, target }
    }

    /// Builds the lookup identity from the desired state.
    ///
    /// Only identity parameters that were actually supplied (or
    /// defaulted) participate in the lookup.
    #[must_use]
    pub fn identity_of(&self, desired: &DesiredState) -> ResourceIdentity {
        let values: BTreeMap<_, _> = self
            .schema
            .identity_params()
            .filter_map(|spec| {
                desired
                    .get(&spec.name)
                    .map(|value| (spec.name.clone(), value.clone()))
            })
            .collect();
        ResourceIdentity::new(values)
    }

    /// Observes the current state of the resource the desired state
    /// identifies.
    ///
    /// # Errors
    ///
    /// Returns a connection or auth error if the target cannot be
    /// queried, and an ambiguity error if more than one remote object
    /// matches the identity exactly.
    pub async fn fetch(&self, desired: &DesiredState) -> Result<FetchOutcome> {
        let identity = self.identity_of(desired);
        debug!("Fetching current state for ({identity})");

        let candidates = self.target.list_candidates(&identity).await?;

        // Targets may over-return; only exact identity matches count.
        let mut matching: Vec<_> = candidates
            .into_iter()
            .filter(|state| identity.matches(&state.attributes))
            .collect();

        match matching.len() {
            0 => {
                debug!("No resource matches ({identity})");
                Ok(FetchOutcome::NotFound)
            }
            1 => {
                let state = matching.remove(0);
                debug!("Found resource {} for ({identity})", state.label());
                Ok(FetchOutcome::Found(state))
            }
            n => {
                warn!("Identity ({identity}) matched {n} objects");
                Err(ConvergeError::AmbiguousResource {
                    identity: identity.to_string(),
                    matches: matching.iter().map(CurrentState::label).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamValue, Presence};
    use crate::schema::{Constraints, Mutability, ParamKind, ParamSpec};
    use crate::target::MemoryTarget;

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
            ],
            constraints: Constraints::default(),
        }
    }

    fn desired(name: &str) -> DesiredState {
        DesiredState::new(
            Presence::Present,
            BTreeMap::from([(String::from("name"), ParamValue::Str(name.to_string()))]),
        )
    }

    #[tokio::test]
    async fn test_absence_is_not_an_error() {
        let target = MemoryTarget::new();
        let schema = schema();
        let fetcher = StateFetcher::new(&schema, &target);

        let outcome = fetcher.fetch(&desired("ghost")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_single_match_is_found() {
        let target = MemoryTarget::new();
        target.seed(BTreeMap::from([
            (String::from("name"), ParamValue::Str(String::from("web"))),
            (String::from("size"), ParamValue::Int(10)),
        ]));

        let schema = schema();
        let fetcher = StateFetcher::new(&schema, &target);

        let outcome = fetcher.fetch(&desired("web")).await.unwrap();
        let state = outcome.state().unwrap();
        assert_eq!(state.attributes.get("size"), Some(&ParamValue::Int(10)));
    }

    #[tokio::test]
    async fn test_multiple_matches_fail_loudly() {
        let target = MemoryTarget::new();
        for _ in 0..2 {
            target.seed(BTreeMap::from([(
                String::from("name"),
                ParamValue::Str(String::from("web")),
            )]));
        }

        let schema = schema();
        let fetcher = StateFetcher::new(&schema, &target);

        let err = fetcher.fetch(&desired("web")).await.unwrap_err();
        assert_eq!(err.kind(), "ambiguous_resource");
        match err {
            ConvergeError::AmbiguousResource { matches, .. } => assert_eq!(matches.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_over_returned_candidates_are_filtered() {
        let target = MemoryTarget::new();
        target.seed(BTreeMap::from([(
            String::from("name"),
            ParamValue::Str(String::from("web")),
        )]));
        target.seed(BTreeMap::from([(
            String::from("name"),
            ParamValue::Str(String::from("db")),
        )]));

        let schema = schema();
        let fetcher = StateFetcher::new(&schema, &target);

        let outcome = fetcher.fetch(&desired("web")).await.unwrap();
        assert!(outcome.is_found());
    }

    #[test]
    fn test_identity_uses_only_identity_params() {
        let target = MemoryTarget::new();
        let schema = schema();
        let fetcher = StateFetcher::new(&schema, &target);

        let desired = DesiredState::new(
            Presence::Present,
            BTreeMap::from([
                (String::from("name"), ParamValue::Str(String::from("web"))),
                (String::from("size"), ParamValue::Int(10)),
            ]),
        );

        let identity = fetcher.identity_of(&desired);
        assert_eq!(identity.values.len(), 1);
        assert!(identity.values.contains_key("name"));
    }
}
