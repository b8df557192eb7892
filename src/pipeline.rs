//! Invocation pipeline.
//!
//! Wires the stages together for one invocation: normalize the caller's
//! parameters, fetch current state, decide the action, execute it, and
//! report. The pipeline owns no cross-invocation state; every run starts
//! from the definition file and the target's observed reality.

use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::fetch::StateFetcher;
use crate::model::{FetchOutcome, ParamValue};
use crate::reconcile::{reconcile, Action, Executor};
use crate::report::{Report, Reporter, ResultDocument};
use crate::schema::ModuleDefinition;
use crate::target::TargetSystem;

/// One reconciliation run over a module definition.
#[derive(Debug)]
pub struct Pipeline<'a, T: TargetSystem> {
    definition: &'a ModuleDefinition,
    target: &'a T,
    check_mode: bool,
}

impl<'a, T: TargetSystem> Pipeline<'a, T> {
    /// Creates a pipeline over the given definition and target handle.
    #[must_use]
    pub const fn new(definition: &'a ModuleDefinition, target: &'a T, check_mode: bool) -> Self {
        Self {
            definition,
            target,
            check_mode,
        }
    }

    /// Runs the full pipeline and returns the success document.
    ///
    /// # Errors
    ///
    /// Returns the first error any stage raises; there is no rollback
    /// and no partial retry at this level.
    pub async fn run(&self, raw: &BTreeMap<String, ParamValue>) -> Result<ResultDocument> {
        let reporter = Reporter::new(&self.definition.module);
        info!(
            module = %self.definition.module,
            invocation = %reporter.invocation_id(),
            check_mode = self.check_mode,
            "Starting invocation"
        );

        let schema = &self.definition.schema;
        let normalized = crate::schema::Normalizer::new(schema).normalize(raw)?;
        debug!("Desired presence: {}", normalized.desired.presence());

        let fetcher = StateFetcher::new(schema, self.target);
        let outcome = fetcher.fetch(&normalized.desired).await?;

        let action = reconcile(schema, &normalized.desired, &outcome);
        info!("Decided action: {action}");

        let executor = Executor::new(schema, self.target, self.check_mode);
        let applied = executor
            .execute(action, &normalized.desired, &outcome)
            .await?;

        Ok(reporter.success(&applied, normalized.warnings))
    }

    /// Runs the pipeline and folds any error into a failure document.
    ///
    /// This is the error boundary machine callers rely on: exactly one
    /// document comes out, success or failure.
    pub async fn invoke(&self, raw: &BTreeMap<String, ParamValue>) -> Report {
        match self.run(raw).await {
            Ok(doc) => Report::Success(doc),
            Err(e) => {
                error!("Invocation failed: {e}");
                let reporter = Reporter::new(&self.definition.module);
                Report::Failure(reporter.failure(&e))
            }
        }
    }

    /// Decides the action without executing it, for plan previews.
    ///
    /// # Errors
    ///
    /// Returns normalization, connection, or ambiguity errors from the
    /// stages before execution.
    pub async fn plan(&self, raw: &BTreeMap<String, ParamValue>) -> Result<(Action, FetchOutcome)> {
        let schema = &self.definition.schema;
        let normalized = crate::schema::Normalizer::new(schema).normalize(raw)?;

        let fetcher = StateFetcher::new(schema, self.target);
        let outcome = fetcher.fetch(&normalized.desired).await?;

        let action = reconcile(schema, &normalized.desired, &outcome);
        Ok((action, outcome))
    }

    /// Observes current state only, without deciding or acting.
    ///
    /// # Errors
    ///
    /// Returns normalization, connection, or ambiguity errors.
    pub async fn observe(&self, raw: &BTreeMap<String, ParamValue>) -> Result<FetchOutcome> {
        let schema = &self.definition.schema;
        let normalized = crate::schema::Normalizer::new(schema).normalize(raw)?;

        let fetcher = StateFetcher::new(schema, self.target);
        fetcher.fetch(&normalized.desired).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ActionKind;
    use crate::schema::{Constraints, Mutability, ParamKind, ParamSpec, Schema, TargetConfig, TargetKind};
    use crate::target::MemoryTarget;

    fn definition() -> ModuleDefinition {
        ModuleDefinition {
            module: String::from("record"),
            target: TargetConfig {
                kind: TargetKind::Memory,
                ..TargetConfig::default()
            },
            schema: Schema {
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
                        default: Some(ParamValue::Int(1)),
                        choices: vec![],
                        identity: false,
                        mutability: Mutability::Mutable,
                    },
                ],
                constraints: Constraints::default(),
            },
            values: BTreeMap::new(),
        }
    }

    fn params(state: &str, size: i64) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            (
                String::from("state"),
                ParamValue::Str(state.to_string()),
            ),
            (String::from("name"), ParamValue::Str(String::from("web"))),
            (String::from("size"), ParamValue::Int(size)),
        ])
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        let first = pipeline.run(&params("present", 10)).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.action, ActionKind::Create);
        let state = first.state.as_ref().unwrap();
        assert_eq!(state.get("size"), Some(&ParamValue::Int(10)));

        let second = pipeline.run(&params("present", 10)).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.action, ActionKind::NoOp);
        assert_eq!(target.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_drift_produces_update_then_settles() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        pipeline.run(&params("present", 10)).await.unwrap();

        let drifted = pipeline.run(&params("present", 20)).await.unwrap();
        assert!(drifted.changed);
        assert_eq!(drifted.action, ActionKind::Update);
        let state = drifted.state.as_ref().unwrap();
        assert_eq!(state.get("size"), Some(&ParamValue::Int(20)));

        let settled = pipeline.run(&params("present", 20)).await.unwrap();
        assert!(!settled.changed);
    }

    #[tokio::test]
    async fn test_absent_deletes_then_noops() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        pipeline.run(&params("present", 10)).await.unwrap();

        let deleted = pipeline.run(&params("absent", 10)).await.unwrap();
        assert!(deleted.changed);
        assert_eq!(deleted.action, ActionKind::Delete);
        assert!(deleted.state.is_none());

        let gone = pipeline.run(&params("absent", 10)).await.unwrap();
        assert!(!gone.changed);
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_check_mode_reports_but_never_mutates() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, true);

        let doc = pipeline.run(&params("present", 10)).await.unwrap();
        assert!(doc.changed);
        assert!(doc.check_mode);
        assert_eq!(target.mutation_count(), 0);
        assert!(target.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_folds_errors_into_failure_document() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        // Missing the required identity parameter.
        let raw = BTreeMap::from([(
            String::from("state"),
            ParamValue::Str(String::from("present")),
        )]);
        let report = pipeline.invoke(&raw).await;
        assert!(report.is_failure());
        match report {
            Report::Failure(doc) => assert_eq!(doc.kind, "validation"),
            Report::Success(doc) => panic!("unexpected success: {doc}"),
        }
    }

    #[tokio::test]
    async fn test_plan_decides_without_acting() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        let (action, outcome) = pipeline.plan(&params("present", 10)).await.unwrap();
        assert_eq!(action, Action::Create);
        assert_eq!(outcome, FetchOutcome::NotFound);
        assert_eq!(target.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_defaults_flow_into_created_state() {
        let definition = definition();
        let target = MemoryTarget::new();
        let pipeline = Pipeline::new(&definition, &target, false);

        // size omitted; the schema default of 1 applies.
        let raw = BTreeMap::from([
            (
                String::from("state"),
                ParamValue::Str(String::from("present")),
            ),
            (String::from("name"), ParamValue::Str(String::from("web"))),
        ]);
        let doc = pipeline.run(&raw).await.unwrap();
        let state = doc.state.unwrap();
        assert_eq!(state.get("size").and_then(ParamValue::as_int), Some(1));
    }
}
