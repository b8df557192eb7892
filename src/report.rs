//! Invocation result documents.
//!
//! Every invocation ends in exactly one of two shapes: a success
//! document carrying the `changed` verdict and resulting state, or a
//! failure document carrying the error kind, message, and any remote
//! payload verbatim. Both serialize cleanly to JSON for machine callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::ConvergeError;
use crate::model::{CurrentState, ParamValue};
use crate::reconcile::{ActionKind, Applied};

/// Success document for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ResultDocument {
    /// Whether the target was (or would be) changed.
    pub changed: bool,
    /// The action that was carried out.
    pub action: ActionKind,
    /// Module name from the definition file.
    pub module: String,
    /// Unique id of this invocation.
    pub invocation_id: Uuid,
    /// True when this run was a check-mode projection.
    pub check_mode: bool,
    /// Resulting resource state; absent after a delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BTreeMap<String, ParamValue>>,
    /// Human-readable summary line.
    pub msg: String,
    /// Non-fatal warnings accumulated during normalization.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// When the invocation finished.
    pub finished_at: DateTime<Utc>,
}

/// Failure document for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Always true; lets callers branch on one field.
    pub failed: bool,
    /// Human-readable error message.
    pub msg: String,
    /// Machine-readable error kind.
    pub kind: &'static str,
    /// Remote error payload, verbatim, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Unique id of this invocation.
    pub invocation_id: Uuid,
    /// When the invocation finished.
    pub finished_at: DateTime<Utc>,
}

/// Either terminal document of an invocation.
#[derive(Debug, Clone)]
pub enum Report {
    /// The invocation converged (or projected) successfully.
    Success(ResultDocument),
    /// The invocation failed.
    Failure(FailureReport),
}

impl Report {
    /// Returns true for a failure document.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Serializes the document to pretty JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        let result = match self {
            Self::Success(doc) => serde_json::to_string_pretty(doc),
            Self::Failure(doc) => serde_json::to_string_pretty(doc),
        };
        result.unwrap_or_else(|e| format!("{{\"failed\": true, \"msg\": \"{e}\"}}"))
    }
}

/// Builds terminal documents for an invocation.
#[derive(Debug, Clone)]
pub struct Reporter {
    module: String,
    invocation_id: Uuid,
}

impl Reporter {
    /// Creates a reporter for the named module, assigning a fresh
    /// invocation id.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            invocation_id: Uuid::new_v4(),
        }
    }

    /// Returns this invocation's id.
    #[must_use]
    pub const fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Builds the success document for an executed action.
    #[must_use]
    pub fn success(&self, applied: &Applied, warnings: Vec<String>) -> ResultDocument {
        ResultDocument {
            changed: applied.changed,
            action: applied.kind,
            module: self.module.clone(),
            invocation_id: self.invocation_id,
            check_mode: applied.check_mode,
            state: applied.state.as_ref().map(state_attributes),
            msg: summary_line(applied),
            warnings,
            finished_at: Utc::now(),
        }
    }

    /// Builds the failure document for an error.
    #[must_use]
    pub fn failure(&self, error: &ConvergeError) -> FailureReport {
        FailureReport {
            failed: true,
            msg: error.to_string(),
            kind: error.kind(),
            payload: error.payload().cloned(),
            invocation_id: self.invocation_id,
            finished_at: Utc::now(),
        }
    }
}

fn state_attributes(state: &CurrentState) -> BTreeMap<String, ParamValue> {
    let mut attributes = state.attributes.clone();
    if let Some(id) = &state.id {
        attributes.insert(String::from("id"), ParamValue::Str(id.clone()));
    }
    attributes
}

fn summary_line(applied: &Applied) -> String {
    let verb = match applied.kind {
        ActionKind::NoOp => "already converged, no changes",
        ActionKind::Create => "resource created",
        ActionKind::Update => "resource updated",
        ActionKind::Delete => "resource deleted",
    };
    if applied.check_mode && applied.changed {
        format!("check mode: would have changed ({verb})")
    } else {
        verb.to_string()
    }
}

impl fmt::Display for ResultDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] changed={} action={}: {}",
            self.module, self.changed, self.action, self.msg
        )
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed ({}): {}", self.kind, self.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;

    fn applied(kind: ActionKind, changed: bool, check_mode: bool) -> Applied {
        Applied {
            kind,
            changed,
            state: Some(CurrentState::new(
                Some(String::from("r-1")),
                BTreeMap::from([(String::from("size"), ParamValue::Int(10))]),
            )),
            check_mode,
        }
    }

    #[test]
    fn test_success_document_carries_state_and_id() {
        let reporter = Reporter::new("record");
        let doc = reporter.success(&applied(ActionKind::Create, true, false), vec![]);

        assert!(doc.changed);
        let state = doc.state.unwrap();
        assert_eq!(
            state.get("id"),
            Some(&ParamValue::Str(String::from("r-1")))
        );
        assert_eq!(state.get("size"), Some(&ParamValue::Int(10)));
    }

    #[test]
    fn test_check_mode_is_visible_in_summary() {
        let reporter = Reporter::new("record");
        let doc = reporter.success(&applied(ActionKind::Update, true, true), vec![]);

        assert!(doc.check_mode);
        assert!(doc.msg.contains("check mode"));
    }

    #[test]
    fn test_failure_preserves_remote_payload() {
        let payload = serde_json::json!({ "code": "quota_exceeded" });
        let error =
            ConvergeError::Action(ActionError::rejected("create", 409, payload.clone()));

        let reporter = Reporter::new("record");
        let report = reporter.failure(&error);

        assert!(report.failed);
        assert_eq!(report.kind, "action");
        assert_eq!(report.payload, Some(payload));
    }

    #[test]
    fn test_json_shape_is_stable() {
        let reporter = Reporter::new("record");
        let doc = reporter.success(&applied(ActionKind::NoOp, false, false), vec![]);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["changed"], serde_json::json!(false));
        assert_eq!(json["action"], serde_json::json!("no_op"));
        assert!(json.get("warnings").is_none());
    }
}
