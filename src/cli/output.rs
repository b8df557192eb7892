//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying invocation
//! results, plans, and observed state to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::model::{CurrentState, FetchOutcome};
use crate::reconcile::Action;
use crate::report::{FailureReport, Report, ResultDocument};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Attribute row for table display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Field change row for plan display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Desired")]
    desired: String,
}

/// JSON shape of a plan preview.
#[derive(Serialize)]
struct PlanJson<'a> {
    module: &'a str,
    action: crate::reconcile::ActionKind,
    changes: Vec<ChangeJson>,
}

/// JSON shape of one planned field change.
#[derive(Serialize)]
struct ChangeJson {
    field: String,
    current: Option<crate::model::ParamValue>,
    desired: crate::model::ParamValue,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats either terminal document of an invocation.
    #[must_use]
    pub fn format_report(&self, report: &Report) -> String {
        match self.format {
            OutputFormat::Json => report.to_json(),
            OutputFormat::Text => match report {
                Report::Success(doc) => Self::format_result_text(doc),
                Report::Failure(doc) => Self::format_failure_text(doc),
            },
        }
    }

    /// Formats a result as text.
    fn format_result_text(doc: &ResultDocument) -> String {
        let mut output = String::new();

        let marker = if doc.changed {
            "~".yellow()
        } else {
            "✓".green()
        };
        let _ = writeln!(output, "\n{marker} [{}] {}", doc.module, doc.msg);

        if doc.check_mode {
            let _ = writeln!(output, "  {} no changes were made", "check mode:".cyan());
        }

        for warning in &doc.warnings {
            let _ = writeln!(output, "  {} {warning}", "⚠".yellow());
        }

        if let Some(state) = &doc.state {
            let rows: Vec<AttributeRow> = state
                .iter()
                .map(|(field, value)| AttributeRow {
                    field: field.clone(),
                    value: Self::truncate(&value.to_string(), 60),
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a failure as text.
    fn format_failure_text(report: &FailureReport) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\n{} {}", "✗".red(), report.msg);
        if let Some(payload) = &report.payload {
            let rendered = serde_json::to_string_pretty(payload).unwrap_or_default();
            let _ = writeln!(output, "\nTarget response:\n{rendered}");
        }
        output
    }

    /// Formats a plan preview for display.
    #[must_use]
    pub fn format_plan(
        &self,
        module: &str,
        action: &Action,
        outcome: &FetchOutcome,
        detailed: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let plan = PlanJson {
                    module,
                    action: action.kind(),
                    changes: Self::plan_changes(action, outcome),
                };
                serde_json::to_string_pretty(&plan).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(module, action, outcome, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(
        module: &str,
        action: &Action,
        outcome: &FetchOutcome,
        detailed: bool,
    ) -> String {
        let mut output = String::new();

        let verdict = match action {
            Action::NoOp => format!(
                "{} No changes required - resource is converged.",
                "✓".green()
            ),
            Action::Create => format!("{} Resource will be created.", "+".green()),
            Action::Update(delta) => format!(
                "{} Resource will be updated ({} field(s)).",
                "~".yellow(),
                delta.len()
            ),
            Action::Delete => format!("{} Resource will be deleted.", "-".red()),
        };
        let _ = writeln!(output, "\nPlan for [{module}]: {verdict}");

        if detailed {
            let changes = Self::plan_changes(action, outcome);
            if !changes.is_empty() {
                let rows: Vec<ChangeRow> = changes
                    .into_iter()
                    .map(|change| ChangeRow {
                        field: change.field,
                        current: change
                            .current
                            .map_or_else(|| String::from("-"), |v| v.to_string()),
                        desired: change.desired.to_string(),
                    })
                    .collect();
                output.push('\n');
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
            }
        }

        output
    }

    /// Formats an observed state for display.
    #[must_use]
    pub fn format_observation(&self, module: &str, outcome: &FetchOutcome) -> String {
        match self.format {
            OutputFormat::Json => match outcome.state() {
                Some(state) => serde_json::to_string_pretty(state).unwrap_or_default(),
                None => String::from("null"),
            },
            OutputFormat::Text => match outcome.state() {
                Some(state) => Self::format_state_text(module, state),
                None => format!("\n[{module}] Resource does not exist on the target.\n"),
            },
        }
    }

    /// Formats observed state as text.
    fn format_state_text(module: &str, state: &CurrentState) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\n[{module}] Resource: {}", state.label());

        let rows: Vec<AttributeRow> = state
            .attributes
            .iter()
            .map(|(field, value)| AttributeRow {
                field: field.clone(),
                value: Self::truncate(&value.to_string(), 60),
            })
            .collect();
        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Extracts the per-field change list from an action.
    fn plan_changes(action: &Action, outcome: &FetchOutcome) -> Vec<ChangeJson> {
        match action {
            Action::Update(delta) => delta
                .changes
                .iter()
                .map(|(field, desired)| ChangeJson {
                    field: field.clone(),
                    current: outcome
                        .state()
                        .and_then(|state| state.attributes.get(field))
                        .cloned(),
                    desired: desired.clone(),
                })
                .collect(),
            Action::NoOp | Action::Create | Action::Delete => vec![],
        }
    }

    /// Truncates a string for table display.
    ///
    /// Cuts on a character boundary so multi-byte values never split.
    fn truncate(s: &str, max: usize) -> String {
        if s.len() <= max {
            return s.to_string();
        }

        let budget = max.saturating_sub(3);
        let cut = s
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= budget)
            .last()
            .unwrap_or(0);

        format!("{}...", &s[..cut])
    }
}
