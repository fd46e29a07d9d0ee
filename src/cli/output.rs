//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; `main` decides where it goes.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::model::{Fingerprinter, Resource};
use crate::planner::{PlannedOperation, ResourcePlan};
use crate::reconciler::ApplySummary;
use crate::state::ReconcileState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// One listed resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    /// Resource kind.
    pub kind: &'static str,
    /// Resource name.
    pub name: String,
    /// Project.
    pub project: String,
    /// Location.
    pub location: String,
    /// Fingerprint of the listed state.
    pub fingerprint: String,
}

impl ResourceSummary {
    /// Summarizes a resource.
    #[must_use]
    pub fn of<R: Resource>(resource: &R) -> Self {
        let identity = resource.identity();
        Self {
            kind: R::KIND,
            name: identity.name.unwrap_or_default(),
            project: identity.project.unwrap_or_default(),
            location: identity.location.unwrap_or_default(),
            fingerprint: Fingerprinter::new().fingerprint(resource),
        }
    }
}

#[derive(Tabled)]
struct PlanOperationRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Resource")]
    key: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Applied")]
    applied_at: String,
}

#[derive(Serialize)]
struct PlansJson<'a> {
    creates: usize,
    updates: usize,
    deletes: usize,
    plans: &'a [ResourcePlan],
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the plans for a manifest.
    #[must_use]
    pub fn format_plans(&self, plans: &[ResourcePlan]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlansJson {
                creates: count(plans, "create"),
                updates: count(plans, "update"),
                deletes: count(plans, "delete"),
                plans,
            }),
            OutputFormat::Text => Self::format_plans_text(plans),
        }
    }

    fn format_plans_text(plans: &[ResourcePlan]) -> String {
        let rows: Vec<PlanOperationRow> = plans
            .iter()
            .flat_map(|plan| plan.operations.iter().map(move |op| (plan, op)))
            .enumerate()
            .map(|(i, (plan, op))| PlanOperationRow {
                index: i + 1,
                operation: Self::format_operation(op),
                resource: format!("{} {}", plan.kind, plan.identity),
                fields: Self::format_fields(op),
            })
            .collect();

        if rows.is_empty() {
            return format!("{} No changes required, every resource is up to date.\n", "✓".green());
        }

        let mut output = String::from("\nPlan\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete\n",
            count(plans, "create").to_string().green(),
            count(plans, "update").to_string().yellow(),
            count(plans, "delete").to_string().red()
        );
        output
    }

    /// Formats the results of an apply.
    #[must_use]
    pub fn format_apply(&self, summaries: &[ApplySummary]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&summaries),
            OutputFormat::Text => {
                let mut output = String::new();
                for summary in summaries {
                    let status = if summary.operations.is_empty() {
                        "unchanged".dimmed().to_string()
                    } else {
                        summary.operations.join(", ").green().to_string()
                    };
                    let _ = writeln!(
                        output,
                        "{} {} {}: {status} ({})",
                        "✓".green(),
                        summary.kind,
                        summary.identity,
                        Fingerprinter::new().short(&summary.fingerprint)
                    );
                }
                let _ = write!(output, "\n{} resource(s) converged.\n", summaries.len());
                output
            }
        }
    }

    /// Formats a single resource in wire format.
    #[must_use]
    pub fn format_resource(&self, resource: &Value) -> String {
        match self.format {
            OutputFormat::Json => to_json(resource),
            OutputFormat::Text => serde_yaml::to_string(resource).unwrap_or_default(),
        }
    }

    /// Formats a list of resources of one kind.
    #[must_use]
    pub fn format_list(&self, kind: &str, resources: &[ResourceSummary]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&resources),
            OutputFormat::Text => {
                if resources.is_empty() {
                    return format!("No {kind} resources found.\n");
                }
                let fingerprinter = Fingerprinter::new();
                let rows: Vec<ResourceRow> = resources
                    .iter()
                    .map(|r| ResourceRow {
                        name: r.name.clone(),
                        project: r.project.clone(),
                        location: r.location.clone(),
                        fingerprint: fingerprinter.short(&r.fingerprint),
                    })
                    .collect();
                let mut output = format!("\n{kind} ({})\n\n", resources.len());
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats recorded state.
    #[must_use]
    pub fn format_state(&self, state: &ReconcileState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = String::from("\nState\n\n");
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.len());

                if !state.is_empty() {
                    let fingerprinter = Fingerprinter::new();
                    let rows: Vec<StateRow> = state
                        .resources
                        .iter()
                        .map(|(key, record)| StateRow {
                            key: key.clone(),
                            fingerprint: fingerprinter.short(&record.fingerprint),
                            applied_at: record.applied_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                output
            }
        }
    }

    fn format_operation(op: &PlannedOperation) -> String {
        match op {
            PlannedOperation::Create => "+create".green().to_string(),
            PlannedOperation::Update { name, .. } => format!("~{name}").yellow().to_string(),
            PlannedOperation::Delete => "-delete".red().to_string(),
        }
    }

    fn format_fields(op: &PlannedOperation) -> String {
        match op {
            PlannedOperation::Update { diffs, .. } => {
                truncate(&diffs.iter().map(|d| d.path.as_str()).collect::<Vec<_>>().join(", "), 60)
            }
            PlannedOperation::Create | PlannedOperation::Delete => String::new(),
        }
    }
}

fn count(plans: &[ResourcePlan], verb: &str) -> usize {
    plans
        .iter()
        .flat_map(|p| &p.operations)
        .filter(|op| op.verb() == verb)
        .count()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
