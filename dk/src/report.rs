//! Console and JSON renderings of trees, plans and run outcomes

use colored::Colorize;
use serde_json::{Value, json};

use crate::domain::{NodeId, TaskTree};
use crate::pipeline::{AbortReport, EntryStatus, LedgerEntry, OutcomeLedger, PipelineOutcome, RunReport};
use crate::planning::{Action, OperationKind, ProvisionOperation};

/// How a run or tree is printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per operation, labels shown as breadcrumbs
    #[default]
    Text,
    /// Indented hierarchy with outcomes beside each node
    Tree,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "tree" => Ok(Self::Tree),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text, tree, or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Tree => write!(f, "tree"),
            Self::Json => write!(f, "json"),
        }
    }
}

fn status_word(status: EntryStatus) -> String {
    let word = format!("{:<7}", status.to_string());
    match status {
        EntryStatus::Created => word.green().to_string(),
        EntryStatus::Failed => word.red().to_string(),
        EntryStatus::Pending => word.yellow().to_string(),
    }
}

fn breadcrumb(tree: &TaskTree, node: NodeId) -> String {
    tree.path(node).join(" > ")
}

fn entry_outcome(entry: &LedgerEntry) -> String {
    match (&entry.external_ref, &entry.failure) {
        (Some(external_ref), _) => external_ref.clone(),
        (None, Some(failure)) => failure.to_string(),
        (None, None) => String::new(),
    }
}

/// Indented hierarchy, optionally annotated with ledger outcomes
pub fn render_tree(tree: &TaskTree, ledger: Option<&OutcomeLedger>) -> String {
    let mut out = String::new();
    for id in tree.pre_order() {
        let Some(node) = tree.node(id) else { continue };
        let indent = "  ".repeat(node.depth());
        let label = if node.depth() == 0 {
            node.label().bold().to_string()
        } else {
            node.label().to_string()
        };
        out.push_str(&format!("{}{}", indent, label));

        if let Some(ledger) = ledger {
            for kind in [OperationKind::Ticket, OperationKind::Branch] {
                if let Some(entry) = ledger.get(id, kind) {
                    let detail = match entry.status {
                        EntryStatus::Created => entry_outcome(entry).green().to_string(),
                        EntryStatus::Failed => format!("{} failed: {}", kind, entry_outcome(entry)).red().to_string(),
                        EntryStatus::Pending => format!("{} pending", kind).yellow().to_string(),
                    };
                    out.push_str(&format!("  [{}]", detail));
                }
            }
        } else if let Some(external_ref) = node.external_ref() {
            out.push_str(&format!("  [{}]", external_ref));
        }
        out.push('\n');
    }
    out
}

/// Operations a run would perform, in order
pub fn render_plan(tree: &TaskTree, operations: &[ProvisionOperation]) -> String {
    let mut out = String::new();
    for (i, op) in operations.iter().enumerate() {
        let target = match &op.action {
            Action::CreateTicket => breadcrumb(tree, op.node),
            Action::CreateBranch { name } => name.clone(),
        };
        out.push_str(&format!("{:>3}. {:<6} {}\n", i + 1, op.kind().to_string().cyan(), target));
    }
    out
}

/// One line per ledger entry
pub fn render_ledger(tree: &TaskTree, ledger: &OutcomeLedger) -> String {
    let mut out = String::new();
    for entry in ledger.entries() {
        let label = match tree.node(entry.node) {
            Some(_) => breadcrumb(tree, entry.node),
            None => entry.label.clone(),
        };
        out.push_str(&format!(
            "  {} {:<6} {}  {}\n",
            status_word(entry.status),
            entry.kind.to_string(),
            label,
            entry_outcome(entry).dimmed()
        ));
        if let Some(sub) = &entry.substitution {
            out.push_str(&format!(
                "           issue type '{}' not available, used '{}'\n",
                sub.requested, sub.used
            ));
        }
        for warning in &entry.warnings {
            out.push_str(&format!("           {}\n", warning.yellow()));
        }
    }
    out
}

fn render_warnings(ledger: &OutcomeLedger) -> String {
    if ledger.warnings().is_empty() {
        return String::new();
    }
    let mut out = format!("{}\n", "Warnings:".yellow().bold());
    for warning in ledger.warnings() {
        out.push_str(&format!("  - {}\n", warning));
    }
    out
}

fn render_completed(report: &RunReport, format: OutputFormat) -> String {
    let summary = report.ledger.summary();
    let mut out = format!(
        "{} {}: {} created, {} failed, {} pending\n",
        "Run".bold(),
        report.run_id,
        summary.created.to_string().green(),
        summary.failed.to_string().red(),
        summary.pending
    );
    match format {
        OutputFormat::Tree => out.push_str(&render_tree(&report.tree, Some(&report.ledger))),
        _ => out.push_str(&render_ledger(&report.tree, &report.ledger)),
    }
    out.push_str(&render_warnings(&report.ledger));
    out
}

fn render_aborted(report: &AbortReport, format: OutputFormat) -> String {
    let mut out = format!(
        "{} {} aborted while {}: {}\n",
        "Run".bold(),
        report.run_id,
        report.last_state,
        report.reason.to_string().red()
    );
    if let Some(tree) = &report.tree {
        match format {
            OutputFormat::Tree => out.push_str(&render_tree(tree, Some(&report.ledger))),
            _ => out.push_str(&render_ledger(tree, &report.ledger)),
        }
    }
    out.push_str(&render_warnings(&report.ledger));
    out
}

/// Human-readable outcome; use [`outcome_json`] for `Json`
pub fn render_outcome(outcome: &PipelineOutcome, format: OutputFormat) -> String {
    match outcome {
        PipelineOutcome::Completed(report) => render_completed(report, format),
        PipelineOutcome::Aborted(report) => render_aborted(report, format),
    }
}

/// Machine-readable outcome
pub fn outcome_json(outcome: &PipelineOutcome) -> Value {
    match outcome {
        PipelineOutcome::Completed(report) => json!({
            "run_id": report.run_id,
            "status": "completed",
            "started_at": report.started_at,
            "finished_at": report.finished_at,
            "summary": report.ledger.summary(),
            "tree": report.tree,
            "ledger": report.ledger,
        }),
        PipelineOutcome::Aborted(report) => json!({
            "run_id": report.run_id,
            "status": "aborted",
            "reason": report.reason.to_string(),
            "last_state": report.last_state,
            "started_at": report.started_at,
            "finished_at": report.finished_at,
            "raw_response": report.raw_response,
            "summary": report.ledger.summary(),
            "tree": report.tree,
            "ledger": report.ledger,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::parse;
    use crate::planning::plan;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert_eq!("TREE".parse::<OutputFormat>(), Ok(OutputFormat::Tree));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_tree_indents_by_depth() {
        plain();
        let tree = parse(r#"{"Main": {"Sub": ["Leaf"]}}"#).unwrap();
        let rendered = render_tree(&tree, None);
        assert_eq!(rendered, "Main\n  Sub\n    Leaf\n");
    }

    #[test]
    fn test_render_plan_in_plan_order() {
        plain();
        let tree = parse(r#"{"Login Flow": ["Add Form"]}"#).unwrap();
        let rendered = render_plan(&tree, &plan(&tree));
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("ticket") && lines[0].ends_with("Login Flow"));
        assert!(lines[1].contains("branch") && lines[1].ends_with("login-flow"));
        assert!(lines[2].ends_with("Login Flow > Add Form"));
        assert!(lines[3].ends_with("add-form"));
    }

    #[test]
    fn test_render_tree_shows_assigned_keys() {
        plain();
        let mut tree = parse(r#"{"Main": ["Sub"]}"#).unwrap();
        let root = tree.roots()[0];
        tree.set_external_ref(root, "PROJ-1").unwrap();

        let rendered = render_tree(&tree, None);
        assert!(rendered.starts_with("Main  [PROJ-1]\n"));
        assert!(rendered.ends_with("  Sub\n"));
    }
}
