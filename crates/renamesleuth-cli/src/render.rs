/// Plain-text and JSON rendering of trees, progress, summaries and faults.
use crate::session::SessionError;
use renamesleuth_core::engine::{EngineError, EngineEvent, ItemFault, Workspace};
use renamesleuth_core::model::{FilteredItemModel, ItemTree, TreeSide};
use serde::Serialize;
use std::fmt::Write as _;

/// Running totals shown while a job is active.
pub fn progress_text(items_processed: u64, errors_occurred: u64) -> String {
    let mut text = format!("{items_processed} files/directories processed");
    if errors_occurred > 0 {
        let _ = write!(text, "\n{errors_occurred} error(s) occurred");
    }
    text
}

/// Multi-line summary for a terminal event.
pub fn summary_text(event: &EngineEvent) -> String {
    let mut lines: Vec<String> = Vec::new();
    let (processed, aborted, errors) = match *event {
        EngineEvent::PreviewReady {
            has_root_node,
            aborted,
            items_processed,
            errors_occurred,
            ..
        } => {
            if has_root_node {
                lines.push("Preview has been generated.".to_string());
                lines.push(format!("{items_processed} files/directories have been processed."));
            } else if items_processed > 0 {
                lines.push("No files or directories would be renamed.".to_string());
            } else {
                lines.push("No files and directories have been found.".to_string());
            }
            if aborted {
                lines.push("Generation of preview has been aborted prematurely.".to_string());
            }
            (None, false, errors_occurred)
        }
        EngineEvent::ChangingsApplied {
            items_processed,
            aborted,
            errors_occurred,
        } => {
            lines.push("Changings applied.".to_string());
            (Some(items_processed), aborted, errors_occurred)
        }
        EngineEvent::Progress {
            items_processed,
            errors_occurred,
        } => return progress_text(items_processed, errors_occurred),
        EngineEvent::ItemFailed(ref fault) => return fault.to_string(),
    };
    if let Some(processed) = processed {
        lines.push(format!("{processed} files/directories have been processed."));
    }
    if aborted {
        lines.push("Applying has been aborted prematurely.".to_string());
    }
    if errors > 0 {
        lines.push(format!("{errors} error(s) occurred."));
    }
    lines.join("\n")
}

/// Message for a run that could not be started.
pub fn start_failure_text(err: &SessionError) -> String {
    match err {
        SessionError::Engine(EngineError::Validation(syntax)) => format!(
            "The script is not valid.\nError in line {} and column {}:\n {}",
            syntax.line, syntax.column, syntax.message
        ),
        SessionError::Engine(EngineError::RootNotFound(_)) => {
            "The selected directory doesn't exist.".to_string()
        }
        SessionError::Engine(EngineError::EmptyScript) => "The script is empty.".to_string(),
        other => {
            let mut text = other.to_string();
            if let Some(first) = text.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            text.push('.');
            text
        }
    }
}

/// Indented listing of the visible nodes of `tree`.
pub fn tree_text(tree: &ItemTree, view: &FilteredItemModel) -> String {
    let mut out = String::new();
    for (item, depth) in view.flatten() {
        let node = tree.node(item);
        let _ = write!(out, "{:indent$}{}", "", node.name, indent = depth * 2);
        if node.is_dir() && depth > 0 {
            out.push('/');
        }
        if let Some(warning) = &node.warning {
            let _ = write!(out, "  [{warning}]");
        }
        out.push('\n');
    }
    out
}

/// One renamed item: where it is now and where it would go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub from: String,
    pub to: String,
}

/// Every correspondence whose path actually changes, in current-tree order.
pub fn changes(workspace: &Workspace) -> Vec<Change> {
    let Some(preview) = workspace.preview() else {
        return Vec::new();
    };
    let current = workspace.current();
    workspace
        .correspondence()
        .pairs()
        .into_iter()
        .map(|(c, p)| Change {
            from: current.display_path(c),
            to: preview.display_path(p),
        })
        .filter(|change| change.from != change.to)
        .collect()
}

pub fn changes_text(changes: &[Change]) -> String {
    let mut out = String::new();
    for change in changes {
        let _ = writeln!(out, "{} -> {}", change.from, change.to);
    }
    out
}

pub fn faults_text(faults: &[ItemFault]) -> String {
    let mut out = String::new();
    for fault in faults {
        let _ = writeln!(out, "{fault}");
    }
    out
}

pub fn faults_json(faults: &[ItemFault]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(faults)
}

/// Full machine-readable report of a finished run.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub summary: &'a EngineEvent,
    pub changes: Vec<Change>,
    pub faults: &'a [ItemFault],
}

pub fn report_json(event: &EngineEvent, workspace: Option<&Workspace>, faults: &[ItemFault]) -> serde_json::Result<String> {
    let report = Report {
        summary: event,
        changes: workspace.map(changes).unwrap_or_default(),
        faults,
    };
    serde_json::to_string_pretty(&report)
}

/// Label used in tree headers.
pub fn side_label(side: TreeSide) -> &'static str {
    match side {
        TreeSide::Current => "Current",
        TreeSide::Preview => "Preview",
    }
}
