//! Output formatting helpers for the `ej` CLI.
//!
//! Provides JSON output, table formatting, and the issue tree shown by
//! `ej expand`.

use std::collections::HashMap;
use std::io::{self, Write};

use serde::Serialize;

use errata_template::ResolvedIssue;
use errata_ui::styles::{
    TREE_BRANCH, TREE_INDENT, TREE_LAST, TREE_PIPE, render_accent, render_muted, render_on_respin,
    render_type, truncate,
};
use errata_ui::terminal::terminal_width;

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Ignore broken pipe errors (e.g., piped to `head`)
            let _ = writeln!(handle, "{}", json);
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a simple table with headers and rows.
///
/// Column widths are computed from the data for alignment. Cells must be
/// plain text.
pub fn output_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in table_lines(headers, rows) {
        let _ = writeln!(handle, "{}", line);
    }
}

fn table_lines(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(headers, &widths));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_row(&cells, &widths));
    }
    lines
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        match widths.get(i) {
            Some(width) => line.push_str(&format!("{:<width$}", cell, width = width)),
            None => line.push_str(cell),
        }
    }
    line.trim_end().to_string()
}

/// Print resolved issues as a parent/child tree.
pub fn print_issue_tree(issues: &[ResolvedIssue]) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in issue_tree_lines(issues, terminal_width()) {
        let _ = writeln!(handle, "{}", line);
    }
}

/// Lay out resolved issues as tree lines, children under their parent in
/// creation order. Summaries are truncated to fit `width` when known.
pub fn issue_tree_lines(issues: &[ResolvedIssue], width: Option<usize>) -> Vec<String> {
    let mut children: HashMap<Option<&str>, Vec<&ResolvedIssue>> = HashMap::new();
    for issue in issues {
        children.entry(issue.parent.as_deref()).or_default().push(issue);
    }

    let mut lines = Vec::with_capacity(issues.len());
    let roots = children.get(&None).cloned().unwrap_or_default();
    for root in roots {
        lines.push(issue_line(root, 0, width));
        push_children(&children, root, "", width, &mut lines);
    }
    lines
}

fn push_children(
    children: &HashMap<Option<&str>, Vec<&ResolvedIssue>>,
    parent: &ResolvedIssue,
    prefix: &str,
    width: Option<usize>,
    lines: &mut Vec<String>,
) {
    let Some(kids) = children.get(&Some(parent.key.as_str())) else {
        return;
    };
    for (i, child) in kids.iter().enumerate() {
        let last = i + 1 == kids.len();
        let connector = if last { TREE_LAST } else { TREE_BRANCH };
        let indent = prefix.chars().count() + connector.chars().count();
        lines.push(format!("{}{}{}", prefix, connector, issue_line(child, indent, width)));
        let next = format!("{}{}", prefix, if last { TREE_INDENT } else { TREE_PIPE });
        push_children(children, child, &next, width, lines);
    }
}

/// One issue: type, summary, then muted instance key and respin handling.
fn issue_line(issue: &ResolvedIssue, indent: usize, width: Option<usize>) -> String {
    let summary = match width {
        Some(w) => truncate(&issue.summary, w.saturating_sub(indent + 12).max(20)),
        None => issue.summary.clone(),
    };

    let mut flags = vec![render_on_respin(issue.on_respin)];
    if issue.auto_transition {
        flags.push(render_accent("auto"));
    }

    let mut line = format!(
        "{} {}  {} [{}]",
        render_type(issue.issue_type),
        summary,
        render_muted(&issue.key),
        flags.join(", ")
    );
    if let Some(ref assignee) = issue.assignee {
        line.push_str(&format!(" @{}", assignee));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use errata_template::parser::parse_yaml;
    use errata_template::{ExpandContext, expand};
    use pretty_assertions::assert_eq;

    const WORKFLOW: &str = r#"
project: RHELWF
issues:
  - summary: "Epic"
    type: epic
    id: epic
  - summary: "Task"
    type: task
    id: task
    parent_id: epic
    auto_transition: true
  - summary: "Sub {{ ENVIRONMENT.N }}"
    type: subtask
    parent_id: task
    iterate:
      - N: "a"
      - N: "b"
  - summary: "Other"
    type: task
    parent_id: epic
"#;

    fn issues() -> Vec<ResolvedIssue> {
        let spec = parse_yaml(WORKFLOW).unwrap();
        expand(&spec, &ExpandContext::default()).unwrap()
    }

    #[test]
    fn tree_nests_children_under_parents() {
        let lines = issue_tree_lines(&issues(), None);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("Epic"));
        assert!(lines[1].starts_with(TREE_BRANCH) && lines[1].contains("Task"));
        assert!(lines[2].starts_with(&format!("{}{}", TREE_PIPE, TREE_BRANCH)));
        assert!(lines[2].contains("Sub a"));
        assert!(lines[3].starts_with(&format!("{}{}", TREE_PIPE, TREE_LAST)));
        assert!(lines[3].contains("Sub b"));
        assert!(lines[4].starts_with(TREE_LAST) && lines[4].contains("Other"));
    }

    #[test]
    fn tree_marks_auto_transition() {
        let lines = issue_tree_lines(&issues(), None);
        assert!(lines[1].contains("auto"));
        assert!(!lines[4].contains("auto"));
    }

    #[test]
    fn table_aligns_columns() {
        let rows = vec![
            vec!["create".into(), "epic".into()],
            vec!["reuse".into(), "epic/task".into()],
        ];
        assert_eq!(
            table_lines(&["ACTION", "INSTANCE"], &rows),
            vec![
                "ACTION  INSTANCE",
                "------  ---------",
                "create  epic",
                "reuse   epic/task",
            ]
        );
    }
}
