use std::collections::{HashMap, HashSet};

use tasknest::model::{List, TaskId, TaskRow};
use tasknest::reconcile::Violation;

pub fn format_lists(lists: &[List]) -> String {
    let mut out = String::new();
    for list in lists {
        out.push_str(&format!(
            "{:>4}  {}  (owner: {}, revision {})\n",
            list.id, list.name, list.owner, list.revision
        ));
    }
    out
}

/// One line per row, indented by level.
pub fn format_rows(rows: &[TaskRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!(
            "{}{} {}  #{}\n",
            "  ".repeat(row.level as usize),
            row.icon(),
            row.content,
            row.id
        ));
    }
    out
}

pub fn format_tree(rows: &[TaskRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    // Rows arrive in display order, so each group is already sorted.
    let ids: HashSet<TaskId> = rows.iter().map(|r| r.id).collect();
    let mut children_map: HashMap<Option<TaskId>, Vec<&TaskRow>> = HashMap::new();
    for row in rows {
        let parent_key = row.parent_id.filter(|p| ids.contains(p));
        children_map.entry(parent_key).or_default().push(row);
    }

    let mut out = String::new();
    let roots = children_map.get(&None).cloned().unwrap_or_default();
    for root in &roots {
        write_tree(&mut out, root, &children_map, "", "");
    }
    out
}

/// Write a row and recurse into its children.
/// `line_prefix` goes before the checkbox on this row's line;
/// `child_prefix` is the base for the children's connectors.
fn write_tree(
    out: &mut String,
    row: &TaskRow,
    children_map: &HashMap<Option<TaskId>, Vec<&TaskRow>>,
    line_prefix: &str,
    child_prefix: &str,
) {
    out.push_str(&format!(
        "{}{} {}  #{}\n",
        line_prefix,
        row.icon(),
        row.content,
        row.id
    ));

    let children = children_map.get(&Some(row.id)).cloned().unwrap_or_default();
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let (connector, extension) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        write_tree(
            out,
            child,
            children_map,
            &format!("{child_prefix}{connector}"),
            &format!("{child_prefix}{extension}"),
        );
    }
}

pub fn format_violations(violations: &[Violation]) -> String {
    let mut out = String::new();
    for v in violations {
        out.push_str(&format!("  {v}\n"));
    }
    out
}
