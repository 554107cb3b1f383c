//! ASCII rendering of a session's version forest.

use crate::models::{Session, Version, VersionOrigin};
use crate::VersionNode;

const FOCUSED: char = '●';
const UNFOCUSED: char = '○';

/// Longest user text shown on a line before it is cut.
const MAX_LABEL_CHARS: usize = 48;

/// Render the version forest of a session, marking the focused version.
///
/// Example output:
/// ```text
/// ○ v1 a red circle
/// ├── ○ v2 make it blue
/// │   └── ○ v4 thicker outline
/// └── ● v3 rollback to v1
/// ```
pub fn render_tree(session: &Session, focus: Option<u32>) -> String {
    let mut output = String::new();
    for root in session.tree() {
        render_node(&mut output, &root, focus, "", true, true);
    }
    output
}

/// One-line description of a version.
pub fn label(version: &Version) -> String {
    match (&version.origin, version.parent_version) {
        (VersionOrigin::Rollback, Some(parent)) => format!("rollback to v{}", parent),
        (origin, _) => truncate(origin.text().unwrap_or_default()),
    }
}

fn truncate(text: &str) -> String {
    let text = text.lines().next().unwrap_or_default();
    if text.chars().count() <= MAX_LABEL_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_LABEL_CHARS - 1).collect();
        format!("{}…", cut)
    }
}

fn render_node(
    output: &mut String,
    node: &VersionNode<'_>,
    focus: Option<u32>,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) {
    let version = node.version;
    let symbol = if focus == Some(version.version_number) {
        FOCUSED
    } else {
        UNFOCUSED
    };

    if !is_root {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
    }
    output.push(symbol);
    output.push_str(&format!(" v{} {}", version.version_number, label(version)));
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, focus, &child_prefix, child_is_last, false);
    }
}
