//! Parser for the indentation based notation assigning children to rules:
//!
//! ```text
//! Root:
//!   - spaces
//!   - phrase:
//!     - word
//! ```
//!
//! Indentation is two spaces per level. A `Name:` at column 0 starts a new block wiring the
//! children of `Name`; a `- child:` item can itself have nested items.

use crate::grammars::compiled::GrammarError;

/// One parent -> child assignment, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringEdge {
    pub parent: String,
    pub child: String,
    /// 1-based line of the child item
    pub line: usize,
}

/// Parses the wiring notation into edges. Names are not checked against any registry here.
pub fn parse_wiring(source: &str) -> Result<Vec<WiringEdge>, GrammarError> {
    let mut edges = Vec::new();
    // (name, accepts nested items) for each open level, index 0 being the block header
    let mut stack: Vec<(String, bool)> = Vec::new();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();
        let trimmed = line.trim_start_matches(' ');
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let malformed = |reason: &str| GrammarError::MalformedWiring {
            line: line_no,
            reason: reason.to_owned(),
        };

        if trimmed.starts_with('\t') {
            return Err(malformed("tabs are not allowed for indentation"));
        }
        let indent = line.len() - trimmed.len();
        if indent % 2 != 0 {
            return Err(malformed("indentation must be a multiple of two spaces"));
        }
        let depth = indent / 2;

        if depth == 0 {
            let Some(name) = trimmed.strip_suffix(':') else {
                return Err(malformed("expected a `Name:` header"));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed("empty header name"));
            }
            stack.clear();
            stack.push((name.to_owned(), true));
            continue;
        }

        let Some(item) = trimmed.strip_prefix("- ") else {
            return Err(malformed("expected a `- name` item"));
        };
        if stack.is_empty() {
            return Err(malformed("item outside of any `Name:` block"));
        }
        if depth > stack.len() {
            return Err(malformed("indented deeper than its parent item"));
        }
        stack.truncate(depth);
        let (parent, accepts_children) = &stack[depth - 1];
        if !*accepts_children {
            return Err(malformed("parent item must end with `:` to have children"));
        }

        let item = item.trim();
        let (child, has_children) = match item.strip_suffix(':') {
            Some(name) => (name.trim(), true),
            None => (item, false),
        };
        if child.is_empty() {
            return Err(malformed("empty item name"));
        }

        edges.push(WiringEdge {
            parent: parent.clone(),
            child: child.to_owned(),
            line: line_no,
        });
        stack.push((child.to_owned(), has_children));
    }

    Ok(edges)
}
