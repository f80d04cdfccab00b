//! Snippet truncation
//!
//! At most `S` lines; overflow keeps the head and tail around a single
//! sentinel line.

use crate::model::annotation::SNIPPET_SENTINEL;

pub fn truncate_snippet(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.trim_end_matches('\n').to_string();
    }

    let head = max_lines.div_ceil(2);
    let tail = max_lines / 2;

    let mut out = Vec::with_capacity(max_lines + 1);
    out.extend_from_slice(&lines[..head]);
    out.push(SNIPPET_SENTINEL);
    out.extend_from_slice(&lines[lines.len() - tail..]);
    out.join("\n")
}
