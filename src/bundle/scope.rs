//! Best-effort selector scoping.
//!
//! Line-based: a line that opens a rule (`selector {`) and is not an at-rule
//! gets each comma-separated selector prefixed with `#<id> `. Selectors that
//! span several lines are only scoped on the line carrying the `{`.

use crate::types::ItemId;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Whether `text` contains `#<id>` as a whole selector token.
pub fn references_id(text: &str, id: &ItemId) -> bool {
    let needle = format!("#{id}");
    text.match_indices(&needle).any(|(pos, _)| {
        text[pos + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !is_ident_char(c))
    })
}

fn scope_line(line: &str, id: &ItemId) -> String {
    let trimmed = line.trim_start();
    if trimmed.starts_with('@') {
        return line.to_string();
    }
    let Some(brace) = line.find('{') else {
        return line.to_string();
    };
    let (selectors, rest) = line.split_at(brace);
    if selectors.trim().is_empty() {
        return line.to_string();
    }

    let indent = &line[..line.len() - trimmed.len()];
    let scoped: Vec<String> = selectors
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if references_id(part, id) {
                part.to_string()
            } else {
                format!("#{id} {part}")
            }
        })
        .collect();

    format!("{indent}{} {rest}", scoped.join(", "))
}

/// Scope an item's stylesheet under `#<id>`.
///
/// CSS that already references `#<id>` is trusted and emitted unchanged.
pub fn scope(css: &str, id: &ItemId) -> String {
    let mut out = format!("/* lower third: {id} */\n");
    if references_id(css, id) {
        out.push_str(css);
    } else {
        let lines: Vec<String> = css.lines().map(|line| scope_line(line, id)).collect();
        out.push_str(&lines.join("\n"));
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
