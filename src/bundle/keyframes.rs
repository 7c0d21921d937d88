//! `@keyframes` extraction, deduplication and renaming.
//!
//! Blocks are located by brace-depth matching rather than a CSS parser. The
//! registry is global to one bundle build: identical blocks are emitted once,
//! and a name reused with a different body is renamed for the item that
//! reused it.

// Allow unwrap for compile-time constant regex patterns in LazyLock blocks
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::ItemId;

static RE_AT_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@(?:-[a-z]+-)?keyframes\b").unwrap());

static RE_IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?[A-Za-z_][A-Za-z0-9_-]*").unwrap());

/// One extracted animation definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyframeBlock {
    /// At-rule keyword as written, e.g. `@-webkit-keyframes`.
    pub at_rule: String,
    /// Animation name, when one could be parsed.
    pub name: Option<String>,
    /// Full block text from the at-rule to the matching `}`.
    pub text: String,
    name_span: Option<Range<usize>>,
}

impl KeyframeBlock {
    fn normalized(&self) -> String {
        self.text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn rename(&mut self, new_name: &str) {
        if let Some(span) = self.name_span.clone() {
            self.text.replace_range(span.clone(), new_name);
            self.name_span = Some(span.start..span.start + new_name.len());
            self.name = Some(new_name.to_string());
        }
    }
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(text.len(), |(i, _)| from + i)
}

fn parse_name(text: &str, from: usize) -> Option<Range<usize>> {
    let start = skip_whitespace(text, from);
    let len = text[start..]
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        .map_or(text.len() - start, |(i, _)| i);
    (len > 0).then_some(start..start + len)
}

/// Index of the `}` closing the `{` at `open`, or `None` if unbalanced.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull every keyframe block out of `css`.
///
/// Returns the remaining CSS (each block replaced by a newline) and the blocks
/// in source order. An unbalanced block stops extraction; everything from its
/// at-rule onward is kept verbatim.
pub fn extract(css: &str) -> (String, Vec<KeyframeBlock>) {
    let mut remaining = String::with_capacity(css.len());
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = RE_AT_RULE.find_at(css, cursor) {
        let start = found.start();
        let name_span = parse_name(css, found.end());
        let after_name = name_span.as_ref().map_or(found.end(), |s| s.end);

        let Some(open) = css[after_name..].find('{').map(|i| after_name + i) else {
            tracing::warn!("Keyframe block without a body, leaving the rest of the stylesheet as is");
            break;
        };
        let Some(close) = matching_close(css, open) else {
            tracing::warn!("Unbalanced keyframe block, leaving the rest of the stylesheet as is");
            break;
        };

        remaining.push_str(&css[cursor..start]);
        remaining.push('\n');
        blocks.push(KeyframeBlock {
            at_rule: found.as_str().to_string(),
            name: name_span.as_ref().map(|s| css[s.clone()].to_string()),
            text: css[start..=close].to_string(),
            name_span: name_span.map(|s| s.start - start..s.end - start),
        });
        cursor = close + 1;
    }

    remaining.push_str(&css[cursor..]);
    (remaining, blocks)
}

struct Entry {
    normalized: String,
    text: String,
}

/// First-seen registry of keyframe blocks for one bundle build.
#[derive(Default)]
pub struct KeyframeRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    synthetic: usize,
}

impl KeyframeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(at_rule: &str, name: &str) -> String {
        format!("{} {name}", at_rule.to_ascii_lowercase())
    }

    fn push(&mut self, key: String, block: &KeyframeBlock) {
        self.by_name.insert(key, self.entries.len());
        self.entries.push(Entry { normalized: block.normalized(), text: block.text.clone() });
    }

    /// Register an item's blocks and rewrite its CSS for any renamed animation.
    pub fn absorb(&mut self, item: &ItemId, css: String, blocks: Vec<KeyframeBlock>) -> String {
        let mut renames: BTreeMap<String, String> = BTreeMap::new();

        for mut block in blocks {
            let normalized = block.normalized();

            let Some(name) = block.name.clone() else {
                if self.entries.iter().any(|e| e.normalized == normalized) {
                    continue;
                }
                self.synthetic += 1;
                let key = Self::key(&block.at_rule, &format!("{item}_kf{}", self.synthetic));
                self.push(key, &block);
                continue;
            };

            let key = Self::key(&block.at_rule, &name);
            match self.by_name.get(&key).map(|&idx| &self.entries[idx]) {
                None => self.push(key, &block),
                Some(existing) if existing.normalized == normalized => {}
                Some(_) => {
                    let renamed = format!("{name}_{item}");
                    tracing::debug!(item = %item, from = %name, to = %renamed, "Renaming clashing keyframes");
                    block.rename(&renamed);
                    let renamed_key = Self::key(&block.at_rule, &renamed);
                    if !self.by_name.contains_key(&renamed_key) {
                        self.push(renamed_key, &block);
                    }
                    renames.insert(name, renamed);
                }
            }
        }

        if renames.is_empty() {
            return css;
        }
        RE_IDENT
            .replace_all(&css, |caps: &Captures<'_>| {
                renames.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Every registered block, in first-seen order.
    pub fn css(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.text);
            out.push('\n');
        }
        out
    }

    /// Number of registered blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PULSE: &str = "@keyframes pulse { 0% { opacity: 0; } 100% { opacity: 1; } }";

    #[test]
    fn extracts_blocks_and_leaves_rules() {
        let css = format!(".a {{ animation: pulse 1s; }}\n{PULSE}\n.b {{ color: red; }}");
        let (rest, blocks) = extract(&css);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name.as_deref(), Some("pulse"));
        assert_eq!(blocks[0].text, PULSE);
        assert_eq!(rest, ".a { animation: pulse 1s; }\n\n\n.b { color: red; }");
    }

    #[test]
    fn vendor_prefixed_blocks_are_found() {
        let (_, blocks) = extract("@-webkit-keyframes spin { to { transform: rotate(1turn); } }");
        assert_eq!(blocks[0].at_rule, "@-webkit-keyframes");
        assert_eq!(blocks[0].name.as_deref(), Some("spin"));
    }

    #[test]
    fn unbalanced_block_stops_extraction() {
        let css = "@keyframes ok { to { top: 0; } }\n@keyframes broken { to { top: 0; }\n.x { }";
        let (rest, blocks) = extract(css);

        assert_eq!(blocks.len(), 1);
        assert_eq!(rest, "\n\n@keyframes broken { to { top: 0; }\n.x { }");
    }

    #[test]
    fn identical_blocks_are_kept_once() {
        let mut reg = KeyframeRegistry::new();
        for id in ["a", "b"] {
            let (rest, blocks) = extract(PULSE);
            reg.absorb(&ItemId::new(id), rest, blocks);
        }
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.css().matches("@keyframes pulse").count(), 1);
    }

    #[test]
    fn clashing_block_is_renamed_with_references() {
        let mut reg = KeyframeRegistry::new();
        let (rest, blocks) = extract(PULSE);
        reg.absorb(&ItemId::new("a"), rest, blocks);

        let other = "#b .x { animation: pulse 2s; }\n#b .pulse-slow { animation-name: pulse; }\n\
                     @keyframes pulse { from { left: 0; } to { left: 10px; } }";
        let (rest, blocks) = extract(other);
        let css = reg.absorb(&ItemId::new("b"), rest, blocks);

        assert!(css.contains("animation: pulse_b 2s;"));
        assert!(css.contains("animation-name: pulse_b;"));
        assert!(css.contains(".pulse-slow"));
        let all = reg.css();
        assert!(all.contains("@keyframes pulse {"));
        assert!(all.contains("@keyframes pulse_b {"));
    }

    #[test]
    fn unnamed_blocks_dedupe_by_content() {
        let mut reg = KeyframeRegistry::new();
        for id in ["a", "b"] {
            let (rest, blocks) = extract("@keyframes { to { top: 0; } }");
            reg.absorb(&ItemId::new(id), rest, blocks);
        }
        assert_eq!(reg.len(), 1);
    }
}
