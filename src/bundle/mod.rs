//! Template bundling engine.
//!
//! Turns the item list into one stylesheet, one script and the list markup
//! for the HTML wrapper. Output is a pure function of the items: the same
//! list always yields byte-identical text.

pub mod keyframes;
pub mod placeholders;
pub mod scope;
pub mod script;

use std::fmt::Write;

use crate::constants::files;
use crate::model::Item;
use crate::types::Position;

use keyframes::KeyframeRegistry;
use placeholders::{substitute, Context};

/// Compiled output for the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Stylesheet: base rules, per-item scoped rules, then keyframes.
    pub css: String,
    /// Script: shared runtime, then each item's isolated fragment.
    pub script: String,
    /// `<li>` elements, one per item, in item order.
    pub markup: String,
}

fn base_css() -> String {
    let mut css = String::from(
        "html,body{margin:0;padding:0;background:transparent;overflow:hidden;}\n\
         ul#lower-thirds-root{list-style:none;margin:0;padding:0;}\n\
         .lower-third{position:absolute;opacity:0;visibility:hidden;pointer-events:none;}\n\
         .lower-third.slt-visible{opacity:1;visibility:visible;pointer-events:auto;}\n",
    );
    for position in Position::all() {
        let _ = writeln!(css, ".{}{{{}}}", position.class(), position.declarations());
    }
    css
}

fn item_markup(item: &Item) -> String {
    let fragment = substitute(&item.html_template, item, Context::Html);
    let custom = if item.uses_custom_animation() { " data-custom-anim=\"1\"" } else { "" };
    format!(
        "<li id=\"{}\" class=\"lower-third {}\"{custom}>\n{}\n</li>\n",
        item.id,
        item.position.class(),
        fragment.trim_end()
    )
}

impl Bundle {
    /// Build the bundle for `items` (expected in sort order).
    pub fn build(items: &[Item]) -> Self {
        let mut registry = KeyframeRegistry::new();
        let mut css = base_css();
        let mut js = script::base_script(items);
        let mut markup = String::new();

        for item in items {
            let substituted = substitute(&item.css_template, item, Context::Css);
            let (rest, blocks) = keyframes::extract(&substituted);
            let rest = registry.absorb(&item.id, rest, blocks);
            css.push_str(&scope::scope(&rest, &item.id));

            let source = substitute(&item.js_template, item, Context::Script);
            js.push_str(&script::wrap_fragment(&item.id, &source));

            markup.push_str(&item_markup(item));
        }

        if !registry.is_empty() {
            css.push_str("/* keyframes */\n");
            css.push_str(&registry.css());
        }

        tracing::debug!(items = items.len(), keyframes = registry.len(), "Bundle built");
        Self { css, script: js, markup }
    }

    /// Full HTML wrapper referencing the stable CSS/script names with a
    /// cache-busting `?v=<version>` query.
    pub fn document(&self, version: &str, animate_css_href: &str) -> String {
        format!(
            "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n\
             <title>Lower thirds</title>\n\
             <link rel=\"stylesheet\" href=\"{animate_css_href}\" />\n\
             <link rel=\"stylesheet\" href=\"{css}?v={version}\" />\n\
             </head>\n<body>\n<ul id=\"lower-thirds-root\">\n{markup}</ul>\n\
             <script src=\"{js}?v={version}\"></script>\n</body>\n</html>\n",
            css = files::BUNDLE_CSS,
            js = files::BUNDLE_JS,
            markup = self.markup,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, CUSTOM_ANIMATION};
    use pretty_assertions::assert_eq;

    fn item(id: &str, order: i64) -> Item {
        Item::new_default(ItemId::new(id), order)
    }

    #[test]
    fn build_is_deterministic() {
        let items = vec![item("a", 0), item("b", 1)];
        assert_eq!(Bundle::build(&items), Bundle::build(&items));
    }

    #[test]
    fn markup_carries_id_position_and_custom_marker() {
        let mut custom = item("b", 1);
        custom.anim_out = CUSTOM_ANIMATION.to_string();
        custom.position = Position::Center;

        let bundle = Bundle::build(&[item("a", 0), custom]);

        assert!(bundle.markup.contains("<li id=\"a\" class=\"lower-third lt-pos-bottom-left\">"));
        assert!(bundle
            .markup
            .contains("<li id=\"b\" class=\"lower-third lt-pos-center\" data-custom-anim=\"1\">"));
    }

    #[test]
    fn default_template_is_substituted_and_trusted_as_scoped() {
        let bundle = Bundle::build(&[item("lt-1", 0)]);
        assert!(bundle.css.contains("#lt-1 .slt-card {"));
        assert!(!bundle.css.contains("#lt-1 #lt-1"));
        assert!(bundle.markup.contains("Your Name"));
        assert!(!bundle.markup.contains("{{"));
    }

    #[test]
    fn base_css_appears_once_and_keyframes_come_last() {
        let mut a = item("a", 0);
        a.css_template = ".x { animation: pulse 1s; }\n@keyframes pulse { to { top: 0; } }".into();
        let mut b = a.clone();
        b.id = ItemId::new("b");

        let bundle = Bundle::build(&[a, b]);

        assert_eq!(bundle.css.matches("ul#lower-thirds-root").count(), 1);
        assert_eq!(bundle.css.matches("@keyframes pulse").count(), 1);
        let kf = bundle.css.find("@keyframes pulse").unwrap_or_default();
        let scoped_b = bundle.css.find("#b .x").unwrap_or_default();
        assert!(kf > scoped_b);
    }

    #[test]
    fn document_busts_caches_with_version() {
        let bundle = Bundle::build(&[item("a", 0)]);
        let html = bundle.document("20240101120000000", "animate.min.css");
        assert!(html.contains("href=\"lowerdeck.css?v=20240101120000000\""));
        assert!(html.contains("src=\"lowerdeck.js?v=20240101120000000\""));
        assert!(html.contains("<li id=\"a\""));
    }
}
