//! Script bundle: the shared runtime followed by each item's fragment.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::constants::{files, render};
use crate::model::Item;
use crate::types::{ItemId, ANIMATIONS_IN, ANIMATIONS_OUT, CUSTOM_ANIMATION};

use super::placeholders::file_url;

/// Per-item animation settings read by the runtime.
#[derive(Debug, Serialize)]
struct AnimConfig<'a> {
    #[serde(rename = "in")]
    anim_in: &'a str,
    out: &'a str,
    custom: bool,
    sound_in: Option<String>,
    sound_out: Option<String>,
    delay: u32,
}

impl<'a> AnimConfig<'a> {
    fn of(item: &'a Item) -> Self {
        Self {
            anim_in: &item.anim_in,
            out: &item.anim_out,
            custom: item.uses_custom_animation(),
            sound_in: item.anim_in_sound.as_deref().map(|f| file_url(Some(f))),
            sound_out: item.anim_out_sound.as_deref().map(|f| file_url(Some(f))),
            delay: 0,
        }
    }
}

const RUNTIME: &str = r##"  const nodes = {};
  document.querySelectorAll("#lower-thirds-root > li.lower-third").forEach(function (li) {
    nodes[li.id] = li;
  });
  const shown = new Set();
  const queues = {};

  function clearAnims(li) {
    ALL_ANIMS.forEach(function (cls) { li.classList.remove(cls); });
    li.classList.remove("animate__animated");
  }

  function playSound(url) {
    if (!url) return;
    try { new Audio(url).play().catch(function () {}); } catch (e) {}
  }

  function animate(li, cls) {
    return new Promise(function (resolve) {
      if (!cls || cls === CUSTOM) { resolve(); return; }
      let done = false;
      const finish = function () {
        if (done) return;
        done = true;
        li.removeEventListener("animationend", finish);
        resolve();
      };
      li.addEventListener("animationend", finish);
      li.classList.add("animate__animated", cls);
      setTimeout(finish, 3000);
    });
  }

  function show(id) {
    const li = nodes[id];
    const cfg = ANIMS[id] || {};
    if (!li) return Promise.resolve();
    clearAnims(li);
    li.classList.add("slt-visible");
    playSound(cfg.sound_in);
    if (cfg.custom) {
      li.dispatchEvent(new CustomEvent("slt:show", { detail: { id: id } }));
      return Promise.resolve();
    }
    return animate(li, cfg.in || "animate__fadeIn");
  }

  function hide(id) {
    const li = nodes[id];
    const cfg = ANIMS[id] || {};
    if (!li) return Promise.resolve();
    clearAnims(li);
    playSound(cfg.sound_out);
    if (cfg.custom) {
      li.dispatchEvent(new CustomEvent("slt:hide", { detail: { id: id } }));
      li.classList.remove("slt-visible");
      return Promise.resolve();
    }
    return animate(li, cfg.out || "animate__fadeOut").then(function () {
      clearAnims(li);
      li.classList.remove("slt-visible");
    });
  }

  function enqueue(id, step) {
    const prev = queues[id] || Promise.resolve();
    queues[id] = prev.then(step, step);
  }

  function apply(ids) {
    const wanted = new Set(ids);
    shown.forEach(function (id) {
      if (!wanted.has(id)) {
        shown.delete(id);
        enqueue(id, function () { return hide(id); });
      }
    });
    wanted.forEach(function (id) {
      if (!shown.has(id) && nodes[id]) {
        shown.add(id);
        enqueue(id, function () { return show(id); });
      }
    });
  }

  async function poll() {
    try {
      const res = await fetch(VISIBLE_URL + "?ts=" + Date.now(), { cache: "no-store" });
      if (!res.ok) return;
      const ids = await res.json();
      if (Array.isArray(ids)) apply(ids);
    } catch (e) {}
  }

  poll();
  setInterval(poll, POLL_MS);
"##;

fn json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Failed to encode script data: {e}");
        "null".to_string()
    })
}

/// The shared runtime: animation map plus polling and transition logic.
pub fn base_script(items: &[Item]) -> String {
    let anims: BTreeMap<&str, AnimConfig<'_>> =
        items.iter().map(|item| (item.id.as_str(), AnimConfig::of(item))).collect();
    let all_anims: Vec<&str> = ANIMATIONS_IN
        .iter()
        .chain(ANIMATIONS_OUT)
        .copied()
        .filter(|a| *a != CUSTOM_ANIMATION)
        .collect();

    let mut out = String::from("(function () {\n  \"use strict\";\n");
    let _ = writeln!(out, "  const ANIMS = {};", json(&anims));
    let _ = writeln!(out, "  const ALL_ANIMS = {};", json(&all_anims));
    let _ = writeln!(out, "  const CUSTOM = {};", json(CUSTOM_ANIMATION));
    let _ = writeln!(out, "  const VISIBLE_URL = {};", json(files::VISIBLE_FILE));
    let _ = writeln!(out, "  const POLL_MS = {};", render::POLL_INTERVAL_MS);
    out.push_str(RUNTIME);
    out.push_str("})();\n");
    out
}

/// Wrap one item's (already substituted) fragment so it runs in isolation
/// with `root` bound to the item's element.
pub fn wrap_fragment(id: &ItemId, source: &str) -> String {
    let id_literal = json(id.as_str());
    let mut out = String::new();
    let _ = writeln!(out, "/* lower third: {id} */");
    out.push_str("(function () {\n");
    let _ = writeln!(out, "  const root = document.getElementById({id_literal});");
    out.push_str("  if (!root) return;\n  try {\n");
    let _ = writeln!(out, "    new Function(\"root\", {})(root);", json(source));
    out.push_str("  } catch (e) {\n");
    let _ = writeln!(out, "    console.error(\"lower third script failed:\", {id_literal}, e);");
    out.push_str("  }\n})();\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_map_lists_every_item() {
        let mut a = Item::new_default(ItemId::new("a"), 0);
        let b = Item::new_default(ItemId::new("b"), 1);
        a.anim_in = CUSTOM_ANIMATION.to_string();
        a.anim_in_sound = Some("ding.mp3".into());

        let script = base_script(&[b, a]);

        assert!(script.contains(r#""a":{"in":"custom","out":"animate__fadeOutDown","custom":true,"sound_in":"ding.mp3","sound_out":null,"delay":0}"#));
        assert!(script.find(r#""a":"#) < script.find(r#""b":"#));
        assert!(script.contains("lowerdeck-visible.json"));
    }

    #[test]
    fn runtime_targets_the_item_list() {
        let script = base_script(&[]);
        assert!(script.contains(r##"querySelectorAll("#lower-thirds-root > li.lower-third")"##));
        assert!(script.contains("slt-visible"));
    }

    #[test]
    fn fragment_is_isolated() {
        let wrapped = wrap_fragment(&ItemId::new("lt-1"), "root.dataset.x = \"1\";\nthrow 1;");
        assert!(wrapped.contains("try {"));
        assert!(wrapped.contains(r#"new Function("root", "root.dataset.x = \"1\";\nthrow 1;")(root);"#));
        assert!(wrapped.contains(r#"document.getElementById("lt-1")"#));
    }
}
