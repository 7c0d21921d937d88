//! Overlay item definition and its on-disk record.

use serde::{Deserialize, Serialize};

use crate::constants::limits;
use crate::types::{is_plain_file_name, sanitize_id, ItemId, Position, CUSTOM_ANIMATION};

/// Default entrance animation.
pub const DEFAULT_ANIM_IN: &str = "animate__fadeInUp";
/// Default exit animation.
pub const DEFAULT_ANIM_OUT: &str = "animate__fadeOutDown";
/// Default font family.
pub const DEFAULT_FONT: &str = "Inter";

const DEFAULT_PRIMARY: &str = "#111827";
const DEFAULT_SECONDARY: &str = "#3B82F6";
const DEFAULT_TITLE_COLOR: &str = "#F9FAFB";
const DEFAULT_SUBTITLE_COLOR: &str = "#D1D5DB";

/// Built-in HTML fragment, rendered inside the item's `<li>`.
pub const DEFAULT_HTML_TEMPLATE: &str = r#"<div class="slt-card">
  <div class="slt-accent"></div>
  <div class="slt-body">
    <div class="slt-avatar-wrap" data-has-avatar="{{HAS_AVATAR}}">
      <img class="slt-avatar" src="{{PROFILE_PICTURE_URL}}" alt="" />
    </div>
    <div class="slt-text">
      <div class="slt-title">{{TITLE}}</div>
      <div class="slt-subtitle">{{SUBTITLE}}</div>
    </div>
  </div>
</div>"#;

/// Built-in CSS fragment.
pub const DEFAULT_CSS_TEMPLATE: &str = r#"#{{ID}} .slt-card {
  position: relative;
  display: inline-block;
  border-radius: {{RADIUS}}px;
  overflow: hidden;
  opacity: calc({{OPACITY}} / 100);
  box-shadow: 0 14px 40px rgba(0,0,0,0.35);
}
#{{ID}} .slt-accent {
  position: absolute;
  inset: 0 auto 0 0;
  width: 6px;
  background: {{SECONDARY_COLOR}};
}
#{{ID}} .slt-body {
  display: inline-flex;
  align-items: center;
  gap: 12px;
  padding: 14px 18px 14px 20px;
  background-color: {{PRIMARY_COLOR}};
}
#{{ID}} .slt-avatar-wrap {
  width: {{AVATAR_WIDTH}}px;
  height: {{AVATAR_HEIGHT}}px;
  border-radius: 999px;
  overflow: hidden;
  flex: 0 0 auto;
}
#{{ID}} .slt-avatar-wrap[data-has-avatar="0"] {
  display: none;
}
#{{ID}} .slt-avatar {
  width: 100%;
  height: 100%;
  object-fit: cover;
}
#{{ID}} .slt-title {
  font-family: {{FONT_FAMILY}}, system-ui, sans-serif;
  font-size: {{TITLE_SIZE}}px;
  font-weight: 800;
  color: {{TITLE_COLOR}};
}
#{{ID}} .slt-subtitle {
  font-family: {{FONT_FAMILY}}, system-ui, sans-serif;
  font-size: {{SUBTITLE_SIZE}}px;
  color: {{SUBTITLE_COLOR}};
}"#;

/// Built-in script fragment.
pub const DEFAULT_JS_TEMPLATE: &str = "// `root` is this lower third's <li> element.\n";

/// Media file slots an item can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaSlot {
    /// Profile picture.
    Avatar,
    /// Sound played with the entrance animation.
    SoundIn,
    /// Sound played with the exit animation.
    SoundOut,
}

/// One configured overlay widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    /// Unique id, restricted to `[A-Za-z0-9_-]`.
    pub id: ItemId,
    /// Display label used by list views.
    pub label: String,
    /// Ordering key; ties are broken by id.
    pub order: i64,

    /// Title text.
    pub title: String,
    /// Subtitle text.
    pub subtitle: String,
    /// Avatar filename owned by this item, relative to the output directory.
    pub profile_picture: Option<String>,

    /// Title font size in pixels.
    pub title_size: u32,
    /// Subtitle font size in pixels.
    pub subtitle_size: u32,
    /// Avatar width in pixels.
    pub avatar_width: u32,
    /// Avatar height in pixels.
    pub avatar_height: u32,

    /// Background color (`#RRGGBB` or `#AARRGGBB`).
    pub primary_color: String,
    /// Accent color.
    pub secondary_color: String,
    /// Title text color.
    pub title_color: String,
    /// Subtitle text color.
    pub subtitle_color: String,
    /// Opacity, 0..=100.
    pub opacity: u32,
    /// Corner radius, 0..=100.
    pub radius: u32,
    /// Font family name.
    pub font_family: String,
    /// Screen placement.
    #[serde(rename = "lt_position")]
    pub position: Position,

    /// Entrance animation class, or [`CUSTOM_ANIMATION`].
    pub anim_in: String,
    /// Exit animation class, or [`CUSTOM_ANIMATION`].
    pub anim_out: String,
    /// Entrance sound filename owned by this item.
    pub anim_in_sound: Option<String>,
    /// Exit sound filename owned by this item.
    pub anim_out_sound: Option<String>,
    /// Keyboard shortcut in portable text form.
    pub hotkey: Option<String>,

    /// Seconds between automatic shows; 0 means manual only.
    pub repeat_every_sec: u32,
    /// Seconds an automatic show stays up; 0 uses the default.
    pub repeat_visible_sec: u32,

    /// HTML fragment.
    pub html_template: String,
    /// CSS fragment.
    pub css_template: String,
    /// Script fragment.
    pub js_template: String,
}

impl Item {
    /// A new item with built-in defaults.
    pub fn new_default(id: ItemId, order: i64) -> Self {
        Self {
            label: format!("Lower third {}", order + 1),
            id,
            order,
            title: "Your Name".to_string(),
            subtitle: "Role / Topic".to_string(),
            profile_picture: None,
            title_size: 28,
            subtitle_size: 16,
            avatar_width: 44,
            avatar_height: 44,
            primary_color: DEFAULT_PRIMARY.to_string(),
            secondary_color: DEFAULT_SECONDARY.to_string(),
            title_color: DEFAULT_TITLE_COLOR.to_string(),
            subtitle_color: DEFAULT_SUBTITLE_COLOR.to_string(),
            opacity: 85,
            radius: 14,
            font_family: DEFAULT_FONT.to_string(),
            position: Position::default(),
            anim_in: DEFAULT_ANIM_IN.to_string(),
            anim_out: DEFAULT_ANIM_OUT.to_string(),
            anim_in_sound: None,
            anim_out_sound: None,
            hotkey: None,
            repeat_every_sec: 0,
            repeat_visible_sec: 0,
            html_template: DEFAULT_HTML_TEMPLATE.to_string(),
            css_template: DEFAULT_CSS_TEMPLATE.to_string(),
            js_template: DEFAULT_JS_TEMPLATE.to_string(),
        }
    }

    /// Whether either animation is handled by the template itself.
    pub fn uses_custom_animation(&self) -> bool {
        self.anim_in == CUSTOM_ANIMATION || self.anim_out == CUSTOM_ANIMATION
    }

    /// Filenames this item owns inside the output directory.
    pub fn owned_files(&self) -> impl Iterator<Item = &str> {
        [&self.profile_picture, &self.anim_in_sound, &self.anim_out_sound]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .filter(|f| !f.is_empty())
    }

    /// The filename held in `slot`.
    pub fn media(&self, slot: MediaSlot) -> Option<&str> {
        match slot {
            MediaSlot::Avatar => self.profile_picture.as_deref(),
            MediaSlot::SoundIn => self.anim_in_sound.as_deref(),
            MediaSlot::SoundOut => self.anim_out_sound.as_deref(),
        }
    }

    /// Mutable access to the filename held in `slot`.
    pub fn media_mut(&mut self, slot: MediaSlot) -> &mut Option<String> {
        match slot {
            MediaSlot::Avatar => &mut self.profile_picture,
            MediaSlot::SoundIn => &mut self.anim_in_sound,
            MediaSlot::SoundOut => &mut self.anim_out_sound,
        }
    }

    /// Clamp numeric fields and restore defaults for empty fields.
    pub fn normalize(&mut self) {
        self.title_size = self.title_size.clamp(limits::MIN_FONT_SIZE, limits::MAX_FONT_SIZE);
        self.subtitle_size = self.subtitle_size.clamp(limits::MIN_FONT_SIZE, limits::MAX_FONT_SIZE);
        self.avatar_width = self.avatar_width.clamp(limits::MIN_AVATAR_SIZE, limits::MAX_AVATAR_SIZE);
        self.avatar_height = self.avatar_height.clamp(limits::MIN_AVATAR_SIZE, limits::MAX_AVATAR_SIZE);
        self.opacity = self.opacity.min(limits::MAX_PERCENT);
        self.radius = self.radius.min(limits::MAX_PERCENT);
        self.repeat_every_sec = self.repeat_every_sec.min(limits::MAX_REPEAT_SECS);
        self.repeat_visible_sec = self.repeat_visible_sec.min(limits::MAX_REPEAT_SECS);

        fill_if_blank(&mut self.primary_color, DEFAULT_PRIMARY);
        fill_if_blank(&mut self.secondary_color, DEFAULT_SECONDARY);
        fill_if_blank(&mut self.title_color, DEFAULT_TITLE_COLOR);
        fill_if_blank(&mut self.subtitle_color, DEFAULT_SUBTITLE_COLOR);
        fill_if_blank(&mut self.font_family, DEFAULT_FONT);
        fill_if_blank(&mut self.anim_in, DEFAULT_ANIM_IN);
        fill_if_blank(&mut self.anim_out, DEFAULT_ANIM_OUT);
        fill_if_blank(&mut self.html_template, DEFAULT_HTML_TEMPLATE);
        fill_if_blank(&mut self.css_template, DEFAULT_CSS_TEMPLATE);
        fill_if_blank(&mut self.js_template, DEFAULT_JS_TEMPLATE);

        for file in [&mut self.profile_picture, &mut self.anim_in_sound, &mut self.anim_out_sound] {
            let Some(name) = file.as_deref() else { continue };
            if name.trim().is_empty() {
                *file = None;
            } else if !is_plain_file_name(name) {
                tracing::warn!(id = %self.id, file = name, "Dropping media reference outside the output directory");
                *file = None;
            }
        }
        if self.hotkey.as_deref().is_some_and(|h| h.trim().is_empty()) {
            self.hotkey = None;
        }
    }
}

fn fill_if_blank(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

/// Lenient on-disk form of an [`Item`].
///
/// Every field is optional so older documents load with explicit defaults,
/// including the legacy two-color keys (`bg_color`, `text_color`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ItemRecord {
    /// Raw id.
    pub id: String,
    /// Display label.
    pub label: Option<String>,
    /// Ordering key.
    pub order: Option<i64>,
    /// Title text.
    pub title: Option<String>,
    /// Subtitle text.
    pub subtitle: Option<String>,
    /// Avatar filename.
    pub profile_picture: Option<String>,
    /// Title font size.
    pub title_size: Option<i64>,
    /// Subtitle font size.
    pub subtitle_size: Option<i64>,
    /// Avatar width.
    pub avatar_width: Option<i64>,
    /// Avatar height.
    pub avatar_height: Option<i64>,
    /// Primary color.
    pub primary_color: Option<String>,
    /// Secondary color.
    pub secondary_color: Option<String>,
    /// Title color.
    pub title_color: Option<String>,
    /// Subtitle color.
    pub subtitle_color: Option<String>,
    /// Legacy background color, mapped onto `primary_color`.
    pub bg_color: Option<String>,
    /// Legacy text color, mapped onto `title_color`.
    pub text_color: Option<String>,
    /// Opacity.
    pub opacity: Option<i64>,
    /// Corner radius.
    pub radius: Option<i64>,
    /// Font family.
    pub font_family: Option<String>,
    /// Position keyword.
    pub lt_position: Option<String>,
    /// Entrance animation.
    pub anim_in: Option<String>,
    /// Exit animation.
    pub anim_out: Option<String>,
    /// Entrance sound.
    pub anim_in_sound: Option<String>,
    /// Exit sound.
    pub anim_out_sound: Option<String>,
    /// Shortcut.
    pub hotkey: Option<String>,
    /// Repeat period.
    pub repeat_every_sec: Option<i64>,
    /// Repeat visible time.
    pub repeat_visible_sec: Option<i64>,
    /// HTML fragment.
    pub html_template: Option<String>,
    /// CSS fragment.
    pub css_template: Option<String>,
    /// Script fragment.
    pub js_template: Option<String>,
}

impl ItemRecord {
    /// Resolve into a normalized item; `None` when the id sanitizes to nothing.
    pub fn into_item(self, fallback_order: i64) -> Option<Item> {
        let id = sanitize_id(&self.id);
        if id.is_empty() {
            return None;
        }

        let order = self.order.unwrap_or(fallback_order);
        let mut item = Item::new_default(ItemId::new(id), order);
        let to_u32 = |v: i64| u32::try_from(v.max(0)).unwrap_or(u32::MAX);

        if let Some(label) = self.label {
            item.label = label;
        }
        if let Some(title) = self.title {
            item.title = title;
        }
        if let Some(subtitle) = self.subtitle {
            item.subtitle = subtitle;
        }
        item.profile_picture = self.profile_picture;
        item.title_size = self.title_size.map_or(item.title_size, to_u32);
        item.subtitle_size = self.subtitle_size.map_or(item.subtitle_size, to_u32);
        item.avatar_width = self.avatar_width.map_or(item.avatar_width, to_u32);
        item.avatar_height = self.avatar_height.map_or(item.avatar_height, to_u32);

        if let Some(c) = self.primary_color.or(self.bg_color) {
            item.primary_color = c;
        }
        if let Some(c) = self.secondary_color {
            item.secondary_color = c;
        }
        if let Some(c) = self.title_color.or(self.text_color) {
            item.title_color = c;
        }
        if let Some(c) = self.subtitle_color {
            item.subtitle_color = c;
        }

        item.opacity = self.opacity.map_or(item.opacity, to_u32);
        item.radius = self.radius.map_or(item.radius, to_u32);
        if let Some(font) = self.font_family {
            item.font_family = font;
        }
        item.position = self
            .lt_position
            .as_deref()
            .and_then(Position::from_keyword)
            .unwrap_or_default();
        if let Some(a) = self.anim_in {
            item.anim_in = a;
        }
        if let Some(a) = self.anim_out {
            item.anim_out = a;
        }
        item.anim_in_sound = self.anim_in_sound;
        item.anim_out_sound = self.anim_out_sound;
        item.hotkey = self.hotkey;
        item.repeat_every_sec = self.repeat_every_sec.map_or(0, to_u32);
        item.repeat_visible_sec = self.repeat_visible_sec.map_or(0, to_u32);
        if let Some(t) = self.html_template {
            item.html_template = t;
        }
        if let Some(t) = self.css_template {
            item.css_template = t;
        }
        if let Some(t) = self.js_template {
            item.js_template = t;
        }

        item.normalize();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    fn record(json: serde_json::Value) -> ItemRecord {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn legacy_colors_map_onto_four_color_model() {
        let item = record(serde_json::json!({
            "id": "a",
            "bg_color": "#C0000000",
            "text_color": "#FFFFFF",
        }))
        .into_item(0)
        .unwrap();

        assert_eq!(item.primary_color, "#C0000000");
        assert_eq!(item.title_color, "#FFFFFF");
        assert_eq!(item.secondary_color, DEFAULT_SECONDARY);
    }

    #[test]
    fn explicit_colors_win_over_legacy_keys() {
        let item = record(serde_json::json!({
            "id": "a",
            "bg_color": "#000000",
            "primary_color": "#123456",
        }))
        .into_item(0)
        .unwrap();
        assert_eq!(item.primary_color, "#123456");
    }

    #[test]
    fn numeric_fields_are_clamped() {
        let item = record(serde_json::json!({
            "id": "a",
            "title_size": 1000,
            "subtitle_size": -4,
            "avatar_width": 2,
            "opacity": 250,
            "radius": 101,
        }))
        .into_item(0)
        .unwrap();

        assert_eq!(item.title_size, limits::MAX_FONT_SIZE);
        assert_eq!(item.subtitle_size, limits::MIN_FONT_SIZE);
        assert_eq!(item.avatar_width, limits::MIN_AVATAR_SIZE);
        assert_eq!(item.opacity, 100);
        assert_eq!(item.radius, 100);
    }

    #[test]
    fn empty_templates_fall_back_to_defaults() {
        let item = record(serde_json::json!({
            "id": "a",
            "html_template": "",
            "css_template": "   ",
            "lt_position": "lt-pos-top-right",
        }))
        .into_item(3)
        .unwrap();

        assert_eq!(item.html_template, DEFAULT_HTML_TEMPLATE);
        assert_eq!(item.css_template, DEFAULT_CSS_TEMPLATE);
        assert_eq!(item.position, Position::TopRight);
        assert_eq!(item.order, 3);
    }

    #[test]
    fn unusable_id_is_rejected() {
        assert!(record(serde_json::json!({ "id": "<>" })).into_item(0).is_none());
        let item = record(serde_json::json!({ "id": "a b" })).into_item(0).unwrap();
        assert_eq!(item.id.as_str(), "ab");
    }

    #[test]
    fn owned_files_skip_missing_entries() {
        let mut item = Item::new_default(ItemId::new("a"), 0);
        item.profile_picture = Some("pic.png".into());
        item.anim_out_sound = Some("out.mp3".into());
        let files: Vec<&str> = item.owned_files().collect();
        assert_eq!(files, vec!["pic.png", "out.mp3"]);
    }

    #[test]
    fn media_outside_output_dir_is_dropped() {
        let rec = record(serde_json::json!({
            "id": "a",
            "profile_picture": "/home/someone/victim.png",
            "anim_in_sound": "../in.mp3",
            "anim_out_sound": "out.mp3"
        }));
        let item = rec.into_item(0).unwrap();
        assert_eq!(item.profile_picture, None);
        assert_eq!(item.anim_in_sound, None);
        assert_eq!(item.media(MediaSlot::SoundOut), Some("out.mp3"));
    }
}
