//! `{{TOKEN}}` substitution for item fragments.

// Allow unwrap for compile-time constant regex patterns in LazyLock blocks
#![allow(clippy::unwrap_used)]

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::model::Item;

static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([A-Z0-9_]+)\}\}").unwrap());

/// Where a fragment ends up, which decides how values are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// HTML markup: entity-escaped, so a title such as `A<br>B` renders as
    /// text. Markup belongs in the template, never in field values.
    Html,
    /// Stylesheet: inserted raw.
    Css,
    /// Script source: escaped for use inside a string literal.
    Script,
}

/// Convert a stored color to CSS. `#AARRGGBB` becomes `rgba(r,g,b,a)`;
/// anything else passes through.
pub fn css_color(stored: &str) -> String {
    let hex = stored.trim();
    let Some(digits) = hex.strip_prefix('#').filter(|d| d.len() == 8) else {
        return hex.to_string();
    };
    let byte = |idx: usize| {
        digits
            .get(idx..idx + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .unwrap_or(0)
    };
    let (a, r, g, b) = (byte(0), byte(2), byte(4), byte(6));
    format!("rgba({r},{g},{b},{:.3})", f64::from(a) / 255.0)
}

/// Raw value for a recognised token, or `None` to leave it verbatim.
fn resolve(item: &Item, token: &str) -> Option<String> {
    let file = |f: &Option<String>| f.clone().unwrap_or_default();
    let value = match token {
        "ID" => item.id.to_string(),
        "TITLE" => item.title.clone(),
        "SUBTITLE" => item.subtitle.clone(),
        "PRIMARY_COLOR" | "BG_COLOR" => css_color(&item.primary_color),
        "SECONDARY_COLOR" => css_color(&item.secondary_color),
        "TITLE_COLOR" | "TEXT_COLOR" => css_color(&item.title_color),
        "SUBTITLE_COLOR" => css_color(&item.subtitle_color),
        "OPACITY" => item.opacity.to_string(),
        "RADIUS" => item.radius.to_string(),
        "FONT_FAMILY" => item.font_family.clone(),
        "TITLE_SIZE" => item.title_size.to_string(),
        "SUBTITLE_SIZE" => item.subtitle_size.to_string(),
        "AVATAR_WIDTH" => item.avatar_width.to_string(),
        "AVATAR_HEIGHT" => item.avatar_height.to_string(),
        "HAS_AVATAR" => u8::from(item.profile_picture.is_some()).to_string(),
        "PROFILE_PICTURE" => file(&item.profile_picture),
        "PROFILE_PICTURE_URL" => file_url(item.profile_picture.as_deref()),
        "SOUND_IN_URL" => file_url(item.anim_in_sound.as_deref()),
        "SOUND_OUT_URL" => file_url(item.anim_out_sound.as_deref()),
        "ANIM_IN" => item.anim_in.clone(),
        "ANIM_OUT" => item.anim_out.clone(),
        "POSITION" | "LT_POSITION" => item.position.class().to_string(),
        _ => return None,
    };
    Some(value)
}

/// Page-relative URL of an owned file. Files live next to the page.
pub fn file_url(file: Option<&str>) -> String {
    file.map(|f| f.replace('%', "%25").replace(' ', "%20").replace('#', "%23"))
        .unwrap_or_default()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_script(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\u003c"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace every recognised token in `template`. Unknown tokens stay literal.
pub fn substitute(template: &str, item: &Item, context: Context) -> String {
    RE_TOKEN
        .replace_all(template, |caps: &Captures<'_>| match resolve(item, &caps[1]) {
            Some(value) => match context {
                Context::Html => escape_html(&value),
                Context::Css => value,
                Context::Script => escape_script(&value),
            },
            None => caps[0].to_string(),
        })
        .into_owned()
}
