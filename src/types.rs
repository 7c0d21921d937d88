//! Core type definitions for compile-time safety.
//!
//! This module provides newtype wrappers around string identifiers to prevent
//! accidental mixing of item and group ids, plus the small enums shared by the
//! store, the bundler and the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Sentinel animation value meaning "the template supplies its own show/hide logic".
pub const CUSTOM_ANIMATION: &str = "custom";

/// Entrance animation classes offered to users (animate.css names).
pub const ANIMATIONS_IN: &[&str] = &[
    "animate__fadeIn",
    "animate__fadeInUp",
    "animate__fadeInDown",
    "animate__fadeInLeft",
    "animate__fadeInRight",
    "animate__backInUp",
    "animate__backInDown",
    "animate__backInLeft",
    "animate__backInRight",
    "animate__bounceIn",
    "animate__zoomIn",
    "animate__slideInUp",
    "animate__slideInDown",
    "animate__slideInLeft",
    "animate__slideInRight",
    "animate__flipInX",
    "animate__flipInY",
    "animate__lightSpeedInRight",
    "animate__lightSpeedInLeft",
    "animate__jackInTheBox",
    "animate__rollIn",
];

/// Exit animation classes offered to users (animate.css names).
pub const ANIMATIONS_OUT: &[&str] = &[
    "animate__fadeOut",
    "animate__fadeOutUp",
    "animate__fadeOutDown",
    "animate__fadeOutLeft",
    "animate__fadeOutRight",
    "animate__backOutUp",
    "animate__backOutDown",
    "animate__backOutLeft",
    "animate__backOutRight",
    "animate__bounceOut",
    "animate__zoomOut",
    "animate__slideOutUp",
    "animate__slideOutDown",
    "animate__slideOutLeft",
    "animate__slideOutRight",
    "animate__flipOutX",
    "animate__flipOutY",
    "animate__lightSpeedOutRight",
    "animate__lightSpeedOutLeft",
    "animate__rollOut",
];

/// Keep only `[A-Za-z0-9_-]` from an externally supplied id.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Whether `name` is a bare filename that resolves inside the output directory.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\', ':']) {
        return false;
    }
    let mut parts = Path::new(name).components();
    matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None))
}

/// A fresh opaque id with the given prefix, e.g. `lt-1b4e28ba`.
pub fn generate_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &uuid[..8])
}

/// Overlay item identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new `ItemId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sanitize an external id; an empty result becomes a freshly generated id.
    pub fn sanitized(raw: &str) -> Self {
        let clean = sanitize_id(raw);
        if clean.is_empty() {
            Self(generate_id("lt"))
        } else {
            Self(clean)
        }
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Playback group identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    /// Create a new `GroupId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Sanitize an external id; an empty result becomes a freshly generated id.
    pub fn sanitized(raw: &str) -> Self {
        let clean = sanitize_id(raw);
        if clean.is_empty() {
            Self(generate_id("group"))
        } else {
            Self(clean)
        }
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Screen placement of an item; each variant maps to a CSS utility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Position {
    /// Bottom-left corner.
    #[default]
    #[serde(rename = "lt-pos-bottom-left")]
    BottomLeft,
    /// Bottom-right corner.
    #[serde(rename = "lt-pos-bottom-right")]
    BottomRight,
    /// Top-left corner.
    #[serde(rename = "lt-pos-top-left")]
    TopLeft,
    /// Top-right corner.
    #[serde(rename = "lt-pos-top-right")]
    TopRight,
    /// Centered on screen.
    #[serde(rename = "lt-pos-center")]
    Center,
}

impl Position {
    /// Returns all positions in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::BottomLeft, Self::BottomRight, Self::TopLeft, Self::TopRight, Self::Center]
    }

    /// CSS class selecting this placement.
    #[must_use]
    pub const fn class(self) -> &'static str {
        match self {
            Self::BottomLeft => "lt-pos-bottom-left",
            Self::BottomRight => "lt-pos-bottom-right",
            Self::TopLeft => "lt-pos-top-left",
            Self::TopRight => "lt-pos-top-right",
            Self::Center => "lt-pos-center",
        }
    }

    /// CSS declarations placing an element at this position.
    #[must_use]
    pub const fn declarations(self) -> &'static str {
        match self {
            Self::BottomLeft => "left:5%;bottom:5%;top:auto;right:auto;transform:translate(0,0);",
            Self::BottomRight => "right:5%;bottom:5%;left:auto;top:auto;transform:translate(0,0);",
            Self::TopLeft => "left:5%;top:5%;right:auto;bottom:auto;transform:translate(0,0);",
            Self::TopRight => "right:5%;top:5%;left:auto;bottom:auto;transform:translate(0,0);",
            Self::Center => "top:50%;left:50%;right:auto;bottom:auto;transform:translate(-50%,-50%);",
        }
    }

    /// Parse a position keyword; unknown keywords yield `None`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.class() == keyword.trim())
    }
}

/// How a group walks its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Members in list order.
    #[default]
    Linear,
    /// Members in a freshly shuffled order every cycle.
    Shuffled,
}

/// Why the item list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    /// A new item was added.
    Create,
    /// An item was duplicated.
    Clone,
    /// An item was deleted.
    Delete,
    /// An item or group was edited or reordered.
    Update,
    /// State was reloaded from disk.
    Reload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bare_names_are_plain() {
        assert!(is_plain_file_name("pic.png"));
        assert!(is_plain_file_name("lower-third-1-ab12cd34.mp3"));
        assert!(!is_plain_file_name("../pic.png"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("/tmp/pic.png"));
        assert!(!is_plain_file_name("sub/pic.png"));
        assert!(!is_plain_file_name("C:pic.png"));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize_id("my id<script>"), "myidscript");
        assert_eq!(sanitize_id("lower-third_2"), "lower-third_2");
        assert_eq!(sanitize_id("  "), "");
    }

    #[test]
    fn empty_sanitized_id_is_regenerated() {
        let id = ItemId::sanitized("!!!");
        assert!(id.as_str().starts_with("lt-"));
        assert_eq!(id.as_str().len(), 11);
        assert_eq!(sanitize_id(id.as_str()), id.as_str());
    }

    #[test]
    fn position_keywords_round_trip() {
        for pos in Position::all() {
            assert_eq!(Position::from_keyword(pos.class()), Some(*pos));
        }
        assert_eq!(Position::from_keyword("lt-pos-nowhere"), None);
    }
}
