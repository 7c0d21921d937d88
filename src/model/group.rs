//! Playback groups.

use serde::{Deserialize, Serialize};

use crate::constants::{limits, playback};
use crate::types::{sanitize_id, GroupId, ItemId, PlaybackMode};

/// An ordered or shuffled container that cycles its member items on a timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Unique id.
    pub id: GroupId,
    /// Display title.
    pub title: String,
    /// Ordering key; ties are broken by id.
    pub order: i64,
    /// Member item ids, in playback order for linear mode.
    pub members: Vec<ItemId>,
    /// Linear or shuffled traversal.
    pub mode: PlaybackMode,
    /// Start over after the last member.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Hide every other visible item while a member is shown.
    pub exclusive: bool,
    /// How long each member stays visible.
    pub visible_ms: u64,
    /// Gap between two members.
    pub interval_ms: u64,
    /// Highlight color for list views.
    pub color: String,
    /// Toggle shortcut in portable text form.
    pub hotkey: Option<String>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            id: GroupId::new(""),
            title: "Group".to_string(),
            order: 0,
            members: Vec::new(),
            mode: PlaybackMode::Linear,
            looping: false,
            exclusive: false,
            visible_ms: playback::DEFAULT_GROUP_VISIBLE_MS,
            interval_ms: playback::DEFAULT_GROUP_INTERVAL_MS,
            color: "#3B82F6".to_string(),
            hotkey: None,
        }
    }
}

impl Group {
    /// A new group with defaults.
    pub fn new_default(id: GroupId, order: i64) -> Self {
        Self {
            title: format!("Group {}", order + 1),
            id,
            order,
            ..Self::default()
        }
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.members.iter().any(|m| m == id)
    }

    /// Sanitize ids, drop duplicate members and enforce the minimum step.
    pub fn normalize(&mut self) {
        self.id = GroupId::new(sanitize_id(self.id.as_str()));
        let mut seen = std::collections::HashSet::new();
        self.members.retain(|m| !m.as_str().is_empty() && seen.insert(m.clone()));
        self.visible_ms = self.visible_ms.max(limits::MIN_GROUP_VISIBLE_MS);
        if self.hotkey.as_deref().is_some_and(|h| h.trim().is_empty()) {
            self.hotkey = None;
        }
    }
}
