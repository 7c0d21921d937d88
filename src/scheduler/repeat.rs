//! Per-item auto-repeat.
//!
//! An item with `repeat_every_sec > 0` is shown every `repeat_every_sec`
//! seconds and hidden again after `repeat_visible_sec` (or the default).
//! Items belonging to a running group are exempt; the exemption is checked on
//! every tick and drops the item's timer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::playback;
use crate::model::Item;
use crate::types::ItemId;

use super::VisibilityControl;

#[derive(Debug, Clone, Copy)]
struct RepeatTimer {
    every: Duration,
    next_show: Instant,
    hide_at: Option<Instant>,
}

/// Tick-driven evaluator of item repeat timers.
#[derive(Debug, Default)]
pub struct RepeatEvaluator {
    timers: HashMap<ItemId, RepeatTimer>,
}

fn visible_for(item: &Item) -> Duration {
    let secs = if item.repeat_visible_sec == 0 {
        playback::DEFAULT_REPEAT_VISIBLE_SECS
    } else {
        u64::from(item.repeat_visible_sec)
    };
    Duration::from_secs(secs)
}

impl RepeatEvaluator {
    /// Evaluator with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` currently has an armed timer.
    pub fn is_armed(&self, id: &ItemId) -> bool {
        self.timers.contains_key(id)
    }

    /// Forget the timer of `id`, e.g. after a manual toggle.
    pub fn reset(&mut self, id: &ItemId) {
        self.timers.remove(id);
    }

    /// Evaluate every item at `now`. `exempt` reports items owned by a running group.
    pub fn tick(
        &mut self,
        now: Instant,
        items: &[Item],
        exempt: impl Fn(&ItemId) -> bool,
        vis: &mut impl VisibilityControl,
    ) {
        self.timers.retain(|id, _| {
            items.iter().any(|i| &i.id == id && i.repeat_every_sec > 0) && !exempt(id)
        });

        for item in items {
            if item.repeat_every_sec == 0 || exempt(&item.id) {
                continue;
            }
            let every = Duration::from_secs(u64::from(item.repeat_every_sec));
            let timer = self
                .timers
                .entry(item.id.clone())
                .and_modify(|t| {
                    if t.every != every {
                        *t = RepeatTimer { every, next_show: now + every, hide_at: None };
                    }
                })
                .or_insert(RepeatTimer { every, next_show: now + every, hide_at: None });

            if timer.hide_at.is_some_and(|at| now >= at) {
                timer.hide_at = None;
                if let Err(e) = vis.set_visible(&item.id, false) {
                    tracing::warn!(id = %item.id, "Auto-hide failed: {e}");
                }
            }

            if now >= timer.next_show {
                timer.next_show = now + every;
                if vis.is_visible(&item.id) {
                    continue;
                }
                match vis.set_visible(&item.id, true) {
                    Ok(()) => {
                        tracing::debug!(id = %item.id, "Auto-repeat show");
                        timer.hide_at = Some(now + visible_for(item));
                    }
                    Err(e) => tracing::warn!(id = %item.id, "Auto-repeat show failed: {e}"),
                }
            }
        }
    }
}
