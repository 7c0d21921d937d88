//! Group playback.
//!
//! Each running group is a small state machine (`Showing` → `Hiding` →
//! `Showing` …) driven by [`Scheduler::advance`]. Timing is logical: every
//! transition is anchored to the previous deadline rather than to the moment
//! `advance` happened to be called, so a late tick never stretches a run.

pub mod repeat;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::constants::limits;
use crate::error::Result;
use crate::model::Group;
use crate::store::Store;
use crate::types::{GroupId, ItemId, PlaybackMode};

pub use repeat::RepeatEvaluator;

/// Visibility operations the scheduler drives.
pub trait VisibilityControl {
    /// Whether `id` is currently visible.
    fn is_visible(&self, id: &ItemId) -> bool;

    /// Persisting show/hide.
    fn set_visible(&mut self, id: &ItemId, visible: bool) -> Result<()>;

    /// Sorted snapshot of the visible set.
    fn visible_ids(&self) -> Vec<ItemId>;
}

impl VisibilityControl for Store {
    fn is_visible(&self, id: &ItemId) -> bool {
        Self::is_visible(self, id)
    }

    fn set_visible(&mut self, id: &ItemId, visible: bool) -> Result<()> {
        Self::set_visible(self, id, visible)
    }

    fn visible_ids(&self) -> Vec<ItemId> {
        Self::visible_ids(self)
    }
}

/// Externally observable state of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Not running.
    Idle,
    /// A member is on screen.
    Showing(ItemId),
    /// Between two members.
    Hiding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Showing,
    Hiding,
}

#[derive(Debug)]
struct GroupRun {
    generation: u64,
    sequence: Vec<ItemId>,
    position: usize,
    current: Option<ItemId>,
    phase: Phase,
    deadline: Instant,
    visible: Duration,
    interval: Duration,
    looping: bool,
    shuffled: bool,
    exclusive: bool,
}

fn apply(vis: &mut impl VisibilityControl, id: &ItemId, visible: bool) {
    if let Err(e) = vis.set_visible(id, visible) {
        tracing::warn!(id = %id, visible, "Scheduled visibility change failed: {e}");
    }
}

impl GroupRun {
    fn enter_showing(&mut self, at: Instant, vis: &mut impl VisibilityControl) {
        if let Some(previous) = self.current.take() {
            apply(vis, &previous, false);
        }
        let Some(member) = self.sequence.get(self.position).cloned() else {
            return;
        };
        if self.exclusive {
            for other in vis.visible_ids() {
                if other != member {
                    apply(vis, &other, false);
                }
            }
        }
        apply(vis, &member, true);
        self.current = Some(member);
        self.phase = Phase::Showing;
        self.deadline = at + self.visible;
    }

    /// Returns `false` when the run is exhausted.
    fn enter_hiding(&mut self, at: Instant, vis: &mut impl VisibilityControl, rng: &mut StdRng) -> bool {
        if let Some(current) = self.current.take() {
            apply(vis, &current, false);
        }
        self.position += 1;
        if self.position >= self.sequence.len() {
            if !self.looping {
                return false;
            }
            self.position = 0;
            if self.shuffled {
                self.sequence.shuffle(rng);
            }
        }
        self.phase = Phase::Hiding;
        self.deadline = at + self.interval;
        true
    }
}

/// Runs groups independently of each other.
#[derive(Debug)]
pub struct Scheduler {
    runs: BTreeMap<GroupId, GroupRun>,
    rng: StdRng,
    next_generation: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Scheduler with an entropy-seeded shuffle.
    pub fn new() -> Self {
        Self { runs: BTreeMap::new(), rng: StdRng::from_entropy(), next_generation: 0 }
    }

    /// Scheduler with a fixed shuffle seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { runs: BTreeMap::new(), rng: StdRng::seed_from_u64(seed), next_generation: 0 }
    }

    /// Start (or restart) `group` at `now`. Groups without members are left idle.
    ///
    /// Returns the run generation, or `None` when nothing started.
    pub fn start(&mut self, group: &Group, now: Instant, vis: &mut impl VisibilityControl) -> Option<u64> {
        self.stop(&group.id, vis);
        if group.members.is_empty() {
            tracing::info!(group = %group.id, "Group has no members, not starting");
            return None;
        }

        let mut sequence = group.members.clone();
        let shuffled = group.mode == PlaybackMode::Shuffled;
        if shuffled {
            sequence.shuffle(&mut self.rng);
        }

        self.next_generation += 1;
        let mut run = GroupRun {
            generation: self.next_generation,
            sequence,
            position: 0,
            current: None,
            phase: Phase::Showing,
            deadline: now,
            visible: Duration::from_millis(group.visible_ms.max(limits::MIN_GROUP_VISIBLE_MS)),
            interval: Duration::from_millis(group.interval_ms),
            looping: group.looping,
            shuffled,
            exclusive: group.exclusive,
        };
        run.enter_showing(now, vis);
        tracing::info!(group = %group.id, generation = run.generation, members = run.sequence.len(), "Group started");

        let generation = run.generation;
        self.runs.insert(group.id.clone(), run);
        Some(generation)
    }

    /// Stop `id`, hiding its current member. Returns whether it was running.
    pub fn stop(&mut self, id: &GroupId, vis: &mut impl VisibilityControl) -> bool {
        let Some(mut run) = self.runs.remove(id) else {
            return false;
        };
        if let Some(current) = run.current.take() {
            apply(vis, &current, false);
        }
        tracing::info!(group = %id, generation = run.generation, "Group stopped");
        true
    }

    /// Stop every running group.
    pub fn stop_all(&mut self, vis: &mut impl VisibilityControl) {
        for id in self.running_groups() {
            self.stop(&id, vis);
        }
    }

    /// Start an idle group or stop a running one. Returns whether it runs afterwards.
    pub fn toggle(&mut self, group: &Group, now: Instant, vis: &mut impl VisibilityControl) -> bool {
        if self.stop(&group.id, vis) {
            false
        } else {
            self.start(group, now, vis).is_some()
        }
    }

    /// Whether `id` is running.
    pub fn is_running(&self, id: &GroupId) -> bool {
        self.runs.contains_key(id)
    }

    /// Current state of `id`.
    pub fn state(&self, id: &GroupId) -> RunState {
        match self.runs.get(id) {
            None => RunState::Idle,
            Some(run) => match (&run.phase, &run.current) {
                (Phase::Showing, Some(member)) => RunState::Showing(member.clone()),
                _ => RunState::Hiding,
            },
        }
    }

    /// Generation of the active run of `id`.
    pub fn generation(&self, id: &GroupId) -> Option<u64> {
        self.runs.get(id).map(|r| r.generation)
    }

    /// Ids of running groups.
    pub fn running_groups(&self) -> Vec<GroupId> {
        self.runs.keys().cloned().collect()
    }

    /// The running group whose sequence contains `item`.
    pub fn running_group_of(&self, item: &ItemId) -> Option<GroupId> {
        self.runs
            .iter()
            .find(|(_, run)| run.sequence.contains(item))
            .map(|(id, _)| id.clone())
    }

    /// Earliest pending transition across all runs.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.runs.values().map(|r| r.deadline).min()
    }

    /// Perform every transition due at or before `now`.
    pub fn advance(&mut self, now: Instant, vis: &mut impl VisibilityControl) {
        for id in self.running_groups() {
            self.advance_run(&id, now, vis);
        }
    }

    /// Timer callback for one run. A callback from an earlier run of the same
    /// group (stale `generation`) does nothing.
    pub fn fire(
        &mut self,
        id: &GroupId,
        generation: u64,
        now: Instant,
        vis: &mut impl VisibilityControl,
    ) -> bool {
        if self.generation(id) != Some(generation) {
            tracing::debug!(group = %id, generation, "Ignoring stale group timer");
            return false;
        }
        self.advance_run(id, now, vis);
        true
    }

    fn advance_run(&mut self, id: &GroupId, now: Instant, vis: &mut impl VisibilityControl) {
        loop {
            let Some(run) = self.runs.get_mut(id) else {
                return;
            };
            if run.deadline > now {
                return;
            }
            let at = run.deadline;
            let running = match run.phase {
                Phase::Showing => run.enter_hiding(at, vis, &mut self.rng),
                Phase::Hiding => {
                    run.enter_showing(at, vis);
                    true
                }
            };
            if !running {
                self.runs.remove(id);
                tracing::info!(group = %id, "Group finished");
                return;
            }
        }
    }
}
