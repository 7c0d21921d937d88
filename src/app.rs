//! Application context.
//!
//! `App` owns the store, the group scheduler, the repeat evaluator and the
//! artifact writer, and enforces the rules that span them: manual actions
//! stop the group that owns the item, structural changes trigger a bundle
//! rebuild, and group members are exempt from their own repeat timers.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifacts::{self, ArtifactWriter, RebuildReport, RenderTarget, SwapOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::model::{Group, Item, MediaSlot};
use crate::scheduler::{RepeatEvaluator, Scheduler};
use crate::store::Store;
use crate::types::{GroupId, ItemId};

/// Explicit context object, constructed once at startup.
pub struct App {
    /// Loaded configuration.
    pub config: Config,
    /// Items, groups and the visible set.
    pub store: Store,
    /// Group playback.
    pub scheduler: Scheduler,
    repeat: RepeatEvaluator,
    writer: ArtifactWriter,
    target: Option<Box<dyn RenderTarget>>,
    bus: EventBus,
    /// Human-readable outcome of the last notable action.
    pub status_message: Option<String>,
    /// Outcome of the last bundle rebuild.
    pub last_report: Option<RebuildReport>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("root", &self.store.root())
            .field("items", &self.store.len())
            .field("running", &self.scheduler.running_groups())
            .field("has_target", &self.target.is_some())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Build the context from configuration with an entropy-seeded scheduler.
    pub fn new(config: Config) -> Self {
        Self::with_scheduler(config, Scheduler::new())
    }

    /// Build the context with a caller-supplied scheduler (seeded in tests).
    pub fn with_scheduler(config: Config, scheduler: Scheduler) -> Self {
        let bus = EventBus::new();
        let store = Store::new(bus.clone(), config.output_dir.clone());
        let writer = ArtifactWriter::new(config.render_width, config.render_height, config.retain_versions);
        Self {
            config,
            store,
            scheduler,
            repeat: RepeatEvaluator::new(),
            writer,
            target: None,
            bus,
            status_message: None,
            last_report: None,
        }
    }

    /// The bus every store change is published on.
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Attach (or detach) the renderer that displays the page.
    pub fn set_render_target(&mut self, target: Option<Box<dyn RenderTarget>>) {
        self.target = target;
    }

    fn root(&self) -> Result<PathBuf> {
        self.store.root().map(Path::to_path_buf).ok_or_else(Error::no_output_dir)
    }

    /// Load state from disk, create missing files and publish a fresh bundle.
    pub fn open(&mut self) -> Result<RebuildReport> {
        let root = self.root()?;
        artifacts::ensure_placeholders(&root)?;
        if !self.store.reload() {
            self.status_message = Some("State document unreadable, started empty".to_string());
        }
        self.store.ensure_files()?;
        self.store.take_rebuild_request();
        self.rebuild()
    }

    /// Switch to another output directory and open it.
    pub fn change_output_dir(&mut self, dir: PathBuf) -> Result<RebuildReport> {
        self.scheduler.stop_all(&mut self.store);
        self.store.set_root(Some(dir.clone()));
        self.config.output_dir = Some(dir);
        self.open()
    }

    /// Regenerate the bundle and swap the render target.
    pub fn rebuild(&mut self) -> Result<RebuildReport> {
        let root = self.root()?;
        let target = self.target.as_deref_mut().map(|t| t as &mut dyn RenderTarget);
        let report = self.writer.rebuild_and_swap(&root, self.store.items(), target)?;

        self.status_message = Some(match &report.outcome {
            SwapOutcome::Swapped => format!("Published {}", report.html_path.display()),
            SwapOutcome::NoTarget => format!("Wrote {} (no render target)", report.html_path.display()),
            SwapOutcome::WrongKind(kind) => format!("Wrote page; target kind '{kind}' not supported"),
        });
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Rebuild if the store asked for it. Failures are logged; the store
    /// change that triggered the rebuild is already persisted.
    pub fn apply_pending(&mut self) {
        if !self.store.take_rebuild_request() {
            return;
        }
        if let Err(e) = self.rebuild() {
            tracing::error!("Bundle rebuild failed: {e}");
            self.status_message = Some(format!("Rebuild failed: {e}"));
        }
    }

    /// Advance group runs and repeat timers to `now`, then apply pending rebuilds.
    pub fn tick(&mut self, now: Instant) {
        self.scheduler.advance(now, &mut self.store);

        let items: Vec<Item> = self.store.items().to_vec();
        let scheduler = &self.scheduler;
        self.repeat.tick(
            now,
            &items,
            |id| scheduler.running_group_of(id).is_some(),
            &mut self.store,
        );

        self.apply_pending();
    }

    /// Reload from disk. Running groups are stopped first.
    pub fn reload(&mut self) -> bool {
        self.scheduler.stop_all(&mut self.store);
        let ok = self.store.reload();
        self.apply_pending();
        ok
    }

    // ------------------------------------------------------------------
    // Manual visibility
    // ------------------------------------------------------------------

    fn yield_to_manual(&mut self, id: &ItemId) {
        if let Some(group) = self.scheduler.running_group_of(id) {
            tracing::info!(id = %id, group = %group, "Manual action stops running group");
            self.scheduler.stop(&group, &mut self.store);
        }
        self.repeat.reset(id);
    }

    /// Show or hide an item on user request.
    pub fn set_visible(&mut self, id: &ItemId, visible: bool) -> Result<()> {
        if self.store.item(id).is_none() {
            return Err(Error::UnknownItem(id.to_string()));
        }
        self.yield_to_manual(id);
        self.store.set_visible(id, visible)
    }

    /// Flip an item on user request; returns the new state.
    pub fn toggle_visible(&mut self, id: &ItemId) -> Result<bool> {
        if self.store.item(id).is_none() {
            return Err(Error::UnknownItem(id.to_string()));
        }
        let target = !self.store.is_visible(id);
        self.yield_to_manual(id);
        self.store.set_visible(id, target)?;
        Ok(target)
    }

    /// Show exactly one item (or none) on user request.
    pub fn set_active_exact(&mut self, id: Option<&ItemId>) -> Result<()> {
        let mut affected = self.store.visible_ids();
        if let Some(id) = id {
            if self.store.item(id).is_none() {
                return Err(Error::UnknownItem(id.to_string()));
            }
            affected.push(id.clone());
        }
        for item in &affected {
            self.yield_to_manual(item);
        }
        self.store.set_active_exact(id)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Create an item with default content.
    pub fn add_item(&mut self) -> Result<ItemId> {
        let id = self.store.add_default()?;
        self.apply_pending();
        Ok(id)
    }

    /// Duplicate an item.
    pub fn clone_item(&mut self, id: &ItemId) -> Result<ItemId> {
        let copy = self.store.clone_item(id)?;
        self.apply_pending();
        Ok(copy)
    }

    /// Delete an item, stopping the group run that uses it.
    pub fn remove_item(&mut self, id: &ItemId) -> Result<()> {
        if self.store.item(id).is_none() {
            return Err(Error::UnknownItem(id.to_string()));
        }
        self.yield_to_manual(id);
        self.store.remove_item(id)?;
        self.apply_pending();
        Ok(())
    }

    /// Move an item within the sort order.
    pub fn move_item(&mut self, id: &ItemId, delta: i64) -> Result<()> {
        self.store.move_item(id, delta)?;
        self.apply_pending();
        Ok(())
    }

    /// Edit an item.
    pub fn update_item(&mut self, id: &ItemId, edit: impl FnOnce(&mut Item)) -> Result<()> {
        self.store.update_item(id, edit)?;
        self.repeat.reset(id);
        self.apply_pending();
        Ok(())
    }

    /// Attach a picked file to an item's media slot, or clear the slot.
    pub fn set_media(&mut self, id: &ItemId, slot: MediaSlot, source: Option<&Path>) -> Result<Option<String>> {
        let name = self.store.set_media(id, slot, source)?;
        self.apply_pending();
        Ok(name)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    fn group(&self, id: &GroupId) -> Result<Group> {
        self.store.group(id).cloned().ok_or_else(|| Error::UnknownGroup(id.to_string()))
    }

    /// Create an empty group.
    pub fn add_group(&mut self) -> Result<GroupId> {
        let id = self.store.add_group()?;
        self.apply_pending();
        Ok(id)
    }

    /// Edit a group. A running group is stopped so the next start uses the new settings.
    pub fn update_group(&mut self, id: &GroupId, edit: impl FnOnce(&mut Group)) -> Result<()> {
        self.group(id)?;
        self.scheduler.stop(id, &mut self.store);
        self.store.update_group(id, edit)?;
        self.apply_pending();
        Ok(())
    }

    /// Replace a group's members.
    pub fn set_group_members(&mut self, id: &GroupId, members: Vec<ItemId>) -> Result<()> {
        self.update_group(id, |g| g.members = members)
    }

    /// Delete a group, stopping it first.
    pub fn remove_group(&mut self, id: &GroupId) -> Result<()> {
        self.group(id)?;
        self.scheduler.stop(id, &mut self.store);
        self.store.remove_group(id)?;
        self.apply_pending();
        Ok(())
    }

    /// Start a group at `now`. Returns whether it is running.
    pub fn start_group(&mut self, id: &GroupId, now: Instant) -> Result<bool> {
        let group = self.group(id)?;
        Ok(self.scheduler.start(&group, now, &mut self.store).is_some())
    }

    /// Stop a group. Returns whether it was running.
    pub fn stop_group(&mut self, id: &GroupId) -> Result<bool> {
        self.group(id)?;
        Ok(self.scheduler.stop(id, &mut self.store))
    }

    /// Start an idle group or stop a running one. Returns whether it runs afterwards.
    pub fn toggle_group(&mut self, id: &GroupId, now: Instant) -> Result<bool> {
        let group = self.group(id)?;
        Ok(self.scheduler.toggle(&group, now, &mut self.store))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::constants::files;
    use std::time::Duration;

    fn app_in(dir: &Path) -> App {
        let mut config = Config::default();
        config.output_dir = Some(dir.to_path_buf());
        let mut app = App::with_scheduler(config, Scheduler::with_seed(7));
        app.open().unwrap();
        app
    }

    #[test]
    fn open_writes_page_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path());

        let report = app.last_report.clone().unwrap();
        assert!(report.html_path.exists());
        assert_eq!(report.outcome, SwapOutcome::NoTarget);
        assert_eq!(app.store.len(), 1);
    }

    #[test]
    fn crud_rebuilds_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let before = app.last_report.clone().unwrap().version;

        let id = app.add_item().unwrap();
        let after = app.last_report.clone().unwrap();

        assert_ne!(before, after.version);
        let page = std::fs::read_to_string(after.html_path).unwrap();
        assert!(page.contains(&format!("<li id=\"{id}\"")));
    }

    #[test]
    fn manual_toggle_stops_owning_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let a = app.store.items()[0].id.clone();
        let b = app.add_item().unwrap();
        let g = app.add_group().unwrap();
        app.set_group_members(&g, vec![a.clone(), b]).unwrap();

        let t0 = Instant::now();
        assert!(app.start_group(&g, t0).unwrap());
        assert!(app.store.is_visible(&a));

        app.toggle_visible(&a).unwrap();
        assert!(!app.scheduler.is_running(&g));
        assert!(!app.store.is_visible(&a));

        app.tick(t0 + Duration::from_secs(60));
        assert!(app.store.visible_ids().is_empty());
    }

    #[test]
    fn removing_member_stops_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let a = app.store.items()[0].id.clone();
        let g = app.add_group().unwrap();
        app.set_group_members(&g, vec![a.clone()]).unwrap();
        app.start_group(&g, Instant::now()).unwrap();

        app.remove_item(&a).unwrap();
        assert!(!app.scheduler.is_running(&g));
        assert!(app.store.visible_ids().is_empty());
    }

    #[test]
    fn unknown_group_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_in(dir.path());
        let err = app.start_group(&GroupId::new("nope"), Instant::now()).unwrap_err();
        assert!(matches!(err, Error::UnknownGroup(_)));
    }

    #[test]
    fn changing_output_dir_opens_the_new_folder() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let mut app = app_in(first.path());
        app.add_item().unwrap();
        let g = app.add_group().unwrap();
        let id = app.store.items()[0].id.clone();
        app.set_group_members(&g, vec![id.clone()]).unwrap();
        app.start_group(&g, Instant::now()).unwrap();

        let report = app.change_output_dir(second.path().to_path_buf()).unwrap();

        assert!(!app.scheduler.is_running(&g));
        assert_eq!(app.store.root(), Some(second.path()));
        assert_eq!(app.config.output_dir.as_deref(), Some(second.path()));
        assert_eq!(app.store.len(), 1);
        assert!(report.html_path.starts_with(second.path()));
        assert!(second.path().join(files::STATE_FILE).exists());
        assert!(second.path().join(files::BUNDLE_CSS).exists());
    }

    #[test]
    fn set_media_rebuilds_with_the_new_avatar() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let picked = outside.path().join("face.png");
        std::fs::write(&picked, b"face").unwrap();
        let mut app = app_in(dir.path());
        let id = app.store.items()[0].id.clone();
        app.update_item(&id, |i| i.html_template = "<img src=\"{{PROFILE_PICTURE}}\">".into())
            .unwrap();

        let name = app.set_media(&id, MediaSlot::Avatar, Some(&picked)).unwrap().unwrap();

        let page = std::fs::read_to_string(&app.last_report.as_ref().unwrap().html_path).unwrap();
        assert!(page.contains(&name));
    }
}
