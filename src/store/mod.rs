//! Item/Group store.
//!
//! Authoritative in-memory model of overlay items, playback groups and the
//! visible set, persisted to a state document and a separate visibility list
//! inside the output directory.
//!
//! All mutation entry points are expected to run on a single logical
//! timeline; the store itself is not shared across threads.

pub mod media;
pub mod persist;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::constants::files;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::model::{Group, Item, MediaSlot, StateDocument, StateDocumentRef};
use crate::types::{ChangeReason, GroupId, ItemId};

/// What a successful mutation reports on the bus.
struct Change<T> {
    value: T,
    id: String,
    id2: Option<String>,
}

impl<T> Change<T> {
    fn new(value: T, id: impl Into<String>) -> Self {
        Self { value, id: id.into(), id2: None }
    }

    fn with_partner(mut self, id2: impl Into<String>) -> Self {
        self.id2 = Some(id2.into());
        self
    }
}

/// In-memory items, groups and visible set with disk persistence.
#[derive(Debug)]
pub struct Store {
    bus: EventBus,
    root: Option<PathBuf>,
    items: Vec<Item>,
    groups: Vec<Group>,
    visible: BTreeSet<ItemId>,
    rebuild_requested: bool,
}

impl Store {
    /// Create an empty store. Nothing is read until [`Store::load`].
    pub fn new(bus: EventBus, root: Option<PathBuf>) -> Self {
        Self {
            bus,
            root,
            items: Vec::new(),
            groups: Vec::new(),
            visible: BTreeSet::new(),
            rebuild_requested: false,
        }
    }

    /// Output directory, if configured.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Point the store at another output directory. Call [`Store::reload`] afterwards.
    pub fn set_root(&mut self, root: Option<PathBuf>) {
        tracing::info!(root = ?root, "Output directory changed");
        self.root = root;
    }

    /// Absolute path of the state document.
    pub fn state_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(files::STATE_FILE))
    }

    /// Absolute path of the visibility list.
    pub fn visible_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(files::VISIBLE_FILE))
    }

    fn require_root(&self) -> Result<PathBuf> {
        self.root.clone().ok_or_else(Error::no_output_dir)
    }

    /// Items in sort order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Groups in sort order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Look up an item.
    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|i| &i.id == id)
    }

    /// Look up a group.
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// The group owning `id`, if any.
    pub fn group_of(&self, id: &ItemId) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(id))
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a bundle rebuild was requested since the last call; clears the flag.
    pub fn take_rebuild_request(&mut self) -> bool {
        std::mem::take(&mut self.rebuild_requested)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Read the state document.
    ///
    /// A missing document yields an empty store. A malformed one resets the
    /// store to empty, logs a warning and returns `false`.
    pub fn load(&mut self) -> bool {
        let Some(path) = self.state_path() else {
            return false;
        };

        let ok = match persist::read_state(&path) {
            Ok(Some(doc)) => {
                let (items, groups) = normalize_document(doc);
                self.items = items;
                self.groups = groups;
                true
            }
            Ok(None) => {
                self.items.clear();
                self.groups.clear();
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "State document unreadable, starting empty: {e}");
                self.items.clear();
                self.groups.clear();
                false
            }
        };

        self.retain_known_visible();
        tracing::info!(path = %path.display(), items = self.items.len(), groups = self.groups.len(), "Loaded state");
        ok
    }

    /// Read the visibility list, keeping only ids that resolve to an item.
    pub fn load_visible(&mut self) {
        let Some(path) = self.visible_path() else {
            return;
        };
        self.visible = persist::read_visible(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "Visibility list unreadable, starting hidden: {e}");
            BTreeSet::new()
        });
        self.retain_known_visible();
    }

    /// Reload everything from disk and notify observers.
    pub fn reload(&mut self) -> bool {
        let ok = self.load();
        self.load_visible();
        self.rebuild_requested = true;

        let count = self.items.len();
        self.bus.publish(&Event::ListChanged {
            reason: ChangeReason::Reload,
            id: String::new(),
            id2: None,
            count,
        });
        self.bus.publish(&Event::Reloaded { ok, count });
        ok
    }

    /// Write the state document.
    pub fn save(&self) -> Result<()> {
        let root = self.require_root()?;
        let path = root.join(files::STATE_FILE);
        persist::write_state(&path, &StateDocumentRef::new(&self.items, &self.groups))?;
        tracing::debug!(path = %path.display(), "Saved state");
        Ok(())
    }

    /// Write the visibility list.
    pub fn save_visible(&self) -> Result<()> {
        let root = self.require_root()?;
        persist::write_visible(&root.join(files::VISIBLE_FILE), &self.visible)
    }

    /// Create the output directory, state document and visibility list if missing.
    ///
    /// A freshly created state document is seeded with one default item.
    /// Returns whether anything was written.
    pub fn ensure_files(&mut self) -> Result<bool> {
        let root = self.require_root()?;
        fs_err::create_dir_all(&root).map_err(|e| Error::io(e, root.clone()))?;

        let mut wrote = false;
        if !root.join(files::STATE_FILE).exists() {
            if self.items.is_empty() {
                let id = self.next_item_id();
                self.items.push(Item::new_default(id, 0));
            }
            self.save()?;
            wrote = true;
        }
        if !root.join(files::VISIBLE_FILE).exists() {
            self.save_visible()?;
            wrote = true;
        }
        Ok(wrote)
    }

    /// Pick up edits made on disk since the last load. Unreadable documents
    /// keep the in-memory state.
    fn merge_from_disk(&mut self) {
        let Some(path) = self.state_path() else {
            return;
        };
        match persist::read_state(&path) {
            Ok(Some(doc)) => {
                let (items, groups) = normalize_document(doc);
                self.items = items;
                self.groups = groups;
                self.retain_known_visible();
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), "Skipping merge from disk: {e}"),
        }
    }

    /// Run one structural mutation: ensure files, merge disk edits, mutate,
    /// re-sort, persist, request a rebuild and publish `ListChanged`.
    ///
    /// On any failure the previous in-memory state is restored.
    fn transact<T>(
        &mut self,
        reason: ChangeReason,
        mutate: impl FnOnce(&mut Self, &Path) -> Result<Change<T>>,
    ) -> Result<T> {
        let root = self.require_root()?;
        self.ensure_files()?;
        self.merge_from_disk();

        let snapshot = (self.items.clone(), self.groups.clone(), self.visible.clone());
        let restore = |store: &mut Self| {
            let (items, groups, visible) = snapshot;
            store.items = items;
            store.groups = groups;
            store.visible = visible;
        };

        let change = match mutate(self, &root) {
            Ok(change) => change,
            Err(e) => {
                restore(self);
                return Err(e);
            }
        };

        sort_by_order(&mut self.items, |i| (i.order, i.id.as_str()));
        sort_by_order(&mut self.groups, |g| (g.order, g.id.as_str()));
        enforce_group_timing(&mut self.items, &self.groups);

        if let Err(e) = self.save() {
            tracing::error!("Failed to persist {reason:?}: {e}");
            restore(self);
            return Err(e);
        }
        if let Err(e) = self.save_visible() {
            tracing::warn!("Failed to persist visibility after {reason:?}: {e}");
        }

        self.rebuild_requested = true;
        self.bus.publish(&Event::ListChanged {
            reason,
            id: change.id,
            id2: change.id2,
            count: self.items.len(),
        });
        Ok(change.value)
    }

    // ------------------------------------------------------------------
    // Item CRUD
    // ------------------------------------------------------------------

    fn index_of(&self, id: &ItemId) -> Result<usize> {
        self.items
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| Error::UnknownItem(id.to_string()))
    }

    fn next_item_id(&self) -> ItemId {
        (self.items.len() + 1..)
            .map(|n| ItemId::new(format!("lower-third-{n}")))
            .find(|candidate| self.item(candidate).is_none())
            .unwrap_or_else(|| ItemId::sanitized(""))
    }

    fn renumber(&mut self) {
        for (order, item) in (0_i64..).zip(self.items.iter_mut()) {
            item.order = order;
        }
    }

    /// Append a new item with default content.
    pub fn add_default(&mut self) -> Result<ItemId> {
        self.transact(ChangeReason::Create, |store, _| {
            let id = store.next_item_id();
            let order = store.items.iter().map(|i| i.order).max().map_or(0, |m| m + 1);
            store.items.push(Item::new_default(id.clone(), order));
            tracing::info!(id = %id, "Created lower third");
            Ok(Change::new(id.clone(), id.to_string()))
        })
    }

    /// Deep-copy an item right after the original, duplicating its media files.
    pub fn clone_item(&mut self, id: &ItemId) -> Result<ItemId> {
        self.transact(ChangeReason::Clone, |store, root| {
            let idx = store.index_of(id)?;
            let new_id = store.next_item_id();

            let mut copy = store.items[idx].clone();
            copy.id = new_id.clone();
            copy.label = format!("{} (Copy)", copy.label);
            for file in [&mut copy.profile_picture, &mut copy.anim_in_sound, &mut copy.anim_out_sound] {
                *file = file.take().and_then(|f| media::duplicate(root, &f, &new_id));
            }

            store.items.insert(idx + 1, copy);
            store.renumber();
            tracing::info!(id = %new_id, source = %id, "Cloned lower third");
            Ok(Change::new(new_id.clone(), new_id.to_string()).with_partner(id.to_string()))
        })
    }

    /// Delete an item, its owned media files, its group membership and visibility.
    pub fn remove_item(&mut self, id: &ItemId) -> Result<()> {
        let owned: Vec<String> = self.transact(ChangeReason::Delete, |store, _| {
            let idx = store.index_of(id)?;
            let item = store.items.remove(idx);
            for group in &mut store.groups {
                group.members.retain(|m| m != id);
            }
            store.visible.remove(id);
            tracing::info!(id = %id, "Removed lower third");
            let owned = store.unreferenced(item.owned_files().map(str::to_string).collect());
            Ok(Change::new(owned, id.to_string()))
        })?;

        self.remove_media(&owned);
        Ok(())
    }

    /// The subset of `files` no item references any more.
    fn unreferenced(&self, files: Vec<String>) -> Vec<String> {
        files
            .into_iter()
            .filter(|f| !self.items.iter().any(|i| i.owned_files().any(|o| o == f)))
            .collect()
    }

    fn remove_media(&self, files: &[String]) {
        if let Some(root) = self.root.as_deref() {
            for file in files {
                media::remove(root, file);
            }
        }
    }

    /// Move an item `delta` places in the sort order (clamped to the list bounds).
    pub fn move_item(&mut self, id: &ItemId, delta: i64) -> Result<()> {
        self.transact(ChangeReason::Update, |store, _| {
            let idx = store.index_of(id)?;
            let last = i64::try_from(store.items.len().saturating_sub(1)).unwrap_or(i64::MAX);
            let current = i64::try_from(idx).unwrap_or(i64::MAX);
            let target = usize::try_from(current.saturating_add(delta).clamp(0, last)).unwrap_or(idx);

            let partner = store.items[target].id.to_string();
            let item = store.items.remove(idx);
            store.items.insert(target, item);
            store.renumber();
            Ok(Change::new((), id.to_string()).with_partner(partner))
        })
    }

    /// Edit an item in place. The id cannot be changed this way.
    ///
    /// Media files the edit stops referencing are deleted once the change is saved.
    pub fn update_item(&mut self, id: &ItemId, edit: impl FnOnce(&mut Item)) -> Result<()> {
        let released = self.transact(ChangeReason::Update, |store, _| {
            let idx = store.index_of(id)?;
            let before: Vec<String> = store.items[idx].owned_files().map(str::to_string).collect();
            let item = &mut store.items[idx];
            edit(item);
            item.id = id.clone();
            item.normalize();
            Ok(Change::new(store.unreferenced(before), id.to_string()))
        })?;

        self.remove_media(&released);
        Ok(())
    }

    /// Copy `source` into the output directory as the file owned by `slot`,
    /// or clear the slot when `source` is `None`. The previously owned file is
    /// deleted once the change is saved.
    ///
    /// Returns the new filename.
    pub fn set_media(&mut self, id: &ItemId, slot: MediaSlot, source: Option<&Path>) -> Result<Option<String>> {
        let root = self.require_root()?;
        self.index_of(id)?;
        let imported = source.map(|src| media::import(&root, src, id)).transpose()?;

        let result = self.transact(ChangeReason::Update, |store, _| {
            let idx = store.index_of(id)?;
            let previous = std::mem::replace(store.items[idx].media_mut(slot), imported.clone());
            tracing::info!(id = %id, ?slot, file = ?imported, "Replaced media");
            Ok(Change::new(store.unreferenced(previous.into_iter().collect()), id.to_string()))
        });

        match result {
            Ok(released) => {
                self.remove_media(&released);
                Ok(imported)
            }
            Err(e) => {
                if let Some(name) = &imported {
                    media::remove(&root, name);
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Group CRUD
    // ------------------------------------------------------------------

    fn group_index(&self, id: &GroupId) -> Result<usize> {
        self.groups
            .iter()
            .position(|g| &g.id == id)
            .ok_or_else(|| Error::UnknownGroup(id.to_string()))
    }

    fn next_group_id(&self) -> GroupId {
        (self.groups.len() + 1..)
            .map(|n| GroupId::new(format!("group-{n}")))
            .find(|candidate| self.group(candidate).is_none())
            .unwrap_or_else(|| GroupId::sanitized(""))
    }

    /// Append a new empty group.
    pub fn add_group(&mut self) -> Result<GroupId> {
        self.transact(ChangeReason::Create, |store, _| {
            let id = store.next_group_id();
            let order = store.groups.iter().map(|g| g.order).max().map_or(0, |m| m + 1);
            store.groups.push(Group::new_default(id.clone(), order));
            Ok(Change::new(id.clone(), id.to_string()))
        })
    }

    /// Edit a group in place.
    ///
    /// Members must exist and must not already belong to another group.
    pub fn update_group(&mut self, id: &GroupId, edit: impl FnOnce(&mut Group)) -> Result<()> {
        self.transact(ChangeReason::Update, |store, _| {
            let idx = store.group_index(id)?;
            let mut group = store.groups[idx].clone();
            edit(&mut group);
            group.id = id.clone();
            group.normalize();

            for member in &group.members {
                if store.item(member).is_none() {
                    return Err(Error::UnknownItem(member.to_string()));
                }
                if let Some(owner) = store.groups.iter().find(|g| &g.id != id && g.contains(member)) {
                    return Err(Error::Conflict(format!(
                        "{member} already belongs to group {}",
                        owner.id
                    )));
                }
            }

            store.groups[idx] = group;
            Ok(Change::new((), id.to_string()))
        })
    }

    /// Replace a group's member list.
    pub fn set_group_members(&mut self, id: &GroupId, members: Vec<ItemId>) -> Result<()> {
        self.update_group(id, |g| g.members = members)
    }

    /// Delete a group. Member items are kept.
    pub fn remove_group(&mut self, id: &GroupId) -> Result<()> {
        self.transact(ChangeReason::Delete, |store, _| {
            let idx = store.group_index(id)?;
            store.groups.remove(idx);
            Ok(Change::new((), id.to_string()))
        })
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    fn retain_known_visible(&mut self) {
        let known: HashSet<&ItemId> = self.items.iter().map(|i| &i.id).collect();
        self.visible.retain(|id| known.contains(id));
    }

    /// Whether `id` is currently flagged visible.
    pub fn is_visible(&self, id: &ItemId) -> bool {
        self.visible.contains(id)
    }

    /// Sorted snapshot of the visible set.
    pub fn visible_ids(&self) -> Vec<ItemId> {
        self.visible.iter().cloned().collect()
    }

    /// Change visibility in memory only: no disk write, no notification.
    /// Returns whether anything changed.
    pub fn set_visible_silent(&mut self, id: &ItemId, visible: bool) -> bool {
        if visible {
            self.visible.insert(id.clone())
        } else {
            self.visible.remove(id)
        }
    }

    /// Change visibility, persist the visibility list and publish `VisibilityChanged`.
    ///
    /// Setting the current state again succeeds without writing or notifying.
    pub fn set_visible(&mut self, id: &ItemId, visible: bool) -> Result<()> {
        if self.root.is_none() {
            return Err(Error::no_output_dir());
        }
        if self.item(id).is_none() {
            return Err(Error::UnknownItem(id.to_string()));
        }
        if self.is_visible(id) == visible {
            return Ok(());
        }

        self.set_visible_silent(id, visible);
        if let Err(e) = self.save_visible() {
            self.set_visible_silent(id, !visible);
            return Err(e);
        }

        tracing::debug!(id = %id, visible, "Visibility changed");
        self.bus.publish(&Event::VisibilityChanged {
            id: id.clone(),
            visible,
            visible_ids: self.visible_ids(),
        });
        Ok(())
    }

    /// Flip visibility of one item; returns the new state.
    pub fn toggle_visible(&mut self, id: &ItemId) -> Result<bool> {
        let target = !self.is_visible(id);
        self.set_visible(id, target)?;
        Ok(target)
    }

    /// Show exactly `id` (hiding every other item), or hide everything for `None`.
    pub fn set_active_exact(&mut self, id: Option<&ItemId>) -> Result<()> {
        if let Some(id) = id {
            if self.item(id).is_none() {
                return Err(Error::UnknownItem(id.to_string()));
            }
        }
        for other in self.visible_ids() {
            if Some(&other) != id {
                self.set_visible(&other, false)?;
            }
        }
        if let Some(id) = id {
            self.set_visible(id, true)?;
        }
        Ok(())
    }
}

fn sort_by_order<T>(list: &mut [T], key: impl Fn(&T) -> (i64, &str)) {
    list.sort_by(|a, b| key(a).cmp(&key(b)));
}

/// Items belonging to a group never run their own repeat timers.
fn enforce_group_timing(items: &mut [Item], groups: &[Group]) {
    for item in items.iter_mut() {
        if groups.iter().any(|g| g.contains(&item.id)) {
            item.repeat_every_sec = 0;
            item.repeat_visible_sec = 0;
        }
    }
}

/// Resolve a raw document into sorted, invariant-respecting collections.
fn normalize_document(doc: StateDocument) -> (Vec<Item>, Vec<Group>) {
    let mut seen = HashSet::new();
    let mut items: Vec<Item> = Vec::with_capacity(doc.items.len());
    for (idx, record) in doc.items.into_iter().enumerate() {
        let fallback = i64::try_from(idx).unwrap_or(i64::MAX);
        match record.into_item(fallback) {
            Some(item) if seen.insert(item.id.clone()) => items.push(item),
            Some(item) => tracing::warn!(id = %item.id, "Dropping duplicate item id"),
            None => tracing::warn!("Dropping item without a usable id"),
        }
    }
    sort_by_order(&mut items, |i| (i.order, i.id.as_str()));

    let mut group_ids = HashSet::new();
    let mut groups: Vec<Group> = doc
        .groups
        .into_iter()
        .filter_map(|mut g| {
            g.normalize();
            (!g.id.as_str().is_empty() && group_ids.insert(g.id.clone())).then_some(g)
        })
        .collect();
    sort_by_order(&mut groups, |g| (g.order, g.id.as_str()));

    // A member listed by several groups stays with the last one in sort order.
    let mut claimed: HashSet<ItemId> = HashSet::new();
    for group in groups.iter_mut().rev() {
        group.members.retain(|m| {
            if !seen.contains(m) {
                return false;
            }
            if claimed.insert(m.clone()) {
                true
            } else {
                tracing::warn!(id = %m, group = %group.id, "Item already claimed by a later group");
                false
            }
        });
    }

    enforce_group_timing(&mut items, &groups);
    (items, groups)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn store_in(dir: &Path) -> Store {
        let mut store = Store::new(EventBus::new(), Some(dir.to_path_buf()));
        store.ensure_files().unwrap();
        store
    }

    #[test]
    fn ensure_files_seeds_one_default_item() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.len(), 1);
        assert!(dir.path().join(files::STATE_FILE).exists());
        assert!(dir.path().join(files::VISIBLE_FILE).exists());
    }

    #[test]
    fn ids_stay_unique_across_crud() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        let a = store.add_default().unwrap();
        let b = store.clone_item(&a).unwrap();
        store.remove_item(&a).unwrap();
        let c = store.add_default().unwrap();
        let _d = store.clone_item(&b).unwrap();
        let _e = store.clone_item(&c).unwrap();

        let ids: HashSet<&ItemId> = store.items().iter().map(|i| &i.id).collect();
        assert_eq!(ids.len(), store.len());
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn operations_without_root_fail() {
        let mut store = Store::new(EventBus::new(), None);
        assert!(matches!(store.add_default(), Err(Error::Config { .. })));
        assert!(matches!(
            store.set_visible(&ItemId::new("x"), true),
            Err(Error::Config { .. })
        ));
        assert!(store.items().is_empty());
    }

    #[test]
    fn unknown_id_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let before = store.items().to_vec();

        assert!(matches!(store.clone_item(&ItemId::new("ghost")), Err(Error::UnknownItem(_))));
        assert!(matches!(store.move_item(&ItemId::new("ghost"), 1), Err(Error::UnknownItem(_))));
        assert!(matches!(store.set_visible(&ItemId::new("ghost"), true), Err(Error::UnknownItem(_))));
        assert_eq!(store.items(), before.as_slice());
    }

    #[test]
    fn set_visible_is_idempotent_and_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let mut store = Store::new(bus.clone(), Some(dir.path().to_path_buf()));
        store.ensure_files().unwrap();
        let id = store.items()[0].id.clone();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = bus.subscribe(move |e: &Event| sink.lock().push(e.clone()));

        store.set_visible(&id, true).unwrap();
        store.set_visible(&id, true).unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            Event::VisibilityChanged { id: id.clone(), visible: true, visible_ids: vec![id] }
        );
    }

    #[test]
    fn visibility_survives_reload_until_item_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.add_default().unwrap();
        store.set_visible(&id, true).unwrap();

        let mut reopened = Store::new(EventBus::new(), Some(dir.path().to_path_buf()));
        assert!(reopened.reload());
        assert!(reopened.is_visible(&id));

        reopened.remove_item(&id).unwrap();
        let mut third = Store::new(EventBus::new(), Some(dir.path().to_path_buf()));
        third.reload();
        assert!(!third.is_visible(&id));
        assert!(third.item(&id).is_none());
    }

    #[test]
    fn move_order_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add_default().unwrap();
        store.add_default().unwrap();
        let first = store.items()[0].id.clone();

        store.move_item(&first, 1).unwrap();
        let order: Vec<ItemId> = store.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(order[1], first);

        let mut reopened = Store::new(EventBus::new(), Some(dir.path().to_path_buf()));
        reopened.load();
        let reloaded: Vec<ItemId> = reopened.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(reloaded, order);
    }

    #[test]
    fn move_clamps_at_list_edges() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add_default().unwrap();
        let last = store.items()[1].id.clone();

        store.move_item(&last, 10).unwrap();
        assert_eq!(store.items()[1].id, last);
        store.move_item(&last, -10).unwrap();
        assert_eq!(store.items()[0].id, last);
    }

    #[test]
    fn clone_duplicates_owned_avatar() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        std::fs::write(dir.path().join("pic.png"), b"avatar").unwrap();
        store.update_item(&id, |i| i.profile_picture = Some("pic.png".into())).unwrap();

        let copy = store.clone_item(&id).unwrap();
        let copied = store.item(&copy).unwrap().profile_picture.clone().unwrap();

        assert_ne!(copied, "pic.png");
        assert_eq!(std::fs::read(dir.path().join("pic.png")).unwrap(), b"avatar");
        assert_eq!(std::fs::read(dir.path().join(&copied)).unwrap(), b"avatar");
        assert_eq!(store.items()[1].id, copy);
    }

    #[test]
    fn clone_clears_reference_when_copy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        store.update_item(&id, |i| i.anim_in_sound = Some("missing.mp3".into())).unwrap();

        let copy = store.clone_item(&id).unwrap();
        assert!(store.item(&copy).unwrap().anim_in_sound.is_none());
        assert_eq!(store.item(&id).unwrap().anim_in_sound.as_deref(), Some("missing.mp3"));
    }

    #[test]
    fn remove_purges_media_groups_and_visibility() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        std::fs::write(dir.path().join("in.mp3"), b"snd").unwrap();
        store.update_item(&id, |i| i.anim_in_sound = Some("in.mp3".into())).unwrap();
        let group = store.add_group().unwrap();
        store.set_group_members(&group, vec![id.clone()]).unwrap();
        store.set_visible(&id, true).unwrap();

        store.remove_item(&id).unwrap();

        assert!(!dir.path().join("in.mp3").exists());
        assert!(store.group(&group).unwrap().members.is_empty());
        assert!(store.visible_ids().is_empty());
    }

    #[test]
    fn remove_never_touches_files_outside_the_output_dir() {
        let outside = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim.png");
        std::fs::write(&victim, b"keep").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();

        store
            .update_item(&id, |i| i.profile_picture = Some(victim.display().to_string()))
            .unwrap();
        assert_eq!(store.item(&id).unwrap().profile_picture, None);
        store.remove_item(&id).unwrap();

        assert!(victim.exists());
    }

    #[test]
    fn replacing_media_in_an_edit_deletes_the_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        std::fs::write(dir.path().join("old.png"), b"old").unwrap();
        std::fs::write(dir.path().join("new.png"), b"new").unwrap();
        store.update_item(&id, |i| i.profile_picture = Some("old.png".into())).unwrap();

        store.update_item(&id, |i| i.profile_picture = Some("new.png".into())).unwrap();

        assert!(!dir.path().join("old.png").exists());
        assert!(dir.path().join("new.png").exists());
    }

    #[test]
    fn set_media_imports_a_copy_and_drops_the_previous_one() {
        let outside = tempfile::tempdir().unwrap();
        let picked = outside.path().join("face.png");
        std::fs::write(&picked, b"face").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();

        let first = store.set_media(&id, MediaSlot::Avatar, Some(&picked)).unwrap().unwrap();
        let second = store.set_media(&id, MediaSlot::Avatar, Some(&picked)).unwrap().unwrap();

        assert_ne!(first, second);
        assert!(!dir.path().join(&first).exists());
        assert_eq!(std::fs::read(dir.path().join(&second)).unwrap(), b"face");
        assert_eq!(store.item(&id).unwrap().media(MediaSlot::Avatar), Some(second.as_str()));
        assert!(picked.exists());

        assert_eq!(store.set_media(&id, MediaSlot::Avatar, None).unwrap(), None);
        assert!(!dir.path().join(&second).exists());
    }

    #[test]
    fn set_media_on_unknown_item_copies_nothing() {
        let outside = tempfile::tempdir().unwrap();
        let picked = outside.path().join("face.png");
        std::fs::write(&picked, b"face").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let before = std::fs::read_dir(dir.path()).unwrap().count();

        let err = store.set_media(&ItemId::new("ghost"), MediaSlot::SoundIn, Some(&picked)).unwrap_err();

        assert!(matches!(err, Error::UnknownItem(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), before);
    }

    #[test]
    fn runtime_group_claim_conflict_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        let g1 = store.add_group().unwrap();
        let g2 = store.add_group().unwrap();

        store.set_group_members(&g1, vec![id.clone()]).unwrap();
        let err = store.set_group_members(&g2, vec![id.clone()]).unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        assert!(store.group(&g2).unwrap().members.is_empty());
        assert!(store.group(&g1).unwrap().contains(&id));
    }

    #[test]
    fn group_membership_zeroes_repeat_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        let id = store.items()[0].id.clone();
        store.update_item(&id, |i| i.repeat_every_sec = 10).unwrap();
        let group = store.add_group().unwrap();
        store.set_group_members(&group, vec![id.clone()]).unwrap();

        assert_eq!(store.item(&id).unwrap().repeat_every_sec, 0);
    }

    #[test]
    fn load_gives_contested_member_to_later_group() {
        let dir = tempfile::tempdir().unwrap();
        let doc = serde_json::json!({
            "schema_version": 2,
            "items": [
                { "id": "a", "order": 0, "repeat_every_sec": 30 },
                { "id": "b", "order": 1 }
            ],
            "groups": [
                { "id": "late", "order": 5, "members": ["a", "b"] },
                { "id": "early", "order": 1, "members": ["a", "ghost"] }
            ]
        });
        std::fs::write(dir.path().join(files::STATE_FILE), doc.to_string()).unwrap();

        let mut store = Store::new(EventBus::new(), Some(dir.path().to_path_buf()));
        assert!(store.load());

        let early = store.group(&GroupId::new("early")).unwrap();
        let late = store.group(&GroupId::new("late")).unwrap();
        assert!(early.members.is_empty());
        assert_eq!(late.members, vec![ItemId::new("a"), ItemId::new("b")]);
        assert_eq!(store.item(&ItemId::new("a")).unwrap().repeat_every_sec, 0);
    }

    #[test]
    fn malformed_state_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(files::STATE_FILE), "[oops").unwrap();
        std::fs::write(dir.path().join(files::VISIBLE_FILE), r#"["a"]"#).unwrap();

        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(move |e: &Event| sink.lock().push(e.clone()));

        let mut store = Store::new(bus, Some(dir.path().to_path_buf()));
        assert!(!store.reload());
        assert!(store.is_empty());
        assert!(store.visible_ids().is_empty());
        assert!(seen.lock().contains(&Event::Reloaded { ok: false, count: 0 }));
    }

    #[test]
    fn crud_merges_edits_made_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = store_in(dir.path());
        let mut b = Store::new(EventBus::new(), Some(dir.path().to_path_buf()));
        b.load();

        a.add_default().unwrap();
        b.add_default().unwrap();

        assert_eq!(b.len(), 3);
    }
}
