//! Data model: overlay items, playback groups and the state document.

pub mod group;
pub mod item;

pub use group::Group;
pub use item::{Item, ItemRecord, MediaSlot};

use serde::{Deserialize, Serialize};

use crate::constants::schema;

/// State document as read from disk.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateDocument {
    /// Schema version the document was written with.
    pub schema_version: u32,
    /// Item records, resolved leniently.
    pub items: Vec<ItemRecord>,
    /// Groups.
    pub groups: Vec<Group>,
}

/// State document as written to disk.
#[derive(Debug, Serialize)]
pub struct StateDocumentRef<'a> {
    /// Schema version.
    pub schema_version: u32,
    /// Items in sort order.
    pub items: &'a [Item],
    /// Groups in sort order.
    pub groups: &'a [Group],
}

impl<'a> StateDocumentRef<'a> {
    /// Borrow the current collections for serialization.
    pub const fn new(items: &'a [Item], groups: &'a [Group]) -> Self {
        Self { schema_version: schema::STATE_VERSION, items, groups }
    }
}
