//! On-disk persistence helpers: atomic writes and lenient reads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{StateDocument, StateDocumentRef};
use crate::types::ItemId;

/// Sibling path used for write-then-rename.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to a temporary sibling, then rename it over `path`.
///
/// A crash between the two steps leaves a stray `.tmp` next to an unchanged
/// original.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs_err::write(&tmp, bytes).map_err(|e| Error::io(e, tmp.clone()))?;
    if let Err(e) = fs_err::rename(&tmp, path) {
        let _ = fs_err::remove_file(&tmp);
        return Err(Error::io(e, path.to_path_buf()));
    }
    Ok(())
}

/// Read the state document; `Ok(None)` when the file does not exist.
pub fn read_state(path: &Path) -> Result<Option<StateDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs_err::read_to_string(path).map_err(|e| Error::io(e, path.to_path_buf()))?;
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| Error::parse(e.to_string(), path.to_path_buf()))
}

/// Serialize and atomically write the state document.
pub fn write_state(path: &Path, doc: &StateDocumentRef<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| Error::Msg(format!("Failed to serialize state: {e}")))?;
    write_atomic(path, json.as_bytes())
}

/// Read the visible id list; `Ok(empty)` when the file does not exist.
pub fn read_visible(path: &Path) -> Result<BTreeSet<ItemId>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let data = fs_err::read_to_string(path).map_err(|e| Error::io(e, path.to_path_buf()))?;
    let ids: Vec<String> =
        serde_json::from_str(&data).map_err(|e| Error::parse(e.to_string(), path.to_path_buf()))?;
    Ok(ids.into_iter().map(ItemId::from).collect())
}

/// Atomically write the visible id list, sorted and deduplicated.
pub fn write_visible(path: &Path, ids: &BTreeSet<ItemId>) -> Result<()> {
    let list: Vec<&str> = ids.iter().map(ItemId::as_str).collect();
    let json = serde_json::to_string(&list)
        .map_err(|e| Error::Msg(format!("Failed to serialize visible ids: {e}")))?;
    write_atomic(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn visible_list_is_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visible.json");
        let ids: BTreeSet<ItemId> = ["b", "a", "b"].into_iter().map(ItemId::from).collect();

        write_visible(&path, &ids).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"["a","b"]"#);
        assert_eq!(read_visible(&path).unwrap(), ids);
    }

    #[test]
    fn malformed_state_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(read_state(&path), Err(Error::Parse { .. })));
        assert!(read_state(&dir.path().join("missing.json")).unwrap().is_none());
    }
}
