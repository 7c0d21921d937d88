//! Media files owned by a single item (avatar, sounds).
//!
//! Copy and cleanup failures are logged and absorbed; they never block the
//! owning operation. Only [`import`] of a user-picked file reports an error.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{is_plain_file_name, ItemId};

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

fn fresh_name(dir: &Path, owner: &ItemId, ext: &str) -> Option<String> {
    (0..8)
        .map(|_| {
            let tag = uuid::Uuid::new_v4().simple().to_string();
            format!("{owner}-{}{ext}", &tag[..8])
        })
        .find(|candidate| !dir.join(candidate).exists())
}

/// Copy `file` to a fresh unique name for `owner`.
///
/// Returns the new filename, or `None` when the copy failed. Callers clear the
/// reference on `None` instead of pointing two items at one file.
pub fn duplicate(dir: &Path, file: &str, owner: &ItemId) -> Option<String> {
    if !is_plain_file_name(file) {
        tracing::warn!(file, "Refusing to copy media outside the output directory");
        return None;
    }
    let src = dir.join(file);
    let name = fresh_name(dir, owner, &extension_of(Path::new(file)))?;

    let dst = dir.join(&name);
    match fs_err::copy(&src, &dst) {
        Ok(_) => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), "Copied owned media");
            Some(name)
        }
        Err(e) => {
            tracing::warn!(
                src = %src.display(),
                dst = %dst.display(),
                os_error = ?e.raw_os_error(),
                "Failed to copy owned media: {e}"
            );
            None
        }
    }
}

/// Copy an external file into `dir` under a fresh name owned by `owner`.
pub fn import(dir: &Path, source: &Path, owner: &ItemId) -> Result<String> {
    let name = fresh_name(dir, owner, &extension_of(source))
        .ok_or_else(|| Error::Msg(format!("No free media filename for {owner}")))?;
    let dst = dir.join(&name);
    fs_err::copy(source, &dst).map_err(|e| {
        tracing::warn!(
            src = %source.display(),
            dst = %dst.display(),
            os_error = ?e.raw_os_error(),
            "Failed to import media: {e}"
        );
        Error::io(e, dst.clone())
    })?;
    tracing::debug!(src = %source.display(), dst = %dst.display(), "Imported media");
    Ok(name)
}

/// Delete an owned file. Missing files are fine; names that would leave
/// `dir` are refused.
pub fn remove(dir: &Path, file: &str) {
    if !is_plain_file_name(file) {
        tracing::warn!(file, "Refusing to remove media outside the output directory");
        return;
    }
    let path = dir.join(file);
    if !path.exists() {
        return;
    }
    if let Err(e) = fs_err::remove_file(&path) {
        tracing::warn!(
            path = %path.display(),
            os_error = ?e.raw_os_error(),
            "Failed to remove owned media: {e}"
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn duplicate_creates_distinct_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.png"), b"png").unwrap();

        let copy = duplicate(dir.path(), "pic.png", &ItemId::new("lower-third-2")).unwrap();

        assert_ne!(copy, "pic.png");
        assert!(copy.starts_with("lower-third-2-"));
        assert!(copy.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&copy)).unwrap(), b"png");
        assert!(dir.path().join("pic.png").exists());
    }

    #[test]
    fn duplicate_of_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(duplicate(dir.path(), "gone.png", &ItemId::new("x")).is_none());
    }

    #[test]
    fn remove_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        remove(dir.path(), "a.mp3");
        remove(dir.path(), "a.mp3");
        assert!(!dir.path().join("a.mp3").exists());
    }

    #[test]
    fn paths_leaving_the_directory_are_left_alone() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let victim = outside.path().join("victim.png");
        std::fs::write(&victim, b"keep").unwrap();

        remove(dir.path(), victim.to_str().unwrap());
        assert!(duplicate(dir.path(), victim.to_str().unwrap(), &ItemId::new("x")).is_none());

        assert!(victim.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn import_copies_under_owner_name() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = outside.path().join("face.jpg");
        std::fs::write(&source, b"jpg").unwrap();

        let name = import(dir.path(), &source, &ItemId::new("lower-third-1")).unwrap();

        assert!(name.starts_with("lower-third-1-"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), b"jpg");
        assert!(source.exists());
    }

    #[test]
    fn import_of_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import(dir.path(), &dir.path().join("nope.png"), &ItemId::new("x")).is_err());
    }
}
