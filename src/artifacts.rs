//! Artifact writer and render-target swap.
//!
//! CSS and script land under stable names; the HTML wrapper gets a versioned
//! name so a renderer holding the previous file open never blocks the write.

use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::constants::{files, render};
use crate::error::{Error, Result};
use crate::model::Item;
use crate::store::persist::write_atomic;

/// Settings pushed to a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Load a local file rather than a URL.
    pub local_file: bool,
    /// Absolute HTML path; empty to unload.
    pub path: String,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Route page audio through the host mixer.
    pub reroute_audio: bool,
}

impl RenderSettings {
    /// Local-file settings for `path` at the given size.
    pub fn local_file(path: impl Into<String>, width: u32, height: u32) -> Self {
        Self { local_file: true, path: path.into(), width, height, reroute_audio: true }
    }
}

/// External renderer that displays the generated page.
pub trait RenderTarget {
    /// Renderer kind identifier, e.g. `browser_source`.
    fn kind(&self) -> &str;

    /// Path the renderer currently shows, if any.
    fn current_path(&self) -> Option<String>;

    /// Push new settings.
    fn apply(&mut self, settings: &RenderSettings) -> Result<()>;

    /// Reload without cache.
    fn reload(&mut self) -> Result<()>;
}

/// What happened to the render target after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The target now shows the new page.
    Swapped,
    /// No target is configured.
    NoTarget,
    /// The configured target is not a browser renderer.
    WrongKind(String),
}

/// Result of [`ArtifactWriter::rebuild_and_swap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Version stamp embedded in the HTML name and cache-busting queries.
    pub version: String,
    /// Absolute path of the new HTML wrapper.
    pub html_path: PathBuf,
    /// Render target handling.
    pub outcome: SwapOutcome,
}

/// Writes bundle files and keeps the versioned HTML history short.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    width: u32,
    height: u32,
    retain: usize,
    last_version: Option<u64>,
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new(render::DEFAULT_WIDTH, render::DEFAULT_HEIGHT, render::DEFAULT_RETAIN_VERSIONS)
    }
}

/// Versioned HTML filename for `version`.
pub fn html_name(version: &str) -> String {
    format!("{}{version}.{}", files::HTML_PREFIX, files::HTML_EXT)
}

fn parse_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(files::HTML_PREFIX)?
        .strip_suffix(files::HTML_EXT)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Versioned HTML files in `root`, newest first.
fn versioned_pages(root: &Path) -> Vec<(u64, PathBuf)> {
    let mut pages: Vec<(u64, PathBuf)> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let version = parse_version(e.file_name().to_str()?)?;
            Some((version, e.into_path()))
        })
        .collect();
    pages.sort_by(|a, b| b.0.cmp(&a.0));
    pages
}

fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if fs_err::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(false);
    }
    write_atomic(path, contents.as_bytes())?;
    Ok(true)
}

/// Create the output directory and empty bundle files if missing.
pub fn ensure_placeholders(root: &Path) -> Result<()> {
    fs_err::create_dir_all(root).map_err(|e| Error::io(e, root.to_path_buf()))?;
    for (name, contents) in [(files::BUNDLE_CSS, ""), (files::BUNDLE_JS, ""), (files::VISIBLE_FILE, "[]")] {
        let path = root.join(name);
        if !path.exists() {
            write_atomic(&path, contents.as_bytes())?;
        }
    }
    Ok(())
}

/// Push `html_path` to `target`, forcing a reload when the path is unchanged.
pub fn swap(
    target: Option<&mut dyn RenderTarget>,
    html_path: &Path,
    width: u32,
    height: u32,
) -> Result<SwapOutcome> {
    let Some(target) = target else {
        tracing::info!("No render target configured, skipping swap");
        return Ok(SwapOutcome::NoTarget);
    };
    if target.kind() != render::BROWSER_SOURCE_KIND {
        let kind = target.kind().to_string();
        tracing::warn!(kind = %kind, "Render target is not a browser source, skipping swap");
        return Ok(SwapOutcome::WrongKind(kind));
    }

    let settings = RenderSettings::local_file(html_path.to_string_lossy(), width, height);
    if target.current_path().as_deref() == Some(settings.path.as_str()) {
        target.apply(&RenderSettings { path: String::new(), ..settings.clone() })?;
    }
    target.apply(&settings)?;
    target.reload()?;
    tracing::info!(path = %html_path.display(), "Render target swapped");
    Ok(SwapOutcome::Swapped)
}

impl ArtifactWriter {
    /// Writer for the given render size, keeping `retain` versioned pages (at least one).
    pub fn new(width: u32, height: u32, retain: usize) -> Self {
        Self { width, height, retain: retain.max(1), last_version: None }
    }

    /// A version stamp strictly greater than every earlier one, derived from
    /// local wall-clock time (`YYYYmmddHHMMSSmmm`).
    fn next_version(&mut self, floor: Option<u64>) -> u64 {
        let now = chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string().parse().unwrap_or(0);
        let previous = self.last_version.max(floor);
        let version = match previous {
            Some(prev) if now <= prev => prev + 1,
            _ => now,
        };
        self.last_version = Some(version);
        version
    }

    /// Regenerate the bundle, write a new versioned page, prune old pages and
    /// point the render target at the new page.
    pub fn rebuild_and_swap(
        &mut self,
        root: &Path,
        items: &[Item],
        target: Option<&mut dyn RenderTarget>,
    ) -> Result<RebuildReport> {
        ensure_placeholders(root)?;

        let bundle = Bundle::build(items);
        if write_if_changed(&root.join(files::BUNDLE_CSS), &bundle.css)? {
            tracing::debug!("Stylesheet updated");
        }
        if write_if_changed(&root.join(files::BUNDLE_JS), &bundle.script)? {
            tracing::debug!("Script updated");
        }

        let existing = versioned_pages(root);
        let version = self.next_version(existing.first().map(|(v, _)| *v)).to_string();
        let animate_href = if root.join(files::LOCAL_ANIMATE_CSS).exists() {
            files::LOCAL_ANIMATE_CSS
        } else {
            files::REMOTE_ANIMATE_CSS
        };
        let html_path = root.join(html_name(&version));
        write_atomic(&html_path, bundle.document(&version, animate_href).as_bytes())?;
        tracing::info!(path = %html_path.display(), items = items.len(), "Wrote page");

        self.prune(root);

        let outcome = swap(target, &html_path, self.width, self.height)?;
        Ok(RebuildReport { version, html_path, outcome })
    }

    /// Delete all but the newest `retain` versioned pages. Failures are logged.
    fn prune(&self, root: &Path) {
        for (_, path) in versioned_pages(root).into_iter().skip(self.retain) {
            if let Err(e) = fs_err::remove_file(&path) {
                tracing::warn!(
                    path = %path.display(),
                    os_error = ?e.raw_os_error(),
                    "Failed to remove stale page: {e}"
                );
            }
        }
    }
}
