//! Application constants.
//!
//! Centralizes magic numbers and configuration values for better maintainability.

/// Valid ranges for the numeric presentation fields of an item.
pub mod limits {
    /// Minimum title/subtitle font size in pixels.
    pub const MIN_FONT_SIZE: u32 = 6;

    /// Maximum title/subtitle font size in pixels.
    pub const MAX_FONT_SIZE: u32 = 200;

    /// Minimum avatar width/height in pixels.
    pub const MIN_AVATAR_SIZE: u32 = 10;

    /// Maximum avatar width/height in pixels.
    pub const MAX_AVATAR_SIZE: u32 = 400;

    /// Upper bound for opacity and corner radius (both are 0..=100).
    pub const MAX_PERCENT: u32 = 100;

    /// Upper bound for the repeat integers, in seconds (one day).
    pub const MAX_REPEAT_SECS: u32 = 24 * 60 * 60;

    /// Shortest allowed group step, in milliseconds.
    pub const MIN_GROUP_VISIBLE_MS: u64 = 100;
}

/// File names inside the output directory.
pub mod files {
    /// Structured state document (items + groups).
    pub const STATE_FILE: &str = "lowerdeck-state.json";

    /// Visible id list polled by the rendered page.
    pub const VISIBLE_FILE: &str = "lowerdeck-visible.json";

    /// Stable-named CSS bundle.
    pub const BUNDLE_CSS: &str = "lowerdeck.css";

    /// Stable-named script bundle.
    pub const BUNDLE_JS: &str = "lowerdeck.js";

    /// Prefix of the versioned HTML wrapper (`<prefix><version>.html`).
    pub const HTML_PREFIX: &str = "lowerdeck-";

    /// Extension of the versioned HTML wrapper.
    pub const HTML_EXT: &str = "html";

    /// Optional local copy of the animation library.
    pub const LOCAL_ANIMATE_CSS: &str = "animate.min.css";

    /// Remote fallback for the animation library.
    pub const REMOTE_ANIMATE_CSS: &str =
        "https://cdnjs.cloudflare.com/ajax/libs/animate.css/4.1.1/animate.min.css";
}

/// Playback timing defaults.
pub mod playback {
    /// Auto-hide delay used when an item is auto-shown with `repeat_visible == 0`.
    pub const DEFAULT_REPEAT_VISIBLE_SECS: u64 = 5;

    /// Default time a group member stays visible.
    pub const DEFAULT_GROUP_VISIBLE_MS: u64 = 5_000;

    /// Default gap between two group members.
    pub const DEFAULT_GROUP_INTERVAL_MS: u64 = 1_000;

    /// Default tick period of the scheduler driver.
    pub const DEFAULT_TICK_MS: u64 = 250;
}

/// Render target defaults.
pub mod render {
    /// Renderer kind the artifact writer knows how to drive.
    pub const BROWSER_SOURCE_KIND: &str = "browser_source";

    /// Default render width in pixels.
    pub const DEFAULT_WIDTH: u32 = 1920;

    /// Default render height in pixels.
    pub const DEFAULT_HEIGHT: u32 = 1080;

    /// Versioned HTML files kept after a rebuild.
    pub const DEFAULT_RETAIN_VERSIONS: usize = 1;

    /// Poll interval of the generated page, in milliseconds.
    pub const POLL_INTERVAL_MS: u64 = 500;
}

/// State document schema.
pub mod schema {
    /// Schema version written to the state document.
    pub const STATE_VERSION: u32 = 2;
}
