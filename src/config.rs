//! Application configuration.
//!
//! Handles loading configuration from environment variables and .env files.

use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{playback, render};
use crate::error::Result;

/// Configuration for the application.
#[derive(Debug, Clone)]
pub struct Config {
    /// The application name
    app_name: String,
    /// The application version
    app_version: String,
    /// Root storage and bundle directory
    pub output_dir: Option<PathBuf>,
    /// Period of the scheduler / repeat evaluator tick
    pub tick: Duration,
    /// Render target width in pixels
    pub render_width: u32,
    /// Render target height in pixels
    pub render_height: u32,
    /// Versioned HTML pages kept after a rebuild
    pub retain_versions: usize,
}

impl Config {
    /// Get the application name.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Get the application version.
    #[must_use]
    pub fn app_version(&self) -> &str {
        &self.app_version
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            output_dir: dirs::data_dir().map(|d| d.join("lowerdeck")),
            tick: Duration::from_millis(playback::DEFAULT_TICK_MS),
            render_width: render::DEFAULT_WIDTH,
            render_height: render::DEFAULT_HEIGHT,
            retain_versions: render::DEFAULT_RETAIN_VERSIONS,
        }
    }
}

/// Parse a numeric variable, keeping `current` (with a warning) when it is invalid.
fn numeric<T: FromStr + Copy>(name: &str, current: T) -> T {
    let Ok(raw) = env::var(name) else {
        return current;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(variable = name, value = %raw, "Ignoring invalid numeric setting");
        current
    })
}

impl Config {
    /// Load configuration from environment variables
    #[allow(clippy::unnecessary_wraps)] // Returns Result for forward-compatible API
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        dotenv().ok();

        let mut config = Self::default();

        if let Ok(dir) = env::var("LOWERDECK_OUTPUT_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.output_dir = Some(PathBuf::from(shellexpand::tilde(dir).to_string()));
            }
        }

        let tick_ms = numeric("LOWERDECK_TICK_MS", playback::DEFAULT_TICK_MS).max(10);
        config.tick = Duration::from_millis(tick_ms);
        config.render_width = numeric("LOWERDECK_RENDER_WIDTH", config.render_width);
        config.render_height = numeric("LOWERDECK_RENDER_HEIGHT", config.render_height);
        config.retain_versions = numeric("LOWERDECK_RETAIN_VERSIONS", config.retain_versions).max(1);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = Config::default();
        assert_eq!(config.tick, Duration::from_millis(250));
        assert_eq!((config.render_width, config.render_height), (1920, 1080));
        assert_eq!(config.retain_versions, 1);
        assert_eq!(config.app_name(), "lowerdeck");
    }

    #[test]
    fn unset_numeric_keeps_current() {
        assert_eq!(numeric("LOWERDECK_TEST_UNSET_VARIABLE", 7_u32), 7);
    }
}
