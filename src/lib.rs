//! `lowerdeck` - lower-third overlays for live video production.
//!
//! This crate keeps a store of overlay items and playback groups, compiles
//! them into an HTML/CSS/script bundle for a browser renderer, and drives
//! timed group playback and per-item auto-repeat.

// Re-export public modules for use in integration tests and as a library
pub mod app;
pub mod artifacts;
pub mod bridge;
pub mod bundle;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod types;
