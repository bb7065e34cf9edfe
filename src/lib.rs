//! Discourse collector library.
//!
//! Incrementally collects topics, participants and main-post edit history
//! from a Discourse forum into an in-memory cache that persists across
//! collection cycles, and exports snapshots of it as JSON or into SQLite.

pub mod collector;
pub mod config;
pub mod constants;
pub mod discourse;
pub mod export;
pub mod rate_limiter;
pub mod runner;
