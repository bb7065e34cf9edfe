//! Shared constants used across the application.

/// User agent sent with every forum API request.
pub const COLLECTOR_USER_AGENT: &str = concat!("discourse-collector/", env!("CARGO_PKG_VERSION"));

/// Slug separator used for subcategories (`parent/child`).
pub const SUBCATEGORY_SEPARATOR: char = '/';
