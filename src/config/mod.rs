/// Database configuration and connection management
pub mod database;

/// Role permission sets and navigation menus
pub mod roles;

/// Application settings loading from config.toml with environment overrides
pub mod settings;
