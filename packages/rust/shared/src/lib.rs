//! Shared types, error model, and configuration for the dredger.
//!
//! This crate is the foundation depended on by all other dredger crates.
//! It provides:
//! - [`DredgerError`]: the unified error type
//! - Domain types ([`Link`], [`LinkId`], [`LinkStatus`], [`DredgeState`], [`LinkStats`])
//! - Configuration ([`AppConfig`], [`DredgeConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, DredgeConfig, DredgeSection, OllamaConfig, config_dir,
    config_file_path, default_db_path, init_config, load_config, load_config_from,
};
pub use error::{DredgerError, Result};
pub use types::{DredgeState, Link, LinkId, LinkStats, LinkStatus};
