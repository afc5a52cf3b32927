//! Shared types, error model, and configuration for Presswork.
//!
//! This crate is the foundation depended on by all other Presswork crates.
//! It provides:
//! - [`PressworkError`] — the unified error type
//! - Record types ([`Entry`], the `_file` stamp helpers)
//! - The declarative field schema ([`FieldSpec`], [`CollectionSchema`])
//! - Project configuration ([`SiteConfig`], config loading)

pub mod config;
pub mod error;
pub mod schema;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    CONFIG_FILE_NAME, OutputConfig, SiteConfig, init_site_config, load_site_config_from,
};
pub use error::{PressworkError, Result};
pub use schema::{
    BoxFuture, CollectionSchema, ComputedFn, ComputedMap, FieldKind, FieldMap, FieldSpec,
    ItemKind, ListOf, validate_fields,
};
pub use types::{Entry, FILE_KEY, entry_source_file, stamp_source_file};
