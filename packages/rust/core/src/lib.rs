//! Core build pipeline for Presswork.
//!
//! Ties parsers, field processing, and collection loading together into
//! the end-to-end [`pipeline::Pipeline`] that emits per-collection JSON
//! artifacts and content-addressed asset copies.

pub mod fields;
pub mod loader;
pub mod parser;
pub mod pipeline;

pub use parser::{ContentParser, ParserRegistry};
pub use pipeline::{BuildCallback, BuildSummary, CollectionsMap, Pipeline};
