//! Core record types for the content pipeline.

use std::path::PathBuf;

use serde_json::{Map, Value};

/// Reserved entry key holding the source file path a record came from.
///
/// Stamped onto every raw entry by the collection loader; excluded from
/// typed output unless the schema declares it.
pub const FILE_KEY: &str = "_file";

/// One content record: declared field names mapped to JSON-like values,
/// plus the reserved [`FILE_KEY`]. "Raw" before field processing, "typed"
/// after.
pub type Entry = Map<String, Value>;

/// Read the source file path stamped on an entry, if present.
pub fn entry_source_file(entry: &Entry) -> Option<PathBuf> {
    entry
        .get(FILE_KEY)
        .and_then(Value::as_str)
        .map(PathBuf::from)
}

/// Stamp the source file path onto an entry, replacing any existing stamp.
pub fn stamp_source_file(entry: &mut Entry, path: &std::path::Path) {
    entry.insert(
        FILE_KEY.to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
}
