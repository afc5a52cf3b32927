//! Collection loading: glob → parse → field-process → computed fields.
//!
//! One bad file or entry never blocks unrelated content: per-file parse
//! failures and per-entry required-field violations are logged and
//! skipped, and everything else proceeds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use presswork_assets::AssetStore;
use presswork_shared::{
    CollectionSchema, Entry, PressworkError, Result, stamp_source_file,
};

use crate::fields;
use crate::parser::ParserRegistry;

/// Load one collection: every matched file parsed, every raw record
/// processed against the schema, computed fields merged in last.
#[instrument(skip_all, fields(collection = %name, pattern = %schema.pattern))]
pub async fn load(
    root: &Path,
    name: &str,
    schema: &CollectionSchema,
    registry: &ParserRegistry,
    store: Arc<AssetStore>,
) -> Result<Vec<Entry>> {
    let parser = registry.get(&schema.parser).ok_or_else(|| {
        PressworkError::config(format!(
            "collection `{name}`: unknown parser type `{}`",
            schema.parser
        ))
    })?;

    let files = discover(root, &schema.pattern)?;
    debug!(files = files.len(), "collection files discovered");

    // --- Parse every file concurrently; a bad file contributes nothing ---
    let mut handles = Vec::new();
    for path in files {
        let parser = Arc::clone(&parser);
        handles.push(tokio::spawn(async move {
            let result = parser.parse(path.clone()).await;
            (path, result)
        }));
    }

    let mut raw_entries: Vec<Entry> = Vec::new();
    for handle in handles {
        let (path, result) = handle.await.map_err(|e| {
            PressworkError::parse(format!("parser task panicked: {e}"))
        })?;

        match result {
            Ok(value) => raw_entries.extend(normalize(value, &path)),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "parse failed, skipping file");
            }
        }
    }

    // --- Field-process every entry concurrently; rejected entries drop ---
    let field_map = Arc::new(schema.fields.clone());
    let mut handles = Vec::new();
    for entry in raw_entries {
        handles.push(tokio::spawn(fields::process(
            Arc::clone(&store),
            Arc::clone(&field_map),
            entry,
        )));
    }

    let mut entries: Vec<Entry> = Vec::new();
    for handle in handles {
        if let Ok(Some(entry)) = handle.await {
            entries.push(entry);
        }
    }

    // --- Computed fields, strictly after field processing ---
    if !schema.computed.is_empty() {
        let computed = Arc::new(schema.computed.clone());
        let mut handles = Vec::new();
        for entry in entries {
            let computed = Arc::clone(&computed);
            handles.push(tokio::spawn(async move {
                let mut entry = entry;
                for (key, derive) in computed.iter() {
                    let value = derive(entry.clone()).await;
                    entry.insert(key.clone(), value);
                }
                entry
            }));
        }

        entries = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "computed-field task failed, dropping entry"),
            }
        }
    }

    debug!(entries = entries.len(), "collection loaded");
    Ok(entries)
}

/// Glob `root/pattern`, excluding private files (basename starts with `_`).
fn discover(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = root.join(pattern);
    let matches = glob::glob(&full.to_string_lossy())
        .map_err(|e| PressworkError::config(format!("bad pattern `{pattern}`: {e}")))?;

    let mut files = Vec::new();
    for matched in matches {
        let path = match matched {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "unreadable path during discovery, skipping");
                continue;
            }
        };

        if !path.is_file() {
            continue;
        }
        let private = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('_'));
        if private {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

/// A parser may yield one record (object) or several (array); normalize
/// to a flat list, stamping each with `_file`.
fn normalize(value: Value, path: &Path) -> Vec<Entry> {
    let records = match value {
        Value::Object(object) => vec![object],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(object) => Some(object),
                other => {
                    warn!(file = %path.display(), ?other, "non-object record, skipping");
                    None
                }
            })
            .collect(),
        other => {
            warn!(file = %path.display(), ?other, "parser yielded a non-record value, skipping file");
            Vec::new()
        }
    };

    records
        .into_iter()
        .map(|mut entry| {
            stamp_source_file(&mut entry, path);
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use presswork_shared::{FieldKind, FieldSpec};
    use serde_json::json;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write content file");
    }

    fn schema(pattern: &str, parser: &str, fields: Vec<(&str, FieldSpec)>) -> CollectionSchema {
        CollectionSchema {
            pattern: pattern.into(),
            parser: parser.into(),
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            computed: Default::default(),
        }
    }

    fn store_in(dir: &Path) -> Arc<AssetStore> {
        Arc::new(AssetStore::new(dir.join("public"), "/assets/"))
    }

    #[tokio::test]
    async fn loads_yaml_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "people/ada.yaml", "name: Ada\nage: \"36\"\n");
        write(dir.path(), "people/bob.yaml", "name: Bob\nage: 41\n");

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema(
            "people/*.yaml",
            "yaml",
            vec![
                ("name", FieldSpec::of_kind(FieldKind::String).required()),
                ("age", FieldSpec::of_kind(FieldKind::Number)),
            ],
        );

        let entries = load(dir.path(), "people", &schema, &registry, store)
            .await
            .expect("load");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], json!("Ada"));
        assert_eq!(entries[0]["age"], json!(36));
    }

    #[tokio::test]
    async fn private_files_are_excluded() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "posts/real.yaml", "title: yes\n");
        write(dir.path(), "posts/_draft.yaml", "title: no\n");

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema(
            "posts/*.yaml",
            "yaml",
            vec![("title", FieldSpec::of_kind(FieldKind::String))],
        );

        let entries = load(dir.path(), "posts", &schema, &registry, store)
            .await
            .expect("load");
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn parse_failure_skips_only_that_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "data/good.json", r#"{"title": "ok"}"#);
        write(dir.path(), "data/bad.json", "{broken");

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema(
            "data/*.json",
            "json",
            vec![("title", FieldSpec::of_kind(FieldKind::String))],
        );

        let entries = load(dir.path(), "data", &schema, &registry, store)
            .await
            .expect("load");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["title"], json!("ok"));
    }

    #[tokio::test]
    async fn array_file_yields_many_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "data/list.json",
            r#"[{"title": "a"}, {"title": "b"}, "not a record"]"#,
        );

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema(
            "data/*.json",
            "json",
            vec![("title", FieldSpec::of_kind(FieldKind::String))],
        );

        let entries = load(dir.path(), "data", &schema, &registry, store)
            .await
            .expect("load");
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn required_violation_drops_entry_not_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "posts/ok.yaml", "title: fine\n");
        write(dir.path(), "posts/bad.yaml", "subtitle: no title here\n");

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema(
            "posts/*.yaml",
            "yaml",
            vec![("title", FieldSpec::of_kind(FieldKind::String).required())],
        );

        let entries = load(dir.path(), "posts", &schema, &registry, store)
            .await
            .expect("load");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["title"], json!("fine"));
    }

    #[tokio::test]
    async fn computed_fields_merge_and_may_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "posts/one.yaml", "title: Hello\n");

        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let mut schema = schema(
            "posts/*.yaml",
            "yaml",
            vec![("title", FieldSpec::of_kind(FieldKind::String))],
        );
        schema.computed.insert(
            "slug".into(),
            Arc::new(|entry: Entry| -> presswork_shared::BoxFuture<Value> {
                Box::pin(async move {
                    let title = entry["title"].as_str().unwrap_or_default();
                    Value::String(title.to_lowercase())
                })
            }),
        );
        schema.computed.insert(
            "title".into(),
            Arc::new(|_| -> presswork_shared::BoxFuture<Value> {
                Box::pin(async { Value::String("overwritten".into()) })
            }),
        );

        let entries = load(dir.path(), "posts", &schema, &registry, store)
            .await
            .expect("load");

        assert_eq!(entries[0]["slug"], json!("hello"));
        assert_eq!(entries[0]["title"], json!("overwritten"));
    }

    #[tokio::test]
    async fn unknown_parser_type_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));
        let schema = schema("x/*.toml", "toml", vec![]);

        let err = load(dir.path(), "x", &schema, &registry, store)
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("unknown parser type"));
    }
}
