//! Schema-driven field processing.
//!
//! Transforms one raw entry into a typed entry by structural recursion
//! over the field schema: scalars are coerced, `file` references resolve
//! through the [`AssetStore`], `nested` and `list` variants recurse. The
//! source file path (`_file`) is threaded through as explicit context for
//! asset resolution. The output contains exactly the declared fields —
//! undeclared raw keys never pass through.
//!
//! A missing `required` field with no default rejects the whole entry:
//! the rejection is a logged `None`, filtered by the caller, never an
//! error out of the pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Number, Value};
use tracing::warn;

use presswork_assets::AssetStore;
use presswork_shared::{
    BoxFuture, Entry, FieldKind, FieldMap, FieldSpec, ItemKind, ListOf, entry_source_file,
    stamp_source_file,
};

/// Per-field result inside one entry.
enum FieldOutcome {
    /// Typed value to include under the declared name.
    Value(Value),
    /// Field stays absent (no raw value, or uncoercible).
    Skip,
    /// A `required` field was missing; the owning entry is rejected.
    MissingRequired(String),
}

/// Process one raw entry against a field map. `None` means the entry was
/// rejected and must be filtered out, never partially emitted.
///
/// All declared fields are processed concurrently; list elements and
/// nested objects fan out recursively.
pub fn process(
    store: Arc<AssetStore>,
    fields: Arc<FieldMap>,
    entry: Entry,
) -> BoxFuture<Option<Entry>> {
    Box::pin(async move {
        let source = entry_source_file(&entry).unwrap_or_default();

        let mut handles = Vec::new();
        for (name, spec) in fields.iter() {
            let raw = entry.get(name).cloned();
            let store = Arc::clone(&store);
            let spec = spec.clone();
            let source = source.clone();
            let name = name.clone();

            handles.push(tokio::spawn(async move {
                (name, process_field(store, spec, source, raw).await)
            }));
        }

        let mut typed = Entry::new();
        for handle in handles {
            let (name, outcome) = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "field task failed, dropping entry");
                    return None;
                }
            };

            match outcome {
                FieldOutcome::Value(value) => {
                    typed.insert(name, value);
                }
                FieldOutcome::Skip => {}
                FieldOutcome::MissingRequired(detail) => {
                    warn!(
                        field = %name,
                        detail = %detail,
                        source = %source.display(),
                        "required field missing, dropping entry"
                    );
                    return None;
                }
            }
        }

        Some(typed)
    })
}

/// Dispatch one field by kind. Absence is an explicit check — legitimate
/// falsy values (`0`, `false`, `""`) coerce normally, and a declared
/// default satisfies `required` by filling in first.
async fn process_field(
    store: Arc<AssetStore>,
    spec: FieldSpec,
    source: PathBuf,
    raw: Option<Value>,
) -> FieldOutcome {
    let raw = raw.filter(|value| !value.is_null());
    let value = match raw.or_else(|| spec.default.clone()) {
        Some(value) => value,
        None if spec.required => return FieldOutcome::MissingRequired(String::new()),
        None => return FieldOutcome::Skip,
    };

    match spec.kind {
        FieldKind::String => outcome(coerce_string(value)),
        FieldKind::Number => outcome(coerce_number(value)),
        FieldKind::Boolean => outcome(coerce_boolean(value)),
        FieldKind::Date => outcome(coerce_date(value)),

        FieldKind::File => match store.resolve(&source, value.as_str()).await {
            Some(url) => FieldOutcome::Value(Value::String(url)),
            None => FieldOutcome::Skip,
        },

        FieldKind::Nested => {
            let Some(inner) = spec.fields else {
                return FieldOutcome::Skip;
            };
            let Value::Object(mut object) = value else {
                return FieldOutcome::Skip;
            };
            stamp_source_file(&mut object, &source);

            match process(store, Arc::new(inner), object).await {
                Some(nested) => FieldOutcome::Value(Value::Object(nested)),
                // An inner required violation rejects the outer entry too.
                None => FieldOutcome::MissingRequired("<nested>".into()),
            }
        }

        FieldKind::List => {
            let Some(of) = spec.of else {
                return FieldOutcome::Skip;
            };
            let Value::Array(items) = value else {
                return FieldOutcome::Skip;
            };
            process_list(store, of, source, items).await
        }

        // Unknown kinds pass the raw value through unchanged.
        FieldKind::Other => FieldOutcome::Value(value),
    }
}

/// Fan out over list elements concurrently.
async fn process_list(
    store: Arc<AssetStore>,
    of: ListOf,
    source: PathBuf,
    items: Vec<Value>,
) -> FieldOutcome {
    match of {
        ListOf::Item(ItemKind::File) => {
            let mut handles = Vec::new();
            for item in items {
                let store = Arc::clone(&store);
                let source = source.clone();
                handles.push(tokio::spawn(async move {
                    store.resolve(&source, item.as_str()).await
                }));
            }

            let mut resolved = Vec::new();
            for handle in handles {
                if let Ok(Some(url)) = handle.await {
                    resolved.push(Value::String(url));
                }
            }
            FieldOutcome::Value(Value::Array(resolved))
        }

        ListOf::Item(kind) => {
            let coerce = item_coercion(kind);
            let coerced = items.into_iter().filter_map(coerce).collect();
            FieldOutcome::Value(Value::Array(coerced))
        }

        ListOf::Nested(inner) => {
            let inner = Arc::new(inner);
            let mut handles = Vec::new();
            for item in items {
                let Value::Object(mut object) = item else {
                    continue;
                };
                stamp_source_file(&mut object, &source);
                handles.push(tokio::spawn(process(
                    Arc::clone(&store),
                    Arc::clone(&inner),
                    object,
                )));
            }

            let mut processed = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok(Some(entry)) => processed.push(Value::Object(entry)),
                    // An element's required violation rejects the whole entry.
                    Ok(None) => return FieldOutcome::MissingRequired("<list element>".into()),
                    Err(_) => return FieldOutcome::Skip,
                }
            }
            FieldOutcome::Value(Value::Array(processed))
        }
    }
}

fn outcome(coerced: Option<Value>) -> FieldOutcome {
    match coerced {
        Some(value) => FieldOutcome::Value(value),
        None => FieldOutcome::Skip,
    }
}

// ---------------------------------------------------------------------------
// Scalar coercion
// ---------------------------------------------------------------------------

fn item_coercion(kind: ItemKind) -> fn(Value) -> Option<Value> {
    match kind {
        ItemKind::String => coerce_string,
        ItemKind::Number => coerce_number,
        ItemKind::Boolean => coerce_boolean,
        ItemKind::Date => coerce_date,
        // Handled separately; a file kind reaching here resolves nothing.
        ItemKind::File => |_| None,
    }
}

fn coerce_string(value: Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s)),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_number(value: Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(Value::Number(n)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Some(Value::Number(int.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        Value::Bool(b) => Some(Value::Number(i64::from(b).into())),
        _ => None,
    }
}

fn coerce_boolean(value: Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(b)),
        Value::String(s) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(n) => Some(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        _ => None,
    }
}

/// Canonical date form is RFC 3339 UTC. Accepts RFC 3339 strings, bare
/// `YYYY-MM-DD` dates (midnight UTC), and integer epoch milliseconds.
fn coerce_date(value: Value) -> Option<Value> {
    let datetime = match &value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };

    datetime.map(|dt| Value::String(dt.to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use presswork_shared::FILE_KEY;
    use serde_json::json;

    fn store() -> Arc<AssetStore> {
        Arc::new(AssetStore::new("unused-public", "/assets/"))
    }

    fn entry(value: Value) -> Entry {
        value.as_object().expect("object literal").clone()
    }

    fn fields_from(pairs: Vec<(&str, FieldSpec)>) -> Arc<FieldMap> {
        Arc::new(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    async fn run(fields: Arc<FieldMap>, raw: Value) -> Option<Entry> {
        process(store(), fields, entry(raw)).await
    }

    #[tokio::test]
    async fn scalars_coerce_to_declared_types() {
        let fields = fields_from(vec![
            ("title", FieldSpec::of_kind(FieldKind::String)),
            ("count", FieldSpec::of_kind(FieldKind::Number)),
            ("live", FieldSpec::of_kind(FieldKind::Boolean)),
            ("when", FieldSpec::of_kind(FieldKind::Date)),
        ]);

        let typed = run(
            fields,
            json!({
                "title": 42,
                "count": "17",
                "live": "true",
                "when": "2024-01-14",
            }),
        )
        .await
        .expect("entry kept");

        assert_eq!(typed["title"], json!("42"));
        assert_eq!(typed["count"], json!(17));
        assert_eq!(typed["live"], json!(true));
        assert_eq!(typed["when"], json!("2024-01-14T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn falsy_scalars_survive() {
        let fields = fields_from(vec![
            ("zero", FieldSpec::of_kind(FieldKind::Number).required()),
            ("no", FieldSpec::of_kind(FieldKind::Boolean).required()),
            ("empty", FieldSpec::of_kind(FieldKind::String).required()),
        ]);

        let typed = run(fields, json!({"zero": 0, "no": false, "empty": ""}))
            .await
            .expect("entry kept");

        assert_eq!(typed["zero"], json!(0));
        assert_eq!(typed["no"], json!(false));
        assert_eq!(typed["empty"], json!(""));
    }

    #[tokio::test]
    async fn missing_required_drops_entry() {
        let fields = fields_from(vec![(
            "title",
            FieldSpec::of_kind(FieldKind::String).required(),
        )]);

        assert!(run(fields.clone(), json!({})).await.is_none());
        // Explicit null counts as absent too.
        assert!(run(fields, json!({"title": null})).await.is_none());
    }

    #[tokio::test]
    async fn default_satisfies_required() {
        let fields = fields_from(vec![(
            "weight",
            FieldSpec::of_kind(FieldKind::Number)
                .required()
                .with_default(json!(0)),
        )]);

        let typed = run(fields, json!({})).await.expect("entry kept");
        assert_eq!(typed["weight"], json!(0));
    }

    #[tokio::test]
    async fn undeclared_keys_are_dropped() {
        let fields = fields_from(vec![("title", FieldSpec::of_kind(FieldKind::String))]);

        let typed = run(
            fields,
            json!({"title": "hi", "sneaky": 1, "_file": "a.md"}),
        )
        .await
        .expect("entry kept");

        assert_eq!(typed.len(), 1);
        assert!(!typed.contains_key("sneaky"));
        assert!(!typed.contains_key(FILE_KEY));
    }

    #[tokio::test]
    async fn list_of_number_coerces_strings() {
        let fields = fields_from(vec![(
            "scores",
            FieldSpec {
                of: Some(ListOf::Item(ItemKind::Number)),
                ..FieldSpec::of_kind(FieldKind::List)
            },
        )]);

        let typed = run(fields, json!({"scores": ["1", "2", "3"]}))
            .await
            .expect("entry kept");
        assert_eq!(typed["scores"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn unknown_kind_passes_raw_value_through() {
        let fields = fields_from(vec![("blob", FieldSpec::of_kind(FieldKind::Other))]);

        let typed = run(fields, json!({"blob": {"anything": [1, 2]}}))
            .await
            .expect("entry kept");
        assert_eq!(typed["blob"], json!({"anything": [1, 2]}));
    }

    #[tokio::test]
    async fn nested_fields_recurse_and_filter() {
        let inner = vec![
            ("name", FieldSpec::of_kind(FieldKind::String).required()),
            ("age", FieldSpec::of_kind(FieldKind::Number)),
        ];
        let fields = fields_from(vec![(
            "author",
            FieldSpec {
                fields: Some(
                    inner
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                ..FieldSpec::of_kind(FieldKind::Nested)
            },
        )]);

        let typed = run(
            fields.clone(),
            json!({"author": {"name": "Ada", "age": "36", "extra": true}}),
        )
        .await
        .expect("entry kept");

        assert_eq!(typed["author"], json!({"name": "Ada", "age": 36}));

        // Inner required violation rejects the whole outer entry.
        assert!(run(fields, json!({"author": {"age": 1}})).await.is_none());
    }

    #[tokio::test]
    async fn deep_nesting_resolves_without_overflow() {
        // Build a 10-deep nested schema and matching value.
        let mut spec = FieldSpec::of_kind(FieldKind::String).required();
        let mut value = json!("bottom");
        for _ in 0..10 {
            let mut map = FieldMap::new();
            map.insert("inner".into(), spec);
            spec = FieldSpec {
                fields: Some(map),
                ..FieldSpec::of_kind(FieldKind::Nested)
            };
            value = json!({ "inner": value });
        }

        let fields = fields_from(vec![("root", spec)]);
        let typed = run(fields, json!({ "root": value }))
            .await
            .expect("entry kept");

        let mut cursor = &typed["root"];
        for _ in 0..10 {
            cursor = &cursor["inner"];
        }
        assert_eq!(cursor, &json!("bottom"));
    }

    #[tokio::test]
    async fn list_of_nested_processes_each_element() {
        let mut inner = FieldMap::new();
        inner.insert("name".into(), FieldSpec::of_kind(FieldKind::String));
        let fields = fields_from(vec![(
            "people",
            FieldSpec {
                of: Some(ListOf::Nested(inner)),
                ..FieldSpec::of_kind(FieldKind::List)
            },
        )]);

        let typed = run(
            fields,
            json!({"people": [{"name": "a", "x": 1}, {"name": "b"}]}),
        )
        .await
        .expect("entry kept");

        assert_eq!(typed["people"], json!([{"name": "a"}, {"name": "b"}]));
    }

    #[tokio::test]
    async fn file_field_resolves_relative_to_source_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cover.png"), b"coverbytes").expect("write asset");
        let store = Arc::new(AssetStore::new(dir.path().join("public"), "/assets/"));

        let fields = fields_from(vec![("cover", FieldSpec::of_kind(FieldKind::File))]);
        let mut raw = entry(json!({"cover": "cover.png"}));
        stamp_source_file(&mut raw, &dir.path().join("post.md"));

        let typed = process(Arc::clone(&store), fields, raw)
            .await
            .expect("entry kept");

        let url = typed["cover"].as_str().expect("rewritten url");
        assert!(url.starts_with("/assets/"), "url={url}");
        assert!(url.ends_with(".png"));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn list_of_file_keeps_unresolvable_elements_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.png"), b"a-bytes").expect("write asset");
        std::fs::write(dir.path().join("b.jpg"), b"b-bytes").expect("write asset");
        let store = Arc::new(AssetStore::new(dir.path().join("public"), "/assets/"));

        let fields = fields_from(vec![(
            "gallery",
            FieldSpec {
                of: Some(ListOf::Item(ItemKind::File)),
                ..FieldSpec::of_kind(FieldKind::List)
            },
        )]);
        let mut raw = entry(json!({"gallery": ["a.png", "missing.gif", "b.jpg"]}));
        stamp_source_file(&mut raw, &dir.path().join("post.md"));

        let typed = process(Arc::clone(&store), fields, raw)
            .await
            .expect("entry kept");

        let gallery = typed["gallery"].as_array().expect("array");
        assert_eq!(gallery.len(), 3);
        assert!(gallery[0].as_str().expect("url").starts_with("/assets/"));
        // The unreadable reference survives unchanged, in place.
        assert_eq!(gallery[1], json!("missing.gif"));
        assert!(gallery[2].as_str().expect("url").ends_with(".jpg"));
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn date_coercion_accepts_epoch_millis() {
        let coerced = coerce_date(json!(0)).expect("coerced");
        assert_eq!(coerced, json!("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn uncoercible_scalar_is_skipped() {
        assert!(coerce_number(json!({"not": "a number"})).is_none());
        assert!(coerce_boolean(json!("maybe")).is_none());
        assert!(coerce_date(json!("not a date")).is_none());
    }
}
