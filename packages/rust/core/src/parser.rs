//! Content parsers and the parser registry.
//!
//! A parser is the `file -> value` collaborator boundary: it reads one
//! content file and yields a JSON-like object (one record) or an array of
//! objects (several records). Built-ins cover `yaml`, `json`, and
//! `markdown`; users may register new type keys or override a built-in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use presswork_assets::AssetStore;
use presswork_markdown::MarkdownTransformer;
use presswork_shared::{BoxFuture, PressworkError, Result};

/// One content parser behind the registry.
///
/// Takes an owned path so implementations can move it into their future;
/// stateful parsers hold their collaborators behind `Arc`.
pub trait ContentParser: Send + Sync {
    fn parse(&self, path: PathBuf) -> BoxFuture<Result<Value>>;
}

/// Maps a content type key to a parser.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn ContentParser>>,
}

impl ParserRegistry {
    /// Registry with the `yaml`, `json`, and `markdown` built-ins.
    pub fn with_builtins(store: Arc<AssetStore>) -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
        };
        registry.register("yaml", Arc::new(YamlParser));
        registry.register("json", Arc::new(JsonParser));
        registry.register(
            "markdown",
            Arc::new(MarkdownParser {
                transformer: Arc::new(MarkdownTransformer::new(store)),
            }),
        );
        registry
    }

    /// Add a parser under `key`, overriding any built-in with that key.
    pub fn register(&mut self, key: impl Into<String>, parser: Arc<dyn ContentParser>) {
        self.parsers.insert(key.into(), parser);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ContentParser>> {
        self.parsers.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Built-in parsers
// ---------------------------------------------------------------------------

/// `yaml` — one document per file.
struct YamlParser;

impl ContentParser for YamlParser {
    fn parse(&self, path: PathBuf) -> BoxFuture<Result<Value>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PressworkError::io(&path, e))?;

            let value: serde_yaml::Value = serde_yaml::from_str(&text)
                .map_err(|e| PressworkError::parse(format!("{}: {e}", path.display())))?;

            serde_json::to_value(value)
                .map_err(|e| PressworkError::parse(format!("{}: {e}", path.display())))
        })
    }
}

/// `json` — an object or an array of objects.
struct JsonParser;

impl ContentParser for JsonParser {
    fn parse(&self, path: PathBuf) -> BoxFuture<Result<Value>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PressworkError::io(&path, e))?;

            serde_json::from_str(&text)
                .map_err(|e| PressworkError::parse(format!("{}: {e}", path.display())))
        })
    }
}

/// `markdown` — frontmatter + body through the [`MarkdownTransformer`].
///
/// Yields one record: the frontmatter's own keys spread at the top level,
/// alongside `data`, `raw`, `html`, and `excerpt`.
struct MarkdownParser {
    transformer: Arc<MarkdownTransformer>,
}

impl ContentParser for MarkdownParser {
    fn parse(&self, path: PathBuf) -> BoxFuture<Result<Value>> {
        let transformer = Arc::clone(&self.transformer);
        Box::pin(async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PressworkError::io(&path, e))?;

            let parsed = transformer.parse(&text, &path).await?;

            let mut record = Map::new();
            for (key, value) in &parsed.data {
                record.insert(key.clone(), value.clone());
            }
            record.insert("data".into(), Value::Object(parsed.data));
            record.insert("raw".into(), Value::String(parsed.raw));
            record.insert("html".into(), Value::String(parsed.html));
            record.insert("excerpt".into(), Value::String(parsed.excerpt));

            Ok(Value::Object(record))
        })
    }
}
