//! End-to-end build pipeline: prepare output → load collections →
//! user callback → write JSON artifacts.
//!
//! Collections load concurrently and share only the asset store's dedup
//! table, so no ordering between them is required or guaranteed. Failures
//! below the collection level are logged and skipped inside the loader;
//! output-directory preparation and artifact writing are the only fatal
//! paths. Nothing is ever retried, and there is no cancellation: a build
//! runs to completion or dies on a fatal error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use presswork_assets::AssetStore;
use presswork_shared::{
    BoxFuture, ComputedFn, Entry, PressworkError, Result, SiteConfig,
};

use crate::loader;
use crate::parser::{ContentParser, ParserRegistry};

/// All loaded collections, keyed by name.
pub type CollectionsMap = BTreeMap<String, Vec<Entry>>;

/// Cross-collection post-processing hook, run after loading and before
/// persistence. Takes and returns the full map so it can add, remove, or
/// rewrite collections wholesale.
pub type BuildCallback = Arc<dyn Fn(CollectionsMap) -> BoxFuture<CollectionsMap> + Send + Sync>;

/// Result of a completed build.
#[derive(Debug)]
pub struct BuildSummary {
    /// Number of collections written.
    pub collections: usize,
    /// Total entries across all collections.
    pub entries: usize,
    /// Distinct assets copied into the public directory.
    pub assets: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// The build orchestrator.
pub struct Pipeline {
    config: SiteConfig,
    registry: ParserRegistry,
    store: Arc<AssetStore>,
    callback: Option<BuildCallback>,
    clean: bool,
}

impl Pipeline {
    /// Pipeline for `config`, with the built-in parsers registered
    /// against a fresh asset store.
    pub fn new(config: SiteConfig) -> Self {
        let store = Arc::new(AssetStore::new(
            config.output.public.clone(),
            config.output.public_url.clone(),
        ));
        let registry = ParserRegistry::with_builtins(Arc::clone(&store));

        Self {
            config,
            registry,
            store,
            callback: None,
            clean: false,
        }
    }

    /// Register a parser type key, overriding any built-in.
    pub fn with_parser(mut self, key: impl Into<String>, parser: Arc<dyn ContentParser>) -> Self {
        self.registry.register(key, parser);
        self
    }

    /// Attach a computed field to a collection declared in the config.
    pub fn with_computed(
        mut self,
        collection: &str,
        field: impl Into<String>,
        derive: ComputedFn,
    ) -> Self {
        if let Some(schema) = self.config.collections.get_mut(collection) {
            schema.computed.insert(field.into(), derive);
        }
        self
    }

    /// Attach the cross-collection post-processing callback.
    pub fn with_callback(mut self, callback: BuildCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Remove and recreate the output directories before building.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Run the full build.
    #[instrument(skip_all, fields(root = %self.config.root.display(), clean = self.clean))]
    pub async fn build(&self) -> Result<BuildSummary> {
        let start = Instant::now();

        self.prepare_output_dirs().await?;

        // --- Load all collections concurrently ---
        let registry = Arc::new(self.registry.clone());
        let mut handles = Vec::new();
        for (name, schema) in &self.config.collections {
            let registry = Arc::clone(&registry);
            let store = Arc::clone(&self.store);
            let root = self.config.root.clone();
            let name = name.clone();
            let schema = schema.clone();

            handles.push(tokio::spawn(async move {
                let entries = loader::load(&root, &name, &schema, &registry, store).await;
                (name, entries)
            }));
        }

        let mut collections = CollectionsMap::new();
        for handle in handles {
            let (name, entries) = handle
                .await
                .map_err(|e| PressworkError::Output(format!("collection task panicked: {e}")))?;
            collections.insert(name, entries?);
        }

        // --- User callback, before persistence ---
        if let Some(callback) = &self.callback {
            collections = callback(collections).await;
        }

        // --- Write one JSON artifact per collection ---
        for (name, entries) in &collections {
            self.write_collection(name, entries).await?;
        }

        let summary = BuildSummary {
            collections: collections.len(),
            entries: collections.values().map(Vec::len).sum(),
            assets: self.store.record_count(),
            elapsed: start.elapsed(),
        };

        info!(
            collections = summary.collections,
            entries = summary.entries,
            assets = summary.assets,
            elapsed_ms = summary.elapsed.as_millis(),
            "build complete"
        );

        Ok(summary)
    }

    /// Clean (optionally) and create the data and public output dirs.
    /// Failures here are fatal.
    async fn prepare_output_dirs(&self) -> Result<()> {
        for dir in [&self.config.output.data, &self.config.output.public] {
            if self.clean {
                match tokio::fs::remove_dir_all(dir).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PressworkError::io(dir, e)),
                }
            }
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PressworkError::io(dir, e))?;
        }
        Ok(())
    }

    /// Pretty-printed JSON, written to a temp sibling and renamed so a
    /// crash mid-write cannot leave a truncated artifact.
    async fn write_collection(&self, name: &str, entries: &[Entry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| PressworkError::Output(format!("serialize `{name}`: {e}")))?;

        let path = self.config.output.data.join(format!("{name}.json"));
        let tmp = self.config.output.data.join(format!("{name}.json.tmp"));

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PressworkError::Output(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PressworkError::Output(format!("rename {}: {e}", path.display())))?;

        info!(collection = %name, entries = entries.len(), path = %path.display(), "artifact written");
        Ok(())
    }

    /// The pipeline's asset store (shared with the registry's built-ins).
    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }
}
