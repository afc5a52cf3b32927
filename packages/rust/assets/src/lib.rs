//! Content-addressed asset store.
//!
//! Files referenced by entries and Markdown bodies are copied into the
//! public output directory under a name derived from their content hash
//! (`hash8.ext`), so byte-identical assets referenced from anywhere in the
//! project collapse to a single physical copy with a stable URL.
//!
//! The store is injected into the pipeline as an explicit instance — never
//! a module-level singleton — so its lifetime is test-scoped and its
//! check-then-copy sequence is atomic per content hash: concurrent
//! first-time resolutions of the same bytes rendezvous on a per-hash
//! `OnceCell` and only one performs the copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Reference prefixes that always pass through unresolved.
const PASSTHROUGH_PREFIXES: [&str; 4] = ["http://", "https://", "data:", "mailto:"];

/// Content-addressed copy/deduplication of referenced files.
pub struct AssetStore {
    public_dir: PathBuf,
    public_url: String,
    // Keyed by content hash + original extension; each cell is initialized
    // exactly once with the public URL after the physical copy lands.
    records: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl AssetStore {
    /// Create a store copying into `public_dir` and minting URLs under
    /// `public_url` (used as a literal prefix).
    pub fn new(public_dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            public_dir: public_dir.into(),
            public_url: public_url.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one reference found in `source_file`.
    ///
    /// Absolute URLs, rooted paths, extensionless refs, and `.md` refs
    /// pass through unchanged. Everything else is resolved relative to
    /// `source_file`'s directory, hashed, copied once, and rewritten to
    /// `<public_url><hash8>.<ext>`. An unreadable target logs a warning
    /// and yields the original reference — never an error to the caller.
    pub async fn resolve(&self, source_file: &Path, reference: Option<&str>) -> Option<String> {
        let reference = reference?;

        if !Self::is_resolvable(reference) {
            return Some(reference.to_string());
        }

        let ext = match Path::new(reference).extension() {
            Some(ext) => ext.to_string_lossy().into_owned(),
            None => return Some(reference.to_string()),
        };
        if ext == "md" {
            return Some(reference.to_string());
        }

        let base = source_file.parent().unwrap_or_else(|| Path::new("."));
        let target = base.join(reference);

        let bytes = match tokio::fs::read(&target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    reference,
                    target = %target.display(),
                    error = %e,
                    "asset unreadable, keeping original reference"
                );
                return Some(reference.to_string());
            }
        };

        let hash = format!("{:x}", Sha256::digest(&bytes));
        let name = format!("{}.{ext}", &hash[..8]);
        let key = format!("{hash}.{ext}");

        let cell = {
            let mut records = self.records.lock().expect("asset table poisoned");
            Arc::clone(records.entry(key).or_default())
        };

        let copied = cell
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.public_dir).await?;
                let dest = self.public_dir.join(&name);
                tokio::fs::write(&dest, &bytes).await?;
                debug!(source = %target.display(), dest = %dest.display(), "asset copied");
                Ok::<String, std::io::Error>(format!("{}{name}", self.public_url))
            })
            .await;

        match copied {
            Ok(url) => Some(url.clone()),
            Err(e) => {
                warn!(
                    reference,
                    target = %target.display(),
                    error = %e,
                    "asset copy failed, keeping original reference"
                );
                Some(reference.to_string())
            }
        }
    }

    /// Whether a reference is a candidate for resolution at all.
    fn is_resolvable(reference: &str) -> bool {
        !reference.starts_with('/')
            && !PASSTHROUGH_PREFIXES
                .iter()
                .any(|prefix| reference.starts_with(prefix))
    }

    /// Number of assets recorded so far (one per distinct content hash).
    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .expect("asset table poisoned")
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }
}
