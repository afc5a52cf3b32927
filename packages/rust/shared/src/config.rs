//! Project configuration for Presswork.
//!
//! A project is described by a `presswork.toml` at its root: the content
//! root, output directories, and one `[collections.<name>]` table per
//! collection. Computed fields and custom parsers are programmatic only
//! and attach via the library API, never the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PressworkError, Result};
use crate::schema::CollectionSchema;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "presswork.toml";

// ---------------------------------------------------------------------------
// Config structs (matching presswork.toml schema)
// ---------------------------------------------------------------------------

/// Top-level project config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Content root directory all collection patterns resolve against.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Collections keyed by name; one JSON artifact is written per key.
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSchema>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output: OutputConfig::default(),
            collections: BTreeMap::new(),
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one `<collection>.json` per collection.
    #[serde(default = "default_data_dir")]
    pub data: PathBuf,

    /// Directory receiving content-addressed asset copies.
    #[serde(default = "default_public_dir")]
    pub public: PathBuf,

    /// URL prefix rewritten references resolve under.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data: default_data_dir(),
            public: default_public_dir(),
            public_url: default_public_url(),
        }
    }
}

fn default_root() -> PathBuf {
    "content".into()
}
fn default_data_dir() -> PathBuf {
    "dist/data".into()
}
fn default_public_dir() -> PathBuf {
    "dist/public".into()
}
fn default_public_url() -> String {
    "/".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load and validate a project config from a specific file path.
pub fn load_site_config_from(path: &Path) -> Result<SiteConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PressworkError::io(path, e))?;

    let config: SiteConfig = toml::from_str(&content).map_err(|e| {
        PressworkError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    for (name, schema) in &config.collections {
        schema.validate(name)?;
    }

    Ok(config)
}

/// Write a starter config file at `path`. Refuses to overwrite.
pub fn init_site_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(PressworkError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    std::fs::write(path, STARTER_CONFIG).map_err(|e| PressworkError::io(path, e))?;
    tracing::info!(?path, "created starter config file");
    Ok(())
}

const STARTER_CONFIG: &str = r#"root = "content"

[output]
data = "dist/data"
public = "dist/public"
public_url = "/assets/"

[collections.posts]
pattern = "posts/*.md"
parser = "markdown"

[collections.posts.fields.title]
type = "string"
required = true

[collections.posts.fields.date]
type = "date"

[collections.posts.fields.cover]
type = "file"
"#;
