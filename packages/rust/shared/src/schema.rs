//! Declarative field schemas for collections.
//!
//! A collection declares a glob `pattern`, a `parser` type key, and a map
//! of field descriptors. Field descriptors form a small recursive sum
//! type: scalars (`string`/`number`/`boolean`/`date`), `file` references,
//! `nested` maps, and `list`s of any of those. Every descriptor accepts
//! `required` and `default`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PressworkError, Result};
use crate::types::Entry;

/// A named map of field descriptors.
pub type FieldMap = BTreeMap<String, FieldSpec>;

/// Boxed future used by computed-field functions and parsers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A computed-field function: receives the already-typed entry and yields
/// an additional field value, evaluated strictly after field processing.
pub type ComputedFn = Arc<dyn Fn(Entry) -> BoxFuture<Value> + Send + Sync>;

/// Named computed-field functions for one collection.
pub type ComputedMap = BTreeMap<String, ComputedFn>;

/// The kind tag of a field descriptor.
///
/// Unknown tags deserialize to [`FieldKind::Other`]; the field processor
/// passes their raw values through unchanged (non-strict mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    File,
    Nested,
    List,
    Other,
}

impl<'de> Deserialize<'de> for FieldKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "file" => Self::File,
            "nested" => Self::Nested,
            "list" => Self::List,
            _ => Self::Other,
        })
    }
}

/// Element descriptor for `list` fields: a scalar/file kind tag, or a
/// nested field map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListOf {
    Item(ItemKind),
    Nested(FieldMap),
}

/// Scalar or file kind tag usable as a list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    String,
    Number,
    Boolean,
    Date,
    File,
}

/// One field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Kind tag.
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Entries missing this field (with no default) are dropped.
    #[serde(default)]
    pub required: bool,

    /// Fallback value when the raw field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Element descriptor — `list` fields only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<ListOf>,

    /// Inner field map — `nested` fields only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldMap>,
}

impl FieldSpec {
    /// A plain descriptor of the given kind with no modifiers.
    pub fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            of: None,
            fields: None,
        }
    }

    /// Builder-style `required` toggle, for tests and programmatic schemas.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder-style default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Schema for one collection: glob pattern, parser type key, declared
/// fields, and optional computed-field functions (programmatic only —
/// never serialized).
#[derive(Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Glob pattern relative to the content root (e.g. `posts/*.md`).
    pub pattern: String,

    /// Parser type key: `yaml`, `json`, `markdown`, or a user-registered key.
    pub parser: String,

    /// Declared field descriptors.
    #[serde(default)]
    pub fields: FieldMap,

    /// Computed-field functions, merged in after field processing.
    #[serde(skip)]
    pub computed: ComputedMap,
}

impl fmt::Debug for CollectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSchema")
            .field("pattern", &self.pattern)
            .field("parser", &self.parser)
            .field("fields", &self.fields)
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CollectionSchema {
    /// Check structural invariants of the declared fields.
    pub fn validate(&self, collection: &str) -> Result<()> {
        validate_fields(&self.fields, collection)
    }
}

/// Recursively check a field map: `list` needs `of`, `nested` needs
/// `fields`, and declared defaults must match the declared kind.
pub fn validate_fields(fields: &FieldMap, context: &str) -> Result<()> {
    for (name, spec) in fields {
        let at = format!("{context}.{name}");

        match spec.kind {
            FieldKind::List => match &spec.of {
                None => {
                    return Err(PressworkError::validation(format!(
                        "field `{at}`: list requires `of`"
                    )));
                }
                Some(ListOf::Nested(inner)) => validate_fields(inner, &at)?,
                Some(ListOf::Item(_)) => {}
            },
            FieldKind::Nested => match &spec.fields {
                None => {
                    return Err(PressworkError::validation(format!(
                        "field `{at}`: nested requires `fields`"
                    )));
                }
                Some(inner) => validate_fields(inner, &at)?,
            },
            _ => {}
        }

        if let Some(default) = &spec.default {
            if !default_matches_kind(spec.kind, default) {
                return Err(PressworkError::validation(format!(
                    "field `{at}`: default does not match declared type"
                )));
            }
        }
    }
    Ok(())
}

fn default_matches_kind(kind: FieldKind, default: &Value) -> bool {
    match kind {
        FieldKind::String | FieldKind::Date | FieldKind::File => default.is_string(),
        FieldKind::Number => default.is_number(),
        FieldKind::Boolean => default.is_boolean(),
        FieldKind::Nested => default.is_object(),
        FieldKind::List => default.is_array(),
        FieldKind::Other => true,
    }
}
