//! Frontmatter-aware Markdown transformation.
//!
//! Parses a Markdown document into `{data, raw, html, excerpt}`: a leading
//! YAML frontmatter block becomes `data`, link/image destinations and
//! `href`/`src` attributes inside raw HTML are piped through the
//! [`AssetStore`], HTML comments are blanked, and the (possibly rewritten)
//! body is kept both as Markdown (`raw`) and rendered HTML (`html`).
//!
//! Rewrites are applied as byte-range edits against the source text, using
//! pulldown-cmark's offset iterator, so everything the parser does not
//! touch round-trips exactly.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use pulldown_cmark::{Event, MetadataBlockKind, Options, Parser, Tag, TagEnd};
use serde_json::{Map, Value};
use tracing::debug;

use presswork_assets::AssetStore;
use presswork_shared::{PressworkError, Result};

/// Text leaves concatenated into the excerpt.
const EXCERPT_TEXT_LEAVES: usize = 5;
/// Excerpt length cap, in characters (not word-boundary aware).
const EXCERPT_MAX_CHARS: usize = 100;

/// Result of transforming one Markdown document.
#[derive(Debug, Clone, Default)]
pub struct ParsedMarkdown {
    /// Frontmatter key/value pairs (empty when no leading YAML block).
    pub data: Map<String, Value>,
    /// The body re-serialized as Markdown, with references rewritten.
    pub raw: String,
    /// The body rendered to HTML, embedded raw HTML passed through.
    pub html: String,
    /// First text leaves of the document, capped at 100 characters.
    pub excerpt: String,
}

/// One pending text edit: replace `span` of the source with `replacement`.
#[derive(Debug)]
struct Edit {
    span: Range<usize>,
    replacement: String,
}

/// Frontmatter-aware Markdown → `{data, raw, html, excerpt}` transformer.
pub struct MarkdownTransformer {
    store: Arc<AssetStore>,
}

impl MarkdownTransformer {
    pub fn new(store: Arc<AssetStore>) -> Self {
        Self { store }
    }

    /// Transform `text`, resolving asset references relative to `source_file`.
    pub async fn parse(&self, text: &str, source_file: &Path) -> Result<ParsedMarkdown> {
        let scan = scan(text);

        let data = match &scan.frontmatter {
            Some(block) => parse_frontmatter(&block.yaml, source_file)?,
            None => Map::new(),
        };

        // Resolve every collected reference once; identical refs share a result.
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for url in scan
            .link_sites
            .iter()
            .map(|site| &site.url)
            .chain(scan.html_sites.iter().flat_map(|site| &site.urls))
        {
            if !resolved.contains_key(url) {
                if let Some(new) = self.store.resolve(source_file, Some(url)).await {
                    resolved.insert(url.clone(), new);
                }
            }
        }

        let raw = apply_edits(text, &scan, &resolved);

        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, Parser::new_ext(&raw, markdown_options()));

        Ok(ParsedMarkdown {
            data,
            raw,
            html,
            excerpt: scan.excerpt,
        })
    }
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    options
}

// ---------------------------------------------------------------------------
// Event scan
// ---------------------------------------------------------------------------

/// A leading YAML frontmatter block.
struct FrontmatterBlock {
    span: Range<usize>,
    yaml: String,
}

/// Exact byte span of one link/image destination URL.
struct LinkSite {
    span: Range<usize>,
    url: String,
}

/// One raw-HTML event carrying `href`/`src` attribute values.
struct HtmlSite {
    span: Range<usize>,
    urls: Vec<String>,
}

#[derive(Default)]
struct Scan {
    frontmatter: Option<FrontmatterBlock>,
    link_sites: Vec<LinkSite>,
    html_sites: Vec<HtmlSite>,
    comment_spans: Vec<Range<usize>>,
    excerpt: String,
}

/// Single pass over the document collecting frontmatter, rewrite sites,
/// comment spans, and the excerpt.
fn scan(text: &str) -> Scan {
    let mut scan = Scan::default();
    let mut in_metadata = false;
    let mut in_code_block = false;
    let mut text_leaves = 0usize;

    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_metadata = true;
                scan.frontmatter = Some(FrontmatterBlock {
                    span: range,
                    yaml: String::new(),
                });
            }
            Event::End(TagEnd::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_metadata = false;
                if let Some(block) = scan.frontmatter.as_mut() {
                    block.span.end = block.span.end.max(range.end);
                }
            }
            Event::Text(value) if in_metadata => {
                if let Some(block) = scan.frontmatter.as_mut() {
                    block.yaml.push_str(&value);
                }
            }

            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,

            Event::Start(Tag::Link { dest_url, .. })
            | Event::Start(Tag::Image { dest_url, .. }) => {
                // Locate the destination text inside the construct; a
                // reference-style link has no inline destination to edit.
                match text[range.clone()].find(dest_url.as_ref()) {
                    Some(offset) if !dest_url.is_empty() => {
                        let start = range.start + offset;
                        scan.link_sites.push(LinkSite {
                            span: start..start + dest_url.len(),
                            url: dest_url.to_string(),
                        });
                    }
                    _ => debug!(url = %dest_url, "destination not inline, skipping rewrite"),
                }
            }

            Event::Html(value) | Event::InlineHtml(value) => {
                if value.trim_start().starts_with("<!--") {
                    scan.comment_spans.push(range);
                } else {
                    let urls = html_attribute_urls(&value);
                    if !urls.is_empty() {
                        scan.html_sites.push(HtmlSite { span: range, urls });
                    }
                }
            }

            Event::Text(value) if !in_code_block => {
                if text_leaves < EXCERPT_TEXT_LEAVES {
                    scan.excerpt.push_str(&value);
                    text_leaves += 1;
                }
            }

            _ => {}
        }
    }

    scan.excerpt = scan.excerpt.chars().take(EXCERPT_MAX_CHARS).collect();
    scan
}

/// Collect `href`/`src` attribute values from a raw-HTML fragment.
fn html_attribute_urls(fragment: &str) -> Vec<String> {
    let parsed = scraper::Html::parse_fragment(fragment);
    let mut urls = Vec::new();

    for node in parsed.tree.nodes() {
        if let scraper::Node::Element(element) = node.value() {
            for attr in ["href", "src"] {
                if let Some(value) = element.attr(attr) {
                    if !value.is_empty() {
                        urls.push(value.to_string());
                    }
                }
            }
        }
    }

    urls
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Apply frontmatter removal, comment blanking, and URL rewrites as
/// non-overlapping byte-span edits, back to front.
fn apply_edits(text: &str, scan: &Scan, resolved: &BTreeMap<String, String>) -> String {
    let mut edits: Vec<Edit> = Vec::new();

    if let Some(block) = &scan.frontmatter {
        edits.push(Edit {
            span: block.span.clone(),
            replacement: String::new(),
        });
    }

    for span in &scan.comment_spans {
        edits.push(Edit {
            span: span.clone(),
            replacement: String::new(),
        });
    }

    for site in &scan.link_sites {
        if let Some(new) = resolved.get(&site.url) {
            if new != &site.url {
                edits.push(Edit {
                    span: site.span.clone(),
                    replacement: new.clone(),
                });
            }
        }
    }

    // Literal substring replacement of each old URL inside raw-HTML text.
    // Longest URLs match first, and a span already claimed by one URL is
    // never re-edited for a shorter URL that happens to sit inside it.
    for site in &scan.html_sites {
        let slice = &text[site.span.clone()];
        let mut urls: Vec<&String> = site.urls.iter().collect();
        urls.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        urls.dedup();

        let mut claimed: Vec<Range<usize>> = Vec::new();
        for url in urls {
            let Some(new) = resolved.get(url) else { continue };
            if new == url {
                continue;
            }
            let mut search_from = 0;
            while let Some(offset) = slice[search_from..].find(url.as_str()) {
                let span = search_from + offset..search_from + offset + url.len();
                search_from = span.end;
                if claimed.iter().any(|c| c.start < span.end && span.start < c.end) {
                    continue;
                }
                edits.push(Edit {
                    span: site.span.start + span.start..site.span.start + span.end,
                    replacement: new.clone(),
                });
                claimed.push(span);
            }
        }
    }

    edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));
    edits.dedup_by(|a, b| a.span == b.span);

    let mut output = text.to_string();
    for edit in edits {
        output.replace_range(edit.span, &edit.replacement);
    }

    output.trim_start().to_string()
}

/// Parse a frontmatter YAML document into a JSON object map.
fn parse_frontmatter(yaml: &str, source_file: &Path) -> Result<Map<String, Value>> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| {
        PressworkError::parse(format!("{}: bad frontmatter: {e}", source_file.display()))
    })?;

    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(PressworkError::parse(format!(
            "{}: frontmatter is not JSON-representable: {e}",
            source_file.display()
        ))),
    }
}
