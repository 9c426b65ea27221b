//! Pipeline – ties together parsing, style capture, cloning and class
//! generation into a single function call.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheStats, CaptureSession, StyleCache};
use crate::classes::{
    apply_classes, class_css, collect_used_tag_names, generate_css_classes,
    generate_deduped_base_css, ClassMap,
};
use crate::clone::{clone_tree, CloneError, CloneOptions, CloneOutput, DEFAULT_PLACEHOLDER_TEXT};
use crate::css::SelectorError;
use crate::dom::{parse_html, Document, NodeId};

/// Configuration for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Selector of the capture root (default: `body`).
    pub selector: String,
    /// Selectors replaced by spacers.
    pub exclude: Vec<String>,
    /// Diff style keys against tag defaults (default: true).
    pub compress: bool,
    pub placeholder_text: String,
    /// Materialise `::before` / `::after` boxes (default: false).
    pub capture_pseudo: bool,
    /// Emit the deduplicated default-style sheet (default: true).
    pub base_css: bool,
    /// Measure common tag defaults before cloning (default: true).
    pub warm_up: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            selector: "body".to_string(),
            exclude: Vec::new(),
            compress: true,
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_string(),
            capture_pseudo: false,
            base_css: true,
            warm_up: true,
        }
    }
}

impl CaptureConfig {
    /// Parse a (possibly partial) JSON config; missing fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Clone-engine options for this config (no filter).
    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions {
            exclude: self.exclude.clone(),
            filter: None,
            compress: self.compress,
            placeholder_text: self.placeholder_text.clone(),
            capture_pseudo: self.capture_pseudo,
        }
    }
}

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture selector {selector:?}: {source}")]
    Selector {
        selector: String,
        #[source]
        source: SelectorError,
    },
    #[error("no element matches {0:?}")]
    NoMatch(String),
    #[error(transparent)]
    Clone(#[from] CloneError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A finished capture: the styled clone tree and its stylesheet.
#[derive(Debug)]
pub struct Snapshot {
    pub clone: CloneOutput,
    pub classes: ClassMap,
    /// `.cN{...}` rules.
    pub class_css: String,
    /// Shared default-style rules; empty when disabled.
    pub base_css: String,
    /// Tag names present in the clone.
    pub tags: Vec<String>,
    pub stats: CacheStats,
}

impl Snapshot {
    /// Base CSS, shadow CSS and class CSS, in cascade order.
    pub fn stylesheet(&self) -> String {
        std::iter::once(self.base_css.as_str())
            .chain(self.clone.shadow_css.iter().map(String::as_str))
            .chain(std::iter::once(self.class_css.as_str()))
            .filter(|css| !css.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Element selected by `selector`. The default `body` selector falls back
/// to the whole document for fragments without a body.
pub fn resolve_root(doc: &Document, selector: &str) -> Result<NodeId, CaptureError> {
    let found = doc
        .find_first(selector)
        .map_err(|source| CaptureError::Selector {
            selector: selector.to_string(),
            source,
        })?;
    match found {
        Some(node) => Ok(node),
        None if selector.trim() == "body" => Ok(doc.root()),
        None => Err(CaptureError::NoMatch(selector.to_string())),
    }
}

/// Capture the subtree at `root` with options derived from `config`.
pub fn capture(
    doc: &Document,
    root: NodeId,
    config: &CaptureConfig,
    cache: &mut StyleCache,
) -> Result<Snapshot, CaptureError> {
    capture_with(doc, root, config, &config.clone_options(), cache)
}

/// Capture with explicit clone options (e.g. to install a filter).
/// `config` still controls warm-up and base CSS.
pub fn capture_with(
    doc: &Document,
    root: NodeId,
    config: &CaptureConfig,
    options: &CloneOptions,
    cache: &mut StyleCache,
) -> Result<Snapshot, CaptureError> {
    if config.warm_up {
        cache.defaults.warm_up();
    }

    // 1. Clone
    let (mut clone, stats) = {
        let mut session = CaptureSession::new(doc, cache);
        let clone = clone_tree(&mut session, root, options)?;
        (clone, session.stats())
    };
    debug!(
        "capture: {} clone nodes, {} styled, {} keys; computed {}/{} snapshot {}/{} key {}/{} (hit/miss), {} default entries",
        clone.node_map.len(),
        clone.style_map.len(),
        cache.key_count(),
        stats.computed_hits,
        stats.computed_misses,
        stats.snapshot_hits,
        stats.snapshot_misses,
        stats.key_hits,
        stats.key_misses,
        stats.default_entries,
    );

    // 2. Classes
    let classes = generate_css_classes(&clone.style_map);
    apply_classes(&mut clone.doc, &clone.style_map, &classes);
    let class_css = class_css(&classes);

    // 3. Base CSS
    let mut tags: Vec<String> = Vec::new();
    for &root in &clone.roots {
        for tag in collect_used_tag_names(&clone.doc, root) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    let base_css = if config.base_css {
        generate_deduped_base_css(&tags, &mut cache.defaults)
    } else {
        String::new()
    };

    Ok(Snapshot {
        clone,
        classes,
        class_css,
        base_css,
        tags,
        stats,
    })
}

/// Full pipeline: HTML string → snapshot, with a fresh cache.
pub fn capture_html(html: &str, config: &CaptureConfig) -> Result<Snapshot, CaptureError> {
    let doc = parse_html(html);
    let root = resolve_root(&doc, &config.selector)?;
    let mut cache = StyleCache::new();
    capture(&doc, root, config, &mut cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_basic() {
        let html = r#"<body><h1 style="color:navy">Hello</h1><p>World</p></body>"#;
        let snap = capture_html(html, &CaptureConfig::default()).unwrap();
        assert_eq!(snap.tags, vec!["body", "h1", "p"]);
        assert_eq!(snap.class_css, ".c1{color:navy}");
        assert!(snap.base_css.contains("h1{"));
        let h1 = snap.clone.doc.find_first("h1").unwrap().unwrap();
        assert_eq!(snap.clone.doc.attr(h1, "class"), Some("c1"));
    }

    #[test]
    fn config_from_partial_json() {
        let config =
            CaptureConfig::from_json(r#"{"selector": "main", "compress": false}"#).unwrap();
        assert_eq!(config.selector, "main");
        assert!(!config.compress);
        assert!(config.base_css);
        assert_eq!(config.placeholder_text, DEFAULT_PLACEHOLDER_TEXT);
        assert!(CaptureConfig::from_json("{").is_err());
    }

    #[test]
    fn config_json_round_trip() {
        let config = CaptureConfig {
            exclude: vec![".ad".to_string()],
            capture_pseudo: true,
            ..CaptureConfig::default()
        };
        assert_eq!(CaptureConfig::from_json(&config.to_json()).unwrap(), config);
    }

    #[test]
    fn oversized_canvas_is_a_capture_error() {
        let html = r#"<body><canvas width="4294967295" height="4294967295"></canvas></body>"#;
        let err = capture_html(html, &CaptureConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Clone(CloneError::Canvas { .. })
        ));
    }

    #[test]
    fn fragment_without_body_captures_document() {
        let snap = capture_html("<p>a</p><p>b</p>", &CaptureConfig::default()).unwrap();
        assert_eq!(snap.clone.roots.len(), 2);
    }

    #[test]
    fn missing_and_invalid_selectors() {
        let doc = parse_html("<main></main>");
        assert!(matches!(
            resolve_root(&doc, "#nope"),
            Err(CaptureError::NoMatch(_))
        ));
        assert!(matches!(
            resolve_root(&doc, "main >"),
            Err(CaptureError::Selector { .. })
        ));
    }

    #[test]
    fn base_css_can_be_disabled() {
        let config = CaptureConfig {
            base_css: false,
            warm_up: false,
            ..CaptureConfig::default()
        };
        let snap = capture_html("<body><div>x</div></body>", &config).unwrap();
        assert!(snap.base_css.is_empty());
        assert!(snap.stylesheet().is_empty());
    }

    #[test]
    fn shared_cache_reuses_defaults() {
        let doc = parse_html(r#"<body><div style="color:red">a</div></body>"#);
        let root = resolve_root(&doc, "body").unwrap();
        let mut cache = StyleCache::new();
        let config = CaptureConfig::default();
        capture(&doc, root, &config, &mut cache).unwrap();
        let measured = cache.defaults.measurements();
        let second = capture(&doc, root, &config, &mut cache).unwrap();
        assert_eq!(cache.defaults.measurements(), measured);
        assert_eq!(second.stats.key_misses, 0);
        assert_eq!(second.stats.key_hits, 2);
        assert_eq!(second.stats.snapshot_misses, 2);
    }
}
