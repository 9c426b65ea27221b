//! Default-style table – the baseline computed style of each tag, measured
//! once in an off-screen sandbox and reused for every later lookup.
//!
//! The sandbox is a private [`Document`] with no author stylesheet, so a bare
//! element placed in it resolves to the user-agent defaults for its tag
//! with inherited properties at their initial values.

use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::{Document, NodeId};
use crate::style::{ComputedStyle, StyleResolver, Stylesheet};

/// Tags that never render; their entry is empty and no sandbox is built.
pub const NON_VISUAL_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "noscript", "template", "defs", "symbol", "metadata",
    "title", "desc",
];

/// Tags measured by [`DefaultStyleTable::warm_up`].
pub const COMMON_TAGS: &[&str] = &[
    "div", "span", "p", "a", "img", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6",
    "table", "thead", "tbody", "tr", "td", "th", "section", "article", "header", "footer",
    "nav", "main", "aside", "button", "input", "label", "select", "option", "textarea", "form",
    "strong", "em", "b", "i", "code", "pre", "blockquote", "figure", "canvas", "svg",
];

const SANDBOX_CSS: &str =
    "position: absolute; left: -9999px; top: 0px; width: 0px; height: 0px; overflow: hidden";

/// Off-screen container the table measures elements in.
#[derive(Debug)]
struct Sandbox {
    doc: Document,
    container: NodeId,
    container_style: ComputedStyle,
    resolver: StyleResolver,
}

impl Sandbox {
    fn new() -> Self {
        let mut doc = Document::new();
        let container = doc.create_element_with_attrs(
            "div",
            vec![
                ("id".to_string(), "snap-sandbox".to_string()),
                ("style".to_string(), SANDBOX_CSS.to_string()),
            ],
        );
        let root = doc.root();
        doc.append_child(root, container);
        let resolver = StyleResolver::with_sheet(Stylesheet::default());
        let container_style = resolver
            .resolve(&doc, container, None)
            .unwrap_or_else(ComputedStyle::initial);
        Self {
            doc,
            container,
            container_style,
            resolver,
        }
    }

    /// Insert a bare `tag`, read its computed style, and remove it again.
    fn measure(&mut self, tag: &str) -> ComputedStyle {
        let el = self.doc.create_element(tag);
        self.doc.append_child(self.container, el);
        let style = self
            .resolver
            .resolve(&self.doc, el, Some(&self.container_style))
            .unwrap_or_default();
        self.doc.remove_child(self.container, el);
        style
    }
}

/// Per-tag default computed styles.
#[derive(Debug, Default)]
pub struct DefaultStyleTable {
    entries: HashMap<String, Rc<ComputedStyle>>,
    sandbox: Option<Sandbox>,
    measurements: usize,
}

impl DefaultStyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default style for `tag`, measuring it on first use.
    pub fn get(&mut self, tag: &str) -> Rc<ComputedStyle> {
        let tag = tag.to_ascii_lowercase();
        if let Some(entry) = self.entries.get(&tag) {
            return Rc::clone(entry);
        }
        let style = if NON_VISUAL_TAGS.contains(&tag.as_str()) {
            ComputedStyle::default()
        } else {
            self.measurements += 1;
            self.sandbox.get_or_insert_with(Sandbox::new).measure(&tag)
        };
        let entry = Rc::new(style);
        self.entries.insert(tag, Rc::clone(&entry));
        entry
    }

    /// Pre-populate the table for [`COMMON_TAGS`].
    pub fn warm_up(&mut self) {
        for tag in COMMON_TAGS {
            self.get(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(&tag.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of sandbox measurements performed so far.
    pub fn measurements(&self) -> usize {
        self.measurements
    }

    pub fn has_sandbox(&self) -> bool {
        self.sandbox.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_once_per_tag() {
        let mut table = DefaultStyleTable::new();
        let a = table.get("div");
        let b = table.get("DIV");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(table.measurements(), 1);
        assert_eq!(a.get("display"), Some("block"));
    }

    #[test]
    fn non_visual_tags_skip_the_sandbox() {
        let mut table = DefaultStyleTable::new();
        assert!(table.get("script").is_empty());
        assert!(table.get("defs").is_empty());
        assert!(!table.has_sandbox());
        assert_eq!(table.measurements(), 0);
    }

    #[test]
    fn sandbox_layout_does_not_leak_into_defaults() {
        let mut table = DefaultStyleTable::new();
        let span = table.get("span");
        assert_eq!(span.get("position"), Some("static"));
        assert_eq!(span.get("width"), Some("auto"));
        assert_eq!(span.get("display"), Some("inline"));
        assert_eq!(span.get("color"), Some("rgb(0, 0, 0)"));
    }

    #[test]
    fn warm_up_populates_common_tags() {
        let mut table = DefaultStyleTable::new();
        table.warm_up();
        assert_eq!(table.len(), COMMON_TAGS.len());
        let before = table.measurements();
        table.get("p");
        assert_eq!(table.measurements(), before);
    }
}
