//! Deep clone engine.
//!
//! Walks a source subtree and builds a detached copy in a fresh
//! [`Document`], recording for every clone node the source node it came
//! from ([`NodeMap`]) and the style key of that source ([`StyleMap`]).
//!
//! Per element, in order:
//! 1. exclusion (marker attribute, `exclude` selectors, `filter`) yields a
//!    sized, invisible spacer
//! 2. the node kind picks the strategy: frame placeholder, placeholder
//!    marker, canvas freeze, slot projection, form-control state copy,
//!    image source pinning, shadow flattening, or a plain copy

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{error, warn};
use thiserror::Error;

use crate::cache::CaptureSession;
use crate::css::{PseudoElement, SelectorList};
use crate::dom::{CanvasError, Document, NodeData, NodeId};
use crate::key::StyleKey;
use crate::style::fmt_px;

/// Marker attribute; `exclude` or `placeholder`.
pub const CAPTURE_ATTR: &str = "data-capture";
/// Per-node override of the placeholder text.
pub const PLACEHOLDER_TEXT_ATTR: &str = "data-placeholder-text";
/// Set on spans materialised from `::before` / `::after`.
pub const PSEUDO_ATTR: &str = "data-snap-pseudo";
/// Set on synthetic placeholder and spacer elements.
pub const SYNTHETIC_ATTR: &str = "data-snap";

pub const DEFAULT_PLACEHOLDER_TEXT: &str = "Content unavailable";

/// Failure reported by a [`FilterFn`]. The node is kept.
#[derive(Debug, Error)]
#[error("filter failed: {0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors that abort a clone.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("node {0:?} is not part of the source document")]
    InvalidNode(NodeId),
    #[error("cannot export canvas {node:?}: {source}")]
    Canvas {
        node: NodeId,
        #[source]
        source: CanvasError,
    },
}

/// `(document, node, capture root) -> keep?`
pub type FilterFn = Box<dyn Fn(&Document, NodeId, NodeId) -> Result<bool, FilterError>>;

/// Options recognised by the clone engine.
pub struct CloneOptions {
    /// Selectors whose matches are replaced by spacers.
    pub exclude: Vec<String>,
    /// Returning `Ok(false)` replaces the node by a spacer.
    pub filter: Option<FilterFn>,
    /// Drop declarations equal to the tag's defaults from style keys.
    pub compress: bool,
    pub placeholder_text: String,
    /// Materialise `::before` / `::after` boxes as spans.
    pub capture_pseudo: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            filter: None,
            compress: true,
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_string(),
            capture_pseudo: false,
        }
    }
}

impl fmt::Debug for CloneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneOptions")
            .field("exclude", &self.exclude)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("compress", &self.compress)
            .field("placeholder_text", &self.placeholder_text)
            .field("capture_pseudo", &self.capture_pseudo)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Side tables
// ---------------------------------------------------------------------------

/// Clone node → source node, indexed by clone id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMap {
    sources: Vec<Option<NodeId>>,
    len: usize,
}

impl NodeMap {
    fn insert(&mut self, clone: NodeId, source: NodeId) {
        if self.sources.len() <= clone.0 {
            self.sources.resize(clone.0 + 1, None);
        }
        if self.sources[clone.0].replace(source).is_none() {
            self.len += 1;
        }
    }

    pub fn source(&self, clone: NodeId) -> Option<NodeId> {
        self.sources.get(clone.0).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `(clone, source)` pairs in clone-id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (NodeId(i), s)))
    }
}

/// Clone node → style key, in insertion (pre-order) order.
#[derive(Debug, Clone, Default)]
pub struct StyleMap {
    entries: Vec<(NodeId, StyleKey)>,
    index: HashMap<NodeId, usize>,
}

impl StyleMap {
    pub fn insert(&mut self, clone: NodeId, key: StyleKey) {
        match self.index.get(&clone) {
            Some(&i) => self.entries[i].1 = key,
            None => {
                self.index.insert(clone, self.entries.len());
                self.entries.push((clone, key));
            }
        }
    }

    pub fn get(&self, clone: NodeId) -> Option<&StyleKey> {
        self.index.get(&clone).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &StyleKey)> {
        self.entries.iter().map(|(n, k)| (*n, k))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of cloning one source node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cloned {
    Node(NodeId),
    /// Several detached siblings replacing one source node (slot projection).
    Fragment(Vec<NodeId>),
}

/// Everything a clone pass produces.
#[derive(Debug)]
pub struct CloneOutput {
    /// Clone tree; the top-level results hang off the document node.
    pub doc: Document,
    pub roots: Vec<NodeId>,
    pub node_map: NodeMap,
    pub style_map: StyleMap,
    /// Text of `<style>` elements harvested from shadow trees.
    pub shadow_css: Vec<String>,
}

impl CloneOutput {
    /// First top-level clone node.
    pub fn root(&self) -> Option<NodeId> {
        self.roots.first().copied()
    }
}

// ---------------------------------------------------------------------------
// Node classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormControl {
    Textarea,
    Input,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Text,
    Comment,
    /// Document or shadow root passed in directly.
    Container,
    CrossOriginFrame,
    Placeholder,
    Canvas,
    Slot,
    FormControl(FormControl),
    Image,
    ShadowHost { slotted: bool },
    Plain,
}

impl NodeKind {
    fn of(doc: &Document, node: NodeId) -> Self {
        let el = match &doc.node(node).data {
            NodeData::Text(_) => return NodeKind::Text,
            NodeData::Comment(_) => return NodeKind::Comment,
            NodeData::Document | NodeData::ShadowRoot { .. } => return NodeKind::Container,
            NodeData::Element(el) => el,
        };
        if doc.is_cross_origin_frame(node) {
            return NodeKind::CrossOriginFrame;
        }
        if el.attr(CAPTURE_ATTR) == Some("placeholder") {
            return NodeKind::Placeholder;
        }
        match el.tag.as_str() {
            "canvas" => NodeKind::Canvas,
            "slot" => NodeKind::Slot,
            "textarea" => NodeKind::FormControl(FormControl::Textarea),
            "input" => NodeKind::FormControl(FormControl::Input),
            "select" => NodeKind::FormControl(FormControl::Select),
            "img" => NodeKind::Image,
            _ => match el.shadow_root {
                Some(sr) => NodeKind::ShadowHost {
                    slotted: doc
                        .descendants(sr)
                        .into_iter()
                        .any(|n| doc.tag(n) == Some("slot")),
                },
                None => NodeKind::Plain,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Clone the subtree at `root` of the session's document.
pub fn clone_tree(
    session: &mut CaptureSession<'_, '_>,
    root: NodeId,
    options: &CloneOptions,
) -> Result<CloneOutput, CloneError> {
    let mut cloner = Cloner::new(session, options, root);
    let result = cloner.deep_clone(root)?;
    Ok(cloner.finish(result))
}

/// State of one clone pass.
pub struct Cloner<'a, 'd, 'c> {
    session: &'a mut CaptureSession<'d, 'c>,
    src: &'d Document,
    options: &'a CloneOptions,
    exclude: Vec<SelectorList>,
    root: NodeId,
    out: Document,
    node_map: NodeMap,
    style_map: StyleMap,
    shadow_css: Vec<String>,
}

impl<'a, 'd, 'c> Cloner<'a, 'd, 'c> {
    pub fn new(
        session: &'a mut CaptureSession<'d, 'c>,
        options: &'a CloneOptions,
        root: NodeId,
    ) -> Self {
        let src = session.document();
        let exclude = options
            .exclude
            .iter()
            .filter_map(|sel| match SelectorList::parse(sel) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("skipping invalid exclude selector {sel:?}: {e}");
                    None
                }
            })
            .collect();
        let mut out = Document::new();
        out.origin = src.origin.clone();
        out.device_pixel_ratio = src.device_pixel_ratio;
        out.viewport_width = src.viewport_width;
        Self {
            session,
            src,
            options,
            exclude,
            root,
            out,
            node_map: NodeMap::default(),
            style_map: StyleMap::default(),
            shadow_css: Vec::new(),
        }
    }

    /// Attach `result` under the clone document and hand out the tables.
    pub fn finish(mut self, result: Option<Cloned>) -> CloneOutput {
        let top = self.out.root();
        let roots = match result {
            Some(Cloned::Node(n)) => vec![n],
            Some(Cloned::Fragment(nodes)) => nodes,
            None => Vec::new(),
        };
        for &n in &roots {
            self.out.append_child(top, n);
        }
        CloneOutput {
            doc: self.out,
            roots,
            node_map: self.node_map,
            style_map: self.style_map,
            shadow_css: self.shadow_css,
        }
    }

    /// Clone `node` and everything below it.
    ///
    /// `Ok(None)` means the node produced no output.
    pub fn deep_clone(&mut self, node: NodeId) -> Result<Option<Cloned>, CloneError> {
        if !self.src.contains(node) {
            error!("clone aborted: {node:?} is not in the source document");
            return Err(CloneError::InvalidNode(node));
        }

        let kind = NodeKind::of(self.src, node);
        if !matches!(kind, NodeKind::Text | NodeKind::Comment | NodeKind::Container)
            && self.is_excluded(node)
        {
            return Ok(Some(Cloned::Node(self.spacer(node))));
        }

        let clone = match kind {
            NodeKind::Text | NodeKind::Comment => {
                let clone = self.shallow_clone(node)?;
                self.node_map.insert(clone, node);
                return Ok(Some(Cloned::Node(clone)));
            }
            NodeKind::Container => {
                let children = self.src.children(node).to_vec();
                let mut nodes = Vec::new();
                for cloned in self.clone_children(&children)? {
                    push_cloned(&mut nodes, cloned);
                }
                return Ok(Some(Cloned::Fragment(nodes)));
            }
            NodeKind::CrossOriginFrame => return Ok(Some(Cloned::Node(self.frame_placeholder(node)))),
            NodeKind::Placeholder => return self.placeholder(node).map(|n| Some(Cloned::Node(n))),
            NodeKind::Canvas => return self.freeze_canvas(node).map(|n| Some(Cloned::Node(n))),
            NodeKind::Slot => return self.project_slot(node).map(Some),
            NodeKind::FormControl(FormControl::Textarea) => {
                return self.clone_textarea(node).map(|n| Some(Cloned::Node(n)));
            }
            _ => {
                let clone = self.shallow_clone(node)?;
                self.node_map.insert(clone, node);
                clone
            }
        };

        let mut selected = None;
        match kind {
            NodeKind::Image => self.pin_image_source(node, clone),
            NodeKind::FormControl(FormControl::Input) => self.copy_input_state(node, clone),
            NodeKind::FormControl(FormControl::Select) => selected = self.src.selected_value(node),
            _ => {}
        }
        self.apply_style(node, clone, None);

        self.clone_pseudo(node, clone, PseudoElement::Before);
        let children = match kind {
            NodeKind::ShadowHost { slotted: true } => {
                self.harvest_shadow_styles(node);
                self.src.children(node).to_vec()
            }
            NodeKind::ShadowHost { slotted: false } => self.flatten_shadow(node),
            _ => self.src.children(node).to_vec(),
        };
        for cloned in self.clone_children(&children)? {
            self.attach(clone, cloned);
        }
        self.clone_pseudo(node, clone, PseudoElement::After);

        if let Some(value) = selected {
            self.apply_selection(clone, &value);
        }
        Ok(Some(Cloned::Node(clone)))
    }

    /// Clone `children` in order, skipping nodes a sibling slot already
    /// projected.
    fn clone_children(&mut self, children: &[NodeId]) -> Result<Vec<Cloned>, CloneError> {
        let mut consumed: HashSet<NodeId> = HashSet::new();
        let mut out = Vec::with_capacity(children.len());
        for &child in children {
            if consumed.contains(&child) {
                continue;
            }
            if self.src.tag(child) == Some("slot") {
                consumed.extend(self.src.assigned_nodes(child));
            }
            if let Some(cloned) = self.deep_clone(child)? {
                out.push(cloned);
            }
        }
        Ok(out)
    }

    fn attach(&mut self, parent: NodeId, cloned: Cloned) {
        match cloned {
            Cloned::Node(n) => self.out.append_child(parent, n),
            Cloned::Fragment(nodes) => {
                for n in nodes {
                    self.out.append_child(parent, n);
                }
            }
        }
    }

    fn shallow_clone(&mut self, node: NodeId) -> Result<NodeId, CloneError> {
        let Some(source) = self.src.get(node) else {
            error!("clone aborted: {node:?} is not in the source document");
            return Err(CloneError::InvalidNode(node));
        };
        let clone = match &source.data {
            NodeData::Element(el) => self
                .out
                .create_element_with_attrs(&el.tag, el.attributes.clone()),
            NodeData::Text(t) => self.out.create_text(t),
            NodeData::Comment(c) => self.out.create_comment(c),
            NodeData::Document | NodeData::ShadowRoot { .. } => {
                error!("clone aborted: {node:?} is not an element, text or comment");
                return Err(CloneError::InvalidNode(node));
            }
        };
        self.out.set_bounding_rect(clone, source.rect);
        Ok(clone)
    }

    fn apply_style(&mut self, source: NodeId, clone: NodeId, as_tag: Option<&str>) {
        let compress = self.options.compress;
        let key = match as_tag {
            Some(tag) => self.session.style_key_as(source, tag, compress),
            None => self.session.style_key(source, compress),
        };
        if let Some(key) = key {
            self.style_map.insert(clone, key);
        }
    }

    // -- exclusion -----------------------------------------------------------

    fn is_excluded(&self, node: NodeId) -> bool {
        if self.src.attr(node, CAPTURE_ATTR) == Some("exclude") {
            return true;
        }
        if self.exclude.iter().any(|list| list.matches(self.src, node)) {
            return true;
        }
        match &self.options.filter {
            Some(filter) => match filter(self.src, node, self.root) {
                Ok(keep) => !keep,
                Err(e) => {
                    warn!("{e}; keeping {node:?}");
                    false
                }
            },
            None => false,
        }
    }

    /// Invisible box holding the node's layout footprint.
    fn spacer(&mut self, node: NodeId) -> NodeId {
        let rect = self.src.bounding_rect(node);
        let style = format!(
            "display: inline-block; width: {}; height: {}; visibility: hidden",
            fmt_px(rect.width),
            fmt_px(rect.height)
        );
        let spacer = self.out.create_element_with_attrs(
            "div",
            vec![
                (SYNTHETIC_ATTR.to_string(), "spacer".to_string()),
                ("style".to_string(), style),
            ],
        );
        self.out.set_bounding_rect(spacer, rect);
        spacer
    }

    // -- substitutions -------------------------------------------------------

    fn frame_placeholder(&mut self, node: NodeId) -> NodeId {
        let rect = self.src.bounding_rect(node);
        let style = format!(
            "display: inline-block; box-sizing: border-box; width: {}; height: {}; \
             border: 1px dashed rgb(153, 153, 153); background-color: rgb(245, 245, 245); \
             color: rgb(102, 102, 102); font-size: 12px; text-align: center; overflow: hidden",
            fmt_px(rect.width),
            fmt_px(rect.height)
        );
        let boxed = self.out.create_element_with_attrs(
            "div",
            vec![
                (SYNTHETIC_ATTR.to_string(), "frame".to_string()),
                ("style".to_string(), style),
            ],
        );
        let label = self.out.create_text(&self.options.placeholder_text);
        self.out.append_child(boxed, label);
        self.out.set_bounding_rect(boxed, rect);
        boxed
    }

    /// Styled copy of the node with a text placeholder instead of its
    /// children.
    fn placeholder(&mut self, node: NodeId) -> Result<NodeId, CloneError> {
        let clone = self.shallow_clone(node)?;
        self.apply_style(node, clone, None);
        let text = self
            .src
            .attr(node, PLACEHOLDER_TEXT_ATTR)
            .unwrap_or(&self.options.placeholder_text)
            .to_string();
        let label = self.out.create_element_with_attrs(
            "div",
            vec![
                (SYNTHETIC_ATTR.to_string(), "placeholder".to_string()),
                (
                    "style".to_string(),
                    "display: flex; align-items: center; justify-content: center; \
                     width: 100%; height: 100%; color: rgb(136, 136, 136)"
                        .to_string(),
                ),
            ],
        );
        self.out.set_text_content(label, &text);
        self.out.append_child(clone, label);
        Ok(clone)
    }

    /// `<img>` showing the canvas pixels as they are now.
    fn freeze_canvas(&mut self, node: NodeId) -> Result<NodeId, CloneError> {
        let canvas_error = |source: CanvasError| {
            error!("clone aborted: canvas {node:?} could not be exported: {source}");
            CloneError::Canvas { node, source }
        };
        let src = self.src;
        let rect = src.bounding_rect(node);
        let canvas = src.canvas(node).ok_or_else(|| {
            canvas_error(CanvasError::Unavailable {
                width: rect.width as u32,
                height: rect.height as u32,
            })
        })?;
        let data_url = canvas.to_data_url().map_err(canvas_error)?;

        let mut attrs: Vec<(String, String)> = src
            .attributes(node)
            .iter()
            .filter(|(k, _)| k != "width" && k != "height")
            .cloned()
            .collect();
        attrs.push(("src".to_string(), data_url));
        attrs.push(("width".to_string(), canvas.width.to_string()));
        attrs.push(("height".to_string(), canvas.height.to_string()));
        let img = self.out.create_element_with_attrs("img", attrs);
        self.out.set_bounding_rect(img, rect);
        self.node_map.insert(img, node);
        self.apply_style(node, img, Some("img"));
        Ok(img)
    }

    /// Replace a slot by its assigned nodes, or by its fallback content.
    fn project_slot(&mut self, slot: NodeId) -> Result<Cloned, CloneError> {
        let assigned = self.src.assigned_nodes(slot);
        let sources = if assigned.is_empty() {
            self.src.children(slot).to_vec()
        } else {
            assigned
        };
        let mut nodes = Vec::new();
        for cloned in self.clone_children(&sources)? {
            push_cloned(&mut nodes, cloned);
        }
        Ok(Cloned::Fragment(nodes))
    }

    // -- element fixups ------------------------------------------------------

    fn pin_image_source(&mut self, img: NodeId, clone: NodeId) {
        if let Some(src) = self.src.current_src(img) {
            self.out.set_attr(clone, "src", &src);
        }
        self.out.remove_attr(clone, "srcset");
        self.out.remove_attr(clone, "sizes");
        self.out.set_attr(clone, "decoding", "sync");
        self.out.set_attr(clone, "loading", "eager");
    }

    fn clone_textarea(&mut self, node: NodeId) -> Result<NodeId, CloneError> {
        let clone = self.shallow_clone(node)?;
        self.node_map.insert(clone, node);
        let value = self.src.value(node);
        self.out.set_text_content(clone, &value);
        self.out.set_value(clone, &value);
        let rect = self.src.bounding_rect(node);
        self.out
            .set_inline_style_property(clone, "width", &fmt_px(rect.width));
        self.out
            .set_inline_style_property(clone, "height", &fmt_px(rect.height));
        self.apply_style(node, clone, None);
        Ok(clone)
    }

    fn copy_input_state(&mut self, node: NodeId, clone: NodeId) {
        let input_type = self
            .src
            .attr(node, "type")
            .unwrap_or("text")
            .to_ascii_lowercase();
        match input_type.as_str() {
            "checkbox" | "radio" => {
                let checked = self.src.checked(node);
                self.out.set_checked(clone, checked);
                if checked {
                    self.out.set_attr(clone, "checked", "");
                } else {
                    self.out.remove_attr(clone, "checked");
                }
                self.out
                    .set_indeterminate(clone, self.src.indeterminate(node));
            }
            "file" => {}
            _ => {
                let value = self.src.value(node);
                self.out.set_value(clone, &value);
                self.out.set_attr(clone, "value", &value);
            }
        }
    }

    fn apply_selection(&mut self, select: NodeId, value: &str) {
        self.out.set_value(select, value);
        let mut found = false;
        for option in self.out.options(select) {
            if !found && self.out.value(option) == value {
                found = true;
                self.out.set_attr(option, "selected", "");
            } else {
                self.out.remove_attr(option, "selected");
            }
        }
    }

    // -- shadow DOM ----------------------------------------------------------

    fn harvest_shadow_styles(&mut self, host: NodeId) {
        let Some(sr) = self.src.shadow_root(host) else {
            return;
        };
        for n in self.src.descendants(sr) {
            if self.src.tag(n) == Some("style") {
                self.push_shadow_css(n);
            }
        }
    }

    /// Shadow children to clone in place of the light children; `<style>`
    /// children are harvested instead.
    fn flatten_shadow(&mut self, host: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        for &child in self.src.shadow_children(host) {
            if self.src.tag(child) == Some("style") {
                self.push_shadow_css(child);
            } else {
                children.push(child);
            }
        }
        children
    }

    fn push_shadow_css(&mut self, style: NodeId) {
        let css = self.src.text_content(style);
        if !css.trim().is_empty() {
            self.shadow_css.push(css.trim().to_string());
        }
    }

    // -- pseudo-elements -----------------------------------------------------

    fn clone_pseudo(&mut self, node: NodeId, clone: NodeId, pseudo: PseudoElement) {
        if !self.options.capture_pseudo {
            return;
        }
        let Some((style, key)) = self
            .session
            .pseudo_style(node, pseudo, self.options.compress)
        else {
            return;
        };
        let span = self.out.create_element_with_attrs(
            "span",
            vec![(PSEUDO_ATTR.to_string(), pseudo.name().to_string())],
        );
        let text = content_text(style.get("content").unwrap_or(""));
        self.out.set_text_content(span, &text);
        self.out.append_child(clone, span);
        self.style_map.insert(span, key);
    }
}

fn push_cloned(nodes: &mut Vec<NodeId>, cloned: Cloned) {
    match cloned {
        Cloned::Node(n) => nodes.push(n),
        Cloned::Fragment(ns) => nodes.extend(ns),
    }
}

/// Literal text of a `content` value: quoted strings concatenated, anything
/// else (counters, `attr()`) dropped.
fn content_text(content: &str) -> String {
    let mut out = String::new();
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            continue;
        }
        while let Some(inner) = chars.next() {
            match inner {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                q if q == c => break,
                other => out.push(other),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StyleCache;
    use crate::dom::parse_html;
    use std::rc::Rc;

    fn clone_with(doc: &Document, root: NodeId, options: &CloneOptions) -> CloneOutput {
        let mut cache = StyleCache::new();
        let mut session = CaptureSession::new(doc, &mut cache);
        clone_tree(&mut session, root, options).unwrap()
    }

    fn first(doc: &Document, selector: &str) -> NodeId {
        doc.find_first(selector).unwrap().unwrap()
    }

    /// Tag/text outline of a subtree, e.g. `div(p("a"),span)`.
    fn shape(doc: &Document, node: NodeId) -> String {
        match &doc.node(node).data {
            NodeData::Text(t) => format!("{t:?}"),
            NodeData::Comment(_) => "#comment".to_string(),
            _ => {
                let children: Vec<String> =
                    doc.children(node).iter().map(|c| shape(doc, *c)).collect();
                let tag = doc.tag(node).unwrap_or("#root");
                if children.is_empty() {
                    tag.to_string()
                } else {
                    format!("{tag}({})", children.join(","))
                }
            }
        }
    }

    // -- scenarios -----------------------------------------------------------

    #[test]
    fn equal_styles_share_a_key() {
        let doc = parse_html(
            r#"<body><div style="color:red">a</div><div style="color:red">b</div></body>"#,
        );
        let out = clone_with(&doc, first(&doc, "body"), &CloneOptions::default());
        let body = out.root().unwrap();
        let divs = out.doc.children(body).to_vec();
        let a = out.style_map.get(divs[0]).unwrap();
        let b = out.style_map.get(divs[1]).unwrap();
        assert_eq!(&**a, "color:red");
        assert!(Rc::ptr_eq(a, b));
    }

    #[test]
    fn plain_tree_is_isomorphic() {
        let html = r#"<section><h1>Title</h1><ul><li>a</li><li>b <em>c</em></li></ul><!-- note --><p>end</p></section>"#;
        let doc = parse_html(html);
        let root = first(&doc, "section");
        let out = clone_with(&doc, root, &CloneOptions::default());
        assert_eq!(shape(&out.doc, out.root().unwrap()), shape(&doc, root));
        assert_eq!(out.node_map.len(), doc.descendants(root).len() + 1);
    }

    #[test]
    fn node_map_points_back_to_sources() {
        let doc = parse_html(r#"<div id="a"><p id="b">x</p></div>"#);
        let out = clone_with(&doc, first(&doc, "#a"), &CloneOptions::default());
        for (clone, source) in out.node_map.iter() {
            assert_eq!(out.doc.tag(clone), doc.tag(source));
            assert_eq!(out.doc.attr(clone, "id"), doc.attr(source, "id"));
        }
    }

    // -- exclusion -----------------------------------------------------------

    fn assert_spacer(doc: &Document, node: NodeId, width: &str, height: &str) {
        assert!(doc.children(node).is_empty());
        assert_eq!(doc.attr(node, SYNTHETIC_ATTR), Some("spacer"));
        assert_eq!(doc.inline_style_value(node, "width").as_deref(), Some(width));
        assert_eq!(doc.inline_style_value(node, "height").as_deref(), Some(height));
    }

    #[test]
    fn exclude_marker_becomes_spacer() {
        let doc = parse_html(
            r#"<div><aside data-capture="exclude" style="width:50px;height:20px"><b>gone</b></aside></div>"#,
        );
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        let spacer = out.doc.children(out.root().unwrap())[0];
        assert_spacer(&out.doc, spacer, "50px", "20px");
        assert!(out.node_map.source(spacer).is_none());
        assert!(out.style_map.get(spacer).is_none());
    }

    #[test]
    fn exclude_selectors_skip_invalid_entries() {
        let doc = parse_html(
            r#"<div><p class="ad" style="width:10px;height:5px">ad</p><p>keep</p></div>"#,
        );
        let options = CloneOptions {
            exclude: vec!["p[".to_string(), ".ad".to_string()],
            ..CloneOptions::default()
        };
        let out = clone_with(&doc, first(&doc, "div"), &options);
        let kids = out.doc.children(out.root().unwrap()).to_vec();
        assert_eq!(kids.len(), 2);
        assert_spacer(&out.doc, kids[0], "10px", "5px");
        assert_eq!(out.doc.text_content(kids[1]), "keep");
    }

    #[test]
    fn filter_false_excludes_and_error_keeps() {
        let doc = parse_html(r#"<div><span>drop</span><em>boom</em><b>keep</b></div>"#);
        let options = CloneOptions {
            filter: Some(Box::new(|doc: &Document, node: NodeId, _root: NodeId| {
                match doc.tag(node) {
                    Some("span") => Ok(false),
                    Some("em") => Err(FilterError::new("boom")),
                    _ => Ok(true),
                }
            })),
            ..CloneOptions::default()
        };
        let out = clone_with(&doc, first(&doc, "div"), &options);
        let kids = out.doc.children(out.root().unwrap()).to_vec();
        assert_eq!(out.doc.attr(kids[0], SYNTHETIC_ATTR), Some("spacer"));
        assert_eq!(out.doc.tag(kids[1]), Some("em"));
        assert_eq!(out.doc.text_content(kids[1]), "boom");
        assert_eq!(out.doc.tag(kids[2]), Some("b"));
    }

    #[test]
    fn filter_receives_capture_root() {
        let doc = parse_html(r#"<main><div><p>x</p></div></main>"#);
        let root = first(&doc, "main");
        let options = CloneOptions {
            filter: Some(Box::new(move |_doc: &Document, _node: NodeId, r: NodeId| {
                Ok(r == root)
            })),
            ..CloneOptions::default()
        };
        let out = clone_with(&doc, root, &options);
        assert_eq!(shape(&out.doc, out.root().unwrap()), r#"main(div(p("x")))"#);
    }

    // -- substitutions -------------------------------------------------------

    #[test]
    fn cross_origin_frame_is_boxed() {
        let mut doc = parse_html(
            r#"<div><iframe src="https://other.test/embed" width="300" height="200"></iframe><iframe srcdoc="<p>x</p>"></iframe></div>"#,
        );
        doc.origin = Some("https://example.com".to_string());
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        let kids = out.doc.children(out.root().unwrap()).to_vec();
        assert_eq!(out.doc.attr(kids[0], SYNTHETIC_ATTR), Some("frame"));
        assert_eq!(out.doc.text_content(kids[0]), DEFAULT_PLACEHOLDER_TEXT);
        assert_eq!(
            out.doc.inline_style_value(kids[0], "width").as_deref(),
            Some("300px")
        );
        assert_eq!(out.doc.tag(kids[1]), Some("iframe"));
    }

    #[test]
    fn placeholder_marker_drops_children() {
        let doc = parse_html(
            r#"<div><figure data-capture="placeholder" data-placeholder-text="Chart"><svg></svg><p>legend</p></figure></div>"#,
        );
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        let fig = out.doc.children(out.root().unwrap())[0];
        assert_eq!(out.doc.tag(fig), Some("figure"));
        assert_eq!(out.doc.children(fig).len(), 1);
        assert_eq!(out.doc.text_content(fig), "Chart");
        assert!(out.style_map.get(fig).is_some());
        assert!(out.node_map.source(fig).is_none());
    }

    #[test]
    fn canvas_is_frozen_as_image() {
        let mut doc = parse_html(r#"<div><canvas id="c" width="40" height="30"></canvas></div>"#);
        let canvas = first(&doc, "#c");
        doc.canvas_mut(canvas)
            .unwrap()
            .fill_rect(0, 0, 10, 10, [255, 0, 0, 255]);
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        let img = out.doc.children(out.root().unwrap())[0];
        assert_eq!(out.doc.tag(img), Some("img"));
        assert_eq!(out.doc.attr(img, "width"), Some("40"));
        assert_eq!(out.doc.attr(img, "height"), Some("30"));
        assert_eq!(out.doc.attr(img, "id"), Some("c"));
        assert!(out
            .doc
            .attr(img, "src")
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(out.node_map.source(img), Some(canvas));
        assert!(out.doc.descendants(out.doc.root()).iter().all(|n| out.doc.tag(*n) != Some("canvas")));
    }

    #[test]
    fn canvas_later_mutation_is_not_reflected() {
        let mut doc = parse_html(r#"<canvas width="4" height="4"></canvas>"#);
        let canvas = first(&doc, "canvas");
        let before = clone_with(&doc, canvas, &CloneOptions::default());
        let src_before = before.doc.attr(before.root().unwrap(), "src").unwrap().to_string();
        doc.canvas_mut(canvas)
            .unwrap()
            .fill_rect(0, 0, 4, 4, [0, 0, 255, 255]);
        assert_eq!(
            before.doc.attr(before.root().unwrap(), "src"),
            Some(src_before.as_str())
        );
        let after = clone_with(&doc, canvas, &CloneOptions::default());
        assert_ne!(after.doc.attr(after.root().unwrap(), "src"), Some(src_before.as_str()));
    }

    #[test]
    fn empty_canvas_aborts_the_clone() {
        let doc = parse_html(r#"<div><canvas width="0" height="0"></canvas></div>"#);
        let mut cache = StyleCache::new();
        let mut session = CaptureSession::new(&doc, &mut cache);
        let err = clone_tree(&mut session, first(&doc, "div"), &CloneOptions::default())
            .unwrap_err();
        assert!(matches!(err, CloneError::Canvas { .. }));
    }

    #[test]
    fn invalid_root_is_an_error() {
        let doc = parse_html("<p>x</p>");
        let mut cache = StyleCache::new();
        let mut session = CaptureSession::new(&doc, &mut cache);
        let err = clone_tree(&mut session, NodeId(999), &CloneOptions::default()).unwrap_err();
        assert!(matches!(err, CloneError::InvalidNode(NodeId(999))));
    }

    // -- form controls and images -----------------------------------------------

    #[test]
    fn textarea_value_and_size_are_frozen() {
        let mut doc = parse_html(
            r#"<form><textarea style="width:120px;height:40px">initial</textarea></form>"#,
        );
        let ta = first(&doc, "textarea");
        doc.set_value(ta, "hello");
        let out = clone_with(&doc, first(&doc, "form"), &CloneOptions::default());
        let clone = out.doc.children(out.root().unwrap())[0];
        assert_eq!(out.doc.text_content(clone), "hello");
        assert_eq!(out.doc.value(clone), "hello");
        assert_eq!(
            out.doc.inline_style_value(clone, "width").as_deref(),
            Some("120px")
        );
        assert_eq!(
            out.doc.inline_style_value(clone, "height").as_deref(),
            Some("40px")
        );
    }

    #[test]
    fn input_state_is_reflected() {
        let mut doc = parse_html(
            r#"<form><input id="t" value="old"><input id="c" type="checkbox"><input id="r" type="radio" checked></form>"#,
        );
        let (t, c, r) = (first(&doc, "#t"), first(&doc, "#c"), first(&doc, "#r"));
        doc.set_value(t, "typed");
        doc.set_checked(c, true);
        doc.set_indeterminate(c, true);
        doc.set_checked(r, false);
        let out = clone_with(&doc, first(&doc, "form"), &CloneOptions::default());
        let kids = out.doc.children(out.root().unwrap()).to_vec();
        assert_eq!(out.doc.attr(kids[0], "value"), Some("typed"));
        assert_eq!(out.doc.value(kids[0]), "typed");
        assert!(out.doc.checked(kids[1]));
        assert!(out.doc.has_attr(kids[1], "checked"));
        assert!(out.doc.indeterminate(kids[1]));
        assert!(!out.doc.checked(kids[2]));
        assert!(!out.doc.has_attr(kids[2], "checked"));
    }

    #[test]
    fn select_mirrors_live_choice() {
        let mut doc = parse_html(
            r#"<select><option value="a" selected>A</option><optgroup><option value="b">B</option></optgroup></select>"#,
        );
        let select = first(&doc, "select");
        doc.set_value(select, "b");
        let out = clone_with(&doc, select, &CloneOptions::default());
        let clone = out.root().unwrap();
        let options = out.doc.options(clone);
        assert_eq!(options.len(), 2);
        assert!(!out.doc.has_attr(options[0], "selected"));
        assert!(out.doc.has_attr(options[1], "selected"));
        assert_eq!(out.doc.selected_value(clone).as_deref(), Some("b"));
    }

    #[test]
    fn image_source_is_pinned() {
        let mut doc = parse_html(
            r#"<img src="small.png" srcset="small.png 1x, large.png 2x" sizes="100px" loading="lazy">"#,
        );
        doc.device_pixel_ratio = 2.0;
        let out = clone_with(&doc, first(&doc, "img"), &CloneOptions::default());
        let img = out.root().unwrap();
        assert_eq!(out.doc.attr(img, "src"), Some("large.png"));
        assert!(!out.doc.has_attr(img, "srcset"));
        assert!(!out.doc.has_attr(img, "sizes"));
        assert_eq!(out.doc.attr(img, "decoding"), Some("sync"));
        assert_eq!(out.doc.attr(img, "loading"), Some("eager"));
    }

    // -- shadow DOM and slots --------------------------------------------------

    #[test]
    fn slotted_shadow_keeps_only_light_content() {
        let doc = parse_html(
            r#"<x-card><template shadowrootmode="open"><style>.frame{padding:4px}</style><div class="frame">chrome</div><slot></slot></template><p>light</p></x-card>"#,
        );
        let out = clone_with(&doc, first(&doc, "x-card"), &CloneOptions::default());
        assert_eq!(shape(&out.doc, out.root().unwrap()), r#"x-card(p("light"))"#);
        assert_eq!(out.shadow_css, vec![".frame{padding:4px}".to_string()]);
    }

    #[test]
    fn slotless_shadow_is_flattened() {
        let doc = parse_html(
            r#"<x-badge><template shadowrootmode="open"><style>b{color:red}</style><b>shadow</b></template><i>light</i></x-badge>"#,
        );
        let out = clone_with(&doc, first(&doc, "x-badge"), &CloneOptions::default());
        assert_eq!(shape(&out.doc, out.root().unwrap()), r#"x-badge(b("shadow"))"#);
        assert_eq!(out.shadow_css.len(), 1);
        let b = out.doc.children(out.root().unwrap())[0];
        assert!(out.style_map.get(b).unwrap().contains("color:red"));
    }

    #[test]
    fn slot_projects_assigned_nodes() {
        let doc = parse_html(
            r#"<x-a><template shadowrootmode="open"><slot name="t"><em>fallback</em></slot><slot><u>default</u></slot></template><span slot="t">title</span><p>body</p></x-a>"#,
        );
        let host = first(&doc, "x-a");
        let sr = doc.shadow_root(host).unwrap();
        let slots: Vec<NodeId> = doc.children(sr).to_vec();

        let named = clone_with(&doc, slots[0], &CloneOptions::default());
        assert_eq!(named.roots.len(), 1);
        assert_eq!(shape(&named.doc, named.roots[0]), r#"span("title")"#);
        assert!(named.node_map.source(named.roots[0]).is_some());

        let unnamed = clone_with(&doc, slots[1], &CloneOptions::default());
        assert_eq!(shape(&unnamed.doc, unnamed.roots[0]), r#"p("body")"#);
    }

    #[test]
    fn shallow_clone_rejects_unknown_node() {
        let doc = parse_html("<p>x</p>");
        let options = CloneOptions::default();
        let mut cache = StyleCache::new();
        let mut session = CaptureSession::new(&doc, &mut cache);
        let mut cloner = Cloner::new(&mut session, &options, first(&doc, "p"));
        let err = cloner.shallow_clone(NodeId(999)).unwrap_err();
        assert!(matches!(err, CloneError::InvalidNode(NodeId(999))));
    }

    #[test]
    fn slot_assigned_sibling_is_cloned_once() {
        let doc = parse_html(
            r#"<x-a><template shadowrootmode="open"><slot></slot></template><p id="light">body</p></x-a>"#,
        );
        let host = first(&doc, "x-a");
        let slot = doc.shadow_children(host)[0];
        let light = first(&doc, "#light");
        assert_eq!(doc.assigned_nodes(slot), vec![light]);

        let options = CloneOptions::default();
        let mut cache = StyleCache::new();
        let mut session = CaptureSession::new(&doc, &mut cache);
        let mut cloner = Cloner::new(&mut session, &options, host);
        let cloned = cloner.clone_children(&[slot, light]).unwrap();
        let out = cloner.finish(None);

        assert_eq!(cloned.len(), 1);
        assert!(matches!(&cloned[0], Cloned::Fragment(nodes) if nodes.len() == 1));
        let copies = out
            .node_map
            .iter()
            .filter(|&(_, source)| source == light)
            .count();
        assert_eq!(copies, 1);
    }

    #[test]
    fn unassigned_slot_uses_fallback() {
        let doc = parse_html(r#"<div><slot><em>fallback</em></slot></div>"#);
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        assert_eq!(shape(&out.doc, out.root().unwrap()), r#"div(em("fallback"))"#);
    }

    // -- styles --------------------------------------------------------------

    #[test]
    fn hidden_nodes_are_keyed_with_zero_opacity() {
        let doc = parse_html(r#"<div style="visibility:hidden;opacity:0.7">x</div>"#);
        let out = clone_with(&doc, first(&doc, "div"), &CloneOptions::default());
        let key = out.style_map.get(out.root().unwrap()).unwrap();
        assert!(key.split(';').any(|d| d == "opacity:0"));
    }

    #[test]
    fn uncompressed_keys_carry_every_property() {
        let doc = parse_html("<p>x</p>");
        let options = CloneOptions {
            compress: false,
            ..CloneOptions::default()
        };
        let out = clone_with(&doc, first(&doc, "p"), &options);
        let key = out.style_map.get(out.root().unwrap()).unwrap();
        assert!(key.contains("display:block"));
        assert!(!key.contains("cursor:"));
    }

    #[test]
    fn pseudo_boxes_become_spans() {
        let doc = parse_html(
            r#"<style>li::before{content:"\2022 ";color:blue} li::after{content:"!"}</style><ul><li>item</li></ul>"#,
        );
        let options = CloneOptions {
            capture_pseudo: true,
            ..CloneOptions::default()
        };
        let out = clone_with(&doc, first(&doc, "li"), &options);
        let li = out.root().unwrap();
        let kids = out.doc.children(li).to_vec();
        assert_eq!(kids.len(), 3);
        assert_eq!(out.doc.attr(kids[0], PSEUDO_ATTR), Some("before"));
        assert_eq!(out.doc.attr(kids[2], PSEUDO_ATTR), Some("after"));
        assert_eq!(out.doc.text_content(kids[2]), "!");
        assert!(out.style_map.get(kids[0]).unwrap().contains("color:blue"));

        let plain = clone_with(&doc, first(&doc, "li"), &CloneOptions::default());
        assert_eq!(plain.doc.children(plain.root().unwrap()).len(), 1);
    }

    #[test]
    fn content_text_joins_quoted_strings() {
        assert_eq!(content_text(r#""a" "b""#), "ab");
        assert_eq!(content_text(r#"'it\'s'"#), "it's");
        assert_eq!(content_text("counter(x)"), "");
    }
}
