//! Source document – an arena DOM that the snapshot cloner reads from and
//! writes its clone trees into.
//!
//! Besides markup (tags, attributes, text) a [`Document`] carries the "live"
//! state a browser would hold next to the tree:
//! - layout rectangles per node
//! - attached shadow roots and slot assignment
//! - form-control values that diverge from their attributes
//! - canvas pixel buffers
//!
//! Nodes are addressed by a stable [`NodeId`] that is never reused within a
//! document, so side tables keyed by id stay valid for its whole lifetime.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Index of a node inside its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Bounding client rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// The document root. Parsed top-level nodes are its children.
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
    /// Root of an attached shadow tree. Not part of the host's child list.
    ShadowRoot { host: NodeId },
}

/// Tag, ordered attributes, and the optional shadow root of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Lower-cased tag name.
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub shadow_root: Option<NodeId>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            shadow_root: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub rect: Rect,
}

/// Live state of a form control. `None` fields fall back to markup.
#[derive(Debug, Clone, Default)]
struct FormState {
    value: Option<String>,
    checked: Option<bool>,
    indeterminate: bool,
}

/// Errors raised when exporting canvas pixels.
#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas context unavailable ({width}x{height} surface)")]
    Unavailable { width: u32, height: u32 },
    #[error("PNG encode error: {0}")]
    Encode(String),
}

/// RGBA8 pixel surface backing a `<canvas>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasBuffer {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

/// Largest pixel count a surface is allocated for (16384 x 16384).
pub const MAX_CANVAS_AREA: u64 = 16_384 * 16_384;

impl CanvasBuffer {
    /// A fully transparent surface. Surfaces larger than
    /// [`MAX_CANVAS_AREA`] keep their size but get no pixels, so exporting
    /// them fails like an empty canvas does.
    pub fn new(width: u32, height: u32) -> Self {
        let area = u64::from(width) * u64::from(height);
        let pixels = if area <= MAX_CANVAS_AREA {
            usize::try_from(area)
                .ok()
                .and_then(|a| a.checked_mul(4))
                .map(|len| vec![0; len])
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Self {
            width,
            height,
            pixels,
        }
    }

    /// `false` for zero-sized or oversized surfaces.
    pub fn is_available(&self) -> bool {
        !self.pixels.is_empty()
    }

    /// Fill a rectangle with an RGBA colour, clipped to the surface.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgba: [u8; 4]) {
        if !self.is_available() {
            return;
        }
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x.min(self.width)..x_end {
                let i = (py as usize * self.width as usize + px as usize) * 4;
                self.pixels[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if !self.is_available() || x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Encode the current pixels as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, CanvasError> {
        if !self.is_available() {
            return Err(CanvasError::Unavailable {
                width: self.width,
                height: self.height,
            });
        }
        let img = ::image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| CanvasError::Encode("pixel buffer size mismatch".to_string()))?;
        let mut bytes = Vec::new();
        ::image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ::image::ImageFormat::Png)
            .map_err(|e| CanvasError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Encode the current pixels as a `data:image/png;base64,...` URI.
    pub fn to_data_url(&self) -> Result<String, CanvasError> {
        let png = self.to_png()?;
        Ok(format!("data:image/png;base64,{}", BASE64_STD.encode(png)))
    }
}

/// Elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching closing tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script", "textarea", "title"];

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Arena-backed DOM tree plus the live state a renderer would attach to it.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    forms: HashMap<NodeId, FormState>,
    canvases: HashMap<NodeId, CanvasBuffer>,
    /// Origin (`scheme://host[:port]`) used for cross-origin frame checks.
    pub origin: Option<String>,
    pub device_pixel_ratio: f32,
    /// Used to resolve `w` descriptors when an image has no rendered width.
    pub viewport_width: f32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
                rect: Rect::default(),
            }],
            root: NodeId(0),
            forms: HashMap::new(),
            canvases: HashMap::new(),
            origin: None,
            device_pixel_ratio: 1.0,
            viewport_width: 1024.0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Panics on an id from another document; use [`Document::get`] when the
    /// id is untrusted.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        });
        id
    }

    // -- construction ------------------------------------------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with_attrs(tag, Vec::new())
    }

    /// Create a detached element. Canvases get a pixel surface sized from
    /// their `width`/`height` attributes (300x150 by default).
    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        let mut data = ElementData::new(tag);
        data.attributes = attrs;
        let is_canvas = data.tag == "canvas";
        let (cw, ch) = (
            data.attr("width").and_then(|v| v.trim().parse().ok()).unwrap_or(300u32),
            data.attr("height").and_then(|v| v.trim().parse().ok()).unwrap_or(150u32),
        );
        let id = self.push(NodeData::Element(data));
        if is_canvas {
            self.canvases.insert(id, CanvasBuffer::new(cw, ch));
            self.nodes[id.0].rect = Rect::sized(cw as f32, ch as f32);
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    /// Append `child` to `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old) = self.nodes[child.0].parent {
            self.nodes[old.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.retain(|c| *c != child);
        if self.nodes[child.0].parent == Some(parent) {
            self.nodes[child.0].parent = None;
        }
    }

    // -- navigation ----------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// Light-tree descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => t.clone(),
            NodeData::Comment(_) => String::new(),
            _ => self
                .children(id)
                .iter()
                .map(|c| self.text_content(*c))
                .collect(),
        }
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        for child in self.nodes[id.0].children.clone() {
            self.nodes[child.0].parent = None;
        }
        self.nodes[id.0].children.clear();
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(id, t);
        }
    }

    // -- attributes ----------------------------------------------------------

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map(|e| e.attributes.as_slice()).unwrap_or(&[])
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(e) = self.element_mut(id) {
            match e.attributes.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => e.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(e) = self.element_mut(id) {
            e.attributes.retain(|(k, _)| k != name);
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let mut classes: Vec<String> = self.classes(id).iter().map(|c| c.to_string()).collect();
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
        self.set_attr(id, "class", &classes.join(" "));
    }

    pub fn inline_style(&self, id: NodeId) -> Option<&str> {
        self.attr(id, "style")
    }

    /// Value of one declaration in the `style` attribute.
    pub fn inline_style_value(&self, id: NodeId, prop: &str) -> Option<String> {
        parse_declarations(self.inline_style(id)?)
            .into_iter()
            .rev()
            .find(|(p, _)| p == prop)
            .map(|(_, v)| v)
    }

    /// Set one declaration in the `style` attribute, replacing an existing one.
    pub fn set_inline_style_property(&mut self, id: NodeId, prop: &str, value: &str) {
        let mut decls = self
            .inline_style(id)
            .map(parse_declarations)
            .unwrap_or_default();
        decls.retain(|(p, _)| p != prop);
        decls.push((prop.to_string(), value.to_string()));
        let css = decls
            .iter()
            .map(|(p, v)| format!("{p}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.set_attr(id, "style", &css);
    }

    // -- geometry ------------------------------------------------------------

    pub fn bounding_rect(&self, id: NodeId) -> Rect {
        self.nodes[id.0].rect
    }

    pub fn set_bounding_rect(&mut self, id: NodeId, rect: Rect) {
        self.nodes[id.0].rect = rect;
    }

    // -- shadow DOM ----------------------------------------------------------

    /// Attach an (initially empty) shadow root to `host` and return it.
    /// Attaching twice returns the existing root.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.shadow_root(host) {
            return existing;
        }
        let sr = self.push(NodeData::ShadowRoot { host });
        if let Some(e) = self.element_mut(host) {
            e.shadow_root = Some(sr);
        }
        sr
    }

    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.element(host)?.shadow_root
    }

    pub fn shadow_children(&self, host: NodeId) -> &[NodeId] {
        match self.shadow_root(host) {
            Some(sr) => self.children(sr),
            None => &[],
        }
    }

    /// The shadow root whose tree contains `id`, if any.
    pub fn containing_shadow_root(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            if let NodeData::ShadowRoot { .. } = self.nodes[n.0].data {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    pub fn shadow_host(&self, shadow_root: NodeId) -> Option<NodeId> {
        match self.nodes[shadow_root.0].data {
            NodeData::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    /// Light-DOM nodes projected into `slot`.
    ///
    /// A named slot receives the host's children whose `slot` attribute
    /// matches; the unnamed slot receives every other element child plus
    /// non-blank text.
    pub fn assigned_nodes(&self, slot: NodeId) -> Vec<NodeId> {
        if self.tag(slot) != Some("slot") {
            return Vec::new();
        }
        let Some(host) = self
            .containing_shadow_root(slot)
            .and_then(|sr| self.shadow_host(sr))
        else {
            return Vec::new();
        };
        let name = self.attr(slot, "name").unwrap_or("");
        self.children(host)
            .iter()
            .copied()
            .filter(|c| match &self.nodes[c.0].data {
                NodeData::Element(e) => e.attr("slot").unwrap_or("") == name,
                NodeData::Text(t) => name.is_empty() && !t.trim().is_empty(),
                _ => false,
            })
            .collect()
    }

    // -- form controls -------------------------------------------------------

    /// Live value of an `input`, `textarea`, `select` or `option`.
    pub fn value(&self, id: NodeId) -> String {
        if let Some(v) = self.forms.get(&id).and_then(|f| f.value.clone()) {
            return v;
        }
        match self.tag(id) {
            Some("textarea") => self.text_content(id),
            Some("select") => self.selected_value(id).unwrap_or_default(),
            Some("option") => self
                .attr(id, "value")
                .map(str::to_string)
                .unwrap_or_else(|| self.text_content(id).trim().to_string()),
            _ => self.attr(id, "value").unwrap_or("").to_string(),
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) {
        self.forms.entry(id).or_default().value = Some(value.to_string());
    }

    pub fn checked(&self, id: NodeId) -> bool {
        self.forms
            .get(&id)
            .and_then(|f| f.checked)
            .unwrap_or_else(|| self.has_attr(id, "checked"))
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        self.forms.entry(id).or_default().checked = Some(checked);
    }

    pub fn indeterminate(&self, id: NodeId) -> bool {
        self.forms.get(&id).map(|f| f.indeterminate).unwrap_or(false)
    }

    pub fn set_indeterminate(&mut self, id: NodeId, indeterminate: bool) {
        self.forms.entry(id).or_default().indeterminate = indeterminate;
    }

    /// `<option>` elements of a select, including those inside `<optgroup>`.
    pub fn options(&self, select: NodeId) -> Vec<NodeId> {
        self.descendants(select)
            .into_iter()
            .filter(|n| self.tag(*n) == Some("option"))
            .collect()
    }

    /// Value of the selected option: live value first, then the first
    /// option carrying `selected`, then the first option.
    pub fn selected_value(&self, select: NodeId) -> Option<String> {
        if let Some(v) = self.forms.get(&select).and_then(|f| f.value.clone()) {
            return Some(v);
        }
        let options = self.options(select);
        options
            .iter()
            .find(|o| self.has_attr(**o, "selected"))
            .or(options.first())
            .map(|o| self.value(*o))
    }

    // -- canvas --------------------------------------------------------------

    pub fn canvas(&self, id: NodeId) -> Option<&CanvasBuffer> {
        self.canvases.get(&id)
    }

    pub fn canvas_mut(&mut self, id: NodeId) -> Option<&mut CanvasBuffer> {
        self.canvases.get_mut(&id)
    }

    // -- images and frames ---------------------------------------------------

    /// Resolve the image candidate a browser would currently display.
    ///
    /// Candidates come from the first `<source srcset>` preceding the image
    /// inside a `<picture>`, else from the image's own `srcset` (plus `src`
    /// as an implicit `1x`). The chosen candidate is the lowest density that
    /// still covers [`Document::device_pixel_ratio`], else the densest one.
    pub fn current_src(&self, img: NodeId) -> Option<String> {
        let mut candidates = Vec::new();
        if let Some(parent) = self.parent(img) {
            if self.tag(parent) == Some("picture") {
                for &sib in self.children(parent) {
                    if sib == img {
                        break;
                    }
                    if self.tag(sib) == Some("source") {
                        if let Some(set) = self.attr(sib, "srcset") {
                            candidates = parse_srcset(set);
                            if !candidates.is_empty() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        if candidates.is_empty() {
            if let Some(set) = self.attr(img, "srcset") {
                candidates = parse_srcset(set);
                let all_density = candidates
                    .iter()
                    .all(|c| matches!(c.descriptor, Descriptor::Density(_)));
                let has_1x = candidates
                    .iter()
                    .any(|c| c.descriptor == Descriptor::Density(1.0));
                if let Some(src) = self.attr(img, "src") {
                    if all_density && !has_1x && !src.is_empty() {
                        candidates.push(Candidate {
                            url: src.to_string(),
                            descriptor: Descriptor::Density(1.0),
                        });
                    }
                }
            }
        }
        if candidates.is_empty() {
            return self.attr(img, "src").map(str::to_string);
        }

        let slot_width = self.image_slot_width(img);
        let density = |c: &Candidate| match c.descriptor {
            Descriptor::Density(d) => d,
            Descriptor::Width(w) => w / slot_width,
        };
        let dpr = self.device_pixel_ratio;
        let covering = candidates
            .iter()
            .filter(|c| density(*c) >= dpr)
            .min_by(|a, b| density(*a).total_cmp(&density(*b)));
        let chosen = covering.or_else(|| {
            candidates
                .iter()
                .max_by(|a, b| density(*a).total_cmp(&density(*b)))
        });
        chosen.map(|c| c.url.clone())
    }

    fn image_slot_width(&self, img: NodeId) -> f32 {
        let rendered = self.bounding_rect(img).width;
        if rendered > 0.0 {
            return rendered;
        }
        self.attr(img, "sizes")
            .and_then(|s| s.trim().strip_suffix("px"))
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| *v > 0.0)
            .unwrap_or(self.viewport_width.max(1.0))
    }

    /// `true` for an `<iframe>` whose document lives on another origin.
    pub fn is_cross_origin_frame(&self, id: NodeId) -> bool {
        if self.tag(id) != Some("iframe") || self.has_attr(id, "srcdoc") {
            return false;
        }
        let Some(src) = self.attr(id, "src") else {
            return false;
        };
        let src = src.trim();
        if src.starts_with("data:") {
            return true;
        }
        match url_origin(src) {
            Some(origin) => self.origin.as_deref() != Some(origin.as_str()),
            None => false,
        }
    }
}

/// `scheme://host[:port]` of an absolute URL, lower-cased.
fn url_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return None;
    }
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, host).to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Descriptor {
    Density(f32),
    Width(f32),
}

#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    descriptor: Descriptor,
}

fn parse_srcset(set: &str) -> Vec<Candidate> {
    set.split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?.to_string();
            let descriptor = match parts.next() {
                None => Descriptor::Density(1.0),
                Some(d) if d.ends_with('x') => {
                    Descriptor::Density(d.trim_end_matches('x').parse().ok()?)
                }
                Some(d) if d.ends_with('w') => {
                    Descriptor::Width(d.trim_end_matches('w').parse().ok()?)
                }
                Some(_) => return None,
            };
            Some(Candidate { url, descriptor })
        })
        .collect()
}

/// Split a declaration block (`a: b; c: d`) into trimmed pairs.
pub fn parse_declarations(css: &str) -> Vec<(String, String)> {
    css.split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim();
            if prop.is_empty() || val.is_empty() {
                return None;
            }
            Some((prop, val.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a [`Document`].
///
/// Whitespace-only runs between tags are dropped, comments are kept,
/// doctypes and processing instructions are skipped, and
/// `<template shadowrootmode>` attaches a shadow root to its parent.
pub fn parse_html(html: &str) -> Document {
    let mut parser = Parser::new(html);
    let root = parser.doc.root();
    parser.parse_nodes(root);
    parser.doc
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    doc: Document,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            doc: Document::new(),
        }
    }

    fn parse_nodes(&mut self, parent: NodeId) {
        loop {
            self.skip_whitespace_preserve();
            if self.eof() || self.starts_with("</") {
                break;
            }
            if let Some(node) = self.parse_node(parent) {
                self.doc.append_child(parent, node);
            }
        }
    }

    fn parse_node(&mut self, parent: NodeId) -> Option<NodeId> {
        if self.starts_with("<!--") {
            let text = self.read_comment();
            return Some(self.doc.create_comment(&text));
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Skip doctype / processing instructions
            while !self.eof() && !self.starts_with(">") {
                self.advance(1);
            }
            if !self.eof() {
                self.advance(1);
            }
            return None;
        }
        if self.starts_with("<") {
            self.parse_element(parent)
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> NodeId {
        let start = self.pos;
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        let text = decode_entities(&self.input[start..self.pos]);
        self.doc.create_text(&text)
    }

    fn parse_element(&mut self, parent: NodeId) -> Option<NodeId> {
        // Consume '<'
        self.advance(1);
        let tag = self.parse_tag_name().to_ascii_lowercase();

        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Stray character; skip it rather than loop forever.
                self.advance(1);
                continue;
            }
            if !attrs.iter().any(|(k, _)| *k == key) {
                attrs.push((key, value));
            }
        }

        let explicit_self_close = self.starts_with("/>");
        if explicit_self_close {
            self.advance(2);
        } else if self.starts_with(">") {
            self.advance(1);
        }

        // Declarative shadow DOM: the template's content becomes the
        // parent's shadow tree instead of a child.
        let shadow_mode = attrs
            .iter()
            .any(|(k, _)| k == "shadowrootmode" || k == "shadowroot");
        if tag == "template" && shadow_mode && self.doc.is_element(parent) {
            let sr = self.doc.attach_shadow(parent);
            if !explicit_self_close {
                self.parse_nodes(sr);
                self.consume_closing_tag();
            }
            return None;
        }

        let seeded = seed_rect(&tag, &attrs);
        let elem = self.doc.create_element_with_attrs(&tag, attrs);
        if let Some(rect) = seeded {
            self.doc.set_bounding_rect(elem, rect);
        }

        if explicit_self_close || VOID_ELEMENTS.contains(&tag.as_str()) {
            return Some(elem);
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            let raw = self.read_raw_text(&tag);
            if !raw.is_empty() {
                let text = if tag == "textarea" || tag == "title" {
                    decode_entities(&raw)
                } else {
                    raw
                };
                let t = self.doc.create_text(&text);
                self.doc.append_child(elem, t);
            }
        } else {
            self.parse_nodes(elem);
        }
        self.consume_closing_tag();
        Some(elem)
    }

    fn consume_closing_tag(&mut self) {
        if self.starts_with("</") {
            self.advance(2);
            self.parse_tag_name();
            self.skip_whitespace();
            if self.starts_with(">") {
                self.advance(1);
            }
        }
    }

    fn read_raw_text(&mut self, tag: &str) -> String {
        let close = format!("</{tag}");
        let rest = &self.input[self.pos..];
        let end = rest
            .to_ascii_lowercase()
            .find(&close)
            .unwrap_or(rest.len());
        let text = rest[..end].to_string();
        self.pos += end;
        text
    }

    fn parse_tag_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' {
                self.advance(1);
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attr_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '=' || c == '>' || c == '/' || c == '"' || c == '\'' {
                break;
            }
            self.advance(1);
        }
        self.input[start..self.pos].to_ascii_lowercase()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_attr_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance(1); // skip '='
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = self.input[start..self.pos].to_string();
                if !self.eof() {
                    self.advance(1);
                }
                return decode_entities(&val);
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            self.advance(1);
        }
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    fn skip_whitespace_preserve(&mut self) {
        // Skip runs of pure whitespace between elements.
        let saved = self.pos;
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
        // If we reached a tag or EOF, keep the skip. Otherwise revert.
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn read_comment(&mut self) -> String {
        self.advance(4); // skip <!--
        let start = self.pos;
        while !self.eof() && !self.starts_with("-->") {
            self.advance(1);
        }
        let text = self.input[start..self.pos].to_string();
        if !self.eof() {
            self.advance(3);
        }
        text
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        // Advance by `n` characters (not bytes).
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

/// Initial layout box from inline `width`/`height` px values or the
/// presentational attributes of replaced elements.
fn seed_rect(tag: &str, attrs: &[(String, String)]) -> Option<Rect> {
    let get = |name: &str| attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
    let inline = get("style").map(parse_declarations).unwrap_or_default();
    let px = |prop: &str| {
        inline
            .iter()
            .rev()
            .find(|(p, _)| p == prop)
            .and_then(|(_, v)| v.strip_suffix("px"))
            .and_then(|v| v.trim().parse::<f32>().ok())
    };
    let attr_px = |name: &str| {
        if matches!(tag, "img" | "canvas" | "iframe" | "video" | "svg") {
            get(name).and_then(|v| v.trim().trim_end_matches("px").parse::<f32>().ok())
        } else {
            None
        }
    };
    let width = px("width").or_else(|| attr_px("width"));
    let height = px("height").or_else(|| attr_px("height"));
    if width.is_none() && height.is_none() {
        return None;
    }
    Some(Rect::sized(width.unwrap_or(0.0), height.unwrap_or(0.0)))
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}
