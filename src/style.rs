//! Style resolver – computes the resolved value of every enumerable CSS
//! property for an element (or one of its pseudo-elements).
//!
//! The cascade is deliberately small:
//! 1. initial values, with inherited properties taken from the parent
//! 2. user-agent defaults for the tag
//! 3. author rules from `<style>` elements in the same tree, ordered by
//!    specificity then source order
//! 4. the inline `style` attribute
//!
//! Values are kept as specified except for a final pass that resolves
//! `em`/`rem`/`%` font sizes, `em` lengths and bare zeros. `currentcolor`
//! stays a keyword, as in its CSS Color 4 computed value.

use std::collections::BTreeMap;

use crate::css::{PseudoElement, Selector, SelectorList, Specificity};
use crate::dom::{parse_declarations, Document, NodeData, NodeId};

/// Resolved property → value map for one element or pseudo-element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComputedStyle {
    values: BTreeMap<String, String>,
}

impl ComputedStyle {
    /// Every property at its initial value.
    pub fn initial() -> Self {
        Self {
            values: PROPERTIES
                .iter()
                .map(|(p, v)| (p.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, prop: &str) -> Option<&str> {
        self.values.get(prop).map(|s| s.as_str())
    }

    pub fn set(&mut self, prop: &str, value: &str) {
        self.values.insert(prop.to_string(), value.to_string());
    }

    /// Entries in property-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for ComputedStyle {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Property tables
// ---------------------------------------------------------------------------

/// Enumerable longhand properties and their initial values.
pub const PROPERTIES: &[(&str, &str)] = &[
    ("align-items", "normal"),
    ("animation-duration", "0s"),
    ("animation-name", "none"),
    ("background-color", "rgba(0, 0, 0, 0)"),
    ("background-image", "none"),
    ("background-position", "0% 0%"),
    ("background-repeat", "repeat"),
    ("background-size", "auto"),
    ("border-bottom-color", "currentcolor"),
    ("border-bottom-left-radius", "0px"),
    ("border-bottom-right-radius", "0px"),
    ("border-bottom-style", "none"),
    ("border-bottom-width", "0px"),
    ("border-collapse", "separate"),
    ("border-left-color", "currentcolor"),
    ("border-left-style", "none"),
    ("border-left-width", "0px"),
    ("border-right-color", "currentcolor"),
    ("border-right-style", "none"),
    ("border-right-width", "0px"),
    ("border-top-color", "currentcolor"),
    ("border-top-left-radius", "0px"),
    ("border-top-right-radius", "0px"),
    ("border-top-style", "none"),
    ("border-top-width", "0px"),
    ("bottom", "auto"),
    ("box-shadow", "none"),
    ("box-sizing", "content-box"),
    ("break-after", "auto"),
    ("break-before", "auto"),
    ("break-inside", "auto"),
    ("caret-color", "auto"),
    ("clear", "none"),
    ("color", "rgb(0, 0, 0)"),
    ("column-gap", "normal"),
    ("content", "normal"),
    ("cursor", "auto"),
    ("display", "inline"),
    ("flex-basis", "auto"),
    ("flex-direction", "row"),
    ("flex-grow", "0"),
    ("flex-shrink", "1"),
    ("flex-wrap", "nowrap"),
    ("float", "none"),
    ("font-family", "Times New Roman"),
    ("font-size", "16px"),
    ("font-style", "normal"),
    ("font-weight", "400"),
    ("height", "auto"),
    ("justify-content", "normal"),
    ("left", "auto"),
    ("letter-spacing", "normal"),
    ("line-height", "normal"),
    ("list-style-position", "outside"),
    ("list-style-type", "disc"),
    ("margin-bottom", "0px"),
    ("margin-left", "0px"),
    ("margin-right", "0px"),
    ("margin-top", "0px"),
    ("max-height", "none"),
    ("max-width", "none"),
    ("min-height", "auto"),
    ("min-width", "auto"),
    ("opacity", "1"),
    ("order", "0"),
    ("outline-color", "currentcolor"),
    ("outline-offset", "0px"),
    ("outline-style", "none"),
    ("outline-width", "0px"),
    ("overflow-x", "visible"),
    ("overflow-y", "visible"),
    ("padding-bottom", "0px"),
    ("padding-left", "0px"),
    ("padding-right", "0px"),
    ("padding-top", "0px"),
    ("pointer-events", "auto"),
    ("position", "static"),
    ("right", "auto"),
    ("row-gap", "normal"),
    ("text-align", "start"),
    ("text-decoration-line", "none"),
    ("text-indent", "0px"),
    ("text-transform", "none"),
    ("top", "auto"),
    ("transform", "none"),
    ("transform-origin", "50% 50%"),
    ("transition-duration", "0s"),
    ("transition-property", "all"),
    ("user-select", "auto"),
    ("vertical-align", "baseline"),
    ("visibility", "visible"),
    ("white-space", "normal"),
    ("width", "auto"),
    ("will-change", "auto"),
    ("word-spacing", "0px"),
    ("z-index", "auto"),
];

/// Properties whose computed value passes from parent to child.
pub const INHERITED: &[&str] = &[
    "border-collapse",
    "caret-color",
    "color",
    "cursor",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "line-height",
    "list-style-position",
    "list-style-type",
    "pointer-events",
    "text-align",
    "text-indent",
    "text-transform",
    "visibility",
    "white-space",
    "word-spacing",
];

fn initial_value(prop: &str) -> Option<&'static str> {
    PROPERTIES
        .binary_search_by(|(p, _)| (*p).cmp(prop))
        .ok()
        .map(|i| PROPERTIES[i].1)
}

fn is_inherited(prop: &str) -> bool {
    INHERITED.contains(&prop)
}

const ROOT_FONT_SIZE: f32 = 16.0;

// ---------------------------------------------------------------------------
// User-agent defaults
// ---------------------------------------------------------------------------

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "details", "dialog", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "html", "main", "nav", "ol", "p", "pre", "section", "summary", "ul",
];

const HIDDEN_TAGS: &[&str] = &[
    "base", "datalist", "head", "link", "meta", "noscript", "script", "style", "template",
    "title",
];

/// Default declarations for a tag, in the spirit of the HTML UA sheet.
fn base_style_for_tag(tag: &str) -> Vec<(&'static str, &'static str)> {
    let mut d: Vec<(&'static str, &'static str)> = Vec::new();
    if BLOCK_TAGS.contains(&tag) {
        d.push(("display", "block"));
    }
    if HIDDEN_TAGS.contains(&tag) {
        d.push(("display", "none"));
    }
    match tag {
        "body" => d.push(("margin", "8px")),
        "p" | "dl" => d.push(("margin", "16px 0px")),
        "h1" => d.extend([("font-size", "2em"), ("font-weight", "700"), ("margin", "0.67em 0px")]),
        "h2" => d.extend([("font-size", "1.5em"), ("font-weight", "700"), ("margin", "0.83em 0px")]),
        "h3" => d.extend([("font-size", "1.17em"), ("font-weight", "700"), ("margin", "1em 0px")]),
        "h4" => d.extend([("font-weight", "700"), ("margin", "1.33em 0px")]),
        "h5" => d.extend([("font-size", "0.83em"), ("font-weight", "700"), ("margin", "1.67em 0px")]),
        "h6" => d.extend([("font-size", "0.67em"), ("font-weight", "700"), ("margin", "2.33em 0px")]),
        "ul" => d.extend([("margin", "16px 0px"), ("padding-left", "40px")]),
        "ol" => d.extend([
            ("margin", "16px 0px"),
            ("padding-left", "40px"),
            ("list-style-type", "decimal"),
        ]),
        "li" => d.push(("display", "list-item")),
        "dd" => d.push(("margin-left", "40px")),
        "blockquote" | "figure" => d.push(("margin", "16px 40px")),
        "pre" => d.extend([
            ("white-space", "pre"),
            ("font-family", "monospace"),
            ("margin", "16px 0px"),
        ]),
        "code" | "kbd" | "samp" => d.push(("font-family", "monospace")),
        "b" | "strong" => d.push(("font-weight", "700")),
        "i" | "em" | "cite" | "var" | "address" => d.push(("font-style", "italic")),
        "u" | "ins" => d.push(("text-decoration-line", "underline")),
        "s" | "del" => d.push(("text-decoration-line", "line-through")),
        "small" => d.push(("font-size", "0.83em")),
        "a" => d.extend([
            ("color", "rgb(0, 0, 238)"),
            ("text-decoration-line", "underline"),
            ("cursor", "pointer"),
        ]),
        "hr" => d.extend([
            ("margin", "8px auto"),
            ("border-style", "inset"),
            ("border-width", "1px"),
        ]),
        "table" => d.extend([("display", "table"), ("border-collapse", "separate")]),
        "thead" => d.push(("display", "table-header-group")),
        "tbody" => d.push(("display", "table-row-group")),
        "tfoot" => d.push(("display", "table-footer-group")),
        "tr" => d.push(("display", "table-row")),
        "td" => d.extend([("display", "table-cell"), ("padding", "1px")]),
        "th" => d.extend([
            ("display", "table-cell"),
            ("padding", "1px"),
            ("font-weight", "700"),
            ("text-align", "center"),
        ]),
        "img" | "canvas" | "video" | "svg" => d.push(("display", "inline-block")),
        "iframe" => d.extend([
            ("display", "inline-block"),
            ("border-width", "2px"),
            ("border-style", "inset"),
        ]),
        "input" | "button" | "select" => d.extend([
            ("display", "inline-block"),
            ("font-size", "13.3333px"),
            ("font-family", "system-ui"),
        ]),
        "textarea" => d.extend([
            ("display", "inline-block"),
            ("font-size", "13.3333px"),
            ("font-family", "monospace"),
            ("white-space", "pre-wrap"),
        ]),
        "option" => d.push(("display", "block")),
        "slot" => d.push(("display", "contents")),
        _ => {}
    }
    d
}

// ---------------------------------------------------------------------------
// Stylesheets
// ---------------------------------------------------------------------------

/// One author rule for one complex selector.
#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    specificity: Specificity,
    order: usize,
    declarations: Vec<(String, String)>,
    /// Shadow root the rule is scoped to; `None` for the document tree.
    scope: Option<NodeId>,
}

/// All author rules found in a document's `<style>` elements.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    /// Collect every connected `<style>` element, including those inside
    /// shadow trees (whose rules only apply inside that tree).
    pub fn from_document(doc: &Document) -> Self {
        let mut sheet = Self::default();
        for i in 0..doc.len() {
            let id = NodeId(i);
            if doc.tag(id) != Some("style") || doc.parent(id).is_none() {
                continue;
            }
            let scope = doc.containing_shadow_root(id);
            sheet.add_css(&doc.text_content(id), scope);
        }
        sheet
    }

    /// Append the rules of a CSS text. Unparseable selectors drop their rule.
    pub fn add_css(&mut self, css: &str, scope: Option<NodeId>) {
        for (prelude, body) in split_rules(css) {
            let list = match SelectorList::parse(&prelude) {
                Ok(list) => list,
                Err(e) => {
                    log::debug!("Skipping CSS rule `{prelude}`: {e}");
                    continue;
                }
            };
            let declarations: Vec<(String, String)> = parse_declarations(&body)
                .into_iter()
                .map(|(p, v)| (p, strip_important(&v)))
                .collect();
            for selector in list.0 {
                let order = self.rules.len();
                self.rules.push(Rule {
                    specificity: selector.specificity(),
                    selector,
                    order,
                    declarations: declarations.clone(),
                    scope,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matching<'s>(
        &'s self,
        doc: &Document,
        node: NodeId,
        pseudo: Option<PseudoElement>,
    ) -> Vec<&'s Rule> {
        let scope = doc.containing_shadow_root(node);
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.scope == scope)
            .filter(|r| match pseudo {
                None => r.selector.matches(doc, node),
                Some(pe) => r.selector.matches_pseudo(doc, node, pe),
            })
            .collect();
        matched.sort_by_key(|r| (r.specificity, r.order));
        matched
    }
}

fn strip_important(value: &str) -> String {
    value
        .trim_end()
        .strip_suffix("!important")
        .map(|v| v.trim_end().to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Split CSS text into `(prelude, body)` pairs, skipping comments and
/// at-rules.
fn split_rules(css: &str) -> Vec<(String, String)> {
    let css = strip_comments(css);
    let bytes = css.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let Some(open) = css[pos..].find('{').map(|i| pos + i) else {
            break;
        };
        let prelude = css[pos..open].trim().to_string();
        // Find the matching close brace.
        let mut depth = 0usize;
        let mut close = bytes.len();
        for (i, b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = i;
                        break;
                    }
                }
                _ => {}
            }
        }
        if !prelude.starts_with('@') && !prelude.is_empty() {
            let body_end = close.min(bytes.len());
            out.push((prelude, css[open + 1..body_end].to_string()));
        }
        pos = close + 1;
    }
    out
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolves computed styles for the elements of one document.
#[derive(Debug, Clone)]
pub struct StyleResolver {
    sheet: Stylesheet,
}

impl StyleResolver {
    pub fn new(doc: &Document) -> Self {
        Self {
            sheet: Stylesheet::from_document(doc),
        }
    }

    pub fn with_sheet(sheet: Stylesheet) -> Self {
        Self { sheet }
    }

    pub fn sheet(&self) -> &Stylesheet {
        &self.sheet
    }

    /// Computed style of `node` given its parent's computed style.
    ///
    /// Returns `None` for non-element nodes.
    pub fn resolve(
        &self,
        doc: &Document,
        node: NodeId,
        parent: Option<&ComputedStyle>,
    ) -> Option<ComputedStyle> {
        let el = doc.element(node)?;
        let mut style = inherit_from(parent);

        for (prop, val) in base_style_for_tag(&el.tag) {
            apply_css_property(&mut style, parent, prop, val);
        }
        if el.attr("hidden").is_some() {
            style.set("display", "none");
        }
        for rule in self.sheet.matching(doc, node, None) {
            for (prop, val) in &rule.declarations {
                apply_css_property(&mut style, parent, prop, val);
            }
        }
        if let Some(inline) = el.attr("style") {
            apply_inline_style(&mut style, parent, inline);
        }

        finalize(&mut style, parent);
        Some(style)
    }

    /// Computed style of a `::before` / `::after` box of `node`.
    pub fn resolve_pseudo(
        &self,
        doc: &Document,
        node: NodeId,
        pseudo: PseudoElement,
        element_style: &ComputedStyle,
    ) -> ComputedStyle {
        let mut style = inherit_from(Some(element_style));
        style.set("content", "none");
        for rule in self.sheet.matching(doc, node, Some(pseudo)) {
            for (prop, val) in &rule.declarations {
                apply_css_property(&mut style, Some(element_style), prop, val);
            }
        }
        finalize(&mut style, Some(element_style));
        style
    }
}

/// Parent whose computed style an element inherits: the light parent, or
/// the host for top-level shadow children.
pub fn inheritance_parent(doc: &Document, node: NodeId) -> Option<NodeId> {
    let parent = doc.parent(node)?;
    match doc.node(parent).data {
        NodeData::Element(_) => Some(parent),
        NodeData::ShadowRoot { host } => Some(host),
        _ => None,
    }
}

fn inherit_from(parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = ComputedStyle::initial();
    if let Some(p) = parent {
        for prop in INHERITED {
            if let Some(v) = p.get(prop) {
                style.set(prop, v);
            }
        }
    }
    style
}

fn apply_inline_style(s: &mut ComputedStyle, parent: Option<&ComputedStyle>, style_str: &str) {
    for (prop, val) in parse_declarations(style_str) {
        apply_css_property(s, parent, &prop, &strip_important(&val));
    }
}

/// Apply one declaration, expanding shorthands into longhands.
fn apply_css_property(s: &mut ComputedStyle, parent: Option<&ComputedStyle>, prop: &str, val: &str) {
    let val = val.trim();
    match prop {
        "all" => {
            for &(p, initial) in PROPERTIES {
                let v = match val {
                    "inherit" => parent.and_then(|ps| ps.get(p)).unwrap_or(initial),
                    "unset" if is_inherited(p) => {
                        parent.and_then(|ps| ps.get(p)).unwrap_or(initial)
                    }
                    _ => initial,
                };
                s.set(p, v);
            }
        }
        "margin" => apply_box_shorthand(s, parent, val, ["margin-top", "margin-right", "margin-bottom", "margin-left"]),
        "padding" => apply_box_shorthand(s, parent, val, ["padding-top", "padding-right", "padding-bottom", "padding-left"]),
        "border-width" => apply_box_shorthand(s, parent, val, BORDER_WIDTHS),
        "border-style" => apply_box_shorthand(s, parent, val, BORDER_STYLES),
        "border-color" => apply_box_shorthand(s, parent, val, BORDER_COLORS),
        "border-radius" => apply_box_shorthand(
            s,
            parent,
            val,
            [
                "border-top-left-radius",
                "border-top-right-radius",
                "border-bottom-right-radius",
                "border-bottom-left-radius",
            ],
        ),
        "border" => {
            for side in 0..4 {
                apply_border_side(s, parent, val, side);
            }
        }
        "border-top" => apply_border_side(s, parent, val, 0),
        "border-right" => apply_border_side(s, parent, val, 1),
        "border-bottom" => apply_border_side(s, parent, val, 2),
        "border-left" => apply_border_side(s, parent, val, 3),
        "background" => {
            if val.contains("url(") || val.contains("gradient(") {
                set_value(s, parent, "background-image", val);
            } else {
                set_value(s, parent, "background-color", val);
            }
        }
        "overflow" => {
            let mut parts = val.split_whitespace();
            let x = parts.next().unwrap_or("visible");
            let y = parts.next().unwrap_or(x);
            set_value(s, parent, "overflow-x", x);
            set_value(s, parent, "overflow-y", y);
        }
        "gap" => {
            let mut parts = val.split_whitespace();
            let row = parts.next().unwrap_or("normal");
            let col = parts.next().unwrap_or(row);
            set_value(s, parent, "row-gap", row);
            set_value(s, parent, "column-gap", col);
        }
        "flex" => {
            let parts: Vec<&str> = val.split_whitespace().collect();
            let (grow, shrink, basis) = match parts.as_slice() {
                ["none"] => ("0", "0", "auto"),
                ["auto"] => ("1", "1", "auto"),
                [g] if g.parse::<f32>().is_ok() => (*g, "1", "0%"),
                [b] => ("1", "1", *b),
                [g, sh] if sh.parse::<f32>().is_ok() => (*g, *sh, "0%"),
                [g, b] => (*g, "1", *b),
                [g, sh, b, ..] => (*g, *sh, *b),
                [] => return,
            };
            set_value(s, parent, "flex-grow", grow);
            set_value(s, parent, "flex-shrink", shrink);
            set_value(s, parent, "flex-basis", basis);
        }
        "text-decoration" => {
            let line = val.split_whitespace().next().unwrap_or("none");
            set_value(s, parent, "text-decoration-line", line);
        }
        "list-style" => {
            let ty = val.split_whitespace().next().unwrap_or("disc");
            set_value(s, parent, "list-style-type", ty);
        }
        "outline" => {
            for part in val.split_whitespace() {
                if BORDER_STYLE_KEYWORDS.contains(&part) {
                    set_value(s, parent, "outline-style", part);
                } else if looks_like_length(part) {
                    set_value(s, parent, "outline-width", part);
                } else {
                    set_value(s, parent, "outline-color", part);
                }
            }
        }
        // Legacy paged-media aliases.
        "page-break-before" => set_value(s, parent, "break-before", legacy_break(val)),
        "page-break-after" => set_value(s, parent, "break-after", legacy_break(val)),
        "page-break-inside" => set_value(s, parent, "break-inside", legacy_break(val)),
        _ => set_value(s, parent, prop, val),
    }
}

const BORDER_WIDTHS: [&str; 4] = [
    "border-top-width",
    "border-right-width",
    "border-bottom-width",
    "border-left-width",
];
const BORDER_STYLES: [&str; 4] = [
    "border-top-style",
    "border-right-style",
    "border-bottom-style",
    "border-left-style",
];
const BORDER_COLORS: [&str; 4] = [
    "border-top-color",
    "border-right-color",
    "border-bottom-color",
    "border-left-color",
];
const BORDER_STYLE_KEYWORDS: &[&str] = &[
    "none", "hidden", "dotted", "dashed", "solid", "double", "groove", "ridge", "inset", "outset",
];

fn legacy_break(val: &str) -> &str {
    match val {
        "always" => "page",
        other => other,
    }
}

/// Set a longhand, honouring `inherit` / `initial` / `unset`. Properties
/// outside [`PROPERTIES`] are ignored.
fn set_value(s: &mut ComputedStyle, parent: Option<&ComputedStyle>, prop: &str, val: &str) {
    let Some(initial) = initial_value(prop) else {
        return;
    };
    let resolved = match val {
        "initial" => initial,
        "inherit" => parent.and_then(|p| p.get(prop)).unwrap_or(initial),
        "unset" if is_inherited(prop) => parent.and_then(|p| p.get(prop)).unwrap_or(initial),
        "unset" => initial,
        other => other,
    };
    s.set(prop, resolved);
}

fn apply_box_shorthand(
    s: &mut ComputedStyle,
    parent: Option<&ComputedStyle>,
    val: &str,
    [top, right, bottom, left]: [&str; 4],
) {
    let parts: Vec<&str> = val.split_whitespace().collect();
    let (t, r, b, l) = match parts.as_slice() {
        [a] => (*a, *a, *a, *a),
        [a, b] => (*a, *b, *a, *b),
        [a, b, c] => (*a, *b, *c, *b),
        [a, b, c, d, ..] => (*a, *b, *c, *d),
        [] => return,
    };
    set_value(s, parent, top, t);
    set_value(s, parent, right, r);
    set_value(s, parent, bottom, b);
    set_value(s, parent, left, l);
}

fn apply_border_side(s: &mut ComputedStyle, parent: Option<&ComputedStyle>, val: &str, side: usize) {
    if val == "none" || val == "0" {
        set_value(s, parent, BORDER_STYLES[side], "none");
        set_value(s, parent, BORDER_WIDTHS[side], "0px");
        return;
    }
    for part in val.split_whitespace() {
        if BORDER_STYLE_KEYWORDS.contains(&part) {
            set_value(s, parent, BORDER_STYLES[side], part);
        } else if looks_like_length(part) || matches!(part, "thin" | "medium" | "thick") {
            set_value(s, parent, BORDER_WIDTHS[side], part);
        } else {
            set_value(s, parent, BORDER_COLORS[side], part);
        }
    }
}

fn looks_like_length(v: &str) -> bool {
    v.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

// ---------------------------------------------------------------------------
// Value finalisation
// ---------------------------------------------------------------------------

fn finalize(s: &mut ComputedStyle, parent: Option<&ComputedStyle>) {
    let parent_fs = parent
        .and_then(|p| p.get("font-size"))
        .and_then(parse_px)
        .unwrap_or(ROOT_FONT_SIZE);
    let font_size = s
        .get("font-size")
        .and_then(|v| resolve_font_size(v, parent_fs))
        .unwrap_or(parent_fs);
    s.set("font-size", &fmt_px(font_size));

    let keys: Vec<String> = s.values.keys().cloned().collect();
    for prop in keys {
        if prop == "font-size" {
            continue;
        }
        let Some(value) = s.get(&prop) else {
            continue;
        };
        let fixed = if value == "0" && initial_value(&prop).is_some_and(|i| i.ends_with("px")) {
            Some("0px".to_string())
        } else {
            resolve_relative_lengths(value, font_size)
        };
        if let Some(v) = fixed {
            s.set(&prop, &v);
        }
    }

    // Border widths compute to zero when the style is none.
    for side in 0..4 {
        if matches!(s.get(BORDER_STYLES[side]), Some("none") | Some("hidden")) {
            s.set(BORDER_WIDTHS[side], "0px");
        } else if let Some(w) = s.get(BORDER_WIDTHS[side]).and_then(keyword_border_width) {
            s.set(BORDER_WIDTHS[side], w);
        }
    }
}

fn keyword_border_width(v: &str) -> Option<&'static str> {
    match v {
        "thin" => Some("1px"),
        "medium" => Some("3px"),
        "thick" => Some("5px"),
        _ => None,
    }
}

fn resolve_font_size(v: &str, parent_fs: f32) -> Option<f32> {
    let v = v.trim();
    if let Some(em) = v.strip_suffix("rem") {
        return em.parse::<f32>().ok().map(|n| n * ROOT_FONT_SIZE);
    }
    if let Some(em) = v.strip_suffix("em") {
        return em.parse::<f32>().ok().map(|n| n * parent_fs);
    }
    if let Some(pct) = v.strip_suffix('%') {
        return pct.parse::<f32>().ok().map(|n| n * parent_fs / 100.0);
    }
    match v {
        "smaller" => Some(parent_fs / 1.2),
        "larger" => Some(parent_fs * 1.2),
        "small" => Some(13.0),
        "medium" => Some(16.0),
        "large" => Some(18.0),
        _ => parse_px(v),
    }
}

/// Rewrite every `em` / `rem` token of a value to px.
fn resolve_relative_lengths(value: &str, font_size: f32) -> Option<String> {
    if !value.contains("em") || value.contains('(') {
        return None;
    }
    let mut changed = false;
    let parts: Vec<String> = value
        .split_whitespace()
        .map(|part| {
            let px = if let Some(n) = part.strip_suffix("rem") {
                n.parse::<f32>().ok().map(|n| n * ROOT_FONT_SIZE)
            } else if let Some(n) = part.strip_suffix("em") {
                n.parse::<f32>().ok().map(|n| n * font_size)
            } else {
                None
            };
            match px {
                Some(px) => {
                    changed = true;
                    fmt_px(px)
                }
                None => part.to_string(),
            }
        })
        .collect();
    changed.then(|| parts.join(" "))
}

pub fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim().strip_suffix("px")?;
    s.trim().parse().ok()
}

/// Format a pixel length with at most three decimals and no trailing zeros.
pub fn fmt_px(v: f32) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    let mut s = format!("{rounded:.3}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" {
        s = "0".to_string();
    }
    format!("{s}px")
}
