//! Markup output for clone trees: HTML for inspection and an SVG
//! `foreignObject` wrapper for rasterizers.

use crate::dom::{Document, NodeData, NodeId, VOID_ELEMENTS};
use crate::pipeline::Snapshot;
use crate::style::fmt_px;

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Elements whose text children are written unescaped in HTML.
const RAW_TEXT: &[&str] = &["style", "script"];

pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Markup flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Html,
    /// Well-formed XML: void elements self-close and raw text is escaped.
    Xhtml,
}

/// Outer markup of `node`. The document node serialises its children.
pub fn serialize_node(doc: &Document, node: NodeId, markup: Markup) -> String {
    let mut out = String::new();
    write_node(doc, node, markup, &mut out);
    out
}

fn write_node(doc: &Document, node: NodeId, markup: Markup, out: &mut String) {
    match &doc.node(node).data {
        NodeData::Text(t) => {
            let raw = markup == Markup::Html
                && doc
                    .parent(node)
                    .and_then(|p| doc.tag(p))
                    .is_some_and(|tag| RAW_TEXT.contains(&tag));
            if raw {
                out.push_str(t);
            } else {
                out.push_str(&escape_text(t));
            }
        }
        NodeData::Comment(c) => {
            out.push_str("<!--");
            out.push_str(&c.replace("--", "- -"));
            out.push_str("-->");
        }
        NodeData::Document | NodeData::ShadowRoot { .. } => {
            for &child in doc.children(node) {
                write_node(doc, child, markup, out);
            }
        }
        NodeData::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            let void = VOID_ELEMENTS.contains(&el.tag.as_str());
            if void {
                out.push_str(if markup == Markup::Xhtml { "/>" } else { ">" });
                return;
            }
            out.push('>');
            for &child in doc.children(node) {
                write_node(doc, child, markup, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

impl Snapshot {
    /// Clone markup without the stylesheet.
    pub fn markup(&self, markup: Markup) -> String {
        self.clone
            .roots
            .iter()
            .map(|&root| serialize_node(&self.clone.doc, root, markup))
            .collect()
    }

    /// Standalone HTML document: one `<style>` plus the clone.
    pub fn to_html(&self) -> String {
        let body_root = self.clone.roots.len() == 1
            && self
                .clone
                .root()
                .and_then(|r| self.clone.doc.tag(r))
                == Some("body");
        let content = self.markup(Markup::Html);
        let body = if body_root {
            content
        } else {
            format!("<body>{content}</body>")
        };
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\n{}\n</style></head>{}</html>\n",
            self.stylesheet(),
            body
        )
    }

    /// The clone inside an SVG `foreignObject` of the given size.
    pub fn to_svg(&self, width: f32, height: f32) -> String {
        let (w, h) = (fmt_px(width), fmt_px(height));
        let (w, h) = (w.trim_end_matches("px"), h.trim_end_matches("px"));
        format!(
            "<svg xmlns=\"{SVG_NS}\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\
             <foreignObject x=\"0\" y=\"0\" width=\"100%\" height=\"100%\">\
             <div xmlns=\"{XHTML_NS}\"><style>{}</style>{}</div>\
             </foreignObject></svg>",
            escape_text(&self.stylesheet()),
            self.markup(Markup::Xhtml)
        )
    }

    /// [`Snapshot::to_svg`] sized to the capture root's box.
    pub fn to_svg_auto(&self) -> String {
        let rect = self
            .clone
            .root()
            .map(|r| self.clone.doc.bounding_rect(r))
            .unwrap_or_default();
        let width = if rect.width > 0.0 {
            rect.width
        } else {
            self.clone.doc.viewport_width
        };
        self.to_svg(width, rect.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::pipeline::{capture_html, CaptureConfig};

    #[test]
    fn escapes_text_and_attributes() {
        let mut doc = Document::new();
        let p = doc.create_element_with_attrs("p", vec![("title".into(), "a \"b\" & c".into())]);
        let t = doc.create_text("1 < 2 & 3");
        doc.append_child(p, t);
        assert_eq!(
            serialize_node(&doc, p, Markup::Html),
            r#"<p title="a &quot;b&quot; &amp; c">1 &lt; 2 &amp; 3</p>"#
        );
    }

    #[test]
    fn void_elements_per_flavour() {
        let doc = parse_html(r#"<div><br><img src="x.png"></div>"#);
        let div = doc.find_first("div").unwrap().unwrap();
        assert_eq!(
            serialize_node(&doc, div, Markup::Html),
            r#"<div><br><img src="x.png"></div>"#
        );
        assert_eq!(
            serialize_node(&doc, div, Markup::Xhtml),
            r#"<div><br/><img src="x.png"/></div>"#
        );
    }

    #[test]
    fn style_text_is_raw_in_html_only() {
        let doc = parse_html("<style>a > b { color: red }</style>");
        let style = doc.find_first("style").unwrap().unwrap();
        assert_eq!(
            serialize_node(&doc, style, Markup::Html),
            "<style>a > b { color: red }</style>"
        );
        assert_eq!(
            serialize_node(&doc, style, Markup::Xhtml),
            "<style>a &gt; b { color: red }</style>"
        );
    }

    #[test]
    fn html_document_embeds_the_stylesheet() {
        let snap = capture_html(
            r#"<body><p style="color:red">x</p></body>"#,
            &CaptureConfig::default(),
        )
        .unwrap();
        let html = snap.to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(".c1{color:red}"));
        assert!(html.contains(r#"<body><p style="color:red" class="c1">x</p></body>"#));
        assert_eq!(html.matches("<body").count(), 1);
    }

    #[test]
    fn svg_wraps_xhtml() {
        let snap = capture_html(
            r#"<body><p>a<br>b</p></body>"#,
            &CaptureConfig::default(),
        )
        .unwrap();
        let svg = snap.to_svg(200.0, 100.5);
        assert!(svg.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100.5""#));
        assert!(svg.contains("<foreignObject"));
        assert!(svg.contains("<br/>"));
        assert!(svg.ends_with("</foreignObject></svg>"));
    }
}
