//! Integration tests for the snap-forge pipeline.
//!
//! These tests validate:
//! - Repeated styles collapse onto shared classes
//! - Shadow roots, slots and form state survive the clone
//! - Replaced content (images, canvas, frames, markers) is substituted
//! - HTML, SVG and manifest output are well formed

use snap_forge::cache::StyleCache;
use snap_forge::clone::{CloneOptions, FilterError, SYNTHETIC_ATTR};
use snap_forge::dom::{parse_html, Document, NodeId};
use snap_forge::manifest::CaptureManifest;
use snap_forge::pipeline::{capture, capture_html, capture_with, resolve_root, CaptureConfig};
use snap_forge::templates;

use sha2::{Digest, Sha256};

// =====================================================================
// Helper
// =====================================================================

fn default_config() -> CaptureConfig {
    CaptureConfig::default()
}

fn all(doc: &Document, selector: &str) -> Vec<NodeId> {
    doc.select_all(selector).unwrap()
}

fn one(doc: &Document, selector: &str) -> NodeId {
    doc.find_first(selector)
        .unwrap()
        .unwrap_or_else(|| panic!("no match for {selector}"))
}

// =====================================================================
// Deduplication
// =====================================================================

#[test]
fn invoice_cells_share_one_class() {
    let snap = capture_html(templates::invoice_template(), &default_config()).unwrap();
    let doc = &snap.clone.doc;
    let cells = all(doc, "td");
    assert_eq!(cells.len(), 9);

    let class = doc.attr(cells[0], "class").expect("styled cell has a class");
    assert!(class.starts_with('c'));
    for &cell in &cells {
        assert_eq!(doc.attr(cell, "class"), Some(class));
    }
    assert!(snap.classes.len() < snap.clone.style_map.len());
}

#[test]
fn invoice_rules_carry_author_styles() {
    let snap = capture_html(templates::invoice_template(), &default_config()).unwrap();
    let h1 = one(&snap.clone.doc, "h1");
    let key = snap.clone.style_map.get(h1).unwrap();
    assert!(key.contains("color:#1a365d"), "h1 key was {key}");
    let class = snap.classes.get(key).unwrap();
    assert!(snap
        .class_css
        .lines()
        .any(|rule| rule == format!(".{class}{{{key}}}")));
}

#[test]
fn every_styled_node_gets_its_class() {
    let snap = capture_html(templates::invoice_template(), &default_config()).unwrap();
    for (node, key) in snap.clone.style_map.iter() {
        // Nodes that match their tag defaults get no class.
        if key.is_empty() {
            continue;
        }
        let class = snap.classes.get(key).unwrap();
        let classes = snap.clone.doc.classes(node);
        assert!(classes.contains(&class), "missing {class} on {node:?}");
    }
}

#[test]
fn compression_shrinks_keys() {
    let compressed = capture_html(templates::minimal_template(), &default_config()).unwrap();
    let full = capture_html(
        templates::minimal_template(),
        &CaptureConfig {
            compress: false,
            ..default_config()
        },
    )
    .unwrap();
    assert!(compressed.class_css.len() < full.class_css.len());
    assert!(full.class_css.contains("display:block"));
}

#[test]
fn shared_cache_hits_on_second_capture() {
    let doc = parse_html(templates::invoice_template());
    let root = resolve_root(&doc, "body").unwrap();
    let mut cache = StyleCache::new();

    let first = capture(&doc, root, &default_config(), &mut cache).unwrap();
    assert!(first.stats.key_misses > 0);
    let keys = cache.key_count();

    let second = capture(&doc, root, &default_config(), &mut cache).unwrap();
    assert_eq!(second.stats.key_misses, 0);
    assert!(second.stats.key_hits > 0);
    assert_eq!(cache.key_count(), keys);
    assert_eq!(first.class_css, second.class_css);
}

// =====================================================================
// Shadow DOM and slots
// =====================================================================

#[test]
fn components_project_slots_and_flatten_shadow() {
    let snap = capture_html(templates::component_template(), &default_config()).unwrap();
    let doc = &snap.clone.doc;

    let card = one(doc, "x-card");
    let card_tags: Vec<&str> = doc
        .element_children(card)
        .into_iter()
        .filter_map(|n| doc.tag(n))
        .collect();
    assert_eq!(card_tags, vec!["h2", "p"]);
    assert!(doc.text_content(card).contains("Revenue grew"));

    let badge = one(doc, "x-badge");
    assert_eq!(doc.text_content(badge).trim(), "Approved");
    assert!(all(doc, "i").is_empty());
    assert!(all(doc, "template, slot, style").is_empty());

    assert_eq!(snap.clone.shadow_css.len(), 2);
    let sheet = snap.stylesheet();
    assert!(sheet.contains(".frame"));
    assert!(sheet.find(".frame").unwrap() < sheet.find(".c1{").unwrap());
}

// =====================================================================
// Form state
// =====================================================================

#[test]
fn form_live_state_is_frozen() {
    let mut doc = parse_html(templates::form_template());
    doc.set_value(one(&doc, "#name"), "Grace");
    doc.set_checked(one(&doc, "#agree"), true);
    doc.set_value(one(&doc, "#plan"), "pro");
    doc.set_value(one(&doc, "#notes"), "Edited");

    let root = resolve_root(&doc, "body").unwrap();
    let mut cache = StyleCache::new();
    let snap = capture(&doc, root, &default_config(), &mut cache).unwrap();
    let out = &snap.clone.doc;

    assert_eq!(out.attr(one(out, "#name"), "value"), Some("Grace"));
    assert!(out.has_attr(one(out, "#agree"), "checked"));
    assert_eq!(out.selected_value(one(out, "#plan")).as_deref(), Some("pro"));
    let notes = one(out, "#notes");
    assert_eq!(out.text_content(notes), "Edited");
    assert_eq!(out.inline_style_value(notes, "height").as_deref(), Some("80px"));

    let html = snap.to_html();
    assert!(html.contains(r#"value="Grace""#));
    assert!(html.contains(">Edited</textarea>"));
}

// =====================================================================
// Replaced and marked content
// =====================================================================

#[test]
fn media_substitutions() {
    let snap = capture_html(templates::media_template(), &default_config()).unwrap();
    let doc = &snap.clone.doc;

    let hero = one(doc, "#hero");
    assert_eq!(doc.attr(hero, "src"), Some("hero-1x.png"));
    assert!(!doc.has_attr(hero, "srcset"));

    let chart = one(doc, "#chart");
    assert_eq!(doc.tag(chart), Some("img"));
    assert!(doc.attr(chart, "src").unwrap().starts_with("data:image/png;base64,"));

    let frames = all(doc, "[data-snap=frame]");
    assert_eq!(frames.len(), 1);
    assert!(all(doc, "iframe").is_empty());

    let map = one(doc, "#map");
    assert_eq!(doc.text_content(map), "Map omitted");
    assert!(all(doc, "#map span").is_empty());

    assert!(all(doc, "#cookie").is_empty());
    let spacers = all(doc, "[data-snap=spacer]");
    assert_eq!(spacers.len(), 1);
    assert_eq!(
        doc.inline_style_value(spacers[0], "width").as_deref(),
        Some("300px")
    );
}

#[test]
fn config_exclusions_and_custom_placeholder() {
    let config = CaptureConfig {
        exclude: vec!["img".to_string(), "not a [selector".to_string()],
        placeholder_text: "Hidden".to_string(),
        ..default_config()
    };
    let snap = capture_html(templates::media_template(), &config).unwrap();
    let doc = &snap.clone.doc;
    assert!(all(doc, "#hero").is_empty());
    // The frozen canvas is not an <img> in the source.
    assert_eq!(all(doc, "img").len(), 1);
    assert_eq!(all(doc, "[data-snap=spacer]").len(), 2);
    let frame = all(doc, "[data-snap=frame]")[0];
    assert_eq!(doc.text_content(frame), "Hidden");
}

#[test]
fn filter_callback_prunes_subtrees() {
    let doc = parse_html(templates::invoice_template());
    let root = resolve_root(&doc, ".invoice").unwrap();
    let options = CloneOptions {
        filter: Some(Box::new(|doc: &Document, node: NodeId, _root: NodeId| {
            match doc.tag(node) {
                Some("table") => Ok(false),
                Some("h1") => Err(FilterError::new("unreadable")),
                _ => Ok(true),
            }
        })),
        ..CloneOptions::default()
    };
    let mut cache = StyleCache::new();
    let snap = capture_with(&doc, root, &default_config(), &options, &mut cache).unwrap();
    let out = &snap.clone.doc;
    assert!(all(out, "table, td").is_empty());
    assert_eq!(all(out, "h1").len(), 1);
    assert_eq!(out.attr(all(out, "div div")[0], SYNTHETIC_ATTR), Some("spacer"));
}

// =====================================================================
// Output
// =====================================================================

#[test]
fn html_output_is_standalone() {
    let snap = capture_html(templates::invoice_template(), &default_config()).unwrap();
    let html = snap.to_html();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<style>"));
    assert!(html.contains(&snap.class_css));
    assert!(html.contains("Invoice #2024-001"));
    assert!(!html.contains(".invoice h1"));

    // The snapshot renders the same without the source stylesheet.
    let recaptured = capture_html(&html, &default_config()).unwrap();
    let h1 = one(&recaptured.clone.doc, "h1");
    let key = recaptured.clone.style_map.get(h1).unwrap();
    assert!(key.contains("color:#1a365d"));
}

#[test]
fn svg_output_wraps_xhtml() {
    let snap = capture_html(templates::media_template(), &default_config()).unwrap();
    let svg = snap.to_svg(640.0, 480.0);
    assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"640\" height=\"480\""));
    assert!(svg.contains("<foreignObject"));
    assert!(svg.contains("xmlns=\"http://www.w3.org/1999/xhtml\""));
    assert!(svg.contains("<img"));
    assert!(!svg.contains("\"></img>"));
    assert!(svg.ends_with("</foreignObject></svg>"));
}

#[test]
fn output_is_deterministic() {
    let digest = |html: &str| Sha256::digest(html.as_bytes()).to_vec();
    for template in [
        templates::invoice_template(),
        templates::component_template(),
        templates::media_template(),
    ] {
        let a = capture_html(template, &default_config()).unwrap();
        let b = capture_html(template, &default_config()).unwrap();
        assert_eq!(digest(&a.to_html()), digest(&b.to_html()));
        assert_eq!(digest(&a.manifest().to_json()), digest(&b.manifest().to_json()));
    }
}

#[test]
fn manifest_describes_capture() {
    let snap = capture_html(templates::invoice_template(), &default_config()).unwrap();
    let manifest = snap.manifest();
    assert_eq!(manifest.root_tag.as_deref(), Some("body"));
    assert_eq!(manifest.classes.len(), snap.classes.len());
    assert_eq!(manifest.styled_nodes, snap.clone.style_map.len());
    assert!(manifest.tags.contains(&"td".to_string()));
    assert!(manifest.stats.key_misses > 0);

    let parsed = CaptureManifest::from_json(&manifest.to_json()).unwrap();
    assert_eq!(parsed, manifest);
}

#[test]
fn base_css_can_be_disabled() {
    let config = CaptureConfig {
        base_css: false,
        ..default_config()
    };
    let snap = capture_html(templates::minimal_template(), &config).unwrap();
    assert!(snap.base_css.is_empty());
    assert_eq!(snap.tags, vec!["div", "h1", "p"]);
}

#[test]
fn missing_root_is_reported() {
    let config = CaptureConfig {
        selector: "#absent".to_string(),
        ..default_config()
    };
    let err = capture_html(templates::minimal_template(), &config).unwrap_err();
    assert!(err.to_string().contains("#absent"));
}
