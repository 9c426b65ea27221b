//! Style cache layer.
//!
//! - [`StyleCache`] lives as long as the caller wants: it owns the
//!   default-style table and the snapshot-key table, both of which are valid
//!   across captures of unrelated documents.
//! - [`CaptureSession`] lives for one capture: it borrows the long-lived
//!   cache and owns the per-node computed-style memo and snapshot cache, so
//!   nothing keyed by node can go stale between captures.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::css::PseudoElement;
use crate::defaults::DefaultStyleTable;
use crate::dom::{Document, NodeId};
use crate::key::{style_key, StyleKey, StyleSnapshot};
use crate::style::{inheritance_parent, ComputedStyle, StyleResolver};

/// Hit/miss counters for the four caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub computed_hits: u64,
    pub computed_misses: u64,
    pub snapshot_hits: u64,
    pub snapshot_misses: u64,
    pub key_hits: u64,
    pub key_misses: u64,
    /// Tags in the default-style table when the stats were taken.
    pub default_entries: u64,
}

/// Long-lived caches shared across captures.
#[derive(Debug, Default)]
pub struct StyleCache {
    pub defaults: DefaultStyleTable,
    /// SHA-256 of (tag, compress, sorted snapshot) → key.
    keys: HashMap<[u8; 32], StyleKey>,
    /// Interned key strings, so different snapshots that encode to the same
    /// text also share one allocation.
    interned: HashSet<StyleKey>,
    key_hits: u64,
    key_misses: u64,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `snapshot`, reusing the stored key for identical content.
    pub fn key_for(&mut self, snapshot: &StyleSnapshot, tag: &str, compress: bool) -> StyleKey {
        let digest = snapshot_digest(snapshot, tag, compress);
        if let Some(key) = self.keys.get(&digest) {
            self.key_hits += 1;
            return Rc::clone(key);
        }
        self.key_misses += 1;
        let text = style_key(snapshot, tag, compress, &mut self.defaults);
        let key = self.intern(&text);
        self.keys.insert(digest, Rc::clone(&key));
        key
    }

    fn intern(&mut self, text: &str) -> StyleKey {
        if let Some(existing) = self.interned.get(text) {
            return Rc::clone(existing);
        }
        let key: StyleKey = Rc::from(text);
        self.interned.insert(Rc::clone(&key));
        key
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

fn snapshot_digest(snapshot: &StyleSnapshot, tag: &str, compress: bool) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag.to_ascii_lowercase().as_bytes());
    hasher.update([0, u8::from(compress), 0]);
    // `iter` is already sorted by property name.
    for (prop, value) in snapshot.iter() {
        hasher.update(prop.as_bytes());
        hasher.update([b':']);
        hasher.update(value.as_bytes());
        hasher.update([b';']);
    }
    hasher.finalize().into()
}

/// Per-capture caches over one source document.
pub struct CaptureSession<'d, 'c> {
    doc: &'d Document,
    cache: &'c mut StyleCache,
    resolver: StyleResolver,
    computed: HashMap<(NodeId, Option<PseudoElement>), Rc<ComputedStyle>>,
    snapshots: HashMap<NodeId, Rc<StyleSnapshot>>,
    stats: CacheStats,
    /// Key-table counters when the session started.
    key_base: (u64, u64),
}

impl<'d, 'c> CaptureSession<'d, 'c> {
    pub fn new(doc: &'d Document, cache: &'c mut StyleCache) -> Self {
        let key_base = (cache.key_hits, cache.key_misses);
        Self {
            doc,
            cache,
            resolver: StyleResolver::new(doc),
            computed: HashMap::new(),
            snapshots: HashMap::new(),
            stats: CacheStats::default(),
            key_base,
        }
    }

    pub fn document(&self) -> &'d Document {
        self.doc
    }

    /// Memoised computed style of `node` (or its pseudo-element).
    pub fn computed_style(
        &mut self,
        node: NodeId,
        pseudo: Option<PseudoElement>,
    ) -> Option<Rc<ComputedStyle>> {
        if let Some(hit) = self.computed.get(&(node, pseudo)) {
            self.stats.computed_hits += 1;
            return Some(Rc::clone(hit));
        }
        let style = match pseudo {
            None => {
                let parent = match inheritance_parent(self.doc, node) {
                    Some(p) => self.computed_style(p, None),
                    None => None,
                };
                self.resolver.resolve(self.doc, node, parent.as_deref())?
            }
            Some(pe) => {
                let element = self.computed_style(node, None)?;
                self.resolver.resolve_pseudo(self.doc, node, pe, &element)
            }
        };
        self.stats.computed_misses += 1;
        let style = Rc::new(style);
        self.computed.insert((node, pseudo), Rc::clone(&style));
        Some(style)
    }

    /// Style snapshot of `node`, captured once per session.
    ///
    /// A `visibility: hidden` node always snapshots with `opacity: 0`,
    /// overwriting whatever opacity it resolved to.
    pub fn snapshot(&mut self, node: NodeId) -> Option<Rc<StyleSnapshot>> {
        if let Some(hit) = self.snapshots.get(&node) {
            self.stats.snapshot_hits += 1;
            return Some(Rc::clone(hit));
        }
        let computed = self.computed_style(node, None)?;
        let snapshot = Rc::new(capture_snapshot(&computed));
        self.stats.snapshot_misses += 1;
        self.snapshots.insert(node, Rc::clone(&snapshot));
        Some(snapshot)
    }

    /// Style key of `node` for the style map.
    pub fn style_key(&mut self, node: NodeId, compress: bool) -> Option<StyleKey> {
        let doc = self.doc;
        let tag = doc.tag(node)?;
        self.style_key_as(node, tag, compress)
    }

    /// Style key of `node` diffed against the defaults of `tag`, for nodes
    /// whose clone is a different element (a canvas becomes an `img`).
    pub fn style_key_as(&mut self, node: NodeId, tag: &str, compress: bool) -> Option<StyleKey> {
        let snapshot = self.snapshot(node)?;
        Some(self.cache.key_for(&snapshot, tag, compress))
    }

    /// Key of a generated `::before` / `::after` box, keyed against `span`
    /// defaults since that is the element it is materialised as. Returns
    /// `None` when the pseudo-element generates no box.
    pub fn pseudo_style(
        &mut self,
        node: NodeId,
        pseudo: PseudoElement,
        compress: bool,
    ) -> Option<(Rc<ComputedStyle>, StyleKey)> {
        let style = self.computed_style(node, Some(pseudo))?;
        match style.get("content") {
            None | Some("none") | Some("normal") => return None,
            _ => {}
        }
        if style.get("display") == Some("none") {
            return None;
        }
        let mut snapshot = capture_snapshot(&style);
        snapshot.set("content", "normal");
        let key = self.cache.key_for(&snapshot, "span", compress);
        Some((style, key))
    }

    /// Drop memoised computed styles, keeping snapshots and keys.
    pub fn reset_computed_memo(&mut self) {
        self.computed.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            key_hits: self.cache.key_hits - self.key_base.0,
            key_misses: self.cache.key_misses - self.key_base.1,
            default_entries: self.cache.defaults.len() as u64,
            ..self.stats
        }
    }
}

fn capture_snapshot(computed: &ComputedStyle) -> StyleSnapshot {
    let mut snapshot = computed.clone();
    if snapshot.get("visibility") == Some("hidden") {
        snapshot.set("opacity", "0");
    }
    snapshot
}
