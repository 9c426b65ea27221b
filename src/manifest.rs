//! Capture manifest – a JSON summary of a snapshot for tooling that does
//! not need the clone tree itself.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::key::key_entries;
use crate::pipeline::Snapshot;

/// Summary of one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureManifest {
    /// Tag of the first top-level clone node.
    pub root_tag: Option<String>,
    /// Nodes in the clone tree.
    pub node_count: usize,
    /// Clone nodes with a source mapping.
    pub mapped_nodes: usize,
    /// Clone nodes with a style key.
    pub styled_nodes: usize,
    /// Generated classes in assignment order.
    pub classes: Vec<ClassEntry>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub base_css: String,
    #[serde(default)]
    pub shadow_css: Vec<String>,
    #[serde(default)]
    pub stats: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    /// Declarations of the rule (the style key).
    pub declarations: String,
    /// The same declarations split into property/value pairs.
    #[serde(default)]
    pub properties: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl CaptureManifest {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let clone = &snapshot.clone;
        let root_tag = clone
            .root()
            .and_then(|r| clone.doc.tag(r))
            .map(str::to_string);
        Self {
            root_tag,
            node_count: clone.doc.descendants(clone.doc.root()).len(),
            mapped_nodes: clone.node_map.len(),
            styled_nodes: clone.style_map.len(),
            classes: snapshot
                .classes
                .iter()
                .map(|(key, name)| ClassEntry {
                    name: name.to_string(),
                    declarations: key.to_string(),
                    properties: key_entries(key)
                        .into_iter()
                        .map(|(property, value)| Declaration {
                            property: property.to_string(),
                            value: value.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            tags: snapshot.tags.clone(),
            base_css: snapshot.base_css.clone(),
            shadow_css: clone.shadow_css.clone(),
            stats: snapshot.stats,
        }
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Snapshot {
    pub fn manifest(&self) -> CaptureManifest {
        CaptureManifest::from_snapshot(self)
    }
}
