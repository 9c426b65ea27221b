//! Class generation and base-CSS deduplication – the post-pass that turns a
//! style map into a small stylesheet.

use std::collections::{HashMap, HashSet};

use crate::clone::StyleMap;
use crate::defaults::DefaultStyleTable;
use crate::dom::{Document, NodeId};
use crate::key::StyleKey;

pub const CLASS_PREFIX: &str = "c";

/// Style key → generated class name, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ClassMap {
    entries: Vec<(StyleKey, String)>,
    index: HashMap<StyleKey, usize>,
}

impl ClassMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    /// `(key, class)` pairs in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&StyleKey, &str)> {
        self.entries.iter().map(|(k, c)| (k, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assign `c1`, `c2`, ... to the distinct non-empty keys of `style_map`.
pub fn generate_css_classes(style_map: &StyleMap) -> ClassMap {
    let mut map = ClassMap::default();
    for (_, key) in style_map.iter() {
        if key.is_empty() || map.index.contains_key(key) {
            continue;
        }
        let class = format!("{CLASS_PREFIX}{}", map.entries.len() + 1);
        map.index.insert(key.clone(), map.entries.len());
        map.entries.push((key.clone(), class));
    }
    map
}

/// Add each styled clone node's generated class to its `class` attribute.
pub fn apply_classes(doc: &mut Document, style_map: &StyleMap, classes: &ClassMap) {
    for (node, key) in style_map.iter() {
        if let Some(class) = classes.get(key) {
            doc.add_class(node, class);
        }
    }
}

/// One `.cN{key}` rule per class.
pub fn class_css(classes: &ClassMap) -> String {
    classes
        .iter()
        .map(|(key, class)| format!(".{class}{{{key}}}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Distinct tag names under (and including) `root`, in document order.
pub fn collect_used_tag_names(doc: &Document, root: NodeId) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(root)
        .chain(doc.descendants(root))
        .filter_map(|n| doc.tag(n))
        .filter(|tag| seen.insert(*tag))
        .map(str::to_string)
        .collect()
}

/// One rule per group of tags whose default styles serialise identically,
/// e.g. `div,section{...}`. Tags without visual defaults are skipped.
pub fn generate_deduped_base_css(tags: &[String], defaults: &mut DefaultStyleTable) -> String {
    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
    let mut by_block: HashMap<String, usize> = HashMap::new();
    for tag in tags {
        let style = defaults.get(tag);
        if style.is_empty() {
            continue;
        }
        let block: String = style
            .iter()
            .map(|(prop, value)| format!("{prop}:{value};"))
            .collect();
        match by_block.get(&block) {
            Some(&i) => {
                if !groups[i].1.contains(&tag.as_str()) {
                    groups[i].1.push(tag.as_str());
                }
            }
            None => {
                by_block.insert(block.clone(), groups.len());
                groups.push((block, vec![tag.as_str()]));
            }
        }
    }
    groups
        .iter()
        .map(|(block, tags)| format!("{}{{{}}}", tags.join(","), block))
        .collect::<Vec<_>>()
        .join("\n")
}
