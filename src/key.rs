//! Style key encoder – turns a style snapshot into the canonical string used
//! as dedup key and class-rule body.

use std::rc::Rc;

use crate::defaults::DefaultStyleTable;
use crate::style::ComputedStyle;

/// A captured style: property → resolved value for one node.
pub type StyleSnapshot = ComputedStyle;

/// Canonical, shareable encoding of a snapshot (`prop:value;prop:value`).
pub type StyleKey = Rc<str>;

/// Properties that never contribute to a key: they are either animated,
/// interaction-only, or meaningless for a static snapshot.
pub const IGNORED_PROPERTIES: &[&str] = &[
    "animation-duration",
    "animation-name",
    "caret-color",
    "cursor",
    "outline-offset",
    "pointer-events",
    "transition-duration",
    "transition-property",
    "user-select",
    "will-change",
];

/// Encode `snapshot` as a sorted `prop:value` list joined with `;`.
///
/// With `compress`, entries equal to the tag's default are dropped; a
/// missing or empty default always counts as different.
pub fn style_key(
    snapshot: &StyleSnapshot,
    tag: &str,
    compress: bool,
    defaults: &mut DefaultStyleTable,
) -> String {
    let baseline = compress.then(|| defaults.get(tag));
    let mut entries: Vec<String> = snapshot
        .iter()
        .filter(|(prop, value)| !value.is_empty() && !IGNORED_PROPERTIES.contains(prop))
        .filter(|(prop, value)| match &baseline {
            Some(d) => match d.get(prop) {
                Some(default) if !default.is_empty() => default != *value,
                _ => true,
            },
            None => true,
        })
        .map(|(prop, value)| format!("{prop}:{value}"))
        .collect();
    entries.sort();
    entries.join(";")
}

/// Split a key back into its `(prop, value)` pairs.
pub fn key_entries(key: &str) -> Vec<(&str, &str)> {
    key.split(';')
        .filter_map(|decl| decl.split_once(':'))
        .collect()
}
