//! # snap-forge – style-deduplicating DOM snapshot cloner
//!
//! This crate turns a live HTML document into a self-contained, detached
//! copy whose visual styles are captured as a small set of class rules.
//! The pipeline stages are:
//!
//! 1. **Parse** – HTML string → arena DOM with live state ([`dom`])
//! 2. **Resolve** – computed style per element and pseudo-element ([`css`], [`style`])
//! 3. **Cache** – default-style table, style keys and per-capture memos
//!    ([`defaults`], [`key`], [`cache`])
//! 4. **Clone** – deep clone with exclusion, shadow/slot and form handling ([`clone`])
//! 5. **Classes** – style keys → `.cN` rules plus deduplicated base CSS ([`classes`])
//! 6. **Output** – HTML / SVG `foreignObject` markup and a JSON manifest
//!    ([`serialize`], [`manifest`])
//!
//! A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod cache;
pub mod classes;
pub mod clone;
pub mod css;
pub mod defaults;
pub mod dom;
pub mod ffi;
pub mod key;
pub mod manifest;
pub mod pipeline;
pub mod serialize;
pub mod style;
pub mod templates;

// Re-exports for convenience
pub use cache::{CaptureSession, StyleCache};
pub use clone::{clone_tree, CloneOptions, CloneOutput};
pub use pipeline::{capture, capture_html, CaptureConfig, CaptureError, Snapshot};
