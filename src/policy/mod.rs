//! Policy data model and the pure patch-merge engine.

pub mod engine;
pub mod types;

pub use engine::apply_patch;
pub use types::{Patch, Policy, STYLE_MAX_WORDS, STYLE_TONE, Style, StyleValue};
