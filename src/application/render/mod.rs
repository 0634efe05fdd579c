//! Safe markup rendering.
//!
//! Untrusted text passes through a fixed sequence of pure stages over a typed
//! [`tree::Node`] document: parse, math scan, embedded-markup merge,
//! sanitize, highlight, typeset, serialize. Nothing produced after the
//! sanitizer is re-parsed as markup.

pub mod math;
pub mod tree;

mod service;
mod types;

pub use math::{KatexMarkup, MathLimits, MathStyle, typeset, typeset_math};
pub use service::{
    AttributeRule, CLOBBER_PREFIX, ComrakRenderService, DEFAULT_THEME, HighlightTable,
    MAX_MARKUP_DEPTH, MAX_TREE_DEPTH, MarkupToken, RenderConfigError, RenderPipelineConfig,
    SanitizationPolicy, VOID_ELEMENTS, configure_render_service, default_policy, highlight,
    highlight_code_blocks, is_void, merge_markup, parse, render, render_service, sanitize,
    scan_math, serialize, tokenize_markup,
};
pub use types::{RenderService, SafeMarkup};

/// Parser options used by the default service.
pub fn parser_options() -> comrak::Options<'static> {
    service::parser_options()
}
