mod config;
mod highlight;
mod markup;
mod math_scan;
mod merge;
mod parse;
mod policy;
mod sanitize;
mod serialize;

use std::sync::Arc;

use comrak::Options;
use metrics::counter;
use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;
use tracing::debug;

use crate::application::render::math::{MathLimits, typeset_math};
use crate::application::render::tree::Node;
use crate::application::render::types::{RenderService, SafeMarkup};

use config::default_options;

pub use highlight::{DEFAULT_THEME, HighlightTable, highlight, highlight_code_blocks};
pub use markup::{Token as MarkupToken, VOID_ELEMENTS, is_void, tokenize as tokenize_markup};
pub use math_scan::scan_math;
pub use merge::{MAX_MARKUP_DEPTH, merge_markup};
pub use parse::{MAX_TREE_DEPTH, parse};
pub use policy::{AttributeRule, CLOBBER_PREFIX, SanitizationPolicy, default_policy};
pub use sanitize::sanitize;
pub use serialize::serialize;

/// Default pipeline: comrak parsing, typed-tree sanitisation against the
/// GitHub policy, Syntect highlighting and MathML typesetting.
pub struct ComrakRenderService {
    options: Options<'static>,
    policy: &'static SanitizationPolicy,
    highlight: HighlightTable,
    limits: MathLimits,
}

impl ComrakRenderService {
    fn new() -> Self {
        Self::with_config(&active_render_config())
    }

    /// Build a service independent of the process-wide configuration.
    pub fn with_config(config: &RenderPipelineConfig) -> Self {
        Self {
            options: default_options(),
            policy: default_policy(),
            highlight: HighlightTable::load(&config.highlight_theme),
            limits: MathLimits::new(config.max_expand, config.max_size_em),
        }
    }

    pub fn policy(&self) -> &SanitizationPolicy {
        self.policy
    }

    pub fn limits(&self) -> MathLimits {
        self.limits
    }
}

static RENDER_SERVICE: Lazy<Arc<ComrakRenderService>> =
    Lazy::new(|| Arc::new(ComrakRenderService::new()));

/// Access the shared render service instance, initialised on first use.
pub fn render_service() -> Arc<ComrakRenderService> {
    Arc::clone(&RENDER_SERVICE)
}

/// Render untrusted text with the shared service.
pub fn render(text: &str) -> SafeMarkup {
    render_service().render(text)
}

impl Default for ComrakRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderService for ComrakRenderService {
    fn render(&self, text: &str) -> SafeMarkup {
        let document = parse_stage(text, &self.options);
        let document = math_scan_stage(document);
        let document = merge_stage(document);
        let document = sanitize_stage(document, self.policy);
        let document = highlight_stage(document, &self.highlight);
        let document = typeset_stage(document, &self.limits);
        let markup = serialize_stage(&document);

        counter!("safe_markup_render_total").increment(1);
        debug!(
            target = "application::render",
            input_len = text.len(),
            output_len = markup.len(),
            "rendered document"
        );
        SafeMarkup::new(markup)
    }
}

#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    pub max_expand: u32,
    pub max_size_em: f64,
    pub highlight_theme: String,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        let limits = MathLimits::default();
        Self {
            max_expand: limits.max_expand(),
            max_size_em: limits.max_size_em(),
            highlight_theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl From<&crate::config::RenderSettings> for RenderPipelineConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            max_expand: settings.math_max_expand,
            max_size_em: settings.math_max_size_em,
            highlight_theme: settings.highlight_theme.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderConfigError {
    #[error("render service already configured")]
    AlreadyConfigured,
}

static RENDER_PIPELINE_CONFIG: OnceCell<RenderPipelineConfig> = OnceCell::new();

pub fn configure_render_service(config: RenderPipelineConfig) -> Result<(), RenderConfigError> {
    RENDER_PIPELINE_CONFIG
        .set(config)
        .map_err(|_| RenderConfigError::AlreadyConfigured)
}

pub(crate) fn parser_options() -> Options<'static> {
    default_options()
}

fn active_render_config() -> RenderPipelineConfig {
    RENDER_PIPELINE_CONFIG.get().cloned().unwrap_or_default()
}

fn parse_stage(text: &str, options: &Options<'static>) -> Node {
    parse(text, options)
}

fn math_scan_stage(document: Node) -> Node {
    scan_math(document)
}

fn merge_stage(document: Node) -> Node {
    merge_markup(document)
}

fn sanitize_stage(document: Node, policy: &SanitizationPolicy) -> Node {
    sanitize(document, policy)
}

fn highlight_stage(document: Node, table: &HighlightTable) -> Node {
    highlight_code_blocks(document, table)
}

fn typeset_stage(document: Node, limits: &MathLimits) -> Node {
    typeset_math(document, limits)
}

fn serialize_stage(document: &Node) -> String {
    serialize(document)
}
