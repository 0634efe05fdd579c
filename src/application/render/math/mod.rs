//! TeX math typesetting through KaTeX.
//!
//! Each expression is rendered on its own with the configured expansion and
//! size limits. KaTeX runs with `throw_on_error(false)`: parse errors and
//! exhausted limits come back as its error span carrying the literal source,
//! and unknown commands render inline in the error color. Only engine
//! failures surface as [`Typeset::Failed`].

use katex::{OptsBuilder, OutputType};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::render::tree::{Math, Node, NodeKind, Typeset};

/// Largest accepted value for either limit.
pub const LIMIT_CEILING: f64 = 1000.0;

/// Color of error text and failed expressions.
pub const ERROR_COLOR: &str = "#cc0000";

const KATEX_ERROR_OPEN: &str = "<span class=\"katex-error\"";

/// Resource bounds for one expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MathLimits {
    max_expand: u32,
    max_size_em: f64,
}

impl Default for MathLimits {
    fn default() -> Self {
        Self {
            max_expand: 10,
            max_size_em: 25.0,
        }
    }
}

impl MathLimits {
    /// Out-of-range values are pulled into `1..=1000` expansions and
    /// `(0, 1000]` em; non-finite sizes fall back to the default.
    pub fn new(max_expand: u32, max_size_em: f64) -> Self {
        let max_size_em = if max_size_em.is_finite() && max_size_em > 0.0 {
            max_size_em.min(LIMIT_CEILING)
        } else {
            Self::default().max_size_em
        };
        Self {
            max_expand: max_expand.clamp(1, LIMIT_CEILING as u32),
            max_size_em,
        }
    }

    pub fn max_expand(&self) -> u32 {
        self.max_expand
    }

    pub fn max_size_em(&self) -> f64 {
        self.max_size_em
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathStyle {
    Inline,
    Display,
}

/// Markup produced by KaTeX for one expression: HTML layout plus MathML.
///
/// Only [`typeset`] constructs it, so serializers can emit it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KatexMarkup(String);

impl KatexMarkup {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when KaTeX replaced the whole expression with its error span.
    pub fn is_error(&self) -> bool {
        self.0.starts_with(KATEX_ERROR_OPEN)
    }
}

#[derive(Debug, Error)]
pub enum MathError {
    #[error("failed to build KaTeX options: {0}")]
    Options(String),
    #[error("KaTeX rendering failed: {0}")]
    Engine(#[from] katex::Error),
}

fn render_katex(
    source: &str,
    style: MathStyle,
    limits: &MathLimits,
) -> Result<KatexMarkup, MathError> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(matches!(style, MathStyle::Display));
    builder.output_type(OutputType::HtmlAndMathml);
    builder.throw_on_error(false);
    builder.error_color(ERROR_COLOR);
    builder.trust(false);
    builder.max_expand(i32::try_from(limits.max_expand()).unwrap_or(i32::MAX));
    builder.max_size(limits.max_size_em());

    let opts = builder
        .build()
        .map_err(|err| MathError::Options(err.to_string()))?;

    let html = katex::render_with_opts(source, opts)?;
    Ok(KatexMarkup(html))
}

/// Typeset one expression. Never panics; an engine failure produces
/// `Typeset::Failed`.
pub fn typeset(source: &str, style: MathStyle, limits: &MathLimits) -> Typeset {
    match render_katex(source, style, limits) {
        Ok(markup) => Typeset::Rendered(markup),
        Err(err) => Typeset::Failed {
            message: err.to_string(),
        },
    }
}

/// Fill `Math::typeset` on every math node of the tree.
pub fn typeset_math(mut node: Node, limits: &MathLimits) -> Node {
    if let Some(raw) = authored_math(&node) {
        node = raw;
    }
    let style = match &node.kind {
        NodeKind::MathInline(_) => Some(MathStyle::Inline),
        NodeKind::MathDisplay(_) => Some(MathStyle::Display),
        _ => None,
    };
    if let (Some(style), NodeKind::MathInline(math) | NodeKind::MathDisplay(math)) =
        (style, &mut node.kind)
    {
        let result = typeset(&math.source, style, limits);
        match &result {
            Typeset::Failed { message } => {
                warn!(
                    target = "application::render::math",
                    error = %message,
                    source_len = math.source.len(),
                    "math expression failed to typeset"
                );
                counter!("safe_markup_math_failed_total").increment(1);
            }
            Typeset::Rendered(markup) if markup.is_error() => {
                debug!(
                    target = "application::render::math",
                    source_len = math.source.len(),
                    "math expression rendered as an error"
                );
                counter!("safe_markup_math_failed_total").increment(1);
            }
            Typeset::Rendered(_) => {}
        }
        math.typeset = Some(result);
    }
    node.children = std::mem::take(&mut node.children)
        .into_iter()
        .map(|child| typeset_math(child, limits))
        .collect();
    node
}

/// Authored `<span class="math-inline">` and `<div class="math-display">`
/// elements that survived sanitizing are typeset like markdown math, using
/// their text content as the source.
fn authored_math(node: &Node) -> Option<Node> {
    let NodeKind::RawElement(element) = &node.kind else {
        return None;
    };
    let class = element.attribute("class")?;
    let has = |wanted: &str| class.split_whitespace().any(|token| token == wanted);
    let math = Math::new(node.text_content());
    let kind = match element.tag.as_str() {
        "span" if has("math-inline") => NodeKind::MathInline(math),
        "div" if has("math-display") => NodeKind::MathDisplay(math),
        _ => return None,
    };
    Some(Node::new(kind).at(node.position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::tree::Element;

    fn rendered(source: &str, limits: &MathLimits) -> KatexMarkup {
        match typeset(source, MathStyle::Inline, limits) {
            Typeset::Rendered(markup) => markup,
            Typeset::Failed { message } => panic!("{source:?} failed: {message}"),
        }
    }

    fn inline(source: &str) -> KatexMarkup {
        rendered(source, &MathLimits::default())
    }

    #[test]
    fn limits_are_pulled_into_range() {
        let limits = MathLimits::new(0, f64::INFINITY);
        assert_eq!(limits.max_expand(), 1);
        assert_eq!(limits.max_size_em(), 25.0);
        let limits = MathLimits::new(u32::MAX, 1e9);
        assert_eq!(limits.max_expand(), 1000);
        assert_eq!(limits.max_size_em(), 1000.0);
    }

    #[test]
    fn renders_mathml_with_tex_annotation() {
        let markup = inline("x^2");
        assert!(!markup.is_error());
        assert!(markup.as_str().contains("<msup><mi>x</mi><mn>2</mn></msup>"));
        assert!(
            markup
                .as_str()
                .contains("<annotation encoding=\"application/x-tex\">x^2</annotation>")
        );
    }

    #[test]
    fn display_style_marks_the_math_element() {
        let Typeset::Rendered(markup) = typeset("a", MathStyle::Display, &MathLimits::default())
        else {
            panic!("display math failed");
        };
        assert!(markup.as_str().contains("display=\"block\""));
    }

    #[test]
    fn symbol_aliases_do_not_spend_expansions() {
        let source = (0..12)
            .map(|index| format!("a_{index}"))
            .collect::<Vec<_>>()
            .join(" \\le ");
        let markup = inline(&source);
        assert!(!markup.is_error(), "{}", markup.as_str());
        assert_eq!(markup.as_str().matches("<mo>≤</mo>").count(), 11);
    }

    #[test]
    fn expansion_limit_yields_error_span_with_source() {
        let source = format!("\\def\\x{{x}}{}", "\\x".repeat(11));
        let markup = inline(&source);
        assert!(markup.is_error());
        assert!(markup.as_str().contains("Too many expansions"));
        assert!(markup.as_str().contains(&source));
        assert!(markup.as_str().contains(ERROR_COLOR));
    }

    #[test]
    fn redefined_control_symbols_expand() {
        let markup = inline("\\def\\,{q}a\\,b");
        assert!(!markup.is_error(), "{}", markup.as_str());
        assert!(markup.as_str().contains("<mi>q</mi>"));
    }

    #[test]
    fn row_break_inside_a_group_is_accepted() {
        assert!(!inline("{a \\\\ b}").is_error());
        assert!(!inline("a \\\\ b").is_error());
    }

    #[test]
    fn unknown_macro_is_an_inline_error() {
        let markup = inline("a\\invalidMacro b");
        assert!(!markup.is_error());
        assert!(markup.as_str().contains("mathcolor=\"#cc0000\""));
        assert!(markup.as_str().contains("\\invalidMacro"));
    }

    #[test]
    fn oversized_rules_are_clamped() {
        let markup = inline("\\rule{500em}{500em}");
        assert!(markup.as_str().contains("width=\"25em\""));
        assert!(markup.as_str().contains("height=\"25em\""));
        assert!(!markup.as_str().contains("500em\""));
    }

    #[test]
    fn trust_dependent_commands_stay_inert() {
        let markup = inline("\\href{javascript:alert(1)}{x}");
        assert!(!markup.as_str().contains("href=\"javascript"));
    }

    #[test]
    fn typeset_math_fills_every_math_node() {
        let doc = Node::document(vec![
            Node::new(NodeKind::MathDisplay(Math::new("x^2"))),
            Node::with_children(
                NodeKind::Paragraph,
                vec![Node::new(NodeKind::MathInline(Math::new("{")))],
            ),
        ]);
        let doc = typeset_math(doc, &MathLimits::default());
        let NodeKind::MathDisplay(display) = &doc.children[0].kind else {
            panic!("expected display math");
        };
        assert!(matches!(&display.typeset, Some(Typeset::Rendered(m)) if !m.is_error()));
        let NodeKind::MathInline(inline) = &doc.children[1].children[0].kind else {
            panic!("expected inline math");
        };
        assert!(matches!(&inline.typeset, Some(Typeset::Rendered(m)) if m.is_error()));
    }

    #[test]
    fn authored_math_elements_are_typeset() {
        let mut span = Element::new("span");
        span.attributes.push(("class".into(), "math-inline".into()));
        let mut note = Element::new("span");
        note.attributes.push(("class".into(), "note".into()));
        let doc = Node::document(vec![Node::with_children(
            NodeKind::Paragraph,
            vec![
                Node::with_children(NodeKind::RawElement(span), vec![Node::text("\\frac12")]),
                Node::with_children(NodeKind::RawElement(note), vec![Node::text("\\frac12")]),
            ],
        )]);
        let doc = typeset_math(doc, &MathLimits::default());
        let paragraph = &doc.children[0];
        let NodeKind::MathInline(math) = &paragraph.children[0].kind else {
            panic!("expected inline math, got {:?}", paragraph.children[0].kind);
        };
        assert_eq!(math.source, "\\frac12");
        assert!(matches!(math.typeset, Some(Typeset::Rendered(_))));
        assert!(matches!(paragraph.children[1].kind, NodeKind::RawElement(_)));
    }
}
