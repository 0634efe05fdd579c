use syntect::{
    dumps::from_uncompressed_data,
    easy::HighlightLines,
    highlighting::{Color, FontStyle, Style, Theme, ThemeSet},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use tracing::warn;

use crate::application::render::tree::{
    CodeBlock, Highlighted, Node, NodeKind, Rgb, SpanStyle, StyledSpan,
};

pub const DEFAULT_THEME: &str = "InspiredGitHub";

/// Grammars and colour theme shared by every render. Read-only after
/// construction.
pub struct HighlightTable {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl HighlightTable {
    /// Load the bundled grammar pack and the named default theme. Failures
    /// degrade to plain-text highlighting rather than an error.
    pub fn load(theme_name: &str) -> Self {
        Self::new(load_syntax_pack(), load_theme(theme_name))
    }

    pub fn new(syntax_set: SyntaxSet, theme: Theme) -> Self {
        Self { syntax_set, theme }
    }

    pub fn background(&self) -> Option<Rgb> {
        self.theme.settings.background.map(rgb)
    }

    fn find_syntax(&self, token: &str) -> Option<&SyntaxReference> {
        let lowercase = token.to_ascii_lowercase();
        self.syntax_set
            .find_syntax_by_token(&lowercase)
            .or_else(|| self.syntax_set.find_syntax_by_name(&lowercase))
            .or_else(|| self.syntax_set.find_syntax_by_extension(&lowercase))
    }

    pub fn recognises(&self, language: &str) -> bool {
        self.find_syntax(language).is_some()
    }
}

fn load_syntax_pack() -> SyntaxSet {
    let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
    match from_uncompressed_data::<SyntaxSet>(syntax_bytes) {
        Ok(set) => set,
        Err(err) => {
            warn!(
                target = "application::render::highlight",
                error = %err,
                "syntax pack could not be decoded; highlighting disabled"
            );
            // Every lookup misses, so all code renders plain.
            SyntaxSet::new()
        }
    }
}

fn load_theme(name: &str) -> Theme {
    let mut themes = ThemeSet::load_defaults().themes;
    if let Some(theme) = themes.remove(name) {
        return theme;
    }
    warn!(
        target = "application::render::highlight",
        theme = name,
        fallback = DEFAULT_THEME,
        "unknown highlight theme"
    );
    themes.remove(DEFAULT_THEME).unwrap_or_default()
}

/// Split `code` into styled spans. The concatenated span texts always equal
/// `code` byte for byte; unknown languages yield a single unstyled span.
pub fn highlight(code: &str, language: Option<&str>, table: &HighlightTable) -> Vec<StyledSpan> {
    let plain = || {
        vec![StyledSpan {
            text: code.to_string(),
            style: None,
        }]
    };

    let Some(syntax) = language.and_then(|token| table.find_syntax(token)) else {
        return plain();
    };

    let mut highlighter = HighlightLines::new(syntax, &table.theme);
    let mut spans: Vec<StyledSpan> = Vec::new();
    for line in LinesWithEndings::from(code) {
        let regions = match highlighter.highlight_line(line, &table.syntax_set) {
            Ok(regions) => regions,
            Err(err) => {
                warn!(
                    target = "application::render::highlight",
                    language = language.unwrap_or_default(),
                    error = %err,
                    "highlighting failed; emitting plain code"
                );
                return plain();
            }
        };
        for (style, text) in regions {
            push_span(&mut spans, text, span_style(style));
        }
    }

    if spans.is_empty() { plain() } else { spans }
}

fn push_span(spans: &mut Vec<StyledSpan>, text: &str, style: Option<SpanStyle>) {
    if text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.style == style => last.text.push_str(text),
        _ => spans.push(StyledSpan {
            text: text.to_string(),
            style,
        }),
    }
}

fn span_style(style: Style) -> Option<SpanStyle> {
    Some(SpanStyle {
        foreground: rgb(style.foreground),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
        underline: style.font_style.contains(FontStyle::UNDERLINE),
    })
}

fn rgb(color: Color) -> Rgb {
    Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    }
}

/// Attach highlighter output to every code block with a recognised language.
/// Authored `<pre><code class="language-x">` elements become code blocks
/// first.
pub fn highlight_code_blocks(mut node: Node, table: &HighlightTable) -> Node {
    if let Some(block) = authored_code_block(&node) {
        node = block;
    }
    if let NodeKind::CodeBlock(block) = &mut node.kind {
        if let Some(language) = block.language.as_deref().filter(|l| table.recognises(l)) {
            let spans = highlight(&block.code, Some(language), table);
            block.highlighted = Some(Highlighted {
                background: table.background(),
                spans,
            });
        }
    }
    node.children = std::mem::take(&mut node.children)
        .into_iter()
        .map(|child| highlight_code_blocks(child, table))
        .collect();
    node
}

fn authored_code_block(node: &Node) -> Option<Node> {
    let NodeKind::RawElement(pre) = &node.kind else {
        return None;
    };
    if pre.tag != "pre" {
        return None;
    }
    let mut content = node.children.iter().filter(
        |child| !matches!(&child.kind, NodeKind::Text(text) if text.trim().is_empty()),
    );
    let (Some(code), None) = (content.next(), content.next()) else {
        return None;
    };
    let NodeKind::RawElement(element) = &code.kind else {
        return None;
    };
    if element.tag != "code" {
        return None;
    }
    let language = element
        .attribute("class")?
        .split_whitespace()
        .find_map(|class| class.strip_prefix("language-"))
        .filter(|language| !language.is_empty())?
        .to_string();
    let block = CodeBlock {
        language: Some(language),
        code: code.text_content(),
        highlighted: None,
    };
    Some(Node::new(NodeKind::CodeBlock(block)).at(node.position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::tree::Element;
    use once_cell::sync::Lazy;

    static TABLE: Lazy<HighlightTable> = Lazy::new(|| HighlightTable::load(DEFAULT_THEME));

    fn joined(spans: &[StyledSpan]) -> String {
        spans.iter().map(|span| span.text.as_str()).collect()
    }

    #[test]
    fn unknown_language_is_one_plain_span() {
        let spans = highlight("x <y>\n", Some("no-such-language"), &TABLE);
        assert_eq!(
            spans,
            vec![StyledSpan {
                text: "x <y>\n".into(),
                style: None
            }]
        );
    }

    #[test]
    fn missing_language_is_one_plain_span() {
        let spans = highlight("abc", None, &TABLE);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].style.is_none());
    }

    #[test]
    fn known_language_round_trips_text() {
        let code = "fn main() {\n    let x = \"hi\";\r\n\tprintln!(\"{x}\");\n}";
        let spans = highlight(code, Some("rust"), &TABLE);
        assert!(spans.len() > 1);
        assert_eq!(joined(&spans), code);
    }

    #[test]
    fn adjacent_equal_styles_are_coalesced() {
        let spans = highlight("let a = 1;\nlet b = 2;\n", Some("rs"), &TABLE);
        for pair in spans.windows(2) {
            assert_ne!(pair[0].style, pair[1].style);
        }
    }

    #[test]
    fn code_blocks_are_annotated_in_place() {
        let block = Node::new(NodeKind::CodeBlock(CodeBlock {
            language: Some("js".into()),
            code: "const a = 1;\n".into(),
            highlighted: None,
        }));
        let doc = highlight_code_blocks(Node::document(vec![block]), &TABLE);
        let NodeKind::CodeBlock(block) = &doc.children[0].kind else {
            panic!("expected code block");
        };
        let highlighted = block.highlighted.as_ref().expect("highlighted");
        assert_eq!(joined(&highlighted.spans), "const a = 1;\n");
    }

    fn element(tag: &str, class: Option<&str>, children: Vec<Node>) -> Node {
        let mut element = Element::new(tag);
        if let Some(class) = class {
            element.attributes.push(("class".into(), class.into()));
        }
        Node::with_children(NodeKind::RawElement(element), children)
    }

    #[test]
    fn authored_code_elements_are_highlighted() {
        let pre = element(
            "pre",
            None,
            vec![element(
                "code",
                Some("language-rust"),
                vec![Node::text("let x = 1;\n")],
            )],
        );
        let doc = highlight_code_blocks(Node::document(vec![pre]), &TABLE);
        let NodeKind::CodeBlock(block) = &doc.children[0].kind else {
            panic!("expected code block, got {:?}", doc.children[0].kind);
        };
        assert_eq!(block.language.as_deref(), Some("rust"));
        let highlighted = block.highlighted.as_ref().expect("highlighted");
        assert_eq!(joined(&highlighted.spans), "let x = 1;\n");
    }

    #[test]
    fn code_elements_without_language_stay_elements() {
        let pre = element("pre", None, vec![element("code", None, vec![Node::text("x")])]);
        let doc = highlight_code_blocks(Node::document(vec![pre]), &TABLE);
        assert!(matches!(doc.children[0].kind, NodeKind::RawElement(_)));
    }

    #[test]
    fn syntax_lookup_ignores_case() {
        assert!(TABLE.recognises("Rust"));
        assert!(TABLE.recognises("JavaScript"));
        assert!(TABLE.recognises("PY"));
    }

    #[test]
    fn empty_syntax_set_highlights_nothing() {
        let table = HighlightTable::new(SyntaxSet::new(), load_theme(DEFAULT_THEME));
        let spans = highlight("fn main() {}", Some("rust"), &table);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].style.is_none());
    }

    #[test]
    fn unknown_theme_falls_back() {
        let table = HighlightTable::load("no such theme");
        assert!(table.background().is_some());
    }
}
