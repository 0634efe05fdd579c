//! Properties that hold for every input, checked on generated documents.

use once_cell::sync::Lazy;
use proptest::prelude::*;
use safe_markup::application::render::{
    DEFAULT_THEME, HighlightTable, MathLimits, MathStyle, default_policy, highlight,
    merge_markup, parse, parser_options, render, sanitize, scan_math, typeset,
};

static TABLE: Lazy<HighlightTable> = Lazy::new(|| HighlightTable::load(DEFAULT_THEME));

/// Fragments that exercise every stage, including hostile ones.
const PIECES: &[&str] = &[
    "# heading\n",
    "> quote\n",
    "* item\n",
    "1. first\n",
    "- [x] done\n",
    "| a | b |\n| - | - |\n| 1 | 2 |\n",
    "*em* **strong** ~~del~~ ",
    "`code` ",
    "```rust\nfn main() {}\n```\n",
    "```\n<raw>\n```\n",
    "$x^2$ ",
    "$$\n\\frac{a}{b}\n$$\n",
    "$\\rule{900em}{900em}$ ",
    "$\\def\\x{\\x}\\x$ ",
    "$\\invalidMacro$ ",
    "<div>",
    "</div>",
    "<b>bold</b>",
    "<script>alert(1)</script>",
    "<img src=x onerror=alert(1)>",
    "<a href=\"javascript:alert(1)\">j</a>",
    "<a href=\"&#106;avascript:alert(1)\">e</a>",
    "[link](javascript:alert(1))",
    "<svg><script>alert(1)</script></svg>",
    "<style>body{}</style>",
    "<iframe src=x></iframe>",
    "<span style=\"color:red\" id=top>s</span>",
    "<math><mi>x</mi></math>",
    "\n\n",
    "plain text ",
    "&lt;escaped&gt; ",
];

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(PIECES), 0..24).prop_map(|pieces| pieces.concat())
}

const LANGUAGES: &[&str] = &["rust", "javascript", "python", "no-such-language"];

const FORBIDDEN_TAGS: &[&str] = &["script", "style", "iframe", "svg", "object", "embed"];

/// Text content is escaped, so every `<` in the output opens a real tag.
fn assert_no_active_content(html: &str) {
    for raw in html.split('<').skip(1) {
        let tag = raw.split('>').next().unwrap_or_default().to_ascii_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace())
            .next()
            .unwrap_or_default();
        assert!(!FORBIDDEN_TAGS.contains(&name), "forbidden <{name}> in {html}");
        for attribute in tag.split_whitespace().skip(1) {
            let handler = attribute.starts_with("on") && attribute.contains('=');
            assert!(!handler, "handler {attribute:?} in {html}");
            assert!(!attribute.contains("javascript:"), "script url {attribute:?} in {html}");
            if attribute.starts_with("style=") {
                assert!(matches!(name, "pre" | "span"), "style on <{name}> in {html}");
                assert!(!attribute.contains("color:red"), "user style in {html}");
            }
        }
    }
}

proptest! {
    #[test]
    fn render_is_total_on_arbitrary_text(text in ".{0,400}") {
        let _ = render(&text);
    }

    #[test]
    fn rendered_documents_carry_no_active_content(text in document()) {
        let html = render(&text);
        assert_no_active_content(html.as_str());
    }

    #[test]
    fn rendering_is_deterministic(text in document()) {
        prop_assert_eq!(render(&text), render(&text));
    }

    #[test]
    fn sanitize_is_idempotent(text in document()) {
        let tree = merge_markup(scan_math(parse(&text, &parser_options())));
        let once = sanitize(tree, default_policy());
        let twice = sanitize(once.clone(), default_policy());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn highlighting_preserves_code(code in "[ -~\n]{0,200}", language in prop::sample::select(LANGUAGES)) {
        let joined: String = highlight(&code, Some(language), &TABLE)
            .iter()
            .map(|span| span.text.as_str())
            .collect();
        prop_assert_eq!(joined, code);
    }

    #[test]
    fn typesetting_is_total(source in "[a-z0-9{}^_\\\\ +=()&]{0,80}") {
        let _ = typeset(&source, MathStyle::Inline, &MathLimits::default());
        let _ = typeset(&source, MathStyle::Display, &MathLimits::default());
    }
}
