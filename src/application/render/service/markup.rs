//! Tokenizer for embedded markup fragments, driven by html5ever.
//!
//! Every input yields tokens. Character references are decoded by the HTML5
//! tokenizer before any policy decision, so obfuscated attribute values are
//! judged by what a browser would see. Comments and doctypes are dropped.

use std::cell::RefCell;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, TagKind, Token as Html5Token, TokenSink, TokenSinkResult, Tokenizer,
    TokenizerOpts,
};
use html5ever::TokenizerResult;

/// Elements that never have content.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Start {
        tag: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
        raw: String,
    },
    End {
        tag: String,
        raw: String,
    },
    Text(String),
}

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn tokenize(input: &str) -> Vec<Token> {
    let queue = BufferQueue::default();
    queue.push_back(StrTendril::from_slice(input));

    let tokenizer = Tokenizer::new(Collector::default(), TokenizerOpts::default());
    while let TokenizerResult::Script(()) = tokenizer.feed(&queue) {}
    tokenizer.end();

    tokenizer.sink.tokens.take()
}

/// Switches the tokenizer into the content model the HTML5 tree builder
/// would pick for these elements.
fn content_model(tag: &str) -> Option<RawKind> {
    match tag {
        "script" => Some(RawKind::ScriptData),
        "title" | "textarea" => Some(RawKind::Rcdata),
        "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => Some(RawKind::Rawtext),
        _ => None,
    }
}

#[derive(Default)]
struct Collector {
    tokens: RefCell<Vec<Token>>,
}

impl Collector {
    fn text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut tokens = self.tokens.borrow_mut();
        if let Some(Token::Text(previous)) = tokens.last_mut() {
            previous.push_str(text);
        } else {
            tokens.push(Token::Text(text.to_string()));
        }
    }

    fn push(&self, token: Token) {
        self.tokens.borrow_mut().push(token);
    }
}

impl TokenSink for Collector {
    type Handle = ();

    fn process_token(&self, token: Html5Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Html5Token::TagToken(tag) => {
                let name = tag.name.to_string();
                match tag.kind {
                    TagKind::StartTag => {
                        let attributes: Vec<(String, String)> = tag
                            .attrs
                            .iter()
                            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                            .collect();
                        let raw = start_tag_source(&name, &attributes, tag.self_closing);
                        let model = (!tag.self_closing)
                            .then(|| content_model(&name))
                            .flatten();
                        self.push(Token::Start {
                            tag: name,
                            attributes,
                            self_closing: tag.self_closing,
                            raw,
                        });
                        if let Some(kind) = model {
                            return TokenSinkResult::RawData(kind);
                        }
                    }
                    TagKind::EndTag => {
                        let raw = format!("</{name}>");
                        self.push(Token::End { tag: name, raw });
                    }
                }
            }
            Html5Token::CharacterTokens(text) => self.text(&text),
            Html5Token::NullCharacterToken => self.text("\u{FFFD}"),
            Html5Token::CommentToken(_)
            | Html5Token::DoctypeToken(_)
            | Html5Token::ParseError(_)
            | Html5Token::EOFToken => {}
        }
        TokenSinkResult::Continue
    }
}

/// Source form of a start tag, used when the tag has to be kept as text.
fn start_tag_source(tag: &str, attributes: &[(String, String)], self_closing: bool) -> String {
    let mut raw = format!("<{tag}");
    for (name, value) in attributes {
        raw.push(' ');
        raw.push_str(name);
        if !value.is_empty() {
            raw.push_str("=\"");
            raw.push_str(value);
            raw.push('"');
        }
    }
    if self_closing {
        raw.push_str(" /");
    }
    raw.push('>');
    raw
}
