//! Typed document tree shared by every pipeline stage.
//!
//! The tree is a closed sum type: stages pattern-match exhaustively, so a new
//! kind cannot reach the serializer without the sanitizer knowing about it.

use crate::application::render::math::KatexMarkup;

/// 1-based source location as reported by the parser (byte columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Paragraph,
    Heading { level: u8 },
    Emphasis,
    Strong,
    Strikethrough,
    InlineCode(String),
    CodeBlock(CodeBlock),
    Link { href: Option<String>, title: Option<String> },
    Image { src: Option<String>, alt: String, title: Option<String> },
    List { ordered: bool, start: Option<u32>, tight: bool },
    ListItem { checked: Option<bool> },
    Table,
    TableRow { header: bool },
    TableCell { align: Alignment },
    BlockQuote,
    ThematicBreak,
    RawElement(Element),
    Text(String),
    MathInline(Math),
    MathDisplay(Math),
    /// Embedded markup exactly as written, awaiting the merger.
    Markup { literal: String, block: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    None,
    Left,
    Right,
    Center,
}

impl Alignment {
    pub fn as_attribute(self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Right => Some("right"),
            Alignment::Center => Some("center"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
    pub highlighted: Option<Highlighted>,
}

/// Output of the syntax highlighter for one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    pub background: Option<Rgb>,
    pub spans: Vec<StyledSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: Option<SpanStyle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanStyle {
    pub foreground: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// An embedded markup element with attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Math {
    pub source: String,
    pub typeset: Option<Typeset>,
}

impl Math {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            typeset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Typeset {
    Rendered(KatexMarkup),
    Failed { message: String },
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            position: None,
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            children,
            position: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(content.into()))
    }

    pub fn document(children: Vec<Node>) -> Self {
        Self::with_children(NodeKind::Document, children)
    }

    pub fn at(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    /// Concatenated text content of the subtree, in document order.
    pub fn text_content(&self) -> String {
        let mut buffer = String::new();
        collect_text(self, &mut buffer);
        buffer
    }

    /// Pre-order iterator over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

fn collect_text(node: &Node, buffer: &mut String) {
    match &node.kind {
        NodeKind::Text(text) | NodeKind::InlineCode(text) => buffer.push_str(text),
        NodeKind::CodeBlock(block) => buffer.push_str(&block.code),
        NodeKind::MathInline(math) | NodeKind::MathDisplay(math) => buffer.push_str(&math.source),
        NodeKind::Markup { literal, .. } => buffer.push_str(literal),
        NodeKind::Image { alt, .. } => buffer.push_str(alt),
        _ => {}
    }
    for child in &node.children {
        collect_text(child, buffer);
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
