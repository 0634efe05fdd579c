use comrak::{
    Arena,
    nodes::{AstNode, ListType, NodeValue, TableAlignment},
    options::Options,
    parse_document,
};

use crate::application::render::tree::{
    Alignment, CodeBlock, Element, Math, Node, NodeKind, Position,
};

/// Nesting beyond this depth is flattened to plain text.
pub const MAX_TREE_DEPTH: usize = 64;

/// Parse markdown into a document tree. Never fails: anything the grammar does
/// not recognise ends up as paragraphs of text.
pub fn parse(text: &str, options: &Options<'static>) -> Node {
    let arena = Arena::new();
    let root = parse_document(&arena, text, options);
    Node::document(Converter.children(root, 0))
}

struct Converter;

impl Converter {
    fn children<'a>(&self, node: &'a AstNode<'a>, depth: usize) -> Vec<Node> {
        node.children()
            .flat_map(|child| self.convert(child, depth + 1))
            .collect()
    }

    fn convert<'a>(&self, node: &'a AstNode<'a>, depth: usize) -> Vec<Node> {
        if depth >= MAX_TREE_DEPTH {
            return flatten(node);
        }

        let ast = node.data.borrow();
        let position = Some(Position {
            line: ast.sourcepos.start.line,
            column: ast.sourcepos.start.column,
        });

        let kind = match &ast.value {
            NodeValue::Document => return self.children(node, depth),
            NodeValue::Paragraph => NodeKind::Paragraph,
            NodeValue::Heading(heading) => NodeKind::Heading {
                level: heading.level.clamp(1, 6),
            },
            NodeValue::BlockQuote => NodeKind::BlockQuote,
            NodeValue::List(list) => NodeKind::List {
                ordered: matches!(list.list_type, ListType::Ordered),
                start: matches!(list.list_type, ListType::Ordered)
                    .then(|| u32::try_from(list.start).unwrap_or(u32::MAX)),
                tight: list.tight,
            },
            NodeValue::Item(_) => NodeKind::ListItem { checked: None },
            NodeValue::TaskItem(task) => NodeKind::ListItem {
                checked: Some(task.symbol.is_some()),
            },
            NodeValue::CodeBlock(block) => {
                let language = block
                    .info
                    .split_whitespace()
                    .next()
                    .map(|token| token.to_string());
                let code = NodeKind::CodeBlock(CodeBlock {
                    language,
                    code: block.literal.to_string(),
                    highlighted: None,
                });
                return vec![Node::new(code).at(position)];
            }
            NodeValue::HtmlBlock(block) => {
                let literal = block.literal.to_string();
                return vec![Node::new(NodeKind::Markup {
                    literal,
                    block: true,
                })
                .at(position)];
            }
            NodeValue::HtmlInline(literal) => {
                return vec![Node::new(NodeKind::Markup {
                    literal: literal.to_string(),
                    block: false,
                })
                .at(position)];
            }
            NodeValue::ThematicBreak => return vec![Node::new(NodeKind::ThematicBreak).at(position)],
            NodeValue::Text(text) => return vec![Node::text(text.to_string()).at(position)],
            NodeValue::Code(code) => {
                return vec![Node::new(NodeKind::InlineCode(code.literal.to_string())).at(position)];
            }
            NodeValue::SoftBreak => return vec![Node::text("\n").at(position)],
            NodeValue::LineBreak => {
                return vec![Node::new(NodeKind::RawElement(Element::new("br"))).at(position)];
            }
            NodeValue::Emph => NodeKind::Emphasis,
            NodeValue::Strong => NodeKind::Strong,
            NodeValue::Strikethrough => NodeKind::Strikethrough,
            NodeValue::Link(link) => NodeKind::Link {
                href: Some(link.url.to_string()),
                title: non_empty(link.title.to_string()),
            },
            NodeValue::Image(link) => {
                let image = NodeKind::Image {
                    src: Some(link.url.to_string()),
                    alt: inline_text(node),
                    title: non_empty(link.title.to_string()),
                };
                return vec![Node::new(image).at(position)];
            }
            NodeValue::Math(math) => {
                let formula = Math::new(math.literal.to_string());
                let kind = if math.display_math {
                    NodeKind::MathDisplay(formula)
                } else {
                    NodeKind::MathInline(formula)
                };
                return vec![Node::new(kind).at(position)];
            }
            NodeValue::Table(table) => {
                let alignments: Vec<Alignment> =
                    table.alignments.iter().map(|a| alignment(*a)).collect();
                return vec![self.table(node, &alignments, depth).at(position)];
            }
            // Rows and cells are consumed by `table`; anything else the grammar
            // produces is represented by its content.
            _ => return self.children(node, depth),
        };

        vec![Node::with_children(kind, self.children(node, depth)).at(position)]
    }

    fn table<'a>(&self, node: &'a AstNode<'a>, alignments: &[Alignment], depth: usize) -> Node {
        let columns = alignments.len();
        let rows = node
            .children()
            .map(|row| {
                let header = matches!(row.data.borrow().value, NodeValue::TableRow(true));
                let mut cells: Vec<Node> = row
                    .children()
                    .take(columns)
                    .zip(alignments)
                    .map(|(cell, align)| {
                        Node::with_children(
                            NodeKind::TableCell { align: *align },
                            self.children(cell, depth + 2),
                        )
                    })
                    .collect();
                while cells.len() < columns {
                    let align = alignments[cells.len()];
                    cells.push(Node::new(NodeKind::TableCell { align }));
                }
                Node::with_children(NodeKind::TableRow { header }, cells)
            })
            .collect();
        Node::with_children(NodeKind::Table, rows)
    }
}

fn alignment(value: TableAlignment) -> Alignment {
    match value {
        TableAlignment::Left => Alignment::Left,
        TableAlignment::Right => Alignment::Right,
        TableAlignment::Center => Alignment::Center,
        TableAlignment::None => Alignment::None,
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants().skip(1) {
        match &descendant.data.borrow().value {
            NodeValue::Text(value) => text.push_str(value),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::Math(math) => text.push_str(&math.literal),
            NodeValue::LineBreak | NodeValue::SoftBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

fn flatten<'a>(node: &'a AstNode<'a>) -> Vec<Node> {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(value) => text.push_str(value),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::CodeBlock(block) => text.push_str(&block.literal),
            NodeValue::Math(math) => text.push_str(&math.literal),
            NodeValue::HtmlInline(literal) => text.push_str(literal),
            NodeValue::HtmlBlock(block) => text.push_str(&block.literal),
            NodeValue::LineBreak | NodeValue::SoftBreak => text.push('\n'),
            _ => {}
        }
    }
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Node::text(text)]
    }
}
