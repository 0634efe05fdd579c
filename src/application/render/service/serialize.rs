use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::application::render::math::ERROR_COLOR;
use crate::application::render::tree::{
    Alignment, CodeBlock, Element, Highlighted, Math, Node, NodeKind, Typeset,
};

use super::markup::is_void;

/// Write the sanitized tree as HTML. Every text and attribute value is
/// escaped; only KaTeX output for typeset math is emitted verbatim.
pub fn serialize(document: &Node) -> String {
    let mut writer = HtmlWriter::default();
    writer.node(document);
    writer.out
}

fn is_block(kind: &NodeKind) -> bool {
    match kind {
        NodeKind::Paragraph
        | NodeKind::Heading { .. }
        | NodeKind::CodeBlock(_)
        | NodeKind::List { .. }
        | NodeKind::ListItem { .. }
        | NodeKind::Table
        | NodeKind::TableRow { .. }
        | NodeKind::BlockQuote
        | NodeKind::ThematicBreak
        | NodeKind::MathDisplay(_) => true,
        NodeKind::Markup { block, .. } => *block,
        NodeKind::RawElement(element) => BLOCK_ELEMENTS.contains(&element.tag.as_str()),
        _ => false,
    }
}

/// Embedded elements laid out like blocks.
const BLOCK_ELEMENTS: &[&str] = &[
    "blockquote", "caption", "dd", "details", "div", "dl", "dt", "figcaption", "figure", "h1",
    "h2", "h3", "h4", "h5", "h6", "hr", "li", "ol", "p", "pre", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];

#[derive(Default)]
struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    fn text(&mut self, text: &str) {
        self.out.push_str(&encode_text(text));
    }

    fn attribute(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&encode_double_quoted_attribute(value));
        self.out.push('"');
    }

    /// Siblings, with a line break wherever a block meets another node.
    fn children(&mut self, children: &[Node]) {
        let mut previous_block = None;
        for child in children {
            let block = is_block(&child.kind);
            if let Some(previous) = previous_block {
                if previous || block {
                    self.out.push('\n');
                }
            }
            self.node(child);
            previous_block = Some(block);
        }
    }

    fn wrapped(&mut self, tag: &str, children: &[Node]) {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push('>');
        self.children(children);
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    /// Block container whose children sit on their own lines.
    fn lines(&mut self, open: &str, close: &str, children: &[Node]) {
        self.out.push_str(open);
        self.out.push('\n');
        for child in children {
            self.node(child);
            self.out.push('\n');
        }
        self.out.push_str(close);
    }

    fn node(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Document => self.children(&node.children),
            NodeKind::Paragraph => self.wrapped("p", &node.children),
            NodeKind::Heading { level } => {
                let tag = format!("h{}", (*level).clamp(1, 6));
                self.wrapped(&tag, &node.children);
            }
            NodeKind::Emphasis => self.wrapped("em", &node.children),
            NodeKind::Strong => self.wrapped("strong", &node.children),
            NodeKind::Strikethrough => self.wrapped("del", &node.children),
            NodeKind::InlineCode(code) => {
                self.out.push_str("<code>");
                self.text(code);
                self.out.push_str("</code>");
            }
            NodeKind::CodeBlock(block) => self.code_block(block),
            NodeKind::Link { href, title } => {
                self.out.push_str("<a");
                if let Some(href) = href {
                    self.attribute("href", href);
                }
                if let Some(title) = title {
                    self.attribute("title", title);
                }
                self.out.push('>');
                self.children(&node.children);
                self.out.push_str("</a>");
            }
            NodeKind::Image { src, alt, title } => {
                self.out.push_str("<img");
                if let Some(src) = src {
                    self.attribute("src", src);
                }
                self.attribute("alt", alt);
                if let Some(title) = title {
                    self.attribute("title", title);
                }
                self.out.push('>');
            }
            NodeKind::List {
                ordered,
                start,
                tight,
            } => {
                let open = match (ordered, start) {
                    (true, Some(start)) if *start != 1 => format!("<ol start=\"{start}\">"),
                    (true, _) => "<ol>".to_string(),
                    (false, _) => "<ul>".to_string(),
                };
                let close = if *ordered { "</ol>" } else { "</ul>" };
                self.out.push_str(&open);
                self.out.push('\n');
                for item in &node.children {
                    match item.kind {
                        NodeKind::ListItem { checked } => self.list_item(item, checked, *tight),
                        _ => self.node(item),
                    }
                    self.out.push('\n');
                }
                self.out.push_str(close);
            }
            NodeKind::ListItem { checked } => self.list_item(node, *checked, false),
            NodeKind::Table => self.table(&node.children),
            NodeKind::TableRow { header } => self.table_row(node, *header),
            NodeKind::TableCell { align } => self.table_cell("td", *align, &node.children),
            NodeKind::BlockQuote => self.lines("<blockquote>", "</blockquote>", &node.children),
            NodeKind::ThematicBreak => self.out.push_str("<hr>"),
            NodeKind::RawElement(element) => self.element(element, &node.children),
            NodeKind::Text(text) => self.text(text),
            NodeKind::MathInline(math) => {
                self.out.push_str("<span class=\"math-inline\">");
                self.math(math);
                self.out.push_str("</span>");
            }
            NodeKind::MathDisplay(math) => {
                self.out.push_str("<div class=\"math-display\">");
                self.math(math);
                self.out.push_str("</div>");
            }
            NodeKind::Markup { literal, .. } => self.text(literal),
        }
    }

    fn code_block(&mut self, block: &CodeBlock) {
        match &block.highlighted {
            Some(Highlighted { background, spans }) => {
                self.out.push_str("<pre class=\"highlight\"");
                if let Some(background) = background {
                    self.attribute("style", &format!("background-color: {}", background.hex()));
                }
                self.out.push('>');
                self.code_open(block);
                for span in spans {
                    match &span.style {
                        Some(style) => {
                            let mut css = format!("color: {}", style.foreground.hex());
                            if style.bold {
                                css.push_str("; font-weight: bold");
                            }
                            if style.italic {
                                css.push_str("; font-style: italic");
                            }
                            if style.underline {
                                css.push_str("; text-decoration: underline");
                            }
                            self.out.push_str("<span");
                            self.attribute("style", &css);
                            self.out.push('>');
                            self.text(&span.text);
                            self.out.push_str("</span>");
                        }
                        None => self.text(&span.text),
                    }
                }
            }
            None => {
                self.out.push_str("<pre>");
                self.code_open(block);
                self.text(&block.code);
            }
        }
        self.out.push_str("</code></pre>");
    }

    fn code_open(&mut self, block: &CodeBlock) {
        self.out.push_str("<code");
        if let Some(language) = &block.language {
            self.attribute("class", &format!("language-{language}"));
        }
        self.out.push('>');
    }

    fn list_item(&mut self, item: &Node, checked: Option<bool>, tight: bool) {
        let mut checkbox = checked.map(|checked| {
            if checked {
                "<input type=\"checkbox\" checked disabled> "
            } else {
                "<input type=\"checkbox\" disabled> "
            }
        });
        self.out.push_str(if checkbox.is_some() {
            "<li class=\"task-list-item\">"
        } else {
            "<li>"
        });
        let leads_with_paragraph = item
            .children
            .first()
            .is_some_and(|child| matches!(child.kind, NodeKind::Paragraph));
        if !leads_with_paragraph {
            if let Some(input) = checkbox.take() {
                self.out.push_str(input);
            }
        }

        let mut previous_block = false;
        for (index, child) in item.children.iter().enumerate() {
            let paragraph = matches!(child.kind, NodeKind::Paragraph);
            let block = is_block(&child.kind) && !(tight && paragraph);
            if block || (index > 0 && previous_block) {
                self.out.push('\n');
            }
            match (paragraph, checkbox.take()) {
                (true, input) if tight => {
                    self.out.push_str(input.unwrap_or_default());
                    self.children(&child.children);
                }
                (true, Some(input)) => {
                    self.out.push_str("<p>");
                    self.out.push_str(input);
                    self.children(&child.children);
                    self.out.push_str("</p>");
                }
                _ => self.node(child),
            }
            previous_block = block;
        }
        if previous_block {
            self.out.push('\n');
        }
        self.out.push_str("</li>");
    }

    fn table(&mut self, rows: &[Node]) {
        self.out.push_str("<table>\n");
        let (head, body): (Vec<&Node>, Vec<&Node>) = rows
            .iter()
            .partition(|row| matches!(row.kind, NodeKind::TableRow { header: true }));
        if !head.is_empty() {
            self.out.push_str("<thead>\n");
            for row in head {
                self.table_row(row, true);
                self.out.push('\n');
            }
            self.out.push_str("</thead>\n");
        }
        if !body.is_empty() {
            self.out.push_str("<tbody>\n");
            for row in body {
                self.table_row(row, false);
                self.out.push('\n');
            }
            self.out.push_str("</tbody>\n");
        }
        self.out.push_str("</table>");
    }

    fn table_row(&mut self, row: &Node, header: bool) {
        let tag = if header { "th" } else { "td" };
        self.out.push_str("<tr>\n");
        for cell in &row.children {
            match cell.kind {
                NodeKind::TableCell { align } => self.table_cell(tag, align, &cell.children),
                _ => self.node(cell),
            }
            self.out.push('\n');
        }
        self.out.push_str("</tr>");
    }

    fn table_cell(&mut self, tag: &str, align: Alignment, children: &[Node]) {
        self.out.push('<');
        self.out.push_str(tag);
        if let Some(align) = align.as_attribute() {
            self.attribute("align", align);
        }
        self.out.push('>');
        self.children(children);
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn element(&mut self, element: &Element, children: &[Node]) {
        self.out.push('<');
        self.out.push_str(&element.tag);
        for (name, value) in &element.attributes {
            if value.is_empty() {
                self.out.push(' ');
                self.out.push_str(name);
            } else {
                self.attribute(name, value);
            }
        }
        self.out.push('>');
        if is_void(&element.tag) {
            return;
        }
        let starts_block = children.first().is_some_and(|child| is_block(&child.kind));
        let ends_block = children.last().is_some_and(|child| is_block(&child.kind));
        if starts_block {
            self.out.push('\n');
        }
        self.children(children);
        if ends_block {
            self.out.push('\n');
        }
        self.out.push_str("</");
        self.out.push_str(&element.tag);
        self.out.push('>');
    }

    fn math(&mut self, math: &Math) {
        match &math.typeset {
            Some(Typeset::Rendered(markup)) => self.out.push_str(markup.as_str()),
            Some(Typeset::Failed { message }) => {
                self.out.push_str("<span class=\"math-error\"");
                self.attribute("style", &format!("color: {ERROR_COLOR}"));
                self.attribute("title", message);
                self.out.push('>');
                self.text(&math.source);
                self.out.push_str("</span>");
            }
            None => self.text(&math.source),
        }
    }
}
