use crate::application::render::tree::{Element, Node, NodeKind, Position};

use super::markup::{Token, is_void, tokenize};

/// Open embedded elements allowed along any path; deeper start tags stay text.
pub const MAX_MARKUP_DEPTH: usize = 32;

/// Splice embedded markup into the tree: each fragment is tokenized and its
/// elements adopt the following siblings until their end tag, so raw markup
/// and markdown share one tree shape.
pub fn merge_markup(document: Node) -> Node {
    merge_node(document, 0)
}

fn merge_node(mut node: Node, raw_depth: usize) -> Node {
    let children = std::mem::take(&mut node.children);
    node.children = merge_siblings(children, raw_depth);
    node
}

fn merge_siblings(children: Vec<Node>, raw_depth: usize) -> Vec<Node> {
    if !children
        .iter()
        .any(|child| matches!(child.kind, NodeKind::Markup { .. }))
    {
        return children
            .into_iter()
            .map(|child| merge_node(child, raw_depth))
            .collect();
    }

    let mut builder = SiblingBuilder::new(raw_depth);
    for child in children {
        match child.kind {
            NodeKind::Markup { literal, .. } => {
                for token in tokenize(&literal) {
                    builder.token(token, child.position);
                }
            }
            kind => builder.node(Node {
                kind,
                children: child.children,
                position: child.position,
            }),
        }
    }
    builder.finish()
}

struct OpenElement {
    element: Element,
    children: Vec<Node>,
    position: Option<Position>,
}

struct SiblingBuilder {
    base_depth: usize,
    root: Vec<Node>,
    open: Vec<OpenElement>,
    /// Tags of start tags kept as text because of the depth bound.
    suppressed: Vec<String>,
}

impl SiblingBuilder {
    fn new(base_depth: usize) -> Self {
        Self {
            base_depth,
            root: Vec::new(),
            open: Vec::new(),
            suppressed: Vec::new(),
        }
    }

    fn depth(&self) -> usize {
        self.base_depth + self.open.len()
    }

    fn current(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        if let NodeKind::Text(text) = &node.kind {
            if text.is_empty() {
                return;
            }
        }
        self.current().push(node);
    }

    fn node(&mut self, node: Node) {
        let merged = merge_node(node, self.depth());
        self.push(merged);
    }

    fn token(&mut self, token: Token, position: Option<Position>) {
        match token {
            Token::Text(text) => self.push(Node::text(text).at(position)),
            Token::Start {
                tag,
                attributes,
                self_closing,
                raw,
            } => {
                let element = Element { tag, attributes };
                if is_void(&element.tag) || self_closing {
                    self.push(Node::new(NodeKind::RawElement(element)).at(position));
                } else if self.depth() >= MAX_MARKUP_DEPTH {
                    self.suppressed.push(element.tag);
                    self.push(Node::text(raw).at(position));
                } else {
                    self.open.push(OpenElement {
                        element,
                        children: Vec::new(),
                        position,
                    });
                }
            }
            Token::End { tag, raw } => {
                if self.suppressed.last() == Some(&tag) {
                    self.suppressed.pop();
                    self.push(Node::text(raw).at(position));
                    return;
                }
                // End tags without a matching open element are dropped.
                if let Some(index) = self
                    .open
                    .iter()
                    .rposition(|open| open.element.tag == tag)
                {
                    while self.open.len() > index {
                        self.close_top();
                    }
                }
            }
        }
    }

    fn close_top(&mut self) {
        if let Some(open) = self.open.pop() {
            let node = Node::with_children(NodeKind::RawElement(open.element), open.children)
                .at(open.position);
            self.current().push(node);
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.open.is_empty() {
            self.close_top();
        }
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup(literal: &str) -> Node {
        Node::new(NodeKind::Markup {
            literal: literal.into(),
            block: false,
        })
    }

    fn tag_of(node: &Node) -> &str {
        match &node.kind {
            NodeKind::RawElement(element) => &element.tag,
            _ => panic!("expected raw element, got {:?}", node.kind),
        }
    }

    #[test]
    fn inline_tags_adopt_following_siblings() {
        let para = Node::with_children(
            NodeKind::Paragraph,
            vec![
                Node::text("a "),
                markup("<b>"),
                Node::with_children(NodeKind::Emphasis, vec![Node::text("x")]),
                markup("</b>"),
                Node::text(" c"),
            ],
        );
        let doc = merge_markup(Node::document(vec![para]));
        let para = &doc.children[0];
        assert_eq!(para.children.len(), 3);
        let bold = &para.children[1];
        assert_eq!(tag_of(bold), "b");
        assert!(matches!(bold.children[0].kind, NodeKind::Emphasis));
    }

    #[test]
    fn block_markup_wraps_markdown_blocks() {
        let doc = Node::document(vec![
            markup("<details class=\"note\">\n"),
            Node::with_children(NodeKind::Paragraph, vec![Node::text("A note.")]),
            markup("</details>\n"),
        ]);
        let doc = merge_markup(doc);
        let details = &doc.children[0];
        assert_eq!(tag_of(details), "details");
        assert!(
            details
                .children
                .iter()
                .any(|child| matches!(child.kind, NodeKind::Paragraph))
        );
    }

    #[test]
    fn stray_end_tags_are_ignored_and_open_tags_close() {
        let doc = Node::document(vec![markup("</i><span>open")]);
        let doc = merge_markup(doc);
        assert_eq!(doc.children.len(), 1);
        assert_eq!(tag_of(&doc.children[0]), "span");
        assert_eq!(doc.children[0].text_content(), "open");
    }

    #[test]
    fn void_elements_never_open() {
        let doc = merge_markup(Node::document(vec![markup("<br>text")]));
        assert_eq!(doc.children.len(), 2);
        assert!(doc.children[0].children.is_empty());
    }

    #[test]
    fn nesting_beyond_bound_becomes_text() {
        let literal = format!("{}x{}", "<div>".repeat(100), "</div>".repeat(100));
        let doc = merge_markup(Node::document(vec![markup(&literal)]));
        let mut depth = 0;
        let mut node = &doc;
        while let Some(child) = node
            .children
            .iter()
            .find(|child| matches!(child.kind, NodeKind::RawElement(_)))
        {
            depth += 1;
            node = child;
        }
        assert_eq!(depth, MAX_MARKUP_DEPTH);
        assert!(node.text_content().contains("<div>"));
        assert!(node.text_content().contains('x'));
    }

    #[test]
    fn interleaved_end_tag_closes_inner_elements() {
        let doc = merge_markup(Node::document(vec![markup("<p><b>x</p>y")]));
        assert_eq!(doc.children.len(), 2);
        let p = &doc.children[0];
        assert_eq!(tag_of(p), "p");
        assert_eq!(tag_of(&p.children[0]), "b");
        assert!(matches!(&doc.children[1].kind, NodeKind::Text(t) if t == "y"));
    }
}
