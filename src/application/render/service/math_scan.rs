use crate::application::render::tree::{Math, Node, NodeKind};

/// Settle math placement: display math must stand alone as a block, so a
/// paragraph holding only display math becomes that block, while display math
/// mixed into running text is demoted to inline math. Fenced `math` code blocks
/// become display math.
pub fn scan_math(document: Node) -> Node {
    scan(document, false)
}

fn scan(mut node: Node, inline: bool) -> Node {
    let children_inline = inline || holds_inline_content(&node.kind);
    node.children = std::mem::take(&mut node.children)
        .into_iter()
        .map(|child| {
            if children_inline {
                scan(demote(child), true)
            } else {
                scan(promote(child), false)
            }
        })
        .collect();
    node
}

fn holds_inline_content(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Paragraph
            | NodeKind::Heading { .. }
            | NodeKind::TableCell { .. }
            | NodeKind::Emphasis
            | NodeKind::Strong
            | NodeKind::Strikethrough
            | NodeKind::Link { .. }
    )
}

fn promote(node: Node) -> Node {
    if matches!(node.kind, NodeKind::Paragraph) {
        if let Some(index) = sole_display_math(&node.children) {
            let position = node.position;
            let mut children = node.children;
            return children.swap_remove(index).at(position);
        }
    }

    match node.kind {
        NodeKind::CodeBlock(block)
            if block
                .language
                .as_deref()
                .is_some_and(|language| language.eq_ignore_ascii_case("math")) =>
        {
            let source = block.code.trim_end_matches('\n').to_string();
            Node::new(NodeKind::MathDisplay(Math::new(source))).at(node.position)
        }
        kind => Node {
            kind,
            children: node.children,
            position: node.position,
        },
    }
}

fn demote(node: Node) -> Node {
    match node.kind {
        NodeKind::MathDisplay(math) => Node {
            kind: NodeKind::MathInline(math),
            children: node.children,
            position: node.position,
        },
        kind => Node {
            kind,
            children: node.children,
            position: node.position,
        },
    }
}

/// Index of the only display-math child when every other child is whitespace.
fn sole_display_math(children: &[Node]) -> Option<usize> {
    let mut found = None;
    for (index, child) in children.iter().enumerate() {
        match &child.kind {
            NodeKind::MathDisplay(_) if found.is_none() => found = Some(index),
            NodeKind::Text(text) if text.trim().is_empty() => {}
            _ => return None,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render::tree::CodeBlock;

    fn paragraph(children: Vec<Node>) -> Node {
        Node::with_children(NodeKind::Paragraph, children)
    }

    fn display(source: &str) -> Node {
        Node::new(NodeKind::MathDisplay(Math::new(source)))
    }

    #[test]
    fn lone_display_math_replaces_its_paragraph() {
        let doc = Node::document(vec![paragraph(vec![display("x"), Node::text("\n")])]);
        let doc = scan_math(doc);
        assert_eq!(doc.children.len(), 1);
        assert!(matches!(&doc.children[0].kind, NodeKind::MathDisplay(m) if m.source == "x"));
    }

    #[test]
    fn display_math_inside_text_is_demoted() {
        let doc = Node::document(vec![paragraph(vec![Node::text("see "), display("x")])]);
        let doc = scan_math(doc);
        let para = &doc.children[0];
        assert!(matches!(para.kind, NodeKind::Paragraph));
        assert!(matches!(para.children[1].kind, NodeKind::MathInline(_)));
    }

    #[test]
    fn math_fence_becomes_display_math() {
        let block = Node::new(NodeKind::CodeBlock(CodeBlock {
            language: Some("math".into()),
            code: "a+b\n".into(),
            highlighted: None,
        }));
        let doc = scan_math(Node::document(vec![block]));
        assert!(matches!(&doc.children[0].kind, NodeKind::MathDisplay(m) if m.source == "a+b"));
    }

    #[test]
    fn nested_emphasis_demotes_display_math() {
        let strong = Node::with_children(NodeKind::Strong, vec![display("y")]);
        let doc = scan_math(Node::document(vec![paragraph(vec![strong])]));
        let strong = &doc.children[0].children[0];
        assert!(matches!(strong.children[0].kind, NodeKind::MathInline(_)));
    }
}
