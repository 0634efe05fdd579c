use metrics::counter;
use tracing::debug;

use crate::application::render::tree::{CodeBlock, Element, Node, NodeKind, Position};

use super::policy::SanitizationPolicy;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Report {
    removed: u64,
    unwrapped: u64,
    attributes_dropped: u64,
}

/// Enforce the policy over the whole tree. Disallowed elements are unwrapped,
/// stripped elements are removed with their content, and attributes or URLs
/// outside the allowlist are dropped. Running it twice changes nothing.
pub fn sanitize(document: Node, policy: &SanitizationPolicy) -> Node {
    let mut walker = Walker {
        policy,
        ancestors: Vec::new(),
        report: Report::default(),
    };
    let mut nodes = walker.node(document);
    let root = match nodes.len() {
        1 => nodes.remove(0),
        _ => Node::document(nodes),
    };

    let report = walker.report;
    if report != Report::default() {
        debug!(
            target = "application::render::sanitize",
            removed = report.removed,
            unwrapped = report.unwrapped,
            attributes_dropped = report.attributes_dropped,
            "sanitizer rewrote content"
        );
        counter!("safe_markup_sanitizer_removed_total").increment(report.removed + report.unwrapped);
    }
    root
}

struct Walker<'p> {
    policy: &'p SanitizationPolicy,
    ancestors: Vec<String>,
    report: Report,
}

impl Walker<'_> {
    fn children(&mut self, children: Vec<Node>) -> Vec<Node> {
        children
            .into_iter()
            .flat_map(|child| self.node(child))
            .collect()
    }

    fn node(&mut self, node: Node) -> Vec<Node> {
        let Node {
            kind,
            children,
            position,
        } = node;

        let kind = match kind {
            NodeKind::RawElement(element) => return self.element(element, children, position),
            NodeKind::Markup { literal, .. } => return vec![Node::text(literal).at(position)],
            NodeKind::Link { href, title } => NodeKind::Link {
                href: href.filter(|value| self.keep_url("href", value)),
                title,
            },
            NodeKind::Image { src, alt, title } => NodeKind::Image {
                src: src.filter(|value| self.keep_url("src", value)),
                alt,
                title,
            },
            NodeKind::CodeBlock(block) => NodeKind::CodeBlock(CodeBlock {
                language: block.language.and_then(clean_language),
                ..block
            }),
            NodeKind::Table => {
                self.ancestors.push("table".to_string());
                let children = self.children(children);
                self.ancestors.pop();
                return vec![Node::with_children(NodeKind::Table, children).at(position)];
            }
            kind @ (NodeKind::Document
            | NodeKind::Paragraph
            | NodeKind::Heading { .. }
            | NodeKind::Emphasis
            | NodeKind::Strong
            | NodeKind::Strikethrough
            | NodeKind::InlineCode(_)
            | NodeKind::List { .. }
            | NodeKind::ListItem { .. }
            | NodeKind::TableRow { .. }
            | NodeKind::TableCell { .. }
            | NodeKind::BlockQuote
            | NodeKind::ThematicBreak
            | NodeKind::Text(_)
            | NodeKind::MathInline(_)
            | NodeKind::MathDisplay(_)) => kind,
        };

        let children = self.children(children);
        vec![Node::with_children(kind, children).at(position)]
    }

    fn element(
        &mut self,
        element: Element,
        children: Vec<Node>,
        position: Option<Position>,
    ) -> Vec<Node> {
        let tag = element.tag.to_ascii_lowercase();

        if self.policy.strips(&tag) {
            self.report.removed += 1;
            return Vec::new();
        }

        let misplaced = self
            .policy
            .required_ancestors(&tag)
            .is_some_and(|required| !self.ancestors.iter().any(|open| required.contains(open)));
        if !self.policy.allows_tag(&tag) || misplaced {
            self.report.unwrapped += 1;
            return self.children(children);
        }

        let before = element.attributes.len();
        let attributes: Vec<(String, String)> = element
            .attributes
            .into_iter()
            .filter_map(|(name, value)| {
                let name = name.to_ascii_lowercase();
                self.policy
                    .filter_attribute(&tag, &name, &value)
                    .map(|value| (name, value))
            })
            .collect();
        self.report.attributes_dropped += (before - attributes.len()) as u64;

        self.ancestors.push(tag.clone());
        let children = self.children(children);
        self.ancestors.pop();

        let element = Element { tag, attributes };
        vec![Node::with_children(NodeKind::RawElement(element), children).at(position)]
    }

    fn keep_url(&mut self, attribute: &str, value: &str) -> bool {
        let allowed = self.policy.url_allowed(attribute, value);
        if !allowed {
            self.report.attributes_dropped += 1;
        }
        allowed
    }
}

/// Language tags end up in a class attribute; keep only identifier-ish
/// characters.
fn clean_language(language: String) -> Option<String> {
    let cleaned: String = language
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}
