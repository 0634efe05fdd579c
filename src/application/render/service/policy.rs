use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use serde::Serialize;
use url::Url;

/// Prefix applied to user-supplied `id`/`name` values so they cannot clobber
/// globals or anchors of the hosting page.
pub const CLOBBER_PREFIX: &str = "user-content-";

const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "br", "b", "i", "strong", "em", "a", "pre", "code", "img",
    "tt", "div", "ins", "del", "sup", "sub", "p", "ol", "ul", "table", "thead", "tbody", "tfoot",
    "blockquote", "dl", "dt", "dd", "kbd", "q", "samp", "var", "hr", "ruby", "rt", "rp", "li",
    "tr", "td", "th", "s", "strike", "summary", "details", "caption", "figure", "figcaption",
    "abbr", "bdo", "cite", "dfn", "mark", "small", "span", "time", "wbr", "input",
];

const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "template", "iframe", "object", "embed", "noscript", "textarea", "select",
    "title", "xmp", "noembed", "noframes", "frameset", "frame", "applet", "svg", "math",
];

const GLOBAL_ATTRIBUTES: &[&str] = &[
    "abbr", "accept", "accept-charset", "accesskey", "action", "align", "alt",
    "aria-describedby", "aria-hidden", "aria-label", "aria-labelledby", "axis", "border",
    "cellpadding", "cellspacing", "char", "charoff", "charset", "checked", "clear", "cols",
    "colspan", "color", "compact", "coords", "datetime", "dir", "disabled", "enctype", "for",
    "frame", "headers", "height", "hreflang", "hspace", "ismap", "label", "lang", "maxlength",
    "media", "method", "multiple", "name", "nohref", "noshade", "nowrap", "open", "prompt",
    "readonly", "rel", "rev", "rows", "rowspan", "rules", "scope", "selected", "shape", "size",
    "span", "start", "summary", "tabindex", "target", "title", "type", "usemap", "valign",
    "value", "vspace", "width", "itemprop", "id",
];

/// Constraint on the value of a permitted attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "allowed")]
pub enum AttributeRule {
    Any,
    /// Whitespace-separated tokens are filtered individually.
    Tokens(BTreeSet<String>),
    /// The whole value must be one of these (ASCII case-insensitive).
    OneOf(BTreeSet<String>),
}

/// Allowlist applied by the sanitizer. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizationPolicy {
    pub tag_names: BTreeSet<String>,
    pub strip: BTreeSet<String>,
    pub global_attributes: BTreeSet<String>,
    pub tag_attributes: BTreeMap<String, BTreeMap<String, AttributeRule>>,
    pub protocols: BTreeMap<String, BTreeSet<String>>,
    pub ancestors: BTreeMap<String, BTreeSet<String>>,
    pub clobber: BTreeSet<String>,
}

static GITHUB_POLICY: Lazy<SanitizationPolicy> = Lazy::new(SanitizationPolicy::github);

/// Process-wide default policy.
pub fn default_policy() -> &'static SanitizationPolicy {
    &GITHUB_POLICY
}

impl SanitizationPolicy {
    /// GitHub's comment schema, widened for math containers, task lists and
    /// code language classes.
    pub fn github() -> Self {
        let mut tag_attributes: BTreeMap<String, BTreeMap<String, AttributeRule>> = BTreeMap::new();
        let mut allow = |tag: &str, attribute: &str, rule: AttributeRule| {
            tag_attributes
                .entry(tag.to_string())
                .or_default()
                .insert(attribute.to_string(), rule);
        };

        allow("a", "href", AttributeRule::Any);
        allow("img", "src", AttributeRule::Any);
        allow("img", "longdesc", AttributeRule::Any);
        allow("div", "itemscope", AttributeRule::Any);
        allow("div", "itemtype", AttributeRule::Any);
        for tag in ["blockquote", "del", "ins", "q"] {
            allow(tag, "cite", AttributeRule::Any);
        }
        allow("code", "class", AttributeRule::Any);
        allow("span", "class", tokens(&["math-inline"]));
        allow("div", "class", tokens(&["math-display"]));
        allow("li", "class", tokens(&["task-list-item"]));
        allow("input", "type", one_of(&["checkbox"]));
        allow("input", "disabled", AttributeRule::Any);

        let protocols = BTreeMap::from([
            ("href".to_string(), set(&["http", "https", "mailto"])),
            ("src".to_string(), set(&["http", "https"])),
            ("cite".to_string(), set(&["http", "https"])),
            ("longdesc".to_string(), set(&["http", "https"])),
        ]);

        let ancestors = ["tbody", "tfoot", "thead", "tr", "td", "th"]
            .into_iter()
            .map(|tag| (tag.to_string(), set(&["table"])))
            .collect();

        Self {
            tag_names: set(ALLOWED_TAGS),
            strip: set(STRIPPED_TAGS),
            global_attributes: set(GLOBAL_ATTRIBUTES),
            tag_attributes,
            protocols,
            ancestors,
            clobber: set(&["id", "name"]),
        }
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tag_names.contains(tag)
    }

    pub fn strips(&self, tag: &str) -> bool {
        self.strip.contains(tag)
    }

    /// Tags one of which must enclose `tag`, if constrained.
    pub fn required_ancestors(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.ancestors.get(tag)
    }

    /// Filter one attribute of an element, returning the value to keep.
    pub fn filter_attribute(&self, tag: &str, name: &str, value: &str) -> Option<String> {
        let rule = match self.tag_attributes.get(tag).and_then(|rules| rules.get(name)) {
            Some(rule) => rule,
            None if self.global_attributes.contains(name) => &AttributeRule::Any,
            None => return None,
        };

        let value = match rule {
            AttributeRule::Any => value.to_string(),
            AttributeRule::Tokens(allowed) => {
                let kept: Vec<&str> = value
                    .split_ascii_whitespace()
                    .filter(|token| allowed.contains(*token))
                    .collect();
                if kept.is_empty() {
                    return None;
                }
                kept.join(" ")
            }
            AttributeRule::OneOf(allowed) => {
                let lowered = value.to_ascii_lowercase();
                if !allowed.contains(&lowered) {
                    return None;
                }
                lowered
            }
        };

        if !self.url_allowed(name, &value) {
            return None;
        }

        if self.clobber.contains(name) && !value.starts_with(CLOBBER_PREFIX) {
            return Some(format!("{CLOBBER_PREFIX}{value}"));
        }
        Some(value)
    }

    /// Scheme check for URL-bearing attributes. Relative references carry no
    /// scheme and are always permitted; anything unparsable is rejected.
    pub fn url_allowed(&self, attribute: &str, value: &str) -> bool {
        let Some(allowed) = self.protocols.get(attribute) else {
            return true;
        };
        match Url::parse(value) {
            Ok(url) => allowed.contains(url.scheme()),
            Err(url::ParseError::RelativeUrlWithoutBase) => true,
            Err(_) => false,
        }
    }
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn tokens(values: &[&str]) -> AttributeRule {
    AttributeRule::Tokens(set(values))
}

fn one_of(values: &[&str]) -> AttributeRule {
    AttributeRule::OneOf(set(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_script_schemes_in_any_spelling() {
        let policy = SanitizationPolicy::github();
        for value in [
            "javascript:alert(1)",
            "JaVaScRiPt:alert(1)",
            " javascript:alert(1)",
            "java\tscript:alert(1)",
            "data:text/html,<script>",
            "vbscript:x",
        ] {
            assert!(!policy.url_allowed("href", value), "{value:?}");
        }
    }

    #[test]
    fn accepts_permitted_and_relative_urls() {
        let policy = SanitizationPolicy::github();
        for value in [
            "https://example.com",
            "http://example.com/a?b#c",
            "mailto:me@example.com",
            "/relative/path",
            "#anchor",
            "page.html",
        ] {
            assert!(policy.url_allowed("href", value), "{value:?}");
        }
        assert!(!policy.url_allowed("src", "mailto:me@example.com"));
    }

    #[test]
    fn class_tokens_are_filtered() {
        let policy = SanitizationPolicy::github();
        assert_eq!(
            policy.filter_attribute("span", "class", "evil math-inline"),
            Some("math-inline".to_string())
        );
        assert_eq!(policy.filter_attribute("span", "class", "evil"), None);
        assert_eq!(
            policy.filter_attribute("code", "class", "language-rust"),
            Some("language-rust".to_string())
        );
        assert_eq!(policy.filter_attribute("p", "class", "x"), None);
    }

    #[test]
    fn clobbered_names_are_prefixed_once() {
        let policy = SanitizationPolicy::github();
        let once = policy.filter_attribute("h1", "id", "top");
        assert_eq!(once.as_deref(), Some("user-content-top"));
        let twice = policy.filter_attribute("h1", "id", once.as_deref().unwrap_or_default());
        assert_eq!(twice, once);
    }

    #[test]
    fn event_handlers_and_styles_are_not_permitted() {
        let policy = SanitizationPolicy::github();
        assert_eq!(policy.filter_attribute("img", "onerror", "x"), None);
        assert_eq!(policy.filter_attribute("div", "style", "color:red"), None);
        assert_eq!(policy.filter_attribute("input", "type", "text"), None);
    }
}
