use std::fmt;

use serde::Serialize;

/// Output of the rendering pipeline. Every value has passed the sanitizer,
/// so only the pipeline itself can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct SafeMarkup(String);

impl SafeMarkup {
    pub(crate) fn new(markup: String) -> Self {
        Self(markup)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl AsRef<str> for SafeMarkup {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for SafeMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rendering interface so callers can substitute their own pipeline in tests.
pub trait RenderService: Send + Sync {
    /// Total: any input yields markup, never an error.
    fn render(&self, text: &str) -> SafeMarkup;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_string() {
        let markup = SafeMarkup::new("<p>hi</p>".into());
        let json = serde_json::to_string(&markup).expect("serialize");
        assert_eq!(json, "\"<p>hi</p>\"");
        assert_eq!(markup.to_string(), "<p>hi</p>");
    }
}
