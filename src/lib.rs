//! Safe rendering of untrusted markdown with embedded markup, TeX math and
//! fenced code into sanitized HTML.
//!
//! ```
//! let html = safe_markup::render("Hello <script>alert(1)</script> *world*");
//! assert!(html.as_str().contains("<em>world</em>"));
//! assert!(!html.as_str().contains("script"));
//! ```

pub mod application;
pub mod config;
pub mod infra;

pub use application::render::{RenderService, SafeMarkup, render};
