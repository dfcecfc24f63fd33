#![forbid(unsafe_code)]
// Allow pedantic lints for early-stage API ergonomics.
#![allow(clippy::nursery)]
#![allow(clippy::pedantic)]

//! # HTML Canon
//!
//! Canonical form of rendered HTML, used to decide whether two markdown
//! renderers produced the same document.
//!
//! Two fragments that differ only in renderer-specific but insignificant ways
//! canonicalize to the same string:
//! - runs of whitespace collapse to one space, and text is trimmed at tag
//!   boundaries (except inside `<pre>`)
//! - only the `alt`, `href` and `src` attributes survive, sorted by name
//! - `<br>` and `<br />` are the same tag
//! - named, decimal and hexadecimal character references decode to the
//!   literal character
//! - comments and doctypes are dropped
//!
//! ## Example
//!
//! ```rust
//! use html_canon::canonicalize;
//!
//! assert_eq!(
//!     canonicalize("<p id=\"x\">a  &lt;\n b<br /></p>\n"),
//!     canonicalize("<p>a &#60; b<br></p>"),
//! );
//! assert_eq!(canonicalize("<p>a  \t\nb</p>"), "<p>a b</p>");
//! ```
//!
//! Canonicalization never fails. Markup that does not form a complete tag is
//! kept as literal text.

mod tokenizer;

use tokenizer::{Attribute, Token, Tokenizer};

/// Attributes kept in canonical form. Everything else is renderer noise
/// (anchor ids, CSS classes, inline styles).
pub const SIGNIFICANT_ATTRIBUTES: [&str; 3] = ["alt", "href", "src"];

/// Returns the canonical form of an HTML fragment.
///
/// Pure and deterministic: the result depends on `html` alone.
pub fn canonicalize(html: &str) -> String {
    let mut canon = Canonicalizer::with_capacity(html.len());
    for token in Tokenizer::new(html) {
        canon.push(token);
    }
    canon.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Outside,
    /// Between a literal `<pre>` and `</pre>`. Not nesting-aware.
    Preformatted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    StartTag,
    EndTag,
    Data,
    Reference,
}

/// State for one canonicalization pass.
struct Canonicalizer {
    out: String,
    mode: Mode,
    last: Option<TokenKind>,
    /// Set when trimming discarded a word boundary that a following
    /// reference needs back.
    pending_boundary_space: bool,
    /// Text not yet trimmed. Adjacent runs (split by a dropped comment or
    /// by a reference decoding to whitespace) are trimmed as one.
    text: String,
}

impl Canonicalizer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            mode: Mode::Outside,
            last: None,
            pending_boundary_space: false,
            text: String::new(),
        }
    }

    fn push(&mut self, token: Token<'_>) {
        match token {
            Token::Data(text) => self.text.push_str(text),
            // Outside <pre> whitespace is whitespace however it was spelled.
            Token::Reference(text) if self.mode == Mode::Outside && is_blank(&text) => {
                self.text.push_str(&text);
            }
            token => {
                self.flush_text();
                match token {
                    Token::StartTag { name, attrs } => self.start_tag(&name, attrs),
                    Token::EndTag { name } => self.end_tag(&name),
                    Token::Reference(text) => self.reference(&text),
                    Token::Data(_) => {}
                }
            }
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.data(&text);
        }
    }

    fn finish(mut self) -> String {
        self.flush_text();
        self.out
    }

    fn start_tag(&mut self, name: &str, attrs: Vec<Attribute<'_>>) {
        let mut kept: Vec<Attribute<'_>> = attrs
            .into_iter()
            .filter(|attr| SIGNIFICANT_ATTRIBUTES.contains(&attr.name.as_str()))
            .collect();
        kept.sort_by(|a, b| a.name.cmp(&b.name));

        self.out.push('<');
        self.out.push_str(name);
        for attr in &kept {
            let value = attr.value.unwrap_or("");
            // A value can only hold '"' if it arrived single-quoted.
            let quote = if value.contains('"') { '\'' } else { '"' };
            self.out.push(' ');
            self.out.push_str(&attr.name);
            self.out.push('=');
            self.out.push(quote);
            self.out.push_str(value);
            self.out.push(quote);
        }
        self.out.push('>');

        if name == "pre" {
            self.mode = Mode::Preformatted;
        }
        self.last = Some(TokenKind::StartTag);
    }

    fn end_tag(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');

        if name == "pre" {
            self.mode = Mode::Outside;
        }
        self.last = Some(TokenKind::EndTag);
    }

    fn data(&mut self, text: &str) {
        if self.mode == Mode::Preformatted {
            self.out.push_str(text);
            self.pending_boundary_space = false;
            self.last = Some(TokenKind::Data);
            return;
        }

        let collapsed = collapse_whitespace(text);
        let stripped = collapsed.trim_matches(' ');
        let leading_space = text.starts_with(is_html_space);
        let trailing_space = text.ends_with(is_html_space);
        let after_reference = self.last == Some(TokenKind::Reference);

        if stripped.is_empty() {
            // Whitespace between two references still separates them.
            self.pending_boundary_space = after_reference && leading_space;
        } else {
            if after_reference && leading_space {
                self.out.push(' ');
            }
            self.out.push_str(stripped);
            self.pending_boundary_space = trailing_space;
        }
        self.last = Some(TokenKind::Data);
    }

    fn reference(&mut self, text: &str) {
        if self.last == Some(TokenKind::Data) && self.pending_boundary_space {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.pending_boundary_space = false;
        self.last = Some(TokenKind::Reference);
    }
}

fn is_html_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

fn is_blank(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_html_space)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if is_html_space(c) {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
