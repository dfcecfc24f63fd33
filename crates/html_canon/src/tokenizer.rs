//! Tolerant single-pass HTML tokenizer.
//!
//! Recognizes start tags, end tags, text data and character references.
//! Comments, declarations and processing instructions are consumed and
//! dropped. Anything that does not form a complete construct is left in the
//! surrounding text run, so malformed markup never fails to tokenize.

/// A token produced by [`Tokenizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// `<name attr=value ...>` or `<name ... />`; both spellings produce the
    /// same token. Names are ASCII-lowercased.
    StartTag {
        name: String,
        attrs: Vec<Attribute<'a>>,
    },
    /// `</name>`.
    EndTag { name: String },
    /// A maximal run of text, including stray `<` and `&` characters.
    Data(&'a str),
    /// The decoded text of a named or numeric character reference.
    Reference(String),
}

/// A tag attribute. The value is the raw slice between the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute<'a> {
    pub name: String,
    pub value: Option<&'a str>,
}

enum Markup<'a> {
    Token(Token<'a>),
    Ignored,
}

/// Iterator over the tokens of an HTML fragment.
pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    lookahead: Option<(Markup<'a>, usize)>,
    horizon: Horizon,
}

/// Offsets from which a search for a terminator already failed. A search
/// starting at or past such an offset cannot succeed either, so unterminated
/// constructs are rejected without rescanning the rest of the input.
#[derive(Debug, Default)]
struct Horizon {
    comment_close: Option<usize>,
    declaration_close: Option<usize>,
}

fn find_from(
    input: &str,
    from: usize,
    needle: &str,
    missing_from: &mut Option<usize>,
) -> Option<usize> {
    if missing_from.is_some_and(|missing| from >= missing) {
        return None;
    }
    match input[from..].find(needle) {
        Some(offset) => Some(from + offset),
        None => {
            *missing_from = Some(from);
            None
        }
    }
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            lookahead: None,
            horizon: Horizon::default(),
        }
    }

    /// Finds the end of the text run starting at `start` and the construct
    /// that terminates it, if any.
    fn scan_run(&mut self, start: usize) -> (usize, Option<(Markup<'a>, usize)>) {
        let input = self.input;
        let mut cursor = start;
        while let Some(offset) = input[cursor..].find(['<', '&']) {
            let at = cursor + offset;
            let found = if input.as_bytes()[at] == b'<' {
                markup_at(input, at, &mut self.horizon)
            } else {
                reference_at(input, at)
            };
            if found.is_some() {
                return (at, found);
            }
            cursor = at + 1;
        }
        (input.len(), None)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            if let Some((markup, end)) = self.lookahead.take() {
                self.pos = end;
                match markup {
                    Markup::Token(token) => return Some(token),
                    Markup::Ignored => continue,
                }
            }
            if self.pos >= self.input.len() {
                return None;
            }

            let input = self.input;
            let start = self.pos;
            let (data_end, found) = self.scan_run(start);
            self.lookahead = found;
            self.pos = data_end;
            if data_end > start {
                return Some(Token::Data(&input[start..data_end]));
            }
        }
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

/// Byte cursor over a tag. Every delimiter it stops on is ASCII, so the
/// slices it hands out always fall on char boundaries.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &input[start..self.pos]
    }

    fn skip_spaces(&mut self) {
        self.take_while(is_space);
    }

    /// Skips whitespace and any `/` that does not close the tag.
    fn skip_separators(&mut self) {
        loop {
            match self.peek() {
                Some(b) if is_space(b) => self.pos += 1,
                Some(b'/') if self.peek_at(1) != Some(b'>') => self.pos += 1,
                _ => return,
            }
        }
    }

    fn attribute(&mut self) -> Option<Attribute<'a>> {
        let input = self.input;
        let start = self.pos;
        // The first character may be anything but a delimiter, including '='.
        self.pos += input[start..].chars().next().map_or(1, char::len_utf8);
        self.take_while(|b| !is_space(b) && !matches!(b, b'/' | b'=' | b'>' | b'<'));
        let name = input[start..self.pos].to_ascii_lowercase();

        let before_value = self.pos;
        self.skip_spaces();
        if self.peek() != Some(b'=') {
            self.pos = before_value;
            return Some(Attribute { name, value: None });
        }
        self.take_while(|b| b == b'=');
        self.skip_spaces();

        let value = match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let open = self.pos + 1;
                let close = open + input[open..].find(char::from(quote))?;
                self.pos = close + 1;
                &input[open..close]
            }
            _ => self.take_while(|b| !is_space(b) && !matches!(b, b'>' | b'<')),
        };
        Some(Attribute {
            name,
            value: Some(value),
        })
    }
}

fn markup_at<'a>(
    input: &'a str,
    at: usize,
    horizon: &mut Horizon,
) -> Option<(Markup<'a>, usize)> {
    let rest = &input[at..];
    match rest.as_bytes().get(1).copied()? {
        b'!' if rest.starts_with("<!--") => {
            find_from(input, at + 4, "-->", &mut horizon.comment_close)
                .map(|end| (Markup::Ignored, end + 3))
        }
        b'!' | b'?' => find_from(input, at, ">", &mut horizon.declaration_close)
            .map(|end| (Markup::Ignored, end + 1)),
        b'/' => end_tag_at(input, at),
        b if b.is_ascii_alphabetic() => start_tag_at(input, at),
        _ => None,
    }
}

fn start_tag_at(input: &str, at: usize) -> Option<(Markup<'_>, usize)> {
    let mut cursor = Cursor { input, pos: at + 1 };
    let name = cursor
        .take_while(|b| !is_space(b) && !matches!(b, b'/' | b'>' | b'<'))
        .to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        cursor.skip_separators();
        match cursor.peek()? {
            // skip_separators leaves a '/' only when it is followed by '>'
            closer @ (b'>' | b'/') => {
                let end = cursor.pos + if closer == b'/' { 2 } else { 1 };
                return Some((Markup::Token(Token::StartTag { name, attrs }), end));
            }
            b'<' => return None,
            _ => attrs.push(cursor.attribute()?),
        }
    }
}

fn end_tag_at(input: &str, at: usize) -> Option<(Markup<'_>, usize)> {
    let mut cursor = Cursor { input, pos: at + 2 };
    if !cursor.peek()?.is_ascii_alphabetic() {
        return None;
    }
    let name = cursor
        .take_while(|b| !is_space(b) && !matches!(b, b'/' | b'>' | b'<'))
        .to_ascii_lowercase();
    cursor.take_while(|b| !matches!(b, b'>' | b'<'));
    match cursor.peek()? {
        b'>' => Some((Markup::Token(Token::EndTag { name }), cursor.pos + 1)),
        _ => None,
    }
}

fn reference_at(input: &str, at: usize) -> Option<(Markup<'_>, usize)> {
    let mut cursor = Cursor { input, pos: at + 1 };

    let decoded = if cursor.peek()? == b'#' {
        cursor.pos += 1;
        let radix = match cursor.peek() {
            Some(b'x' | b'X') => {
                cursor.pos += 1;
                16
            }
            _ => 10,
        };
        let digits = cursor.take_while(|b| char::from(b).is_digit(radix));
        if digits.is_empty() {
            return None;
        }
        decode_numeric(digits, radix).to_string()
    } else {
        if !cursor.peek()?.is_ascii_alphabetic() {
            return None;
        }
        let name = cursor.take_while(|b| b.is_ascii_alphanumeric());
        decode_named(name)?
    };

    if cursor.peek() == Some(b';') {
        cursor.pos += 1;
    }
    Some((Markup::Token(Token::Reference(decoded)), cursor.pos))
}

/// Decodes a numeric reference. Zero, surrogates and values past the
/// Unicode range become U+FFFD.
fn decode_numeric(digits: &str, radix: u32) -> char {
    u32::from_str_radix(digits, radix)
        .ok()
        .filter(|&code| code != 0)
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Looks a name up in the HTML5 named character reference table.
fn decode_named(name: &str) -> Option<String> {
    let reference = format!("&{name};");
    let decoded = html_escape::decode_html_entities(&reference);
    if decoded == reference {
        None
    } else {
        Some(decoded.into_owned())
    }
}
