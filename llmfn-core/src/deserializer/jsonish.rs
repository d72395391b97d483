//! Lenient JSON reading for model output.
//!
//! Accepted beyond strict JSON: trailing commas, unquoted object keys,
//! single-quoted strings and the `None` / `True` / `False` literals.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value as Json};

static JSON_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?$")
        .expect("number pattern is valid")
});

/// Parse a complete document. `None` when the text is not (lenient) JSON.
pub(crate) fn parse(text: &str) -> Option<Json> {
    let mut parser = Parser {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    (parser.pos == parser.bytes.len()).then_some(value)
}

/// JSON candidates found in free-form output, in document order.
///
/// The whole text wins when it parses. Otherwise every balanced `{...}` or
/// `[...]` span that parses is a candidate. With `partial` set, the first
/// unterminated bracket whose tail can be repaired is the still-arriving
/// payload: its repaired value goes first, ahead of any balanced span seen
/// in the prose before it.
pub(crate) fn candidates(text: &str, partial: bool) -> Vec<Json> {
    let trimmed = text.trim();
    if let Some(value) = parse(trimmed) {
        return vec![value];
    }

    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        if !matches!(bytes[pos], b'{' | b'[') {
            pos += 1;
            continue;
        }
        match balanced_end(bytes, pos) {
            Some(end) => match parse(&text[pos..end]) {
                Some(value) => {
                    found.push(value);
                    pos = end;
                }
                None => pos += 1,
            },
            None if partial => {
                match close_truncated(&text[pos..]).and_then(|t| parse(&t)) {
                    Some(value) => {
                        found.insert(0, value);
                        break;
                    }
                    None => pos += 1,
                }
            }
            None => pos += 1,
        }
    }
    found
}

/// Close a truncated document.
///
/// The text is cut back to the last point where every scalar seen so far was
/// terminated (after an opening bracket, a comma or a complete value), then
/// the still-open brackets are closed. A scalar at the very end of the text
/// is dropped: it might still be growing.
pub(crate) fn close_truncated(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut stack: Vec<Frame> = Vec::new();
    let mut safe: Option<(usize, Vec<Frame>)> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\n' | b'\r' | b':' => pos += 1,
            b'{' => {
                stack.push(Frame::Object { expect_key: true });
                pos += 1;
                safe = Some((pos, stack.clone()));
            }
            b'[' => {
                stack.push(Frame::Array);
                pos += 1;
                safe = Some((pos, stack.clone()));
            }
            b'}' | b']' => {
                stack.pop();
                pos += 1;
                safe = Some((pos, stack.clone()));
            }
            b',' => {
                if let Some(Frame::Object { expect_key }) = stack.last_mut() {
                    *expect_key = true;
                }
                pos += 1;
                safe = Some((pos, stack.clone()));
            }
            quote @ (b'"' | b'\'') => {
                let Some(end) = string_end(bytes, pos, quote) else {
                    break;
                };
                pos = end;
                if !take_key(&mut stack) {
                    safe = Some((pos, stack.clone()));
                }
            }
            _ => {
                let end = bare_end(bytes, pos);
                if end == bytes.len() {
                    break;
                }
                pos = end;
                if !take_key(&mut stack) {
                    safe = Some((pos, stack.clone()));
                }
            }
        }
    }

    let (end, open) = safe?;
    let mut repaired = text[..end].to_string();
    for frame in open.iter().rev() {
        repaired.push(match frame {
            Frame::Object { .. } => '}',
            Frame::Array => ']',
        });
    }
    Some(repaired)
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Object { expect_key: bool },
    Array,
}

/// Consume the key slot of the innermost object, if it is waiting for one.
fn take_key(stack: &mut [Frame]) -> bool {
    match stack.last_mut() {
        Some(Frame::Object { expect_key }) if *expect_key => {
            *expect_key = false;
            true
        }
        _ => false,
    }
}

fn string_end(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b if b == quote => return Some(pos + 1),
            _ => pos += 1,
        }
    }
    None
}

fn bare_end(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len() && !is_delimiter(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'\t' | b'\n' | b'\r' | b',' | b':' | b'{' | b'}' | b'[' | b']' | b'"' | b'\''
    )
}

/// End (exclusive) of the bracketed span opening at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            open @ (b'{' | b'[') => stack.push(open),
            close @ (b'}' | b']') => {
                let expected = if close == b'}' { b'{' } else { b'[' };
                if stack.pop() != Some(expected) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(pos + 1);
                }
            }
            quote @ (b'"' | b'\'') => {
                pos = string_end(bytes, pos, quote)?;
                continue;
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Json> {
        match self.peek()? {
            b'{' => self.object(),
            b'[' => self.array(),
            quote @ (b'"' | b'\'') => self.string(quote).map(Json::String),
            _ => self.literal(),
        }
    }

    fn object(&mut self) -> Option<Json> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek()? == b'}' {
                self.pos += 1;
                return Some(Json::Object(map));
            }
            let key = self.key()?;
            self.skip_ws();
            if self.peek()? != b':' {
                return None;
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    return Some(Json::Object(map));
                }
                _ => return None,
            }
        }
    }

    fn array(&mut self) -> Option<Json> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek()? == b']' {
                self.pos += 1;
                return Some(Json::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b']' => {
                    self.pos += 1;
                    return Some(Json::Array(items));
                }
                _ => return None,
            }
        }
    }

    fn key(&mut self) -> Option<String> {
        match self.peek()? {
            quote @ (b'"' | b'\'') => self.string(quote),
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'-'))
                {
                    self.pos += 1;
                }
                (self.pos > start).then(|| self.src[start..self.pos].to_string())
            }
        }
    }

    fn string(&mut self, quote: u8) -> Option<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let b = self.peek()?;
            if b == quote {
                self.pos += 1;
                return Some(out);
            }
            match b {
                b'\\' => {
                    self.pos += 1;
                    let escaped = self.peek()?;
                    self.pos += 1;
                    match escaped {
                        b'"' => out.push('"'),
                        b'\'' => out.push('\''),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => out.push(self.unicode_escape()?),
                        _ => return None,
                    }
                }
                0x00..=0x1F => return None,
                _ => {
                    let ch = self.src[self.pos..].chars().next()?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn hex4(&mut self) -> Option<u32> {
        let digits = self.src.get(self.pos..self.pos + 4)?;
        let code = u32::from_str_radix(digits, 16).ok()?;
        self.pos += 4;
        Some(code)
    }

    fn unicode_escape(&mut self) -> Option<char> {
        let high = self.hex4()?;
        if (0xD800..0xDC00).contains(&high) {
            if self.src.get(self.pos..self.pos + 2)? != "\\u" {
                return None;
            }
            self.pos += 2;
            let low = self.hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return None;
            }
            return char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00));
        }
        char::from_u32(high)
    }

    fn literal(&mut self) -> Option<Json> {
        let start = self.pos;
        self.pos = bare_end(self.bytes, start);
        let token = &self.src[start..self.pos];
        match token {
            "true" | "True" => Some(Json::Bool(true)),
            "false" | "False" => Some(Json::Bool(false)),
            "null" | "None" => Some(Json::Null),
            _ if JSON_NUMBER.is_match(token) => parse_number(token).map(Json::Number),
            _ => None,
        }
    }
}

fn parse_number(token: &str) -> Option<Number> {
    if !token.contains(['.', 'e', 'E']) {
        if let Ok(i) = token.parse::<i64>() {
            return Some(i.into());
        }
    }
    token.parse::<f64>().ok().and_then(Number::from_f64)
}
