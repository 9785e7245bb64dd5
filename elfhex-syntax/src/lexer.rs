//! Character-level scanning: position tracking, whitespace/comment
//! skipping, and the handful of primitive token shapes (identifiers,
//! decimal integers, quoted strings) the parser builds on.

use std::sync::Arc;

use elfhex_core::error::Span;

use crate::ParseError;

pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    file: Arc<str>,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str, file: Arc<str>) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            file,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.span(),
        }
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    pub fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    /// Consumes `byte` if it is next, returning whether it did.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Consumes `byte`, failing with a parse error if it is not next.
    pub fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", byte as char)))
        }
    }

    /// Skips spaces, tabs, and newlines only (not comments).
    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    /// Skips whitespace and `# ... \n` line comments.
    pub fn skip_trivia(&mut self) {
        loop {
            self.skip_ws();
            if self.peek() == Some(b'#') {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    /// Tests whether `keyword` begins at the current position and is not
    /// itself followed by an identifier character (so `include` doesn't
    /// match a prefix of `includefoo`).
    pub fn peek_keyword(&self, keyword: &str) -> bool {
        let bytes = keyword.as_bytes();
        if self.pos + bytes.len() > self.bytes.len() {
            return false;
        }
        if &self.bytes[self.pos..self.pos + bytes.len()] != bytes {
            return false;
        }
        !self
            .peek_at(bytes.len())
            .is_some_and(|b| is_ident_continue(b))
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if !self.peek_keyword(keyword) {
            return Err(self.error(format!("expected {keyword:?}")));
        }
        for _ in 0..keyword.len() {
            self.bump();
        }
        Ok(())
    }

    /// Parses `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn parse_ident(&mut self) -> Result<String, ParseError> {
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error("expected an identifier"));
        }
        let mut out = String::new();
        while self.peek().is_some_and(is_ident_continue) {
            out.push(self.bump().unwrap() as char);
        }
        Ok(out)
    }

    /// Parses an identifier that may contain `.` separators, for extension
    /// names such as `pad` or `bitmap.rle`.
    pub fn parse_dotted_ident(&mut self) -> Result<String, ParseError> {
        let mut out = self.parse_ident()?;
        while self.peek() == Some(b'.') {
            out.push(self.bump().unwrap() as char);
            out.push_str(&self.parse_ident()?);
        }
        Ok(out)
    }

    /// Parses a run of decimal digits as an unsigned integer.
    pub fn parse_decimal_u32(&mut self) -> Result<u32, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected a decimal integer"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .unwrap()
            .parse()
            .map_err(|_| self.error("decimal integer out of range"))
    }

    /// Parses a `"…"` string, with `\"`, `\\`, `\n`, and `\t` escapes.
    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    other => return Err(self.error(format!("unknown escape {other:?}"))),
                },
                Some(byte) => out.push(byte as char),
            }
        }
    }

    /// Reads raw text up to (but not including) the `}` that balances the
    /// `{` already consumed by the caller, tracking nested braces.
    pub fn read_balanced_braces(&mut self) -> Result<String, ParseError> {
        let mut depth = 1u32;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated extension body")),
                Some(b'{') => {
                    depth += 1;
                    out.push('{');
                }
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push('}');
                }
                Some(byte) => out.push(byte as char),
            }
        }
    }
}

pub fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

pub fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
