//! Tokenizer for rule expressions

use placement_core::ExpressionError;

/// Kind of a lexical token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Function name
    Ident(String),
    /// Decimal integer literal
    Int(i64),
    /// Double-quoted string literal
    Str(String),
    /// Byte string literal, `b"..."`
    Bytes(Vec<u8>),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `&&`
    AndAnd,
    /// End of input
    Eof,
}

impl TokenKind {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier {name:?}"),
            TokenKind::Int(value) => format!("integer {value}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Bytes(_) => "byte string literal".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::AndAnd => "'&&'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// A token and the byte offset where it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was read
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
}

/// Split an expression into tokens. The last token is always `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExpressionError> {
    Lexer { src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: start,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                '&' => {
                    self.bump();
                    if self.peek() != Some('&') {
                        return Err(ExpressionError::syntax(start, "expected '&&'"));
                    }
                    self.single(TokenKind::AndAnd)
                }
                '"' => TokenKind::Str(self.string(start)?),
                'b' if self.src[self.pos + 1..].starts_with('"') => {
                    self.bump();
                    TokenKind::Bytes(self.byte_string(start)?)
                }
                c if c == '-' || c.is_ascii_digit() => self.integer(start)?,
                c if c == '_' || c.is_ascii_alphabetic() => self.ident(),
                other => {
                    return Err(ExpressionError::syntax(
                        start,
                        format!("unexpected character {other:?}"),
                    ))
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        {
            self.bump();
        }
        TokenKind::Ident(self.src[start..self.pos].to_string())
    }

    fn integer(&mut self, start: usize) -> Result<TokenKind, ExpressionError> {
        if self.peek() == Some('-') {
            self.bump();
        }
        let digits = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if digits == self.pos {
            return Err(ExpressionError::syntax(start, "expected digits after '-'"));
        }
        self.src[start..self.pos]
            .parse()
            .map(TokenKind::Int)
            .map_err(|e| ExpressionError::syntax(start, format!("invalid integer: {e}")))
    }

    /// Reads the body of a quoted literal, calling `push` for each unit.
    /// Escapes produce a single byte; plain characters are passed as UTF-8.
    fn quoted<F>(&mut self, start: usize, mut push: F) -> Result<(), ExpressionError>
    where
        F: FnMut(Unit, usize) -> Result<(), ExpressionError>,
    {
        // opening quote
        self.bump();
        loop {
            let at = self.pos;
            match self.bump() {
                None => return Err(ExpressionError::syntax(start, "unterminated string")),
                Some('"') => return Ok(()),
                Some('\\') => {
                    let byte = match self.bump() {
                        Some('"') => b'"',
                        Some('\\') => b'\\',
                        Some('n') => b'\n',
                        Some('r') => b'\r',
                        Some('t') => b'\t',
                        Some('x') => self.hex_byte(at)?,
                        Some(other) => {
                            return Err(ExpressionError::syntax(
                                at,
                                format!("unknown escape '\\{other}'"),
                            ))
                        }
                        None => return Err(ExpressionError::syntax(start, "unterminated string")),
                    };
                    push(Unit::Byte(byte), at)?;
                }
                Some(c) => push(Unit::Char(c), at)?,
            }
        }
    }

    fn hex_byte(&mut self, at: usize) -> Result<u8, ExpressionError> {
        let digits = self
            .src
            .get(self.pos..self.pos + 2)
            .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| ExpressionError::syntax(at, "expected two hex digits after '\\x'"))?;
        let byte = u8::from_str_radix(digits, 16)
            .map_err(|_| ExpressionError::syntax(at, "expected two hex digits after '\\x'"))?;
        self.pos += 2;
        Ok(byte)
    }

    fn string(&mut self, start: usize) -> Result<String, ExpressionError> {
        let mut out = String::new();
        self.quoted(start, |unit, at| {
            match unit {
                Unit::Char(c) => out.push(c),
                Unit::Byte(b) if b.is_ascii() => out.push(char::from(b)),
                Unit::Byte(_) => {
                    return Err(ExpressionError::syntax(
                        at,
                        "non-ASCII escape in string, use a byte string b\"...\"",
                    ))
                }
            }
            Ok(())
        })?;
        Ok(out)
    }

    fn byte_string(&mut self, start: usize) -> Result<Vec<u8>, ExpressionError> {
        let mut out = Vec::new();
        self.quoted(start, |unit, _| {
            match unit {
                Unit::Char(c) => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
                Unit::Byte(b) => out.push(b),
            }
            Ok(())
        })?;
        Ok(out)
    }
}

enum Unit {
    Char(char),
    Byte(u8),
}
