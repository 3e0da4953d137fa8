use crate::ast::Pos;
use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    /// Whether a line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

// Longest punctuators first so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*", "/", "%", "<", ">", "=",
    "!",
];

pub(crate) struct Lexer<'a> {
    src: &'a [u8],
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let pos = self.pos();
            let Some(&byte) = self.src.get(self.offset) else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                    newline_before,
                });
                return Ok(tokens);
            };

            let kind = match byte {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.number()?,
                b'"' | b'\'' => self.string(byte)?,
                b if b == b'_' || b == b'$' || b.is_ascii_alphabetic() => self.ident(),
                _ => self.punct()?,
            };
            tokens.push(Token {
                kind,
                pos,
                newline_before,
            });
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.offset + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = *self.src.get(self.offset)?;
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if byte & 0xC0 != 0x80 {
            // Count columns in characters, not UTF-8 continuation bytes.
            self.column += 1;
        }
        Some(byte)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    /// Skips whitespace and comments; returns whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScriptError> {
        let mut newline = false;
        loop {
            match self.peek_at(0) {
                Some(b'\n') => {
                    newline = true;
                    self.bump();
                }
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_at(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some(b'*') if self.peek_at(0) == Some(b'/') => {
                                self.bump();
                                break;
                            }
                            Some(b'\n') => newline = true,
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, ScriptError> {
        let start = self.offset;
        if self.peek_at(0) == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            let digits_start = self.offset;
            while self.peek_at(0).is_some_and(|b| b.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = std::str::from_utf8(&self.src[digits_start..self.offset])
                .map_err(|_| self.error("invalid hex literal"))?;
            let value =
                u64::from_str_radix(digits, 16).map_err(|_| self.error("invalid hex literal"))?;
            return Ok(TokenKind::Number(value as f64));
        }

        while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek_at(0) == Some(b'.') {
            self.bump();
            while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            self.bump();
            if matches!(self.peek_at(0), Some(b'+' | b'-')) {
                self.bump();
            }
            while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.offset])
            .map_err(|_| self.error("invalid number literal"))?;
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("invalid number literal {text:?}")))
    }

    fn string(&mut self, quote: u8) -> Result<TokenKind, ScriptError> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(self.error("unterminated string literal")),
                Some(b) if b == quote => break,
                Some(b'\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'r' => bytes.push(b'\r'),
                        b'0' => bytes.push(0),
                        b'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let digit = self
                                    .bump()
                                    .and_then(|b| (b as char).to_digit(16))
                                    .ok_or_else(|| self.error("invalid unicode escape"))?;
                                code = code * 16 + digit;
                            }
                            let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                            let mut buf = [0u8; 4];
                            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                        }
                        other => bytes.push(other),
                    }
                }
                Some(b) => bytes.push(b),
            }
        }
        String::from_utf8(bytes)
            .map(TokenKind::Str)
            .map_err(|_| self.error("string literal is not valid UTF-8"))
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.offset;
        while self
            .peek_at(0)
            .is_some_and(|b| b == b'_' || b == b'$' || b.is_ascii_alphanumeric())
        {
            self.bump();
        }
        // Identifier bytes are ASCII, so this cannot split a character.
        TokenKind::Ident(String::from_utf8_lossy(&self.src[start..self.offset]).into_owned())
    }

    fn punct(&mut self) -> Result<TokenKind, ScriptError> {
        let rest = &self.src[self.offset..];
        for punct in PUNCTUATORS {
            if rest.starts_with(punct.as_bytes()) {
                for _ in 0..punct.len() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }
        let ch = std::str::from_utf8(rest)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or('?');
        Err(self.error(format!("unexpected character {ch:?}")))
    }
}
