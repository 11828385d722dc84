//! GraphQL lexer.
//!
//! Commas, whitespace, the byte order mark and `#` comments are insignificant
//! and skipped.

use nestql_common::utils::error::SourceSpan;

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `!`
    Bang,
    /// `$`
    Dollar,
    /// `&`
    Amp,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `...`
    Spread,
    /// `:`
    Colon,
    /// `=`
    Equals,
    /// `@`
    At,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `|`
    Pipe,
    /// Name (keywords are names in GraphQL).
    Name,
    /// Integer literal.
    Int,
    /// Float literal.
    Float,
    /// String literal, `text` holds the decoded value.
    String,
    /// Block string literal, `text` holds the decoded value.
    BlockString,
    /// End of input.
    Eof,
    /// Invalid input, `text` holds the message.
    Error,
}

/// A token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Token text (decoded for strings).
    pub text: String,
    /// Source span.
    pub span: SourceSpan,
}

/// GraphQL lexer.
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: u32,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Returns the next token, `Eof` forever once input is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_ignored();

        let start = self.position;
        let line = self.line;
        let column = self.column(start);
        let Some(c) = self.peek() else {
            return self.token(TokenKind::Eof, String::new(), start, line, column);
        };

        let punctuator = match c {
            '!' => Some(TokenKind::Bang),
            '$' => Some(TokenKind::Dollar),
            '&' => Some(TokenKind::Amp),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ':' => Some(TokenKind::Colon),
            '=' => Some(TokenKind::Equals),
            '@' => Some(TokenKind::At),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '|' => Some(TokenKind::Pipe),
            _ => None,
        };
        if let Some(kind) = punctuator {
            self.position += 1;
            return self.token(kind, c.to_string(), start, line, column);
        }

        let (kind, text) = match c {
            '.' => self.scan_spread(),
            '"' if self.rest().starts_with("\"\"\"") => self.scan_block_string(),
            '"' => self.scan_string(),
            '-' | '0'..='9' => self.scan_number(),
            c if c == '_' || c.is_ascii_alphabetic() => self.scan_name(),
            other => {
                self.position += other.len_utf8();
                (TokenKind::Error, format!("Unexpected character '{other}'"))
            }
        };
        self.token(kind, text, start, line, column)
    }

    fn token(&self, kind: TokenKind, text: String, start: usize, line: u32, column: u32) -> Token {
        Token {
            kind,
            text,
            span: SourceSpan::new(start, self.position, line, column),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn column(&self, position: usize) -> u32 {
        let chars = self.input[self.line_start..position].chars().count();
        u32::try_from(chars + 1).unwrap_or(u32::MAX)
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.position;
    }

    fn skip_ignored(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | ',' | '\u{feff}' => self.position += c.len_utf8(),
                '\n' => {
                    self.position += 1;
                    self.newline();
                }
                '\r' => {
                    self.position += 1;
                    if self.peek() == Some('\n') {
                        self.position += 1;
                    }
                    self.newline();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.position += c.len_utf8();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_spread(&mut self) -> (TokenKind, String) {
        if self.rest().starts_with("...") {
            self.position += 3;
            (TokenKind::Spread, "...".to_string())
        } else {
            self.position += 1;
            (TokenKind::Error, "Expected '...'".to_string())
        }
    }

    fn scan_name(&mut self) -> (TokenKind, String) {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.position += 1;
            } else {
                break;
            }
        }
        (TokenKind::Name, self.input[start..self.position].to_string())
    }

    fn scan_digits(&mut self) -> usize {
        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
        }
        self.position - start
    }

    fn scan_number(&mut self) -> (TokenKind, String) {
        let start = self.position;
        if self.peek() == Some('-') {
            self.position += 1;
        }
        let leading_zero = self.peek() == Some('0');
        let digits = self.scan_digits();
        if digits == 0 {
            return (TokenKind::Error, "Expected digit after '-'".to_string());
        }
        if leading_zero && digits > 1 {
            return (
                TokenKind::Error,
                "Invalid number, unexpected digit after 0".to_string(),
            );
        }

        let mut kind = TokenKind::Int;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.position += 1;
            self.scan_digits();
            kind = TokenKind::Float;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.position += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.position += 1;
            }
            if self.scan_digits() == 0 {
                return (TokenKind::Error, "Invalid number, expected exponent digit".to_string());
            }
            kind = TokenKind::Float;
        }
        if self
            .peek()
            .is_some_and(|c| c == '_' || c == '.' || c.is_ascii_alphabetic())
        {
            return (
                TokenKind::Error,
                "Invalid number, expected digit but got a name character".to_string(),
            );
        }
        (kind, self.input[start..self.position].to_string())
    }

    fn scan_string(&mut self) -> (TokenKind, String) {
        self.position += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return (TokenKind::Error, "Unterminated string".to_string());
            };
            match c {
                '"' => {
                    self.position += 1;
                    return (TokenKind::String, value);
                }
                '\n' | '\r' => {
                    return (TokenKind::Error, "Unterminated string".to_string());
                }
                '\\' => {
                    self.position += 1;
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => {
                            self.position += 1;
                            match self.scan_unicode_escape() {
                                Some(c) => {
                                    value.push(c);
                                    continue;
                                }
                                None => {
                                    return (
                                        TokenKind::Error,
                                        "Invalid unicode escape sequence".to_string(),
                                    );
                                }
                            }
                        }
                        _ => {
                            return (TokenKind::Error, "Invalid escape sequence".to_string());
                        }
                    };
                    self.position += 1;
                    value.push(escaped);
                }
                c => {
                    self.position += c.len_utf8();
                    value.push(c);
                }
            }
        }
    }

    fn scan_unicode_escape(&mut self) -> Option<char> {
        let hex = self.rest().get(..4)?;
        let code = u32::from_str_radix(hex, 16).ok()?;
        self.position += 4;
        char::from_u32(code)
    }

    fn scan_block_string(&mut self) -> (TokenKind, String) {
        self.position += 3;
        let mut raw = String::new();
        loop {
            let rest = self.rest();
            if rest.starts_with("\"\"\"") {
                self.position += 3;
                return (TokenKind::BlockString, block_string_value(&raw));
            }
            if rest.starts_with("\\\"\"\"") {
                self.position += 4;
                raw.push_str("\"\"\"");
                continue;
            }
            let Some(c) = self.peek() else {
                return (TokenKind::Error, "Unterminated block string".to_string());
            };
            self.position += c.len_utf8();
            match c {
                '\n' => self.newline(),
                '\r' => {
                    if self.peek() == Some('\n') {
                        self.position += 1;
                    }
                    self.newline();
                }
                _ => {}
            }
            raw.push(if c == '\r' { '\n' } else { c });
        }
    }
}

/// Removes the common indentation and blank leading and trailing lines.
fn block_string_value(raw: &str) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let trimmed = line.trim_start_matches([' ', '\t']);
            (!trimmed.is_empty()).then_some(line.len() - trimmed.len())
        })
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| match line.get(indent..) {
            _ if i == 0 => *line,
            Some(dedented) => dedented,
            None => line.trim_start_matches([' ', '\t']),
        })
        .collect();

    let is_blank = |line: &&str| line.trim_matches([' ', '\t']).is_empty();
    while out.first().is_some_and(is_blank) {
        out.remove(0);
    }
    while out.last().is_some_and(is_blank) {
        out.pop();
    }
    out.join("\n")
}
