use log::debug;

use crate::error::Diagnostics;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,

    Comma,
    Dot,
    Semicolon,
    Colon,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Bang,
    Equal,
    Greater,
    Less,

    BangEqual,
    EqualEqual,
    GreaterEqual,
    LessEqual,

    Identifier(String),
    String(String),
    Number(f64),

    And,
    Class,
    Else,
    False,
    For,
    Func,
    If,
    Or,
    Print,
    Return,
    True,
    Var,
    Void,
    While,

    Eof,
}

/// One scanned token. `lexeme` is the raw source slice (quotes included
/// for strings); `line` and `column` are 1-based and point at its first
/// character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

/// Scans a whole source text. Never fails: unexpected characters and
/// unterminated strings are recorded as lexical diagnostics and the scan
/// continues, so one bad character does not hide later ones. The returned
/// stream is always terminated by an `Eof` token.
pub fn scan(source: &str) -> (Vec<Token>, Diagnostics) {
    let mut scanner = Scanner::new(source);
    scanner.scan_all();
    debug!(
        "scanned {} tokens, {} diagnostics",
        scanner.tokens.len(),
        scanner.diagnostics.len()
    );
    (scanner.tokens, scanner.diagnostics)
}

struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    start: usize,
    current: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
    diagnostics: Diagnostics,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Scanner {
            source,
            bytes: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn scan_all(&mut self) {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token {
            token_type: TokenType::Eof,
            lexeme: String::new(),
            line: self.line,
            column: self.column_at(self.current),
        });
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn advance(&mut self) -> u8 {
        let byte = self.bytes[self.current];
        self.current += 1;
        byte
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.bytes[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.bytes[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() {
            0
        } else {
            self.bytes[self.current + 1]
        }
    }

    /// 1-based column at a byte offset, counting characters rather than
    /// bytes so multi-byte text earlier on the line does not skew
    /// reported positions. UTF-8 continuation bytes don't advance the
    /// column, which keeps this safe even mid-character.
    fn column_at(&self, offset: usize) -> usize {
        self.bytes[self.line_start..offset]
            .iter()
            .filter(|&&b| (b & 0xC0) != 0x80)
            .count()
            + 1
    }

    fn column(&self) -> usize {
        self.column_at(self.start)
    }

    fn push(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            token_type,
            lexeme: self.source[self.start..self.current].to_string(),
            line: self.line,
            column: self.column(),
        });
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.line_start = self.current;
    }

    fn scan_token(&mut self) {
        let byte = self.advance();
        match byte {
            b'(' => self.push(TokenType::LeftParen),
            b')' => self.push(TokenType::RightParen),
            b'{' => self.push(TokenType::LeftBrace),
            b'}' => self.push(TokenType::RightBrace),
            b'[' => self.push(TokenType::LeftBracket),
            b']' => self.push(TokenType::RightBracket),
            b',' => self.push(TokenType::Comma),
            b'.' => self.push(TokenType::Dot),
            b';' => self.push(TokenType::Semicolon),
            b':' => self.push(TokenType::Colon),
            b'+' => self.push(TokenType::Plus),
            b'-' => self.push(TokenType::Minus),
            b'*' => self.push(TokenType::Star),
            b'%' => self.push(TokenType::Percent),
            b'/' => {
                if self.matches(b'/') {
                    // Comment runs to end of line.
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.push(TokenType::Slash);
                }
            }
            b'!' => {
                let token = if self.matches(b'=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.push(token);
            }
            b'=' => {
                let token = if self.matches(b'=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.push(token);
            }
            b'<' => {
                let token = if self.matches(b'=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.push(token);
            }
            b'>' => {
                let token = if self.matches(b'=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.push(token);
            }
            b' ' | b'\r' | b'\t' => {}
            b'\n' => self.new_line(),
            b'"' => self.string(),
            _ => {
                if byte.is_ascii_digit() {
                    self.number();
                } else if byte.is_ascii_alphabetic() || byte == b'_' {
                    self.identifier();
                } else {
                    let column = self.column();
                    self.diagnostics.lexical(
                        format!("Unexpected character '{}'", byte.escape_ascii()),
                        self.line,
                        column,
                    );
                }
            }
        }
    }

    fn string(&mut self) {
        let line = self.line;
        let column = self.column();

        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.advance();
                self.new_line();
            } else if self.peek() == b'\\' {
                // A backslash escapes whatever follows, so the next
                // character can never close the string.
                self.advance();
                if !self.is_at_end() {
                    if self.peek() == b'\n' {
                        self.advance();
                        self.new_line();
                    } else {
                        self.advance();
                    }
                }
            } else {
                self.advance();
            }
        }

        if self.is_at_end() {
            self.diagnostics
                .lexical("Unterminated string", line, column);
            return;
        }

        // The closing quote.
        self.advance();

        let raw = &self.source[self.start..self.current];
        let value = match snailquote::unescape(raw) {
            Ok(unescaped) => unescaped,
            Err(_) => {
                self.diagnostics.lexical(
                    format!("Invalid escape sequence in string {}", raw),
                    line,
                    column,
                );
                self.source[self.start + 1..self.current - 1].to_string()
            }
        };

        self.tokens.push(Token {
            token_type: TokenType::String(value),
            lexeme: raw.to_string(),
            line,
            column,
        });
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // A single fractional part; a second '.' is not part of the number.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = &self.source[self.start..self.current];
        match lexeme.parse::<f64>() {
            Ok(value) => self.push(TokenType::Number(value)),
            Err(_) => {
                let column = self.column();
                self.diagnostics.lexical(
                    format!("Invalid number literal '{}'", lexeme),
                    self.line,
                    column,
                );
            }
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        let token_type = match text {
            "and" => TokenType::And,
            "class" => TokenType::Class,
            "else" => TokenType::Else,
            "false" => TokenType::False,
            "for" => TokenType::For,
            "func" => TokenType::Func,
            "if" => TokenType::If,
            "or" => TokenType::Or,
            "print" => TokenType::Print,
            "return" => TokenType::Return,
            "true" => TokenType::True,
            "var" => TokenType::Var,
            "void" => TokenType::Void,
            "while" => TokenType::While,
            _ => TokenType::Identifier(text.to_string()),
        };
        self.push(token_type);
    }
}
