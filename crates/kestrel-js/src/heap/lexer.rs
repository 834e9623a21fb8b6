//! Lexer
//!
//! Tokenizer for the script dialect understood by the heap engine.

use std::iter::Peekable;
use std::str::CharIndices;

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(Box<str>),
    Identifier(Box<str>),

    // Keywords
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    For,
    Try,
    Catch,
    New,
    This,
    Typeof,
    True,
    False,
    Null,
    Undefined,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semicolon,
    Colon,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Eq,
    PlusEq,
    MinusEq,
    PlusPlus,
    MinusMinus,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    AmpAmp,
    PipePipe,

    /// Unrecognized input
    Invalid(Box<str>),
    Eof,
}

/// Token with its byte offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "var" | "let" | "const" => TokenKind::Var,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "new" => TokenKind::New,
        "this" => TokenKind::This,
        "typeof" => TokenKind::Typeof,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "undefined" => TokenKind::Undefined,
        _ => return None,
    })
}

/// Lexer over source text
pub struct Lexer<'src> {
    source: &'src str,
    chars: Peekable<CharIndices<'src>>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source, chars: source.char_indices().peekable() }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |(i, _)| *i)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '*' && self.eat('/') {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let pos = self.offset();
        let Some(c) = self.advance() else {
            return Token { kind: TokenKind::Eof, pos };
        };

        let kind = match c {
            'a'..='z' | 'A'..='Z' | '_' | '$' => self.scan_identifier(pos),
            '0'..='9' => self.scan_number(pos),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(pos),
            '"' | '\'' => self.scan_string(c),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { TokenKind::EqEqEq } else { TokenKind::EqEq }
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { TokenKind::NotEqEq } else { TokenKind::NotEq }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') { TokenKind::LessThanEq } else { TokenKind::LessThan }
            }
            '>' => {
                if self.eat('=') { TokenKind::GreaterThanEq } else { TokenKind::GreaterThan }
            }
            '&' if self.eat('&') => TokenKind::AmpAmp,
            '|' if self.eat('|') => TokenKind::PipePipe,
            other => TokenKind::Invalid(format!("unexpected character '{}'", other).into()),
        };

        Token { kind, pos }
    }

    fn scan_identifier(&mut self, start: usize) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
            self.advance();
        }
        let word = &self.source[start..self.offset()];
        keyword(word).unwrap_or_else(|| TokenKind::Identifier(word.into()))
    }

    fn scan_number(&mut self, start: usize) -> TokenKind {
        let first = self.source[start..].chars().next();
        if first == Some('0') && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let digits_start = self.offset();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.source[digits_start..self.offset()];
            return match i64::from_str_radix(digits, 16) {
                Ok(v) => TokenKind::Number(v as f64),
                Err(_) => TokenKind::Invalid("malformed hex literal".into()),
            };
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.advance();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = &self.source[start..self.offset()];
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Invalid(format!("malformed number '{}'", text).into()),
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return TokenKind::Invalid("unterminated string".into()),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some('u') => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            match self.advance().and_then(|c| c.to_digit(16)) {
                                Some(d) => code = code * 16 + d,
                                None => return TokenKind::Invalid("malformed unicode escape".into()),
                            }
                        }
                        value.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    }
                    Some(other) => value.push(other),
                    None => return TokenKind::Invalid("unterminated string".into()),
                },
                Some(c) => value.push(c),
            }
        }
        TokenKind::String(value.into())
    }
}
