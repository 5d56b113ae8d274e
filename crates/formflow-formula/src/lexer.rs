//! Formula tokenizer
//!
//! Turns formula text into a flat token stream. Field references are written
//! `[Name]` and may contain any script, spaces included; the bracketed name is
//! kept verbatim as a single [`TokenKind::Field`] token.

use crate::error::{FormulaError, FormulaResult};
use crate::functions;

/// Token types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Field,
    String,
    Number,
    Boolean,
    Function,
    Operator,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl TokenKind {
    /// Tokens that can end an operand. A `-` after one of these is subtraction,
    /// anywhere else it may start a negative number.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Field
                | TokenKind::String
                | TokenKind::Number
                | TokenKind::Boolean
                | TokenKind::RParen
        )
    }
}

/// A lexed token. `position` is the character offset of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            position,
        }
    }

    pub fn number(n: f64, position: usize) -> Self {
        Self::new(TokenKind::Number, n.to_string(), position)
    }

    pub fn string(s: impl Into<String>, position: usize) -> Self {
        Self::new(TokenKind::String, s, position)
    }

    pub fn boolean(b: bool, position: usize) -> Self {
        Self::new(TokenKind::Boolean, if b { "TRUE" } else { "FALSE" }, position)
    }

    pub fn eof(position: usize) -> Self {
        Self::new(TokenKind::Eof, "", position)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Tokenize formula text.
///
/// The returned stream always ends with an [`TokenKind::Eof`] token; empty or
/// whitespace-only input yields just that token.
///
/// # Example
/// ```rust
/// use formflow_formula::lexer::{tokenize, TokenKind};
///
/// let tokens = tokenize("[Age]>=18").unwrap();
/// let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
/// assert_eq!(
///     kinds,
///     [TokenKind::Field, TokenKind::Operator, TokenKind::Number, TokenKind::Eof]
/// );
/// ```
pub fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    Lexer::new(input).run()
}

/// Field names referenced by a formula, distinct and in order of first appearance.
///
/// Purely lexical: the result does not depend on any runtime value.
pub fn field_references(input: &str) -> FormulaResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for token in tokenize(input)? {
        if token.is(TokenKind::Field) && !names.contains(&token.value) {
            names.push(token.value);
        }
    }
    Ok(names)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> FormulaResult<Vec<Token>> {
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek_char() else {
                self.tokens.push(Token::eof(self.pos));
                return Ok(self.tokens);
            };
            let token = self.scan_token(c)?;
            self.tokens.push(token);
        }
    }

    fn scan_token(&mut self, c: char) -> FormulaResult<Token> {
        let start = self.pos;

        match c {
            '[' => return self.scan_field(),
            '"' => return self.scan_string(),
            '(' => {
                self.advance();
                return Ok(Token::new(TokenKind::LParen, "(", start));
            }
            ')' => {
                self.advance();
                return Ok(Token::new(TokenKind::RParen, ")", start));
            }
            ',' => {
                self.advance();
                return Ok(Token::new(TokenKind::Comma, ",", start));
            }
            _ => {}
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_digit_at(1)) {
            return Ok(self.scan_number());
        }

        if c == '-' && !self.previous_ends_operand() && self.starts_number_at(1) {
            return Ok(self.scan_number());
        }

        // Two-character operators before their one-character prefixes
        if let Some(next) = self.peek_char_at(1) {
            let pair: Option<&str> = match (c, next) {
                ('<', '>') => Some("<>"),
                ('<', '=') => Some("<="),
                ('>', '=') => Some(">="),
                _ => None,
            };
            if let Some(op) = pair {
                self.advance();
                self.advance();
                return Ok(Token::new(TokenKind::Operator, op, start));
            }
        }

        if matches!(c, '=' | '<' | '>' | '+' | '-' | '*' | '/') {
            self.advance();
            return Ok(Token::new(TokenKind::Operator, c.to_string(), start));
        }

        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier();
        }

        Err(FormulaError::syntax(
            format!("Unexpected character '{}'", c),
            start,
        ))
    }

    fn scan_field(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // Skip '['

        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some(']') => {
                    self.advance();
                    break;
                }
                Some('[') => {
                    return Err(FormulaError::syntax(
                        "Nested '[' in field reference",
                        self.pos,
                    ))
                }
                Some(c) => {
                    name.push(c);
                    self.advance();
                }
                None => {
                    return Err(FormulaError::syntax(
                        "Unterminated field reference",
                        start,
                    ))
                }
            }
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(FormulaError::syntax("Empty field reference", start));
        }
        Ok(Token::new(TokenKind::Field, name, start))
    }

    fn scan_string(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    // A doubled quote is an escaped quote
                    if self.peek_char_at(1) == Some('"') {
                        s.push('"');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        return Ok(Token::string(s, start));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => {
                    return Err(FormulaError::syntax("Unterminated string literal", start));
                }
            }
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.advance();
        }

        // Integer part
        while self.peek_digit_at(0) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') && self.peek_digit_at(1) {
            self.advance();
            while self.peek_digit_at(0) {
                self.advance();
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        Token::new(TokenKind::Number, text, start)
    }

    fn scan_identifier(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let upper = text.to_uppercase();

        if upper == "TRUE" || upper == "FALSE" {
            return Ok(Token::new(TokenKind::Boolean, upper, start));
        }

        // Keywords are functions whatever follows; any other word must be a call
        // so that unregistered names surface as unknown functions at evaluation.
        if functions::is_keyword(&upper) || self.next_non_space() == Some('(') {
            return Ok(Token::new(TokenKind::Function, upper, start));
        }

        Err(FormulaError::syntax(
            format!("Unknown identifier '{}'", text),
            start,
        ))
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn peek_digit_at(&self, offset: usize) -> bool {
        self.peek_char_at(offset).map_or(false, |c| c.is_ascii_digit())
    }

    fn starts_number_at(&self, offset: usize) -> bool {
        self.peek_digit_at(offset)
            || (self.peek_char_at(offset) == Some('.') && self.peek_digit_at(offset + 1))
    }

    fn next_non_space(&self) -> Option<char> {
        self.chars[self.pos..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    fn previous_ends_operand(&self) -> bool {
        self.tokens
            .last()
            .map_or(false, |t| t.kind.ends_operand())
    }

    fn advance(&mut self) {
        if self.pos < self.chars.len() {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }
}
