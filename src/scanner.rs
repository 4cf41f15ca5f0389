pub mod token;

use crate::scanner::token::{Token, TokenKind};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at line {line}")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("Unterminated string at line {line}")]
    UnterminatedString { line: usize },
    #[error("Unterminated comment at line {line}")]
    UnterminatedComment { line: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnexpectedCharacter { line, .. } => *line,
            LexError::UnterminatedString { line } => *line,
            LexError::UnterminatedComment { line } => *line,
        }
    }
}

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    token_line: usize, // line of the token's first character
    keywords: HashMap<String, TokenKind>,
}

impl Scanner {
    pub fn new(source: impl Into<String>, keywords: &HashMap<String, TokenKind>) -> Self {
        Scanner {
            source: source.into().chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            token_line: 1,
            keywords: keywords.clone(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LexError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.token_line = self.line;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexError> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            ';' => self.add_token(TokenKind::Semicolon),
            '+' => self.add_token(TokenKind::Plus),
            '-' => self.add_token(TokenKind::Minus),
            '*' => self.add_token(TokenKind::Star),
            '←' => self.add_token(TokenKind::Assign),
            '=' => self.add_token(TokenKind::Equal),

            ':' => {
                let kind = if self.match_char('=') {
                    TokenKind::Assign
                } else {
                    TokenKind::Colon
                };
                self.add_token(kind);
            }

            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessEqual
                } else if self.match_char('>') {
                    TokenKind::NotEqual
                } else if self.match_char('-') {
                    TokenKind::Assign
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }

            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }

            '/' => {
                if self.match_char('/') {
                    // Comment goes until end of line
                    while self.peek() != Some('\n') && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }

            // Brace comment, closed by the first '}' (nesting not supported)
            '{' => loop {
                if self.is_at_end() {
                    return Err(LexError::UnterminatedComment {
                        line: self.token_line,
                    });
                }
                match self.advance() {
                    '}' => break,
                    '\n' => self.line += 1,
                    _ => {}
                }
            },

            ' ' | '\r' | '\t' => {}

            '\n' => self.line += 1,

            '"' | '\'' => self.handle_string(c)?,

            c if c.is_ascii_digit() => self.handle_number(),

            c if c.is_ascii_alphabetic() || c == '_' => self.handle_identifier(),

            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: c,
                    line: self.line,
                });
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.current];
        self.current += 1;
        ch
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.current + 1).copied()
    }

    fn match_char(&mut self, expected: char) -> bool {
        match self.peek() {
            Some(ch) if ch == expected => {
                self.current += 1;
                true
            }
            _ => false,
        }
    }

    fn handle_string(&mut self, quote: char) -> Result<(), LexError> {
        while self.peek() != Some(quote) && !self.is_at_end() {
            if self.peek() == Some('\n') {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            // Reported at the line of the opening quote
            return Err(LexError::UnterminatedString {
                line: self.token_line,
            });
        }

        self.advance();

        // The token value excludes the quotes; the lexeme keeps them
        let value = self.source[self.start + 1..self.current - 1]
            .iter()
            .collect::<String>();
        self.add_token(TokenKind::Text(value));
        Ok(())
    }

    fn handle_number(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(); // consume '.'

            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        // digits with an optional fraction cannot fail to parse
        let value = text.parse::<f64>().unwrap_or_default();
        self.add_token(TokenKind::Number(value));
    }

    fn handle_identifier(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        // Keywords match case-insensitively; True/False stay identifiers
        // and are resolved as constants at evaluation time
        let kind = self
            .keywords
            .get(&text.to_ascii_lowercase())
            .cloned()
            .unwrap_or(TokenKind::Identifier);

        self.add_token(kind);
    }

    fn add_token(&mut self, kind: TokenKind) {
        let text = self.source[self.start..self.current]
            .iter()
            .collect::<String>();
        self.tokens.push(Token::new(kind, text, self.token_line));
    }
}
