//! Lexer for CARRI expressions.
//!
//! Converts one expression line into a flat stream of tokens. Multi-word
//! identifiers are emitted as separate `Ident` tokens; the parser joins them.

use crate::error::{ParseError, ParseResult};
use crate::token::{Span, Token, TokenKind};
use std::str::Chars;

/// Lexer for a single CARRI expression or statement line.
pub struct Lexer<'a> {
    /// Source text being lexed.
    source: &'a str,
    /// Character iterator.
    chars: Chars<'a>,
    /// Current byte position.
    pos: usize,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
    /// Start position of current token.
    token_start: usize,
    /// Start line of current token.
    token_start_line: u32,
    /// Start column of current token.
    token_start_column: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self::at_line(source, 1)
    }

    /// Create a lexer whose spans report `line` as the starting line.
    pub fn at_line(source: &'a str, line: u32) -> Self {
        Self::at_position(source, line, 1)
    }

    /// Create a lexer for text that starts at `column` of `line` in its file.
    pub fn at_position(source: &'a str, line: u32, column: u32) -> Self {
        Self {
            source,
            chars: source.chars(),
            pos: 0,
            line,
            column,
            token_start: 0,
            token_start_line: line,
            token_start_column: column,
        }
    }

    /// Tokenize the entire source, returning all tokens including EOF.
    ///
    /// Fails on the first character that does not start a token.
    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();
        self.mark_token_start();

        let Some(c) = self.peek() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        if c.is_ascii_digit() {
            return self.lex_number();
        }

        if c.is_alphabetic() || c == '_' {
            return Ok(self.lex_identifier());
        }

        self.lex_operator_or_punctuation()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.pos;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.token_start,
            self.pos,
            self.token_start_line,
            self.token_start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }

    fn token_text(&self) -> &'a str {
        &self.source[self.token_start..self.pos]
    }

    fn lex_number(&mut self) -> ParseResult<Token> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.token_text();
        match text.parse::<i64>() {
            Ok(n) => Ok(self.make_token(TokenKind::Integer(n))),
            Err(_) => Err(ParseError::InvalidSyntax {
                message: format!("integer literal out of range: {}", text),
                span: self.current_span(),
            }),
        }
    }

    fn lex_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = self.token_text();
        match TokenKind::keyword(text) {
            Some(keyword) => self.make_token(keyword),
            None => self.make_token(TokenKind::Ident(text.to_string())),
        }
    }

    fn lex_operator_or_punctuation(&mut self) -> ParseResult<Token> {
        let Some(c) = self.advance() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '?' => TokenKind::Question,
            '@' => TokenKind::At,
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' if self.peek() == Some('=') => {
                self.advance();
                TokenKind::Ne
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            _ => {
                return Err(ParseError::InvalidCharacter {
                    found: c,
                    span: self.current_span(),
                })
            }
        };
        Ok(self.make_token(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Ident(name.to_string())
    }

    #[test]
    fn test_empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(lex("   \t  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_any_case() {
        assert_eq!(
            lex("and OR Not TRUE false Exists ENTITY"),
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Exists,
                TokenKind::Entity,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_identifiers_are_case_sensitive_and_not_joined() {
        assert_eq!(
            lex("package onEntity Truck_2"),
            vec![
                ident("package"),
                ident("onEntity"),
                ident("Truck_2"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("0 42 123456"),
            vec![
                TokenKind::Integer(0),
                TokenKind::Integer(42),
                TokenKind::Integer(123456),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("+ - * / = == != > < >= <= ? @ :"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Assign,
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::Question,
                TokenKind::At,
                TokenKind::Colon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            lex("(1, 2)"),
            vec![
                TokenKind::LParen,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_statement_line() {
        assert_eq!(
            lex("charge v: charge v + 1"),
            vec![
                ident("charge"),
                ident("v"),
                TokenKind::Colon,
                ident("charge"),
                ident("v"),
                TokenKind::Plus,
                TokenKind::Integer(1),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_span_tracking() {
        let tokens = Lexer::at_line("charge v", 7).tokenize().unwrap();
        assert_eq!(tokens[0].span.line, 7);
        assert_eq!(tokens[0].span.column, 1);
        assert_eq!(tokens[1].span.column, 8);
    }

    #[test]
    fn test_column_offset() {
        let tokens = Lexer::at_position("v + 1", 4, 9).tokenize().unwrap();
        assert_eq!(tokens[0].span.column, 9);
        assert_eq!(tokens[2].span.column, 13);
    }

    #[test]
    fn test_unrecognized_character_is_fatal() {
        let err = Lexer::at_line("charge v % 2", 3).tokenize().unwrap_err();
        match err {
            ParseError::InvalidCharacter { found, span } => {
                assert_eq!(found, '%');
                assert_eq!(span.line, 3);
                assert_eq!(span.column, 10);
            }
            other => panic!("expected invalid character, got {:?}", other),
        }
    }

    #[test]
    fn test_lone_bang_is_fatal() {
        assert!(Lexer::new("a ! b").tokenize().is_err());
    }
}
