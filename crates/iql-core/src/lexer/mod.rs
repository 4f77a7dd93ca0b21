//! The IQL lexer: a lazy token stream over (line, column) positions.
//!
//! Beyond the usual SQL shapes it handles `0b`/`0o`/`0x`/leading-zero
//! numeric bases, bracket-quoted identifiers, and triple-backtick
//! here-strings whose options header can wrap the body into a base64
//! data URI. On end of input exactly one trailing `;` is synthesized so
//! that scripts without a final terminator parse.

mod token;

pub use token::{Keyword, Token, TokenKind};

use std::rc::Rc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Error, Pos, Result, SyntaxError};

/// A lexer over one input script.
pub struct Lexer<'a> {
    source: Rc<str>,
    input: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    synthesized_semi: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for the given input. `source` names the input in
    /// error messages.
    #[must_use]
    pub fn new(source: &str, input: &'a str) -> Self {
        Self {
            source: source.into(),
            input,
            pos: 0,
            line: 1,
            column: 1,
            synthesized_semi: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Pos {
        Pos::new(self.source.clone(), self.line, self.column)
    }

    fn line_text(&self, line: u32) -> String {
        self.input
            .lines()
            .nth(line.saturating_sub(1) as usize)
            .unwrap_or("")
            .to_string()
    }

    fn lex_error(&self, pos: Pos, message: impl Into<String>) -> Error {
        let line_text = self.line_text(pos.line);
        Error::Lex(SyntaxError {
            pos,
            line_text,
            message: message.into(),
        })
    }

    /// Builds a parse error carrying the caret excerpt for `pos`. Used by
    /// the parser, which owns the lexer.
    pub fn parse_error(&self, pos: Pos, message: impl Into<String>) -> Error {
        let line_text = self.line_text(pos.line);
        Error::Parse(SyntaxError {
            pos,
            line_text,
            message: message.into(),
        })
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                let start = self.here();
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        Some(_) => {}
                        None => return Err(self.lex_error(start, "unterminated comment")),
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments()?;
        let start = self.here();

        let Some(c) = self.peek() else {
            if !self.synthesized_semi {
                self.synthesized_semi = true;
                return Ok(Token::new(TokenKind::Semicolon, start));
            }
            return Ok(Token::new(TokenKind::Eof, start));
        };

        match c {
            '\'' => self.scan_string(start),
            '"' => self.scan_quoted_identifier(start, '"', '"'),
            '[' => self.scan_quoted_identifier(start, '[', ']'),
            '`' => self.scan_here_string(start),
            c if c.is_ascii_digit() => self.scan_number(start),
            c if c.is_alphabetic() || c == '_' => Ok(self.scan_identifier(start)),
            _ => self.scan_operator(start),
        }
    }

    fn scan_operator(&mut self, start: Pos) -> Result<Token> {
        let c = self.advance().unwrap_or_default();
        let kind = match c {
            ',' => TokenKind::Comma,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '~' => TokenKind::Match,
            '=' => TokenKind::Eq,
            '<' => match self.peek() {
                Some('=') => {
                    self.advance();
                    TokenKind::Le
                }
                Some('>') => {
                    self.advance();
                    TokenKind::Ne
                }
                _ => TokenKind::Lt,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '!' => {
                if self.peek() == Some('~') {
                    self.advance();
                    TokenKind::NotMatch
                } else {
                    return Err(self.lex_error(start, "unexpected character '!'"));
                }
            }
            other => {
                return Err(self.lex_error(start, format!("unexpected character '{other}'")));
            }
        };
        Ok(Token::new(kind, start))
    }

    fn scan_identifier(&mut self, start: Pos) -> Token {
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text = &self.input[begin..self.pos];

        if text.eq_ignore_ascii_case("NULL") {
            return Token::new(TokenKind::Null, start);
        }
        if text.eq_ignore_ascii_case("TRUE") {
            return Token::new(TokenKind::Bool(true), start);
        }
        if text.eq_ignore_ascii_case("FALSE") {
            return Token::new(TokenKind::Bool(false), start);
        }
        if let Some(keyword) = Keyword::from_str(text) {
            return Token::new(TokenKind::Keyword(keyword), start);
        }
        Token::new(TokenKind::Identifier(text.to_string()), start)
    }

    /// Scans a single-quoted string. `''` escapes a literal quote.
    fn scan_string(&mut self, start: Pos) -> Result<Token> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        value.push('\'');
                        self.advance();
                    } else {
                        return Ok(Token::new(TokenKind::String(value), start));
                    }
                }
                Some(c) => value.push(c),
                None => return Err(self.lex_error(start, "unterminated string literal")),
            }
        }
    }

    /// Scans a `"…"` or `[…]` identifier. Doubling the closing delimiter
    /// escapes it; the result is never keyword-promoted.
    fn scan_quoted_identifier(&mut self, start: Pos, open: char, close: char) -> Result<Token> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(c) if c == close => {
                    if self.peek() == Some(close) {
                        value.push(close);
                        self.advance();
                    } else {
                        return Ok(Token::new(TokenKind::Identifier(value), start));
                    }
                }
                Some(c) => value.push(c),
                None => {
                    return Err(self.lex_error(
                        start,
                        format!("unterminated quoted identifier {open}…{close}"),
                    ))
                }
            }
        }
    }

    /// Scans a triple-backtick here-string. The first line is a
    /// space-separated list of `option[:value]` pairs applied to the body.
    fn scan_here_string(&mut self, start: Pos) -> Result<Token> {
        for _ in 0..3 {
            if self.advance() != Some('`') {
                return Err(self.lex_error(start, "malformed here-string opener"));
            }
        }

        let mut header = String::new();
        loop {
            match self.advance() {
                Some('\n') => break,
                Some(c) => header.push(c),
                None => return Err(self.lex_error(start, "unterminated here-string")),
            }
        }

        let mut body = String::new();
        loop {
            match self.advance() {
                Some('`') if self.peek() == Some('`') && self.peek_next() == Some('`') => {
                    self.advance();
                    self.advance();
                    break;
                }
                Some(c) => body.push(c),
                None => return Err(self.lex_error(start, "unterminated here-string")),
            }
        }

        let mut value = body;
        for option in header.split_whitespace() {
            match option.split_once(':') {
                Some(("datauri", media_type)) => {
                    value = format!("data:{media_type};base64,{}", BASE64.encode(&value));
                }
                _ => {
                    return Err(
                        self.lex_error(start, format!("unknown here-string option '{option}'"))
                    )
                }
            }
        }
        Ok(Token::new(TokenKind::String(value), start))
    }

    fn scan_number(&mut self, start: Pos) -> Result<Token> {
        let begin = self.pos;

        if self.peek() == Some('0') {
            match self.peek_next() {
                Some('x' | 'X') => return self.scan_radix(start, 16, "hexadecimal"),
                Some('b' | 'B') => return self.scan_radix(start, 2, "binary"),
                Some('o' | 'O') => return self.scan_radix(start, 8, "octal"),
                Some(c) if c.is_ascii_digit() => return self.scan_leading_zero_octal(start),
                _ => {}
            }
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let is_float = self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[begin..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Ok(Token::new(TokenKind::Float(v), start)),
                Err(e) => Err(self.lex_error(start, format!("invalid float literal: {e}"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(Token::new(TokenKind::Int(v), start)),
                Err(e) => Err(self.lex_error(start, format!("invalid integer literal: {e}"))),
            }
        }
    }

    fn scan_radix(&mut self, start: Pos, radix: u32, name: &str) -> Result<Token> {
        self.advance();
        self.advance();
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let digits = &self.input[begin..self.pos];
        if digits.is_empty() {
            return Err(self.lex_error(start, format!("missing digits in {name} literal")));
        }
        i64::from_str_radix(digits, radix)
            .map(|v| Token::new(TokenKind::Int(v), start.clone()))
            .map_err(|_| self.lex_error(start, format!("invalid digit in {name} literal")))
    }

    fn scan_leading_zero_octal(&mut self, start: Pos) -> Result<Token> {
        self.advance();
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let digits = &self.input[begin..self.pos];
        i64::from_str_radix(digits, 8)
            .map(|v| Token::new(TokenKind::Int(v), start.clone()))
            .map_err(|_| self.lex_error(start, "invalid digit in octal literal"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test", input);
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let eof = token.kind == TokenKind::Eof;
            kinds.push(token.kind);
            if eof {
                break;
            }
        }
        kinds
    }

    fn first_error(input: &str) -> Error {
        let mut lexer = Lexer::new("test", input);
        loop {
            match lexer.next_token() {
                Ok(token) if token.kind == TokenKind::Eof => panic!("expected an error"),
                Ok(_) => {}
                Err(e) => return e,
            }
        }
    }

    #[test]
    fn test_empty_input_synthesizes_semicolon() {
        assert_eq!(token_kinds(""), vec![TokenKind::Semicolon, TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            token_kinds("select From WHERE"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Keyword(Keyword::Where),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            token_kinds("NULL true FALSE 'it''s'"),
            vec![
                TokenKind::Null,
                TokenKind::Bool(true),
                TokenKind::Bool(false),
                TokenKind::String("it's".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_bases() {
        assert_eq!(
            token_kinds("1 0x01 0b10 077 0o70 2.5 0"),
            vec![
                TokenKind::Int(1),
                TokenKind::Int(1),
                TokenKind::Int(2),
                TokenKind::Int(63),
                TokenKind::Int(56),
                TokenKind::Float(2.5),
                TokenKind::Int(0),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_minus_is_not_part_of_the_literal() {
        assert_eq!(
            token_kinds("-42"),
            vec![
                TokenKind::Minus,
                TokenKind::Int(42),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers_not_promoted() {
        assert_eq!(
            token_kinds("\"select\" [from] [a]]b]"),
            vec![
                TokenKind::Identifier("select".to_string()),
                TokenKind::Identifier("from".to_string()),
                TokenKind::Identifier("a]b".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            token_kinds("= <> < <= > >= ~ !~ + - * /"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Match,
                TokenKind::NotMatch,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            token_kinds("1 -- trailing\n/* block\ncomment */ 2"),
            vec![
                TokenKind::Int(1),
                TokenKind::Int(2),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_here_string_plain() {
        let kinds = token_kinds("```\na,b\n1,2\n```");
        assert_eq!(kinds[0], TokenKind::String("a,b\n1,2\n".to_string()));
    }

    #[test]
    fn test_here_string_datauri() {
        let kinds = token_kinds("```datauri:text/csv\na,b\n1,2\n```");
        let TokenKind::String(value) = &kinds[0] else {
            panic!("expected a string token");
        };
        assert!(value.starts_with("data:text/csv;base64,"));
        let decoded = crate::source::loader::parse_data_uri(value).unwrap();
        assert_eq!(decoded.data, b"a,b\n1,2\n");
    }

    #[test]
    fn test_positions() {
        let mut lexer = Lexer::new("test", "SELECT\n  x");
        let select = lexer.next_token().unwrap();
        assert_eq!((select.pos.line, select.pos.column), (1, 1));
        let x = lexer.next_token().unwrap();
        assert_eq!((x.pos.line, x.pos.column), (2, 3));
    }

    #[test]
    fn test_lex_errors() {
        assert!(matches!(first_error("'open"), Error::Lex(_)));
        assert!(matches!(first_error("/* open"), Error::Lex(_)));
        assert!(matches!(first_error("089"), Error::Lex(_)));
        assert!(matches!(first_error("0xZZ"), Error::Lex(_)));
        assert!(matches!(first_error("! x"), Error::Lex(_)));
        assert!(matches!(first_error("```opt:x\nbody\n```"), Error::Lex(_)));
        assert!(matches!(first_error("@"), Error::Lex(_)));
    }

    #[test]
    fn test_error_carries_excerpt() {
        let Error::Lex(err) = first_error("SELECT 'oops") else {
            panic!("expected a lex error");
        };
        assert_eq!(err.pos.column, 8);
        assert_eq!(err.line_text, "SELECT 'oops");
    }
}
