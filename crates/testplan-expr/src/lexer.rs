//! Scanner for the expression grammar.
//!
//! Recognizes decimal and `0x` hex integers, decimal floats (with an
//! optional exponent), single- or double-quoted strings with `\`-escapes,
//! `+`, `-` and parentheses. Anything else is an error — identifiers in
//! particular, since every variable must already have been substituted.

use crate::error::ExprError;
use crate::token::{Token, TokenKind};
use crate::ExprResult;

/// The expression scanner.
pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer over the given source.
    pub fn new(src: &'src str) -> Self {
        Self {
            source: src.as_bytes(),
            pos: 0,
        }
    }

    /// Scan the entire source into a token stream ending with `Eof`.
    pub fn lex(mut self) -> ExprResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, start));
                return Ok(tokens);
            };
            let kind = match ch {
                b'+' => {
                    self.pos += 1;
                    TokenKind::Plus
                }
                b'-' => {
                    self.pos += 1;
                    TokenKind::Minus
                }
                b'(' => {
                    self.pos += 1;
                    TokenKind::LParen
                }
                b')' => {
                    self.pos += 1;
                    TokenKind::RParen
                }
                b'"' | b'\'' => self.scan_string(ch)?,
                b'0'..=b'9' => self.scan_number()?,
                other => {
                    return Err(ExprError::UnexpectedChar {
                        ch: other as char,
                        pos: start,
                    });
                }
            };
            tokens.push(Token::new(kind, start));
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn scan_string(&mut self, quote: u8) -> ExprResult<TokenKind> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ExprError::UnterminatedString { pos: start }),
                Some(b'\\') => {
                    let escaped = self
                        .peek_at(1)
                        .ok_or(ExprError::UnterminatedString { pos: start })?;
                    if !escaped.is_ascii() {
                        return Err(ExprError::UnexpectedChar {
                            ch: '\\',
                            pos: self.pos,
                        });
                    }
                    bytes.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        other => other,
                    });
                    self.pos += 2;
                }
                Some(ch) if ch == quote => {
                    self.pos += 1;
                    let text =
                        String::from_utf8(bytes).expect("source is UTF-8 and escapes are ASCII");
                    return Ok(TokenKind::Str(text));
                }
                Some(ch) => {
                    bytes.push(ch);
                    self.pos += 1;
                }
            }
        }
    }

    fn scan_number(&mut self) -> ExprResult<TokenKind> {
        let start = self.pos;

        // Hex integer.
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = std::str::from_utf8(&self.source[digits_start..self.pos])
                .expect("hex digits are ASCII");
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| ExprError::InvalidNumber { pos: start })?;
            return Ok(TokenKind::Int(value));
        }

        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(lookahead), Some(b'+' | b'-')) {
                lookahead += 1;
            }
            if matches!(self.peek_at(lookahead), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                self.pos += lookahead;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("number literals are ASCII");
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ExprError::InvalidNumber { pos: start })?;
            Ok(TokenKind::Float(value))
        } else {
            let value: u64 = text
                .parse()
                .map_err(|_| ExprError::InvalidNumber { pos: start })?;
            Ok(TokenKind::Int(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_scans_integers_and_operators() {
        assert_eq!(
            kinds("10 + 1"),
            vec![
                TokenKind::Int(10),
                TokenKind::Plus,
                TokenKind::Int(1),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_scans_hex() {
        assert_eq!(kinds("0x12345")[0], TokenKind::Int(0x12345));
    }

    #[test]
    fn test_scans_floats() {
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(kinds("2e3")[0], TokenKind::Float(2000.0));
    }

    #[test]
    fn test_scans_quoted_strings() {
        assert_eq!(kinds("\"a b\"")[0], TokenKind::Str("a b".into()));
        assert_eq!(kinds("'it\\'s'")[0], TokenKind::Str("it's".into()));
    }

    #[test]
    fn test_rejects_identifiers() {
        assert!(matches!(
            Lexer::new("myVar + 1").lex(),
            Err(ExprError::UnexpectedChar { ch: 'm', pos: 0 })
        ));
    }

    #[test]
    fn test_rejects_unterminated_string() {
        assert!(matches!(
            Lexer::new("\"oops").lex(),
            Err(ExprError::UnterminatedString { pos: 0 })
        ));
    }
}
