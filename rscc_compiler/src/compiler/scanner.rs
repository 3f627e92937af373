//! Turns source text into a stream of [tokens](Token)

use crate::compiler::common::error::{Error, ErrorKind};
use crate::compiler::common::token::Token;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

pub struct Scanner<'a> {
    source: Peekable<Chars<'a>>,

    // Reserved words which cannot be identifiers
    keywords: HashMap<&'static str, Token>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source: source.chars().peekable(),
            keywords: HashMap::from([
                ("int", Token::Int),
                ("char", Token::Char),
                ("long", Token::Long),
                ("void", Token::Void),
                ("if", Token::If),
                ("else", Token::Else),
                ("while", Token::While),
                ("for", Token::For),
                ("return", Token::Return),
                ("sizeof", Token::Sizeof),
            ]),
        }
    }

    fn matches(&mut self, expected: char) -> bool {
        match self.source.peek() {
            Some(c) if *c == expected => {
                self.source.next();
                true
            }
            _ => false,
        }
    }

    fn match_next(&mut self, expected: char, if_match: Token, if_not: Token) -> Token {
        match self.matches(expected) {
            true => if_match,
            false => if_not,
        }
    }

    pub fn scan_token(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();

        while let Some(c) = self.source.next() {
            match c {
                ' ' | '\t' | '\n' | '\r' => (),
                '(' => tokens.push(Token::LeftParen),
                ')' => tokens.push(Token::RightParen),
                '[' => tokens.push(Token::LeftBracket),
                ']' => tokens.push(Token::RightBracket),
                '{' => tokens.push(Token::LeftBrace),
                '}' => tokens.push(Token::RightBrace),
                ',' => tokens.push(Token::Comma),
                ';' => tokens.push(Token::Semicolon),
                '*' => tokens.push(Token::Star),
                '%' => tokens.push(Token::Mod),
                '+' => tokens.push(Token::Plus),
                '-' => tokens.push(Token::Minus),
                '=' => {
                    let token = self.match_next('=', Token::EqualEqual, Token::Equal);
                    tokens.push(token);
                }
                '!' => {
                    let token = self.match_next('=', Token::BangEqual, Token::Bang);
                    tokens.push(token);
                }
                '<' => {
                    let token = self.match_next('=', Token::LessEqual, Token::Less);
                    tokens.push(token);
                }
                '>' => {
                    let token = self.match_next('=', Token::GreaterEqual, Token::Greater);
                    tokens.push(token);
                }
                '&' => {
                    let token = self.match_next('&', Token::AmpAmp, Token::Amp);
                    tokens.push(token);
                }
                '|' => {
                    if !self.matches('|') {
                        return Err(Error::new(ErrorKind::SyntaxAt("|".to_string())));
                    }
                    tokens.push(Token::PipePipe);
                }
                '/' => {
                    if self.matches('/') {
                        self.line_comment();
                    } else if self.matches('*') {
                        self.block_comment()?;
                    } else {
                        tokens.push(Token::Slash);
                    }
                }
                '\'' => tokens.push(Token::CharLit(self.char_lit()?)),
                '"' => tokens.push(Token::String(self.string_lit()?)),
                '0'..='9' => tokens.push(Token::Number(self.num_lit(c)?)),
                _ if c.is_ascii_alphabetic() || c == '_' => {
                    let ident = self.ident(c);
                    match self.keywords.get(ident.as_str()) {
                        Some(keyword) => tokens.push(keyword.clone()),
                        None => tokens.push(Token::Ident(ident)),
                    }
                }
                _ => return Err(Error::new(ErrorKind::SyntaxAt(c.to_string()))),
            }
        }

        Ok(tokens)
    }

    fn line_comment(&mut self) {
        while let Some(c) = self.source.next() {
            if c == '\n' {
                break;
            }
        }
    }

    fn block_comment(&mut self) -> Result<(), Error> {
        while let Some(c) = self.source.next() {
            if c == '*' && self.matches('/') {
                return Ok(());
            }
        }
        Err(Error::new(ErrorKind::SyntaxAtEof))
    }

    fn ident(&mut self, first: char) -> String {
        let mut ident = String::from(first);
        while let Some(c) = self.source.peek() {
            if c.is_ascii_alphanumeric() || *c == '_' {
                ident.push(*c);
                self.source.next();
            } else {
                break;
            }
        }
        ident
    }

    // Decimal, hex with an 0x prefix, or octal with a leading 0.
    fn num_lit(&mut self, first: char) -> Result<u64, Error> {
        let mut text = String::from(first);

        let radix = if first == '0' && (self.matches('x') || self.matches('X')) {
            text.clear();
            16
        } else if first == '0' {
            8
        } else {
            10
        };

        while let Some(c) = self.source.peek() {
            if c.is_ascii_hexdigit() {
                text.push(*c);
                self.source.next();
            } else {
                break;
            }
        }

        u64::from_str_radix(&text, radix)
            .map_err(|_| Error::new(ErrorKind::SyntaxAt(text.clone())))
    }

    fn char_lit(&mut self) -> Result<u8, Error> {
        let value = match self.source.next() {
            Some('\\') => self.escape()?,
            Some('\'') => return Err(Error::new(ErrorKind::SyntaxAt("''".to_string()))),
            Some(c) => c as u8,
            None => return Err(Error::new(ErrorKind::SyntaxAtEof)),
        };

        if !self.matches('\'') {
            return Err(Error::new(ErrorKind::SyntaxAt("'".to_string())));
        }

        Ok(value)
    }

    fn string_lit(&mut self) -> Result<Vec<u8>, Error> {
        let mut value = Vec::new();

        loop {
            match self.source.next() {
                Some('"') => return Ok(value),
                Some('\\') => value.push(self.escape()?),
                Some('\n') | None => return Err(Error::new(ErrorKind::SyntaxAtEof)),
                Some(c) => value.push(c as u8),
            }
        }
    }

    // Decodes the character following a backslash. Unknown escapes stand
    // for the character itself.
    fn escape(&mut self) -> Result<u8, Error> {
        let c = match self.source.next() {
            Some(c) => c,
            None => return Err(Error::new(ErrorKind::SyntaxAtEof)),
        };

        Ok(match c {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            '0'..='7' => {
                let mut value = c as u8 - b'0';
                for _ in 0..2 {
                    match self.source.peek() {
                        Some(d @ '0'..='7') => {
                            value = value.wrapping_mul(8) + (*d as u8 - b'0');
                            self.source.next();
                        }
                        _ => break,
                    }
                }
                value
            }
            'x' => {
                let mut value: u8 = 0;
                while let Some(d) = self.source.peek() {
                    if let Some(digit) = d.to_digit(16) {
                        value = value.wrapping_mul(16).wrapping_add(digit as u8);
                        self.source.next();
                    } else {
                        break;
                    }
                }
                value
            }
            _ => c as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str) -> Vec<Token> {
        Scanner::new(input).scan_token().unwrap()
    }

    #[test]
    fn operators_and_keywords() {
        let actual = scan("while (a <= b) a = a + 1;");
        let expected = vec![
            Token::While,
            Token::LeftParen,
            Token::Ident("a".to_string()),
            Token::LessEqual,
            Token::Ident("b".to_string()),
            Token::RightParen,
            Token::Ident("a".to_string()),
            Token::Equal,
            Token::Ident("a".to_string()),
            Token::Plus,
            Token::Number(1),
            Token::Semicolon,
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn two_char_operators() {
        let actual = scan("== != <= >= && || ! = < >");
        let expected = vec![
            Token::EqualEqual,
            Token::BangEqual,
            Token::LessEqual,
            Token::GreaterEqual,
            Token::AmpAmp,
            Token::PipePipe,
            Token::Bang,
            Token::Equal,
            Token::Less,
            Token::Greater,
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn number_radixes() {
        assert_eq!(
            scan("10 0x10 010 4294967296"),
            vec![
                Token::Number(10),
                Token::Number(16),
                Token::Number(8),
                Token::Number(4294967296),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            scan(r#""a\tb\n" "\x41\101""#),
            vec![
                Token::String(b"a\tb\n".to_vec()),
                Token::String(b"AA".to_vec()),
            ]
        );
    }

    #[test]
    fn char_literals() {
        assert_eq!(
            scan(r"'a' '\n' '\0'"),
            vec![Token::CharLit(b'a'), Token::CharLit(b'\n'), Token::CharLit(0)]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            scan("a // line\n/* block\n still */ b"),
            vec![Token::Ident("a".to_string()), Token::Ident("b".to_string())]
        );
    }

    #[test]
    fn unexpected_character_is_fatal() {
        let error = Scanner::new("int a @").scan_token().unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at '@'");
    }

    #[test]
    fn single_pipe_is_fatal() {
        let error = Scanner::new("a | b").scan_token().unwrap_err();
        assert_eq!(error.kind.message(), "syntax error at '|'");
    }
}
