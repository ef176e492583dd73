use std::str::CharIndices;

use anyhow::Result;
use anyhow::{anyhow, Context};
use itertools::{Itertools, MultiPeek};

use crate::token::{Token, TokenKind};

type CharIter<'a> = MultiPeek<CharIndices<'a>>;

pub struct Scanner<'a> {
    source: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner { source }
    }

    pub fn scan_tokens(&self) -> Result<Vec<Token>> {
        let mut iter = self.source.char_indices().multipeek();
        let mut tokens: Vec<Token> = vec![];
        let mut line: u32 = 1;

        while let Some(token) = self.scan_token(&mut iter, &mut line)? {
            tokens.push(token);
        }

        tokens.push(Token::new(TokenKind::Eof, line));

        Ok(tokens)
    }

    fn scan_token(&self, iter: &mut CharIter, line: &mut u32) -> Result<Option<Token>> {
        loop {
            iter.reset_peek(); // reset the "peek" cursor

            let (idx, char) = match iter.next() {
                Some(pair) => pair,
                None => return Ok(None),
            };

            // newlines, whitespace and comments continue the loop, everything
            // else produces a token
            break match char {
                '(' => self.create_token(TokenKind::LeftParen, line),
                ')' => self.create_token(TokenKind::RightParen, line),
                '{' => self.create_token(TokenKind::LeftBrace, line),
                '}' => self.create_token(TokenKind::RightBrace, line),
                ',' => self.create_token(TokenKind::Comma, line),
                '.' => self.create_token(TokenKind::Dot, line),
                '-' => self.create_token(TokenKind::Minus, line),
                '+' => self.create_token(TokenKind::Plus, line),
                ';' => self.create_token(TokenKind::Semicolon, line),
                '*' => self.create_token(TokenKind::Star, line),
                '!' => self.one_or_two(iter, line, TokenKind::Bang, TokenKind::BangEqual),
                '=' => self.one_or_two(iter, line, TokenKind::Equal, TokenKind::EqualEqual),
                '<' => self.one_or_two(iter, line, TokenKind::Less, TokenKind::LessEqual),
                '>' => self.one_or_two(iter, line, TokenKind::Greater, TokenKind::GreaterEqual),
                '/' => {
                    if self.peek_match(iter, |ch| ch == '/') {
                        iter.next();
                        // A comment goes until the end of the line
                        self.read_to_end_of_line(iter);
                        continue;
                    } else {
                        self.create_token(TokenKind::Slash, line)
                    }
                }
                '"' => self.scan_string(iter, line),
                ' ' | '\r' | '\t' => continue,
                '\n' => {
                    *line += 1;
                    continue;
                }
                ch if ch.is_ascii_digit() => self.scan_number(iter, idx, line),
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.scan_identifier(iter, idx, line),
                ch => Err(anyhow!("Unexpected character {:?} on line {}", ch, line)),
            };
        }
    }

    // helper method
    fn create_token(&self, kind: TokenKind, line: &u32) -> Result<Option<Token>> {
        Ok(Some(Token::new(kind, *line)))
    }

    /// Produces `double` if the next character is '=', otherwise `single`.
    fn one_or_two(
        &self,
        iter: &mut CharIter,
        line: &u32,
        single: TokenKind,
        double: TokenKind,
    ) -> Result<Option<Token>> {
        if self.peek_match(iter, |ch| ch == '=') {
            iter.next();
            self.create_token(double, line)
        } else {
            self.create_token(single, line)
        }
    }

    /// Returns true if there is another character to peek which matches the
    /// predicate, otherwise it returns false.
    fn peek_match<F>(&self, iter: &mut CharIter, pred: F) -> bool
    where
        F: FnOnce(char) -> bool,
    {
        iter.reset_peek();
        match iter.peek() {
            Some(&(_, ch)) => pred(ch),
            None => false,
        }
    }

    fn read_to_end_of_line(&self, iter: &mut CharIter) {
        while self.peek_match(iter, |ch| ch != '\n') {
            iter.next();
        }
    }

    fn scan_string(&self, iter: &mut CharIter, line: &mut u32) -> Result<Option<Token>> {
        let start_line = *line;
        let mut lexeme = String::new();
        loop {
            match iter.next() {
                Some((_, '"')) => return self.create_token(TokenKind::String(lexeme), line),
                Some((_, ch)) => {
                    if ch == '\n' {
                        *line += 1;
                    }
                    lexeme.push(ch);
                }
                None => {
                    return Err(anyhow!(
                        "Unterminated string starting on line {}",
                        start_line
                    ))
                }
            }
        }
    }

    /// Consumes characters while `pred` holds and returns the byte offset
    /// just past the last one consumed.
    fn consume_while<F>(&self, iter: &mut CharIter, mut end: usize, pred: F) -> usize
    where
        F: Fn(char) -> bool,
    {
        while self.peek_match(iter, &pred) {
            if let Some((idx, ch)) = iter.next() {
                end = idx + ch.len_utf8();
            }
        }
        end
    }

    fn scan_number(&self, iter: &mut CharIter, idx: usize, line: &u32) -> Result<Option<Token>> {
        let mut end = self.consume_while(iter, idx + 1, |ch| ch.is_ascii_digit());

        // Look for a fractional part
        iter.reset_peek();
        if matches!(iter.peek(), Some((_, '.'))) && matches!(iter.peek(), Some((_, '0'..='9'))) {
            // consume the "."
            iter.next();
            end = self.consume_while(iter, end + 1, |ch| ch.is_ascii_digit());
        }

        let value: f64 = self.source[idx..end]
            .parse()
            .with_context(|| format!("Unable to parse number on line {}", line))?;
        self.create_token(TokenKind::Number(value), line)
    }

    fn scan_identifier(
        &self,
        iter: &mut CharIter,
        idx: usize,
        line: &u32,
    ) -> Result<Option<Token>> {
        let end = self.consume_while(iter, idx + 1, |ch| ch.is_ascii_alphanumeric() || ch == '_');
        let text = &self.source[idx..end];
        let kind = TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_owned()));
        self.create_token(kind, line)
    }
}
