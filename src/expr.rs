use std::fmt;

use crate::token::TokenKind;

/// A name as written in the source, along with where it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub line: u32,
}

impl Identifier {
    pub fn new(name: impl Into<String>, line: u32) -> Self {
        Identifier {
            name: name.into(),
            line,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Assign(Identifier, Box<Expr>),
    Binary(Box<Expr>, TokenKind, Box<Expr>),
    /// Callee, arguments, and the line of the closing parenthesis.
    Call(Box<Expr>, Vec<Expr>, u32),
    Grouping(Box<Expr>),
    Literal(Literal),
    Logical(Box<Expr>, TokenKind, Box<Expr>),
    Unary(TokenKind, Box<Expr>),
    Variable(Identifier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
}
