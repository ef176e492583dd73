use std::rc::Rc;
use std::vec::IntoIter;

use crate::{
    expr::{Expr, Identifier, Literal},
    stmt::{FunctionDecl, Stmt},
    token::{Token, TokenKind},
};

use anyhow::anyhow;
use anyhow::Result;

const MAX_ARGUMENTS: usize = 255;

#[derive(Debug)]
pub struct Parser {
    tokens: IntoIter<Token>,
    token: Token,
    prev_token: Token,
    /// Number of function bodies enclosing the current token.
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut parser = Parser {
            tokens: tokens.into_iter(),
            token: Token::new(TokenKind::Eof, 1),
            prev_token: Token::new(TokenKind::Eof, 1),
            function_depth: 0,
        };

        parser.bump();
        parser
    }

    pub fn parse(&mut self) -> Result<Vec<Stmt>> {
        let mut statements = vec![];
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_declaration()?);
        }
        Ok(statements)
    }

    fn parse_declaration(&mut self) -> Result<Stmt> {
        if self.eat(&TokenKind::Fun) {
            self.parse_function()
        } else if self.eat(&TokenKind::Var) {
            self.parse_var_declaration()
        } else {
            self.parse_statement()
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.eat(&TokenKind::For) {
            self.parse_for_statement()
        } else if self.eat(&TokenKind::If) {
            self.parse_if_statement()
        } else if self.eat(&TokenKind::Print) {
            self.parse_print_statement()
        } else if self.eat(&TokenKind::Return) {
            self.parse_return_statement()
        } else if self.eat(&TokenKind::While) {
            self.parse_while_statement()
        } else if self.eat(&TokenKind::LeftBrace) {
            Ok(Stmt::Block(self.parse_block()?))
        } else {
            self.parse_expression_statement()
        }
    }

    /// `for` has no node of its own: it becomes a `while` loop wrapped in a
    /// block that scopes the initializer.
    fn parse_for_statement(&mut self) -> Result<Stmt> {
        let for_line = self.prev_token.line;
        self.expect(
            &TokenKind::LeftParen,
            format!("Expected '(' after 'for' on line {}.", for_line),
        )?;
        let initializer = if self.eat(&TokenKind::Semicolon) {
            None
        } else if self.eat(&TokenKind::Var) {
            Some(self.parse_var_declaration()?)
        } else {
            Some(self.parse_expression_statement()?)
        };
        let condition = if !self.check(&TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(
            &TokenKind::Semicolon,
            format!("Expected ';' after loop condition on line {}.", for_line),
        )?;
        let increment = if !self.check(&TokenKind::RightParen) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(
            &TokenKind::RightParen,
            format!("Expected ')' after for clauses on line {}.", for_line),
        )?;
        let mut body = self.parse_statement()?;
        if let Some(expr) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(expr)]);
        }
        let condition = condition.unwrap_or(Expr::Literal(Literal::Bool(true)));
        body = Stmt::While(condition, body.into());
        if let Some(stmt) = initializer {
            body = Stmt::Block(vec![stmt, body]);
        }
        Ok(body)
    }

    fn parse_if_statement(&mut self) -> Result<Stmt> {
        let if_line = self.prev_token.line;
        self.expect(
            &TokenKind::LeftParen,
            format!("Expected '(' after 'if' on line {}.", if_line),
        )?;
        let condition = self.parse_expression()?;
        self.expect(
            &TokenKind::RightParen,
            format!("Expected ')' after condition on line {}.", if_line),
        )?;

        let then_branch = self.parse_statement()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(self.parse_statement()?.into())
        } else {
            None
        };
        Ok(Stmt::If(condition, then_branch.into(), else_branch))
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt> {
        let line = self.token.line;
        let expr = self.parse_expression()?;
        if self.eat(&TokenKind::Semicolon) {
            Ok(Stmt::Expression(expr))
        } else {
            Err(anyhow!("Expected ';' after value on line {}", line))
        }
    }

    fn parse_while_statement(&mut self) -> Result<Stmt> {
        let while_line = self.prev_token.line;
        self.expect(
            &TokenKind::LeftParen,
            format!("Expected '(' after 'while' on line {}.", while_line),
        )?;
        let condition = self.parse_expression()?;
        self.expect(
            &TokenKind::RightParen,
            format!("Expected ')' after condition on line {}.", while_line),
        )?;
        let body = self.parse_statement()?;
        Ok(Stmt::While(condition, body.into()))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements = vec![];
        let open_brace_line = self.prev_token.line;
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            statements.push(self.parse_declaration()?);
        }
        if self.eat(&TokenKind::RightBrace) {
            Ok(statements)
        } else {
            Err(anyhow!(
                "Expected '}}' to match '{{' on line {}",
                open_brace_line
            ))
        }
    }

    fn parse_print_statement(&mut self) -> Result<Stmt> {
        let value_line = self.token.line;
        let value = self.parse_expression()?;
        self.expect(
            &TokenKind::Semicolon,
            format!("Expected ';' after value on line {}", value_line),
        )?;
        Ok(Stmt::Print(value))
    }

    fn parse_return_statement(&mut self) -> Result<Stmt> {
        let return_line = self.prev_token.line;
        if self.function_depth == 0 {
            return Err(anyhow!(
                "Can't return from top-level code on line {}.",
                return_line
            ));
        }
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(
            &TokenKind::Semicolon,
            format!("Expected ';' after return value on line {}", return_line),
        )?;
        Ok(Stmt::Return(value))
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt> {
        let var_line = self.prev_token.line;
        let identifier = self.expect_identifier()?;
        let initializer = if self.eat(&TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if self.eat(&TokenKind::Semicolon) {
            Ok(Stmt::Var(identifier, initializer))
        } else {
            Err(anyhow!(
                "Expected ';' after variable declaration on line {}",
                var_line
            ))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_function(&mut self) -> Result<Stmt> {
        let name = self.expect_identifier()?;
        self.expect(
            &TokenKind::LeftParen,
            format!("Expected '(' after {} on line {}", name, name.line),
        )?;
        let mut params = vec![];
        if !self.check(&TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    return Err(anyhow!(
                        "Can't have more than {} parameters on line {}.",
                        MAX_ARGUMENTS,
                        self.token.line
                    ));
                }
                params.push(self.expect_identifier()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(
            &TokenKind::RightParen,
            format!("Expected ')' after parameters on line {}.", self.token.line),
        )?;
        self.expect(
            &TokenKind::LeftBrace,
            format!("Expected '{{' before body of {} on line {}.", name, self.token.line),
        )?;
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        let body = body?;
        Ok(Stmt::Function(Rc::new(FunctionDecl { name, params, body })))
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        if self.eat(&TokenKind::Equal) {
            let line = self.prev_token.line;
            let value = self.parse_assignment()?;
            match expr {
                Expr::Variable(identifier) => Ok(Expr::Assign(identifier, Box::from(value))),
                _ => Err(anyhow!("Invalid assignment target on line {}", line)),
            }
        } else {
            Ok(expr)
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let operator = self.prev_token.kind.clone();
            let right = self.parse_and()?;
            expr = Expr::Logical(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let operator = self.prev_token.kind.clone();
            let right = self.parse_equality()?;
            expr = Expr::Logical(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        while self.token.is_equality() {
            let operator = self.token.kind.clone();
            self.bump();
            let right = self.parse_comparison()?;
            expr = Expr::Binary(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        while self.token.is_comparison() {
            let operator = self.token.kind.clone();
            self.bump();
            let right = self.parse_term()?;
            expr = Expr::Binary(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_factor()?;
        while self.token.is_term() {
            let operator = self.token.kind.clone();
            self.bump();
            let right = self.parse_factor()?;
            expr = Expr::Binary(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while self.token.is_factor() {
            let operator = self.token.kind.clone();
            self.bump();
            let right = self.parse_unary()?;
            expr = Expr::Binary(Box::from(expr), operator, Box::from(right))
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.token.is_unary() {
            let operator = self.token.kind.clone();
            self.bump();
            let right = self.parse_unary()?;
            Ok(Expr::Unary(operator, Box::from(right)))
        } else {
            self.parse_call()
        }
    }

    fn parse_call(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.eat(&TokenKind::LeftParen) {
            expr = self.finish_call(expr)?;
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments = vec![];
        if !self.check(&TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    return Err(anyhow!(
                        "Can't have more than {} arguments on line {}.",
                        MAX_ARGUMENTS,
                        self.token.line
                    ));
                }
                arguments.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let line = self.token.line;
        self.expect(
            &TokenKind::RightParen,
            format!("Expected ')' after arguments on line {}.", line),
        )?;
        Ok(Expr::Call(Box::new(callee), arguments, line))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let line = self.token.line;
        if self.eat(&TokenKind::LeftParen) {
            let expr = self.parse_expression()?;
            self.expect(
                &TokenKind::RightParen,
                format!("Expected ')' to match '(' on line {}", line),
            )?;
            return Ok(Expr::Grouping(Box::from(expr)));
        }

        let expr = match &self.token.kind {
            TokenKind::False => Expr::Literal(Literal::Bool(false)),
            TokenKind::True => Expr::Literal(Literal::Bool(true)),
            TokenKind::Nil => Expr::Literal(Literal::Nil),
            TokenKind::Number(value) => Expr::Literal(Literal::Number(*value)),
            TokenKind::String(value) => Expr::Literal(Literal::String(value.clone())),
            TokenKind::Identifier(name) => Expr::Variable(Identifier::new(name.clone(), line)),
            _ => {
                return Err(anyhow!(
                    "Expected an expression, found token {} on line {}",
                    self.token.kind,
                    line
                ))
            }
        };
        self.bump();
        Ok(expr)
    }

    /// Expects and consumes the token `token`. Signals an error if the next
    /// token is not `token`.
    pub fn expect(&mut self, token: &TokenKind, message: String) -> Result<()> {
        if self.token.kind == *token {
            self.bump();
            Ok(())
        } else {
            Err(anyhow!(message))
        }
    }

    /// Expects and consumes the token `token` if it is an identifier, and
    /// signals an error otherwise.
    pub fn expect_identifier(&mut self) -> Result<Identifier> {
        let identifier = match &self.token.kind {
            TokenKind::Identifier(name) => Identifier::new(name.clone(), self.token.line),
            _ => {
                return Err(anyhow!(
                    "Expected an identifier, found {} on line {}",
                    self.token.kind,
                    self.token.line
                ))
            }
        };
        self.bump();
        Ok(identifier)
    }

    /// Consumes one token (moves the cursor forward by one).
    fn bump(&mut self) {
        let line = self.token.line;
        let next = self
            .tokens
            .next()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, line));
        self.prev_token = std::mem::replace(&mut self.token, next);
    }

    /// Checks if the next token is `tok`, and returns `true` if so.
    fn check(&self, tok: &TokenKind) -> bool {
        self.token.kind == *tok
    }

    /// Consumes the token `token` if it exists. Returns whether the given token
    /// was present.
    fn eat(&mut self, token: &TokenKind) -> bool {
        let is_present = self.check(token);
        if is_present {
            self.bump()
        }
        is_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Result<Vec<Stmt>> {
        let tokens = Scanner::new(source).scan_tokens()?;
        Parser::new(tokens).parse()
    }

    fn var(name: &str, line: u32) -> Expr {
        Expr::Variable(Identifier::new(name, line))
    }

    fn num(x: f64) -> Expr {
        Expr::Literal(Literal::Number(x))
    }

    #[test]
    fn parse_print_stmt() {
        let tokens = vec![
            Token::new(TokenKind::Print, 1),
            Token::new(TokenKind::String("one".into()), 1),
            Token::new(TokenKind::Semicolon, 1),
            Token::new(TokenKind::Eof, 2),
        ];
        let mut parser = Parser::new(tokens);
        let result = parser.parse().unwrap();
        let expected = vec![Stmt::Print(Expr::Literal(Literal::String("one".into())))];
        assert_eq!(result, expected)
    }

    #[test]
    fn parse_var_without_initializer() {
        assert_eq!(
            parse("var x;").unwrap(),
            vec![Stmt::Var(Identifier::new("x", 1), None)]
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(
            parse("a = b = 1;").unwrap(),
            vec![Stmt::Expression(Expr::Assign(
                Identifier::new("a", 1),
                Box::new(Expr::Assign(Identifier::new("b", 1), Box::new(num(1.0))))
            ))]
        );
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        assert_eq!(
            parse("1 + 2 * 3;").unwrap(),
            vec![Stmt::Expression(Expr::Binary(
                Box::new(num(1.0)),
                TokenKind::Plus,
                Box::new(Expr::Binary(
                    Box::new(num(2.0)),
                    TokenKind::Star,
                    Box::new(num(3.0))
                ))
            ))]
        );
    }

    #[test]
    fn parse_grouping_and_unary() {
        assert_eq!(
            parse("-(x);").unwrap(),
            vec![Stmt::Expression(Expr::Unary(
                TokenKind::Minus,
                Box::new(Expr::Grouping(Box::new(var("x", 1))))
            ))]
        );
    }

    #[test]
    fn parse_if_else() {
        assert_eq!(
            parse("if (a) print 1; else print 2;").unwrap(),
            vec![Stmt::If(
                var("a", 1),
                Box::new(Stmt::Print(num(1.0))),
                Some(Box::new(Stmt::Print(num(2.0))))
            )]
        );
    }

    #[test]
    fn for_loop_desugars_to_while_in_block() {
        let stmts = parse("for (var i = 0; i < 2; i = i + 1) print i;").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Block(inner) => {
                assert!(matches!(inner[0], Stmt::Var(_, Some(_))));
                assert!(matches!(inner[1], Stmt::While(_, _)));
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn parse_function_declaration() {
        let stmts = parse("fun add(a, b) {\n  return a + b;\n}").unwrap();
        let expected = Stmt::Function(Rc::new(FunctionDecl {
            name: Identifier::new("add", 1),
            params: vec![Identifier::new("a", 1), Identifier::new("b", 1)],
            body: vec![Stmt::Return(Some(Expr::Binary(
                Box::new(var("a", 2)),
                TokenKind::Plus,
                Box::new(var("b", 2)),
            )))],
        }));
        assert_eq!(stmts, vec![expected]);
    }

    #[test]
    fn parse_bare_return() {
        let stmts = parse("fun f() { return; }").unwrap();
        match &stmts[0] {
            Stmt::Function(decl) => assert_eq!(decl.body, vec![Stmt::Return(None)]),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn parse_chained_calls() {
        assert_eq!(
            parse("f(1)();").unwrap(),
            vec![Stmt::Expression(Expr::Call(
                Box::new(Expr::Call(Box::new(var("f", 1)), vec![num(1.0)], 1)),
                vec![],
                1
            ))]
        );
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let err = parse("print 1;\nreturn 1;").unwrap_err();
        assert_eq!(err.to_string(), "Can't return from top-level code on line 2.");

        let err = parse("fun f() {}\n{ return; }").unwrap_err();
        assert_eq!(err.to_string(), "Can't return from top-level code on line 2.");

        assert!(parse("fun f() { { return 1; } }").is_ok());
        assert!(parse("fun f() { fun g() {} return g; }").is_ok());
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse("1 = 2;").unwrap_err();
        assert_eq!(err.to_string(), "Invalid assignment target on line 1");
    }

    #[test]
    fn unclosed_block() {
        let err = parse("{\nvar a = 1;").unwrap_err();
        assert_eq!(err.to_string(), "Expected '}' to match '{' on line 1");
    }
}
