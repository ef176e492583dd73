use itertools::Itertools;

use crate::{
    expr::{Expr, Literal},
    stmt::Stmt,
    visitor::{ExprVisitor, StmtVisitor},
};

/// Renders syntax trees in a parenthesized prefix form, e.g. `(+ 1 (* 2 3))`.
pub struct AstPrinter;

impl ExprVisitor for AstPrinter {
    type Output = String;

    fn visit_expr(&self, e: &Expr) -> String {
        match e {
            Expr::Assign(name, value) => format!("(= {} {})", name, self.visit_expr(value)),
            Expr::Binary(left, operator, right) | Expr::Logical(left, operator, right) => {
                format!(
                    "({} {} {})",
                    operator,
                    self.visit_expr(left),
                    self.visit_expr(right),
                )
            }
            Expr::Call(callee, arguments, _) => format!(
                "(call {}{})",
                self.visit_expr(callee),
                arguments
                    .iter()
                    .map(|arg| format!(" {}", self.visit_expr(arg)))
                    .join("")
            ),
            Expr::Grouping(expr) => format!("(group {})", self.visit_expr(expr)),
            Expr::Literal(literal) => match literal {
                Literal::Number(x) => x.to_string(),
                Literal::String(x) => format!("{:?}", x),
                Literal::Bool(x) => x.to_string(),
                Literal::Nil => String::from("nil"),
            },
            Expr::Unary(operator, right) => format!("({} {})", operator, self.visit_expr(right)),
            Expr::Variable(name) => name.to_string(),
        }
    }
}

impl StmtVisitor for AstPrinter {
    type Output = String;

    fn visit_stmt(&self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Block(stmts) => format!(
                "(block{})",
                stmts
                    .iter()
                    .map(|s| format!(" {}", self.visit_stmt(s)))
                    .join("")
            ),
            Stmt::Expression(expr) => format!("(expr {})", self.visit_expr(expr)),
            Stmt::Function(decl) => format!(
                "(fun {} ({}) {})",
                decl.name,
                decl.params.iter().join(" "),
                self.visit_stmt(&Stmt::Block(decl.body.clone()))
            ),
            Stmt::If(condition, then_branch, else_branch) => match else_branch {
                Some(else_branch) => format!(
                    "(if {} {} {})",
                    self.visit_expr(condition),
                    self.visit_stmt(then_branch),
                    self.visit_stmt(else_branch)
                ),
                None => format!(
                    "(if {} {})",
                    self.visit_expr(condition),
                    self.visit_stmt(then_branch)
                ),
            },
            Stmt::Print(expr) => format!("(print {})", self.visit_expr(expr)),
            Stmt::Return(Some(expr)) => format!("(return {})", self.visit_expr(expr)),
            Stmt::Return(None) => String::from("(return)"),
            Stmt::Var(name, Some(initializer)) => {
                format!("(var {} {})", name, self.visit_expr(initializer))
            }
            Stmt::Var(name, None) => format!("(var {})", name),
            Stmt::While(condition, body) => format!(
                "(while {} {})",
                self.visit_expr(condition),
                self.visit_stmt(body)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::Parser, scanner::Scanner};
    use pretty_assertions::assert_eq;

    fn print(source: &str) -> Vec<String> {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let stmts = Parser::new(tokens).parse().unwrap();
        stmts.iter().map(|s| AstPrinter.visit_stmt(s)).collect()
    }

    #[test]
    fn prints_expressions_in_prefix_form() {
        assert_eq!(
            print("print -1 + (2 * x);"),
            vec!["(print (+ (- 1) (group (* 2 x))))"]
        );
    }

    #[test]
    fn prints_declarations() {
        assert_eq!(
            print("var a; fun f(x, y) { a = x or y; return; }"),
            vec![
                "(var a)",
                "(fun f (x y) (block (expr (= a (or x y))) (return)))"
            ]
        );
    }

    #[test]
    fn prints_control_flow() {
        assert_eq!(
            print("while (i < 3) if (i) print \"odd\"; else g(i, 1);"),
            vec!["(while (< i 3) (if i (print \"odd\") (expr (call g i 1))))"]
        );
    }
}
