use crate::{expr::Expr, stmt::Stmt};

/// Walks expressions. Implementors decide what a visit produces: the
/// interpreter yields runtime values, the printer yields text.
pub trait ExprVisitor {
    type Output;

    fn visit_expr(&self, expr: &Expr) -> Self::Output;
}

pub trait StmtVisitor {
    type Output;

    fn visit_stmt(&self, stmt: &Stmt) -> Self::Output;
}
