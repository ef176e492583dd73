use std::cell::{Cell, RefCell};
use std::fmt;
use std::iter::zip;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use anyhow::{Context, Result};
use log::debug;

use crate::env::Environment;
use crate::value::{Function, NativeFunction, RuntimeValue};
use crate::{
    expr::Expr, expr::Literal, stmt::Stmt, token::TokenKind, visitor::ExprVisitor,
    visitor::StmtVisitor,
};

// A custom error type used to signal that a function is returning, so the
// error should be "caught" by the nearest function call. The returned value
// waits in `Interpreter::returning` meanwhile, since values hold `Rc`s and
// can't travel inside an `anyhow::Error`.
#[derive(Debug, Clone, Copy)]
struct ReturnSignal;

impl fmt::Display for ReturnSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<returning>")
    }
}

impl std::error::Error for ReturnSignal {}

const MAX_CALL_DEPTH: usize = 1000;

// Stack headroom checked before every call, and how much to grow by when
// less than that is left.
const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

fn clock(_arguments: &[RuntimeValue]) -> Result<RuntimeValue> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is set before the Unix epoch")?;
    Ok(RuntimeValue::Number(elapsed.as_secs_f64()))
}

const NATIVES: &[NativeFunction] = &[NativeFunction {
    name: "clock",
    arity: 0,
    func: clock,
}];

pub struct Interpreter {
    globals: Environment,
    env: RefCell<Environment>,
    returning: RefCell<Option<RuntimeValue>>,
    call_depth: Cell<usize>,
    stdout: RefCell<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        let globals = Environment::new();
        for native in NATIVES {
            globals.define(native.name, RuntimeValue::Native(*native));
        }
        Interpreter {
            env: RefCell::new(globals.clone()),
            globals,
            returning: RefCell::new(None),
            call_depth: Cell::new(0),
            stdout: RefCell::new(String::new()),
        }
    }
}

// Functions bound in the global frame close over it, which is an `Rc` cycle.
// Emptying the frame on teardown lets those functions and their frames go.
impl Drop for Interpreter {
    fn drop(&mut self) {
        self.globals.clear();
    }
}

impl Interpreter {
    /// Runs `statements` in the current scope and returns everything they
    /// printed.
    pub fn interpret(&self, statements: &[Stmt]) -> Result<String> {
        let result = statements.iter().try_for_each(|stmt| self.visit_stmt(stmt));
        let stdout = self.stdout.take();
        result.map(|_| stdout)
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    /// Runs `statements` with `env` as the current scope, then restores the
    /// previous scope whether or not they succeeded.
    fn execute_block(&self, statements: &[Stmt], env: Environment) -> Result<()> {
        let previous = self.env.replace(env);
        let result = statements.iter().try_for_each(|stmt| self.visit_stmt(stmt));
        self.env.replace(previous);
        result
    }

    fn current_env(&self) -> Environment {
        self.env.borrow().clone()
    }

    fn invoke_function(
        &self,
        callee: RuntimeValue,
        arguments: Vec<RuntimeValue>,
        line: u32,
    ) -> Result<RuntimeValue> {
        match callee {
            RuntimeValue::Callable(function) => {
                check_arity(function.arity(), arguments.len(), line)?;
                debug!("calling {} at depth {}", callee_name(&function), function.closure.depth());

                self.call_function(&function, arguments, line)
            }
            RuntimeValue::Native(native) => {
                check_arity(native.arity, arguments.len(), line)?;
                (native.func)(&arguments)
            }
            _ => Err(anyhow!(
                "Can only call functions and classes, found {} on line {}.",
                callee,
                line
            )),
        }
    }

    fn call_function(
        &self,
        function: &Function,
        arguments: Vec<RuntimeValue>,
        line: u32,
    ) -> Result<RuntimeValue> {
        let depth = self.call_depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(anyhow!("Stack overflow on line {}.", line));
        }

        // the call frame encloses the frame the function was declared in,
        // not the caller's frame
        let invoke_env = function.closure.enclose();
        for (param, arg) in zip(&function.declaration.params, arguments) {
            invoke_env.define(param.name.clone(), arg);
        }

        self.call_depth.set(depth + 1);
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            self.execute_block(&function.declaration.body, invoke_env)
        });
        self.call_depth.set(depth);

        match result {
            Ok(()) => Ok(RuntimeValue::Nil),
            Err(err) if err.is::<ReturnSignal>() => {
                Ok(self.returning.take().unwrap_or(RuntimeValue::Nil))
            }
            Err(err) => Err(err),
        }
    }
}

fn callee_name(function: &Function) -> &str {
    &function.declaration.name.name
}

fn check_arity(expected: usize, found: usize, line: u32) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(anyhow!(
            "Expected {} arguments but got {} on line {}.",
            expected,
            found,
            line
        ))
    }
}

impl StmtVisitor for Interpreter {
    type Output = Result<()>;

    fn visit_stmt(&self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(stmts) => self.execute_block(stmts, self.current_env().enclose()),
            Stmt::Expression(expr) => {
                self.visit_expr(expr)?;
                Ok(())
            }
            Stmt::Print(expr) => {
                let value = self.visit_expr(expr)?;
                println!("{}", value);
                self.stdout
                    .borrow_mut()
                    .push_str(value.to_string().as_str());
                self.stdout.borrow_mut().push('\n');
                Ok(())
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.visit_expr(expr)?,
                    None => RuntimeValue::Nil,
                };
                self.returning.replace(Some(value));
                Err(ReturnSignal.into())
            }
            Stmt::Var(name, initializer) => {
                let value = match initializer {
                    Some(expr) => self.visit_expr(expr)?,
                    None => RuntimeValue::Nil,
                };
                debug!("define {} = {}", name, value);
                self.current_env().define(name.name.clone(), value);
                Ok(())
            }
            Stmt::If(condition, then_branch, else_branch) => {
                if self.visit_expr(condition)?.is_truthy() {
                    self.visit_stmt(then_branch)?;
                } else if let Some(unwrapped) = else_branch {
                    self.visit_stmt(unwrapped)?;
                }
                Ok(())
            }
            Stmt::While(condition, body) => {
                while self.visit_expr(condition)?.is_truthy() {
                    self.visit_stmt(body)?;
                }
                Ok(())
            }
            Stmt::Function(declaration) => {
                // the function is bound in the frame it closes over, so it can
                // see itself and recurse
                let closure = self.current_env();
                let function = RuntimeValue::Callable(Rc::new(Function {
                    declaration: declaration.clone(),
                    closure: closure.clone(),
                }));
                debug!("define {}", function);
                closure.define(declaration.name.name.clone(), function);
                Ok(())
            }
        }
    }
}

impl ExprVisitor for Interpreter {
    type Output = Result<RuntimeValue>;

    fn visit_expr(&self, expr: &Expr) -> Result<RuntimeValue> {
        match expr {
            Expr::Assign(name, value) => {
                let evaluated = self.visit_expr(value)?;
                debug!("assign {} = {}", name, evaluated);
                self.current_env()
                    .assign(&name.name, evaluated.clone())
                    .map_err(|err| err.at(name.line))?;
                Ok(evaluated)
            }
            Expr::Binary(left, operator, right) => {
                let left_val = self.visit_expr(left)?;
                let right_val = self.visit_expr(right)?;
                binary(operator, left_val, right_val)
            }
            Expr::Grouping(expr) => self.visit_expr(expr),
            Expr::Literal(literal) => match literal {
                Literal::Number(x) => Ok(RuntimeValue::Number(*x)),
                Literal::String(x) => Ok(RuntimeValue::String(x.to_owned())),
                Literal::Bool(x) => Ok(RuntimeValue::Bool(*x)),
                Literal::Nil => Ok(RuntimeValue::Nil),
            },
            Expr::Variable(name) => Ok(self
                .current_env()
                .lookup(&name.name)
                .map_err(|err| err.at(name.line))?),
            Expr::Unary(operator, value) => {
                let evaluated = self.visit_expr(value)?;
                match operator {
                    TokenKind::Bang => Ok(RuntimeValue::Bool(!evaluated.is_truthy())),
                    TokenKind::Minus => match evaluated {
                        RuntimeValue::Number(x) => Ok(RuntimeValue::Number(-x)),
                        _ => Err(anyhow!("Unexpected operand after -: {}.", evaluated)),
                    },
                    _ => Err(anyhow!("Unexpected unary operator: {}.", operator)),
                }
            }
            Expr::Logical(left, operator, right) => {
                let left_val = self.visit_expr(left)?;
                match operator {
                    TokenKind::Or => {
                        if left_val.is_truthy() {
                            return Ok(left_val);
                        }
                    }
                    TokenKind::And => {
                        if !left_val.is_truthy() {
                            return Ok(left_val);
                        }
                    }
                    _ => return Err(anyhow!("Unexpected logical operator: {}.", operator)),
                };
                self.visit_expr(right)
            }
            Expr::Call(callee, arguments, line) => {
                let callee_val = self.visit_expr(callee)?;

                let mut argument_vals = vec![];
                for arg in arguments {
                    argument_vals.push(self.visit_expr(arg)?);
                }

                self.invoke_function(callee_val, argument_vals, *line)
            }
        }
    }
}

fn binary(operator: &TokenKind, left_val: RuntimeValue, right_val: RuntimeValue) -> Result<RuntimeValue> {
    let numbers = |op: &str| -> Result<(f64, f64)> {
        let left_num =
            left_val.unwrap_number(anyhow!("Unexpected operand before {}: {}", op, left_val))?;
        let right_num =
            right_val.unwrap_number(anyhow!("Unexpected operand after {}: {}", op, right_val))?;
        Ok((left_num, right_num))
    };

    match operator {
        TokenKind::Greater => numbers(">").map(|(l, r)| RuntimeValue::Bool(l > r)),
        TokenKind::GreaterEqual => numbers(">=").map(|(l, r)| RuntimeValue::Bool(l >= r)),
        TokenKind::Less => numbers("<").map(|(l, r)| RuntimeValue::Bool(l < r)),
        TokenKind::LessEqual => numbers("<=").map(|(l, r)| RuntimeValue::Bool(l <= r)),
        TokenKind::Minus => numbers("-").map(|(l, r)| RuntimeValue::Number(l - r)),
        TokenKind::Slash => numbers("/").map(|(l, r)| RuntimeValue::Number(l / r)),
        TokenKind::Star => numbers("*").map(|(l, r)| RuntimeValue::Number(l * r)),
        TokenKind::BangEqual => Ok(RuntimeValue::Bool(left_val != right_val)),
        TokenKind::EqualEqual => Ok(RuntimeValue::Bool(left_val == right_val)),
        TokenKind::Plus => match (&left_val, &right_val) {
            (RuntimeValue::Number(l), RuntimeValue::Number(r)) => Ok(RuntimeValue::Number(l + r)),
            (RuntimeValue::String(l), RuntimeValue::String(r)) => {
                Ok(RuntimeValue::String(format!("{}{}", l, r)))
            }
            _ => Err(anyhow!(
                "Unexpected operands for + (must be a pair of numbers or pair of strings): {}, {}",
                left_val,
                right_val
            )),
        },
        _ => Err(anyhow!("Unexpected binary operator: {}", operator)),
    }
}
