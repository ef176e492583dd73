use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::env::Environment;
use crate::stmt::FunctionDecl;

/// A user-defined function together with the frame it was declared in.
#[derive(Debug)]
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Environment,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }
}

/// A function implemented by the interpreter itself.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[RuntimeValue]) -> Result<RuntimeValue>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Bool(bool),
    Callable(Rc<Function>),
    Native(NativeFunction),
    Nil,
    Number(f64),
    String(String),
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Callable(a), RuntimeValue::Callable(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Native(a), RuntimeValue::Native(b)) => a.name == b.name,
            (RuntimeValue::Nil, RuntimeValue::Nil) => true,
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Bool(x) => write!(f, "{}", x),
            RuntimeValue::Callable(function) => write!(f, "<fn {}>", function.declaration.name),
            RuntimeValue::Native(native) => write!(f, "<native fn {}>", native.name),
            RuntimeValue::Nil => write!(f, "nil"),
            RuntimeValue::Number(x) => write!(f, "{}", x),
            RuntimeValue::String(x) => write!(f, "{}", x),
        }
    }
}

impl RuntimeValue {
    pub fn unwrap_number(&self, e: anyhow::Error) -> Result<f64> {
        if let RuntimeValue::Number(val) = self {
            Ok(*val)
        } else {
            Err(e)
        }
    }

    /// `nil` and `false` are falsey; every other value is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, RuntimeValue::Nil | RuntimeValue::Bool(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Identifier;

    fn function(name: &str) -> RuntimeValue {
        RuntimeValue::Callable(Rc::new(Function {
            declaration: Rc::new(FunctionDecl {
                name: Identifier::new(name, 1),
                params: vec![],
                body: vec![],
            }),
            closure: Environment::new(),
        }))
    }

    #[test]
    fn runtime_values_equality() {
        assert_eq!(RuntimeValue::Number(3.0), RuntimeValue::Number(3.0));
        assert_eq!(RuntimeValue::Number(-0.5), RuntimeValue::Number(-0.5));
        assert_eq!(RuntimeValue::Number(0.0), RuntimeValue::Number(0.0));
        assert_ne!(RuntimeValue::Number(0.1), RuntimeValue::Number(0.2));
        assert_ne!(RuntimeValue::Number(-5.0), RuntimeValue::Number(-6.0));
        assert_ne!(RuntimeValue::Nil, RuntimeValue::Bool(false));
        assert_ne!(RuntimeValue::Number(1.0), RuntimeValue::String("1".into()));
    }

    #[test]
    fn callables_compare_by_identity() {
        let f = function("f");
        assert_eq!(f, f.clone());
        assert_ne!(f, function("f"));
    }

    #[test]
    fn truthiness() {
        assert!(!RuntimeValue::Nil.is_truthy());
        assert!(!RuntimeValue::Bool(false).is_truthy());
        assert!(RuntimeValue::Number(0.0).is_truthy());
        assert!(RuntimeValue::String(String::new()).is_truthy());
        assert!(function("f").is_truthy());
    }

    #[test]
    fn display() {
        assert_eq!(RuntimeValue::Number(3.0).to_string(), "3");
        assert_eq!(RuntimeValue::Number(2.5).to_string(), "2.5");
        assert_eq!(RuntimeValue::Nil.to_string(), "nil");
        assert_eq!(function("greet").to_string(), "<fn greet>");
    }
}
