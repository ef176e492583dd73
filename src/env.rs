//! The scope chain.
//!
//! Each [`Environment`] is a shared handle to one frame of bindings. Frames
//! point at their enclosing frame, so a chain always ends at a single global
//! frame. Handles are reference counted: a block's frame stays alive for as
//! long as a nested frame or a closure still refers to it.
//!
//! A function stored in the frame it closes over makes an `Rc` cycle, and
//! that frame is only reclaimed once [`Environment::clear`] breaks the cycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;
use thiserror::Error;

use crate::value::RuntimeValue;

/// A name was read or assigned without being bound in any frame of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Undefined variable '{name}'.{}", line_suffix(.line))]
pub struct UndefinedVariable {
    pub name: String,
    pub line: Option<u32>,
}

impl UndefinedVariable {
    pub fn new(name: &str) -> Self {
        UndefinedVariable {
            name: name.to_owned(),
            line: None,
        }
    }

    pub fn at(self, line: u32) -> Self {
        UndefinedVariable {
            line: Some(line),
            ..self
        }
    }
}

fn line_suffix(line: &Option<u32>) -> String {
    match line {
        Some(line) => format!(" [line {}]", line),
        None => String::new(),
    }
}

#[derive(Default)]
struct Frame {
    enclosing: Option<Environment>,
    values: HashMap<String, RuntimeValue>,
}

#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enclose(&self) -> Environment {
        let env = Environment(Rc::new(RefCell::new(Frame {
            enclosing: Some(self.clone()),
            values: HashMap::new(),
        })));
        trace!("entered frame at depth {}", env.depth());
        env
    }

    pub fn enclosing(&self) -> Option<Environment> {
        self.0.borrow().enclosing.clone()
    }

    pub fn is_global(&self) -> bool {
        self.0.borrow().enclosing.is_none()
    }

    pub fn depth(&self) -> usize {
        match &self.0.borrow().enclosing {
            Some(enclosing) => enclosing.depth() + 1,
            None => 0,
        }
    }

    /// Binds `name` in this frame only, replacing any binding it already holds.
    pub fn define(&self, name: impl Into<String>, value: RuntimeValue) {
        self.0.borrow_mut().values.insert(name.into(), value);
    }

    /// The first frame that *contains* `name` wins, even if it holds `nil`.
    pub fn lookup(&self, name: &str) -> Result<RuntimeValue, UndefinedVariable> {
        let frame = self.0.borrow();
        if let Some(value) = frame.values.get(name) {
            return Ok(value.clone());
        }

        match &frame.enclosing {
            Some(enclosing) => enclosing.lookup(name),
            None => Err(UndefinedVariable::new(name)),
        }
    }

    pub fn assign(&self, name: &str, value: RuntimeValue) -> Result<(), UndefinedVariable> {
        let mut frame = self.0.borrow_mut();
        if let Some(slot) = frame.values.get_mut(name) {
            *slot = value;
            return Ok(());
        }

        match &frame.enclosing {
            Some(enclosing) => enclosing.assign(name, value),
            None => Err(UndefinedVariable::new(name)),
        }
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.0.borrow().values.contains_key(name)
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.borrow().values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops every binding in this frame.
    pub fn clear(&self) {
        let values = std::mem::take(&mut self.0.borrow_mut().values);
        drop(values);
    }

    pub fn same_frame(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.same_frame(other)
    }
}

// Closures stored in a frame point back at that frame, so printing values
// recursively would never end. Only names and depth are shown.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("depth", &self.depth())
            .field("names", &self.local_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(x: f64) -> RuntimeValue {
        RuntimeValue::Number(x)
    }

    #[test]
    fn define_then_lookup() {
        let env = Environment::new();
        env.define("x", num(1.0));
        assert_eq!(env.lookup("x"), Ok(num(1.0)));
    }

    #[test]
    fn lookup_reaches_every_ancestor() {
        let global = Environment::new();
        global.define("x", RuntimeValue::Nil);
        let inner = global.enclose().enclose().enclose();
        assert_eq!(inner.depth(), 3);
        assert_eq!(inner.lookup("x"), Ok(RuntimeValue::Nil));
    }

    #[test]
    fn inner_definition_shadows_outer() {
        let parent = Environment::new();
        parent.define("x", num(1.0));
        let child = parent.enclose();
        child.define("x", num(2.0));

        assert_eq!(child.lookup("x"), Ok(num(2.0)));
        assert_eq!(parent.lookup("x"), Ok(num(1.0)));
    }

    #[test]
    fn assign_writes_through_to_owning_frame() {
        let parent = Environment::new();
        parent.define("x", num(1.0));
        let child = parent.enclose();

        child.assign("x", num(5.0)).unwrap();

        assert!(!child.contains_local("x"));
        assert_eq!(parent.lookup("x"), Ok(num(5.0)));
    }

    #[test]
    fn assign_prefers_innermost_binding() {
        let parent = Environment::new();
        parent.define("x", num(1.0));
        let child = parent.enclose();
        child.define("x", num(2.0));

        child.assign("x", num(3.0)).unwrap();

        assert_eq!(child.lookup("x"), Ok(num(3.0)));
        assert_eq!(parent.lookup("x"), Ok(num(1.0)));
    }

    #[test]
    fn undefined_names_are_reported() {
        let global = Environment::new();
        let child = global.enclose();

        assert_eq!(child.lookup("nope"), Err(UndefinedVariable::new("nope")));
        assert_eq!(
            child.assign("nope", num(1.0)),
            Err(UndefinedVariable::new("nope"))
        );
        assert!(!global.contains_local("nope"));
        assert!(!child.contains_local("nope"));
    }

    #[test]
    fn root_frame_stops_the_walk() {
        let global = Environment::new();
        assert!(global.is_global());
        assert!(global.enclosing().is_none());
        assert!(global.lookup("x").is_err());
        assert!(global.assign("x", num(1.0)).is_err());
    }

    #[test]
    fn nil_binding_is_not_absence() {
        let parent = Environment::new();
        parent.define("y", num(1.0));
        let child = parent.enclose();
        child.define("y", RuntimeValue::Nil);

        assert_eq!(child.lookup("y"), Ok(RuntimeValue::Nil));

        child.assign("y", num(2.0)).unwrap();
        assert_eq!(child.lookup("y"), Ok(num(2.0)));
        assert_eq!(parent.lookup("y"), Ok(num(1.0)));
    }

    #[test]
    fn redefinition_overwrites() {
        let env = Environment::new();
        env.define("x", num(1.0));
        env.define("x", num(2.0));

        assert_eq!(env.local_names(), vec!["x".to_owned()]);
        assert_eq!(env.lookup("x"), Ok(num(2.0)));
    }

    #[test]
    fn frame_outlives_the_handle_that_created_it() {
        let global = Environment::new();
        let block = global.enclose();
        block.define("captured", num(7.0));
        let closure_env = block.enclose();
        drop(block);

        assert_eq!(closure_env.lookup("captured"), Ok(num(7.0)));
        closure_env.assign("captured", num(8.0)).unwrap();
        let block = closure_env.enclosing().unwrap();
        assert_eq!(block.lookup("captured"), Ok(num(8.0)));
    }

    #[test]
    fn siblings_share_their_parent() {
        let parent = Environment::new();
        parent.define("n", num(0.0));
        let left = parent.enclose();
        let right = parent.enclose();

        left.assign("n", num(1.0)).unwrap();

        assert_eq!(right.lookup("n"), Ok(num(1.0)));
        assert!(left.enclosing().unwrap().same_frame(&right.enclosing().unwrap()));
        assert_ne!(left, right);
    }

    #[test]
    fn clear_empties_only_this_frame() {
        let parent = Environment::new();
        parent.define("x", num(1.0));
        let child = parent.enclose();
        child.define("y", num(2.0));

        child.clear();

        assert!(child.local_names().is_empty());
        assert_eq!(child.lookup("x"), Ok(num(1.0)));
        assert!(child.lookup("y").is_err());
    }

    #[test]
    fn error_message_includes_line_when_known() {
        let err = UndefinedVariable::new("x");
        assert_eq!(err.to_string(), "Undefined variable 'x'.");
        assert_eq!(err.at(4).to_string(), "Undefined variable 'x'. [line 4]");
    }
}
