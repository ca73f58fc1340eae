use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

/// Chain of name bindings, innermost first.
///
/// Only a function call creates a new link; `if`/`while` bodies share the
/// enclosing scope. Links are reference-counted so a `Function` value can
/// keep its defining scope alive after the defining frame returns.
#[derive(Debug, Clone, Default)]
pub struct Environment(Rc<RefCell<Scope>>);

#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Walks the chain from innermost to outermost.
    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        if let Some(value) = scope.bindings.get(name) {
            return Some(value.clone());
        }
        scope.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Creates a binding in this scope, shadowing any outer one.
    pub fn define(&self, name: String, value: Value) {
        self.0.borrow_mut().bindings.insert(name, value);
    }

    /// Mutates the innermost existing binding of `name`, or creates a new
    /// binding in this scope if no environment on the chain binds it.
    pub fn assign(&self, name: &str, value: Value) {
        if !self.try_set(name, &value) {
            self.define(name.to_string(), value);
        }
    }

    fn try_set(&self, name: &str, value: &Value) -> bool {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.bindings.get_mut(name) {
            *slot = value.clone();
            return true;
        }
        match &scope.parent {
            Some(parent) => parent.try_set(name, value),
            None => false,
        }
    }
}
