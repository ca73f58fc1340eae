use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Statement;

use super::env::Environment;

/// Runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Function(Rc<FunctionValue>),
    Nil,
}

/// A user-defined function together with the environment it closed over.
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub env: Environment,
}

impl fmt::Debug for FunctionValue {
    // The captured environment may contain this very function; leave it out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

type ArrayPtr = *const RefCell<Vec<Value>>;

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        eq_values(self, other, &mut Vec::new())
    }
}

fn eq_values(left: &Value, right: &Value, seen: &mut Vec<(ArrayPtr, ArrayPtr)>) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            // A pair already under comparison on this path can only differ
            // through the comparison that is still in progress.
            let pair = (Rc::as_ptr(a), Rc::as_ptr(b));
            if seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let a = a.borrow();
            let b = b.borrow();
            let equal = a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| eq_values(x, y, seen));
            seen.pop();
            equal
        }
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Nil, Value::Nil) => true,
        _ => false,
    }
}

impl Value {
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
            Value::Nil => "nil",
        }
    }

    /// Textual form written by `print`: ints as decimal, bools as
    /// `true`/`false`, strings as their raw contents. An array reached again
    /// inside its own rendering shows as `[...]`.
    pub fn to_output(&self) -> String {
        self.render(&mut Vec::new())
    }

    fn render(&self, rendering: &mut Vec<ArrayPtr>) -> String {
        match self {
            Value::Int(value) => value.to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Str(value) => value.clone(),
            Value::Array(elements) => {
                let ptr = Rc::as_ptr(elements);
                if rendering.contains(&ptr) {
                    return "[...]".to_string();
                }
                rendering.push(ptr);
                let rendered = elements
                    .borrow()
                    .iter()
                    .map(|element| element.render(rendering))
                    .collect::<Vec<_>>()
                    .join(", ");
                rendering.pop();
                format!("[{rendered}]")
            }
            Value::Function(function) => format!("<function {}>", function.name),
            Value::Nil => "nil".to_string(),
        }
    }
}
