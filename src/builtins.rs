use std::collections::HashMap;
use std::io::Write;

use crate::interpreter::{RuntimeError, Value, array_index};

/// Signature shared by every primitive: an output sink and the
/// already-evaluated argument values.
pub type NativeFn = fn(&mut dyn Write, &[Value]) -> Result<Value, RuntimeError>;

/// Name-to-implementation table consulted before environment lookup when a
/// call is evaluated. Adding a primitive is one `register` line plus the
/// implementation function.
pub struct Builtins {
    table: HashMap<&'static str, NativeFn>,
}

impl Builtins {
    pub fn new() -> Self {
        let mut builtins = Self {
            table: HashMap::new(),
        };
        builtins.register("print", print);
        builtins.register("add", add);
        builtins.register("sub", sub);
        builtins.register("lt", lt);
        builtins.register("eq", eq);
        builtins.register("len", len);
        builtins.register("geti", geti);
        builtins.register("seti", seti);
        builtins.register("insert", insert);
        builtins
    }

    fn register(&mut self, name: &'static str, implementation: NativeFn) {
        self.table.insert(name, implementation);
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.table.get(name).copied()
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_arity(name: &'static str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}

fn expect_int(name: &'static str, value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(value) => Ok(*value),
        other => Err(RuntimeError::InvalidArgumentType {
            name,
            expected: "int",
            got: other.type_name().to_string(),
        }),
    }
}

fn expect_array<'a>(
    name: &'static str,
    value: &'a Value,
) -> Result<&'a std::rc::Rc<std::cell::RefCell<Vec<Value>>>, RuntimeError> {
    match value {
        Value::Array(elements) => Ok(elements),
        other => Err(RuntimeError::InvalidArgumentType {
            name,
            expected: "array",
            got: other.type_name().to_string(),
        }),
    }
}

fn print(out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("print", args, 1)?;
    // Flushed per call: interactive output must not sit in the sink's buffer
    // until process exit.
    write!(out, "{}", args[0].to_output())
        .and_then(|()| out.flush())
        .map_err(|error| RuntimeError::Io {
            message: error.to_string(),
        })?;
    Ok(Value::Nil)
}

fn add(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("add", args, 2)?;
    let lhs = expect_int("add", &args[0])?;
    let rhs = expect_int("add", &args[1])?;
    let sum = lhs
        .checked_add(rhs)
        .ok_or(RuntimeError::IntegerOverflow { operator: "add" })?;
    Ok(Value::Int(sum))
}

fn sub(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("sub", args, 2)?;
    let lhs = expect_int("sub", &args[0])?;
    let rhs = expect_int("sub", &args[1])?;
    let difference = lhs
        .checked_sub(rhs)
        .ok_or(RuntimeError::IntegerOverflow { operator: "sub" })?;
    Ok(Value::Int(difference))
}

fn lt(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("lt", args, 2)?;
    let lhs = expect_int("lt", &args[0])?;
    let rhs = expect_int("lt", &args[1])?;
    Ok(Value::Bool(lhs < rhs))
}

fn eq(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("eq", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a == b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a == b)),
        (left, right) => Err(RuntimeError::IncomparableTypes {
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }),
    }
}

fn len(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("len", args, 1)?;
    let elements = expect_array("len", &args[0])?;
    Ok(Value::Int(elements.borrow().len() as i64))
}

fn geti(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("geti", args, 2)?;
    let elements = expect_array("geti", &args[0])?;
    let index = expect_int("geti", &args[1])?;
    let elements = elements.borrow();
    let index = array_index(index, elements.len())?;
    Ok(elements[index].clone())
}

fn seti(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("seti", args, 3)?;
    let elements = expect_array("seti", &args[0])?;
    let index = expect_int("seti", &args[1])?;
    let mut elements = elements.borrow_mut();
    let index = array_index(index, elements.len())?;
    elements[index] = args[2].clone();
    Ok(Value::Nil)
}

fn insert(_out: &mut dyn Write, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arity("insert", args, 3)?;
    let elements = expect_array("insert", &args[0])?;
    let index = expect_int("insert", &args[1])?;
    let mut elements = elements.borrow_mut();
    // Inserting one past the last element appends.
    if index < 0 {
        return Err(RuntimeError::NegativeIndex { index });
    }
    let index = index as usize;
    if index > elements.len() {
        return Err(RuntimeError::IndexOutOfBounds {
            index,
            len: elements.len(),
        });
    }
    elements.insert(index, args[2].clone());
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let builtins = Builtins::new();
        let native = builtins.get(name).expect("builtin should be registered");
        let mut sink = Vec::new();
        native(&mut sink, args)
    }

    #[test]
    fn print_writes_raw_value_without_newline() {
        let builtins = Builtins::new();
        let native = builtins.get("print").expect("print should be registered");
        let mut sink = Vec::new();
        let result = native(&mut sink, &[Value::Str("hi".to_string())]);
        assert_eq!(result, Ok(Value::Nil));
        assert_eq!(sink, b"hi");
    }

    struct FlushCountingSink {
        data: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCountingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn print_flushes_the_sink() {
        let builtins = Builtins::new();
        let native = builtins.get("print").expect("print should be registered");
        let mut sink = FlushCountingSink {
            data: Vec::new(),
            flushes: 0,
        };
        native(&mut sink, &[Value::Int(7)]).expect("print failed");
        assert_eq!(sink.data, b"7");
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn arithmetic_builtins_operate_on_ints() {
        assert_eq!(call("add", &[Value::Int(4), Value::Int(3)]), Ok(Value::Int(7)));
        assert_eq!(call("sub", &[Value::Int(4), Value::Int(3)]), Ok(Value::Int(1)));
        assert_eq!(
            call("lt", &[Value::Int(1), Value::Int(2)]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call("add", &[Value::Int(1), Value::Bool(true)]),
            Err(RuntimeError::InvalidArgumentType {
                name: "add",
                expected: "int",
                got: "bool".to_string(),
            })
        );
    }

    #[test]
    fn eq_compares_matching_kinds_only() {
        assert_eq!(
            call("eq", &[Value::Bool(true), Value::Bool(true)]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call("eq", &[Value::Int(1), Value::Str("1".to_string())]),
            Err(RuntimeError::IncomparableTypes {
                left: "int".to_string(),
                right: "str".to_string(),
            })
        );
    }

    #[test]
    fn array_builtins_share_the_backing_storage() {
        let array = Value::array(vec![Value::Int(1), Value::Int(2)]);
        call("seti", &[array.clone(), Value::Int(0), Value::Int(9)]).expect("seti failed");
        assert_eq!(
            call("geti", &[array.clone(), Value::Int(0)]),
            Ok(Value::Int(9))
        );
        call("insert", &[array.clone(), Value::Int(2), Value::Int(3)]).expect("insert failed");
        assert_eq!(call("len", &[array]), Ok(Value::Int(3)));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert_eq!(
            call("print", &[]),
            Err(RuntimeError::ArityMismatch {
                name: "print".to_string(),
                expected: 1,
                found: 0,
            })
        );
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let array = Value::array(vec![Value::Int(1)]);
        assert_eq!(
            call("geti", &[array.clone(), Value::Int(5)]),
            Err(RuntimeError::IndexOutOfBounds { index: 5, len: 1 })
        );
        assert_eq!(
            call("geti", &[array, Value::Int(-1)]),
            Err(RuntimeError::NegativeIndex { index: -1 })
        );
    }
}
