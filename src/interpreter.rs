use std::io::Write;
use std::rc::Rc;

use crate::ast::{BinaryOperator, Expression, Statement, UnaryOperator};
use crate::builtins::Builtins;
use crate::error::Error;
use crate::lexer::Lexer;
use crate::parser::Parser;

mod env;
mod error;
mod value;

pub use env::Environment;
pub use error::RuntimeError;
pub use value::{FunctionValue, Value};

/// Maximum user-function call depth before a run is aborted.
///
/// Each interpreted call costs several host stack frames (`eval_call`,
/// `exec_block`, `exec_statement`, `eval`, ...), which are large in debug
/// builds; the limit must leave a 2 MiB test-thread stack intact.
pub const MAX_CALL_DEPTH: usize = 64;

/// Control-flow marker for statement execution, bubbled from nested blocks
/// to the enclosing call frame.
pub enum ExecResult {
    Continue,
    Return(Value),
}

/// Tree-walking evaluator.
///
/// Holds the global environment, the primitive registry and the `print`
/// sink. Globals persist across `run` calls, so one interpreter can serve
/// an interactive session statement by statement.
pub struct Interpreter<W: Write> {
    globals: Environment,
    builtins: Builtins,
    out: W,
    call_depth: usize,
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Self {
            globals: Environment::new(),
            builtins: Builtins::new(),
            out,
            call_depth: 0,
        }
    }

    /// Runs a program pulled from a character source.
    ///
    /// Each top-level statement is executed as soon as the parser finishes
    /// it, before any further characters are consumed, so partial input
    /// (interactive mode) behaves the same as a complete file.
    pub fn run<I: Iterator<Item = char>>(&mut self, source: I) -> Result<(), Error> {
        let parser = Parser::new(Lexer::new(source));
        let globals = self.globals.clone();
        for statement in parser {
            let statement = statement?;
            match self.exec_statement(&statement, &globals)? {
                ExecResult::Continue => {}
                ExecResult::Return(_) => {
                    return Err(RuntimeError::ReturnOutsideFunction.into());
                }
            }
        }
        Ok(())
    }

    /// Looks up a top-level binding, mainly useful to callers driving an
    /// interactive session.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    fn exec_block(
        &mut self,
        body: &[Statement],
        env: &Environment,
    ) -> Result<ExecResult, RuntimeError> {
        for statement in body {
            match self.exec_statement(statement, env)? {
                ExecResult::Continue => {}
                ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_statement(
        &mut self,
        statement: &Statement,
        env: &Environment,
    ) -> Result<ExecResult, RuntimeError> {
        match statement {
            Statement::Assign { name, value } => {
                // The target is bound only after the whole expression
                // evaluated; a failed run leaves no partial assignment.
                let value = self.eval(value, env)?;
                env.assign(name, value);
                Ok(ExecResult::Continue)
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let branch = if self.eval_condition(condition, env)? {
                    then_body
                } else {
                    else_body
                };
                self.exec_block(branch, env)
            }
            Statement::While { condition, body } => {
                while self.eval_condition(condition, env)? {
                    if let ExecResult::Return(value) = self.exec_block(body, env)? {
                        return Ok(ExecResult::Return(value));
                    }
                }
                Ok(ExecResult::Continue)
            }
            Statement::FunctionDef { name, params, body } => {
                // Bound before the body ever runs, so the body may refer to
                // the function itself.
                let function = Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    env: env.clone(),
                }));
                env.assign(name, function);
                Ok(ExecResult::Continue)
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Nil,
                };
                Ok(ExecResult::Return(value))
            }
            Statement::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(ExecResult::Continue)
            }
        }
    }

    fn eval_condition(
        &mut self,
        condition: &Expression,
        env: &Environment,
    ) -> Result<bool, RuntimeError> {
        match self.eval(condition, env)? {
            Value::Bool(value) => Ok(value),
            other => Err(RuntimeError::NonBooleanCondition {
                got: other.type_name().to_string(),
            }),
        }
    }

    fn eval(&mut self, expr: &Expression, env: &Environment) -> Result<Value, RuntimeError> {
        match expr {
            Expression::Integer(value) => Ok(Value::Int(*value)),
            Expression::Boolean(value) => Ok(Value::Bool(*value)),
            Expression::String(value) => Ok(Value::Str(value.clone())),
            Expression::Identifier(name) => {
                env.get(name).ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: name.clone(),
                })
            }
            Expression::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element, env)?);
                }
                Ok(Value::array(values))
            }
            Expression::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                let elements = match &object {
                    Value::Array(elements) => elements,
                    other => {
                        return Err(RuntimeError::InvalidOperandType {
                            operator: "[]",
                            expected: "array",
                            got: other.type_name().to_string(),
                        });
                    }
                };
                let index = match index {
                    Value::Int(index) => index,
                    other => {
                        return Err(RuntimeError::InvalidOperandType {
                            operator: "[]",
                            expected: "int",
                            got: other.type_name().to_string(),
                        });
                    }
                };
                let elements = elements.borrow();
                let index = array_index(index, elements.len())?;
                Ok(elements[index].clone())
            }
            Expression::UnaryOp { op, operand } => {
                let value = self.eval(operand, env)?;
                match (op, value) {
                    (UnaryOperator::Negate, Value::Int(value)) => value
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(RuntimeError::IntegerOverflow { operator: "-" }),
                    (UnaryOperator::Negate, other) => Err(RuntimeError::InvalidOperandType {
                        operator: "-",
                        expected: "int",
                        got: other.type_name().to_string(),
                    }),
                    (UnaryOperator::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
                    (UnaryOperator::Not, other) => Err(RuntimeError::InvalidOperandType {
                        operator: "not",
                        expected: "bool",
                        got: other.type_name().to_string(),
                    }),
                }
            }
            Expression::BinaryOp { left, op, right } => match op {
                BinaryOperator::And | BinaryOperator::Or => {
                    self.eval_short_circuit(*op, left, right, env)
                }
                _ => {
                    let left = self.eval(left, env)?;
                    let right = self.eval(right, env)?;
                    apply_binary(*op, left, right)
                }
            },
            Expression::Call { name, args } => self.eval_call(name, args, env),
        }
    }

    /// `and`/`or` evaluate the right operand only when the left one does not
    /// already decide the result.
    fn eval_short_circuit(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        env: &Environment,
    ) -> Result<Value, RuntimeError> {
        let operator = if op == BinaryOperator::And { "and" } else { "or" };
        let left = match self.eval(left, env)? {
            Value::Bool(value) => value,
            other => {
                return Err(RuntimeError::InvalidOperandType {
                    operator,
                    expected: "bool",
                    got: other.type_name().to_string(),
                });
            }
        };
        let decided = match op {
            BinaryOperator::And => !left,
            _ => left,
        };
        if decided {
            return Ok(Value::Bool(left));
        }
        match self.eval(right, env)? {
            Value::Bool(value) => Ok(Value::Bool(value)),
            other => Err(RuntimeError::InvalidOperandType {
                operator,
                expected: "bool",
                got: other.type_name().to_string(),
            }),
        }
    }

    fn eval_call(
        &mut self,
        name: &str,
        args: &[Expression],
        env: &Environment,
    ) -> Result<Value, RuntimeError> {
        // The primitive registry wins over environment bindings.
        if let Some(native) = self.builtins.get(name) {
            let values = self.eval_args(args, env)?;
            return native(&mut self.out, &values);
        }

        let callee = env
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: name.to_string(),
            })?;
        let function = match callee {
            Value::Function(function) => function,
            other => {
                return Err(RuntimeError::NotCallable {
                    name: name.to_string(),
                    type_name: other.type_name().to_string(),
                });
            }
        };

        let values = self.eval_args(args, env)?;
        if values.len() != function.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_string(),
                expected: function.params.len(),
                found: values.len(),
            });
        }
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: MAX_CALL_DEPTH,
            });
        }

        // The frame is a child of the *defining* environment: closures see
        // the names that were in scope where the function was written.
        let frame = Environment::child(&function.env);
        for (param, value) in function.params.iter().zip(values) {
            frame.define(param.clone(), value);
        }

        self.call_depth += 1;
        let outcome = self.exec_block(&function.body, &frame);
        self.call_depth -= 1;

        match outcome? {
            ExecResult::Continue => Ok(Value::Nil),
            ExecResult::Return(value) => Ok(value),
        }
    }

    fn eval_args(
        &mut self,
        args: &[Expression],
        env: &Environment,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        Ok(values)
    }
}

pub(crate) fn array_index(index: i64, len: usize) -> Result<usize, RuntimeError> {
    if index < 0 {
        return Err(RuntimeError::NegativeIndex { index });
    }
    let index = index as usize;
    if index >= len {
        return Err(RuntimeError::IndexOutOfBounds { index, len });
    }
    Ok(index)
}

fn apply_binary(op: BinaryOperator, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOperator::Add => int_op("+", left, right, |a, b| {
            a.checked_add(b)
                .ok_or(RuntimeError::IntegerOverflow { operator: "+" })
        }),
        BinaryOperator::Sub => int_op("-", left, right, |a, b| {
            a.checked_sub(b)
                .ok_or(RuntimeError::IntegerOverflow { operator: "-" })
        }),
        BinaryOperator::Mul => int_op("*", left, right, |a, b| {
            a.checked_mul(b)
                .ok_or(RuntimeError::IntegerOverflow { operator: "*" })
        }),
        BinaryOperator::Div => int_op("/", left, right, floor_div),
        BinaryOperator::Mod => int_op("%", left, right, floor_mod),
        BinaryOperator::Equal => equality(left, right).map(Value::Bool),
        BinaryOperator::NotEqual => equality(left, right).map(|equal| Value::Bool(!equal)),
        BinaryOperator::Less => comparison("<", left, right, |a, b| a < b),
        BinaryOperator::Greater => comparison(">", left, right, |a, b| a > b),
        BinaryOperator::LessEqual => comparison("<=", left, right, |a, b| a <= b),
        BinaryOperator::GreaterEqual => comparison(">=", left, right, |a, b| a >= b),
        // Short-circuit operators never reach the eager path.
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled in eval"),
    }
}

fn int_op(
    operator: &'static str,
    left: Value,
    right: Value,
    apply: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => apply(a, b).map(Value::Int),
        (Value::Int(_), other) | (other, _) => Err(RuntimeError::InvalidOperandType {
            operator,
            expected: "int",
            got: other.type_name().to_string(),
        }),
    }
}

fn comparison(
    operator: &'static str,
    left: Value,
    right: Value,
    apply: impl Fn(i64, i64) -> bool,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(apply(a, b))),
        (Value::Int(_), other) | (other, _) => Err(RuntimeError::InvalidOperandType {
            operator,
            expected: "int",
            got: other.type_name().to_string(),
        }),
    }
}

/// `==`/`!=` compare within a kind; comparing across kinds is an error
/// rather than `false`.
fn equality(left: Value, right: Value) -> Result<bool, RuntimeError> {
    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        _ => Err(RuntimeError::IncomparableTypes {
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        }),
    }
}

/// Floor division, matching the rounding the language has always had.
fn floor_div(a: i64, b: i64) -> Result<i64, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let quotient = a
        .checked_div(b)
        .ok_or(RuntimeError::IntegerOverflow { operator: "/" })?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Floor modulo: the result takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Result<i64, RuntimeError> {
    if b == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let remainder = a
        .checked_rem(b)
        .ok_or(RuntimeError::IntegerOverflow { operator: "%" })?;
    if remainder != 0 && (remainder < 0) != (b < 0) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}
