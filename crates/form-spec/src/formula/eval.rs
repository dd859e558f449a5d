use std::collections::BTreeMap;
use std::fmt;

use super::EvalError;
use super::parser::{BinaryOp, Expr, UnaryOp};

/// Runtime value of a formula sub-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => write!(f, "{number}"),
            Value::Text(text) => f.write_str(text),
            Value::Bool(flag) => write!(f, "{flag}"),
        }
    }
}

/// The only names a formula may read. A bound name with `None` is a known
/// variable that currently has no value.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: BTreeMap<String, Option<Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.bindings.insert(name.into(), value);
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        match self.bindings.get(name) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(EvalError::MissingValue {
                name: name.to_string(),
            }),
            None => Err(EvalError::UnknownVariable {
                name: name.to_string(),
            }),
        }
    }
}

pub(super) fn eval(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(number) => finite(*number),
        Expr::Text(text) => Ok(Value::Text(text.clone())),
        Expr::Var(name) => scope.lookup(name),
        Expr::Unary { op, operand } => {
            let value = number_operand(op.symbol(), eval(operand, scope)?)?;
            finite(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => -value,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if op == BinaryOp::Add
        && (matches!(lhs, Value::Text(_)) || matches!(rhs, Value::Text(_)))
    {
        return Ok(Value::Text(format!("{lhs}{rhs}")));
    }

    let symbol = op.symbol();
    let lhs = number_operand(symbol, lhs)?;
    let rhs = number_operand(symbol, rhs)?;
    let result = match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => {
            if rhs == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            lhs / rhs
        }
    };
    finite(result)
}

fn finite(number: f64) -> Result<Value, EvalError> {
    if number.is_finite() {
        Ok(Value::Number(number))
    } else {
        Err(EvalError::NonFinite)
    }
}

fn number_operand(operator: char, value: Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(number) => Ok(number),
        other => Err(EvalError::NotANumber {
            operator,
            found: other.kind(),
        }),
    }
}
