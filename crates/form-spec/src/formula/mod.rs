//! Sandboxed arithmetic/string formulas for derived fields.
//!
//! The language is deliberately tiny: number and string literals, variable
//! references, `+ - * /`, unary sign, and parentheses. Variables resolve only
//! through the [`Scope`] handed to [`Formula::evaluate`], so a formula cannot
//! observe anything but the values it was given.

mod eval;
mod lexer;
mod parser;

use serde::Serialize;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::spec::field::FieldId;

pub use eval::{Scope, Value};
pub use lexer::Token;
pub use parser::{BinaryOp, Expr, UnaryOp};

/// Why a formula could not be turned into an expression tree.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("formula is {len} characters long, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("formula has more than {max} nodes")]
    TooComplex { max: usize },
    #[error("formula nests deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("unexpected character '{found}' at {position}")]
    UnexpectedChar { found: char, position: usize },
    #[error("invalid number '{text}' at {position}")]
    InvalidNumber { text: String, position: usize },
    #[error("unterminated string starting at {position}")]
    UnterminatedString { position: usize },
    #[error("unterminated field reference starting at {position}")]
    UnterminatedReference { position: usize },
    #[error("empty field reference at {position}")]
    EmptyReference { position: usize },
    #[error("unexpected '{found}' at {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("formula ends unexpectedly")]
    UnexpectedEnd,
}

/// Why a derived value could not be computed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EvalError {
    #[error("invalid formula: {cause}")]
    Syntax { cause: FormulaError },
    #[error("'{name}' is not a parent of this field")]
    UnknownVariable { name: String },
    #[error("'{name}' has no value")]
    MissingValue { name: String },
    #[error("operator '{operator}' needs a number, got {found}")]
    NotANumber { operator: char, found: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("parent '{parent}' could not be computed")]
    UpstreamUnresolved { parent: FieldId },
}

impl From<FormulaError> for EvalError {
    fn from(error: FormulaError) -> Self {
        EvalError::Syntax { cause: error }
    }
}

/// A parsed formula, ready to evaluate against any number of scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
}

impl Formula {
    /// Parses `source`, enforcing the length, depth and node limits in
    /// `config`.
    pub fn parse(source: &str, config: &EngineConfig) -> Result<Self, FormulaError> {
        let len = source.chars().count();
        if len > config.max_formula_len {
            return Err(FormulaError::TooLong {
                len,
                max: config.max_formula_len,
            });
        }
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(tokens, config)?;
        Ok(Self { expr })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Names referenced by the formula, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.expr.collect_variables(&mut names);
        names
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, EvalError> {
        eval::eval(&self.expr, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Formula, FormulaError> {
        Formula::parse(source, &EngineConfig::default())
    }

    fn eval_with(source: &str, bindings: &[(&str, Option<Value>)]) -> Result<Value, EvalError> {
        let mut scope = Scope::new();
        for (name, value) in bindings {
            scope.bind(*name, value.clone());
        }
        parse(source)?.evaluate(&scope)
    }

    #[test]
    fn respects_precedence_and_parentheses() {
        assert_eq!(eval_with("1 + 2 * 3", &[]), Ok(Value::Number(7.0)));
        assert_eq!(eval_with("(1 + 2) * 3", &[]), Ok(Value::Number(9.0)));
        assert_eq!(eval_with("10 - 4 - 3", &[]), Ok(Value::Number(3.0)));
        assert_eq!(eval_with("-2 * -3", &[]), Ok(Value::Number(6.0)));
    }

    #[test]
    fn substitutes_variables() {
        let result = eval_with(
            "price * qty",
            &[
                ("price", Some(Value::Number(2.5))),
                ("qty", Some(Value::Number(4.0))),
            ],
        );
        assert_eq!(result, Ok(Value::Number(10.0)));
    }

    #[test]
    fn braced_references_allow_any_id() {
        let result = eval_with(
            "{first-name} + ' ' + {last-name}",
            &[
                ("first-name", Some(Value::Text("Ada".into()))),
                ("last-name", Some(Value::Text("Lovelace".into()))),
            ],
        );
        assert_eq!(result, Ok(Value::Text("Ada Lovelace".into())));
    }

    #[test]
    fn concatenation_renders_integral_numbers_plainly() {
        assert_eq!(
            eval_with("'age: ' + 31", &[]),
            Ok(Value::Text("age: 31".into()))
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval_with("1 / 0", &[]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn arithmetic_on_text_is_rejected() {
        let result = eval_with("name * 2", &[("name", Some(Value::Text("Al".into())))]);
        assert_eq!(
            result,
            Err(EvalError::NotANumber {
                operator: '*',
                found: "string"
            })
        );
    }

    #[test]
    fn unknown_and_missing_variables() {
        assert_eq!(
            eval_with("other + 1", &[("age", Some(Value::Number(1.0)))]),
            Err(EvalError::UnknownVariable {
                name: "other".into()
            })
        );
        assert_eq!(
            eval_with("age + 1", &[("age", None)]),
            Err(EvalError::MissingValue { name: "age".into() })
        );
    }

    #[test]
    fn rejects_host_language_constructs() {
        assert!(matches!(
            parse("alert(1)"),
            Err(FormulaError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse("a = 1"),
            Err(FormulaError::UnexpectedChar { found: '=', .. })
        ));
        assert!(matches!(
            parse("a; b"),
            Err(FormulaError::UnexpectedChar { found: ';', .. })
        ));
    }

    #[test]
    fn enforces_limits() {
        let config = EngineConfig {
            max_formula_len: 8,
            ..EngineConfig::default()
        };
        assert_eq!(
            Formula::parse("1 + 2 + 3 + 4", &config),
            Err(FormulaError::TooLong { len: 13, max: 8 })
        );

        let config = EngineConfig {
            max_formula_nodes: 3,
            ..EngineConfig::default()
        };
        assert_eq!(
            Formula::parse("1 + 2 + 3", &config),
            Err(FormulaError::TooComplex { max: 3 })
        );

        let config = EngineConfig {
            max_formula_depth: 4,
            ..EngineConfig::default()
        };
        assert_eq!(
            Formula::parse("((((((1))))))", &config),
            Err(FormulaError::TooDeep { max: 4 })
        );
    }

    #[test]
    fn lists_variables_once_in_order() {
        let formula = parse("b + a * b + {c d}").expect("parse");
        assert_eq!(formula.variables(), vec!["b", "a", "c d"]);
    }
}
