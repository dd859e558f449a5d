#![allow(missing_docs)]

pub mod config;
pub mod constraint;
pub mod defaults;
pub mod derived;
pub mod formula;
pub mod graph;
pub mod lint;
pub mod report;
pub mod spec;
pub mod validate;
pub mod values;

pub use config::{ConfigError, EngineConfig};
pub use constraint::validate_field;
pub use defaults::initial_values;
pub use derived::{Derived, evaluate, evaluate_with};
pub use formula::{EvalError, Formula, FormulaError};
pub use graph::{FormGraph, GraphError, build_graph};
pub use lint::{SchemaIssue, check_schema, check_schema_with};
pub use report::{FormReport, ValidationResult, Violation, ViolationKind};
pub use spec::{ChoiceRules, Derivation, FieldId, FieldKind, FieldSchema, FormSchema, TextRules};
pub use validate::{validate_form, validate_form_with};
pub use values::{FieldValue, ValueSet};
