//! Save-time checks for a whole schema.
//!
//! Validation tolerates a half-edited schema; these checks are what an editor
//! runs before it accepts a schema as finished.

use regex::Regex;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::formula::{Formula, FormulaError};
use crate::graph::{GraphError, build_graph};
use crate::spec::field::FieldId;
use crate::spec::form::FormSchema;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaIssue {
    #[error("form name cannot be empty")]
    BlankFormName,
    #[error("form needs at least one field")]
    NoFields,
    #[error("field '{field}' needs a label")]
    BlankLabel { field: FieldId },
    #[error("field '{field}' needs at least one option")]
    MissingOptions { field: FieldId },
    #[error("field '{field}' lists option '{option}' more than once")]
    DuplicateOption { field: FieldId, option: String },
    #[error("default '{value}' of field '{field}' is not one of its options")]
    DefaultNotAnOption { field: FieldId, value: String },
    #[error("field '{field}' has min length {min} above max length {max}")]
    InvertedBounds { field: FieldId, min: usize, max: usize },
    #[error("default of field '{field}' must be {expected}")]
    InvalidDefault {
        field: FieldId,
        expected: &'static str,
    },
    #[error("pattern of field '{field}' does not compile: {error}")]
    InvalidPattern { field: FieldId, error: String },
    #[error("derived field '{field}' needs at least one parent field")]
    MissingParents { field: FieldId },
    #[error("derived field '{field}' lists itself as a parent")]
    SelfParent { field: FieldId },
    #[error("derived field '{field}' needs a formula")]
    BlankFormula { field: FieldId },
    #[error("formula of field '{field}' is invalid: {cause}")]
    Formula { field: FieldId, cause: FormulaError },
    #[error("formula of field '{field}' reads '{name}', which is not one of its parents")]
    UndeclaredReference { field: FieldId, name: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub fn check_schema(schema: &FormSchema) -> Vec<SchemaIssue> {
    check_schema_with(schema, &EngineConfig::default())
}

/// Every problem that keeps `schema` from being saved, in field order.
pub fn check_schema_with(schema: &FormSchema, config: &EngineConfig) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();

    if schema.name.trim().is_empty() {
        issues.push(SchemaIssue::BlankFormName);
    }
    if schema.fields.is_empty() {
        issues.push(SchemaIssue::NoFields);
    }

    for field in &schema.fields {
        if field.label.trim().is_empty() {
            issues.push(SchemaIssue::BlankLabel {
                field: field.id.clone(),
            });
        }
        issues.extend(field.shape_issues());

        if let Some(pattern) = field
            .kind
            .text_rules()
            .and_then(|rules| rules.pattern.as_ref())
            && let Err(error) = Regex::new(pattern)
        {
            issues.push(SchemaIssue::InvalidPattern {
                field: field.id.clone(),
                error: error.to_string(),
            });
        }

        let Some(derivation) = field.kind.derivation() else {
            continue;
        };
        if derivation.formula.trim().is_empty() {
            continue;
        }
        match Formula::parse(&derivation.formula, config) {
            Ok(formula) => {
                for name in formula.variables() {
                    if !derivation.parents().iter().any(|parent| parent.as_str() == name) {
                        issues.push(SchemaIssue::UndeclaredReference {
                            field: field.id.clone(),
                            name: name.to_string(),
                        });
                    }
                }
            }
            Err(cause) => issues.push(SchemaIssue::Formula {
                field: field.id.clone(),
                cause,
            }),
        }
    }

    if let Err(error) = build_graph(schema) {
        let already_reported = match &error {
            GraphError::Cycle { cycle } if cycle.len() == 1 => issues.iter().any(|issue| {
                matches!(issue, SchemaIssue::SelfParent { field } if *field == cycle[0])
            }),
            _ => false,
        };
        if !already_reported {
            issues.push(error.into());
        }
    }

    issues
}
