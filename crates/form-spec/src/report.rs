use std::collections::BTreeMap;

use serde::Serialize;

use crate::formula::EvalError;
use crate::graph::GraphError;
use crate::spec::field::{FieldId, FieldSchema};
use crate::values::ValueSet;

/// What rule a value broke.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ViolationKind {
    Required,
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    PatternMismatch,
    /// The field's own pattern does not compile.
    InvalidPattern { error: String },
    InvalidEmail,
    NotAnOption,
    InvalidDate,
    TypeMismatch { expected: &'static str, found: &'static str },
    BlankLabel,
    /// The field's settings contradict each other.
    Misconfigured { detail: String },
    /// A derived value could not be computed.
    Unresolved { error: EvalError },
}

impl ViolationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ViolationKind::Required => "required",
            ViolationKind::TooShort { .. } => "too_short",
            ViolationKind::TooLong { .. } => "too_long",
            ViolationKind::PatternMismatch => "pattern_mismatch",
            ViolationKind::InvalidPattern { .. } => "invalid_pattern",
            ViolationKind::InvalidEmail => "invalid_email",
            ViolationKind::NotAnOption => "not_an_option",
            ViolationKind::InvalidDate => "invalid_date",
            ViolationKind::TypeMismatch { .. } => "type_mismatch",
            ViolationKind::BlankLabel => "blank_label",
            ViolationKind::Misconfigured { .. } => "misconfigured",
            ViolationKind::Unresolved { .. } => "unresolved",
        }
    }
}

/// A single failed rule on a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub field_id: FieldId,
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(field: &FieldSchema, kind: ViolationKind) -> Self {
        let name = if field.label.trim().is_empty() {
            field.id.as_str()
        } else {
            field.label.as_str()
        };
        let message = match &kind {
            ViolationKind::Required => format!("{name} is required."),
            ViolationKind::TooShort { min, .. } => {
                format!("{name} must be at least {min} characters.")
            }
            ViolationKind::TooLong { max, .. } => format!("{name} cannot exceed {max} characters."),
            ViolationKind::PatternMismatch => {
                format!("{name} does not match the required pattern.")
            }
            ViolationKind::InvalidPattern { error } => {
                format!("{name} has an invalid validation pattern: {error}")
            }
            ViolationKind::InvalidEmail => format!("{name} is not a valid email address."),
            ViolationKind::NotAnOption => format!("{name} must be one of the listed options."),
            ViolationKind::InvalidDate => format!("{name} must be a date in YYYY-MM-DD form."),
            ViolationKind::TypeMismatch { expected, found } => {
                format!("{name} expects a {expected} value, got a {found}.")
            }
            ViolationKind::BlankLabel => format!("Field {} needs a label.", field.id),
            ViolationKind::Misconfigured { detail } => format!("{name} is misconfigured: {detail}"),
            ViolationKind::Unresolved { error } => format!("{name} could not be computed: {error}"),
        };
        Self {
            field_id: field.id.clone(),
            kind,
            message,
        }
    }
}

/// Violations per field, one entry for every field in the schema. An empty
/// list means the field is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationResult(BTreeMap<FieldId, Vec<Violation>>);

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: &FieldId, violations: Vec<Violation>) {
        self.0.entry(field.clone()).or_default().extend(violations);
    }

    pub fn violations(&self, field: &str) -> &[Violation] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_clean(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &[Violation])> {
        self.0.iter().map(|(id, list)| (id, list.as_slice()))
    }

    /// Fields that have at least one violation.
    pub fn failing(&self) -> impl Iterator<Item = (&FieldId, &[Violation])> {
        self.iter().filter(|(_, list)| !list.is_empty())
    }
}

/// Outcome of validating one submission against one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormReport {
    pub overall_valid: bool,
    /// Set when the schema itself is broken; field checks are skipped then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_error: Option<GraphError>,
    pub field_errors: ValidationResult,
    pub resolved_values: ValueSet,
}
