use std::sync::LazyLock;

use regex::Regex;

use crate::report::{Violation, ViolationKind};
use crate::spec::field::{FieldKind, FieldSchema, TextRules};
use crate::values::{FieldValue, parse_date};

// local@domain.tld over printable ASCII, no whitespace, one '@'.
static EMAIL: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[!-?A-~]+@[!-?A-~]+\.[!-?A-~]+$"));

/// Checks one value against one field's constraints.
///
/// Every applicable rule runs and all violations are returned in rule order:
/// configuration, required, type, length, pattern, email, membership, date.
/// Content rules only look at non-empty values, so an empty value reports at
/// most `Required`. Derived fields only get the required check here; the
/// form validator reports unresolved derivations separately.
pub fn validate_field(field: &FieldSchema, value: Option<&FieldValue>) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut push = |kind| violations.push(Violation::new(field, kind));

    if field.label.trim().is_empty() {
        push(ViolationKind::BlankLabel);
    }
    for issue in field.shape_issues() {
        push(ViolationKind::Misconfigured {
            detail: issue.to_string(),
        });
    }

    let present = value.filter(|value| !is_empty(&field.kind, value));
    let Some(value) = present else {
        if field.required {
            push(ViolationKind::Required);
        }
        if let Some(rules) = field.kind.text_rules()
            && let Some(kind) = pattern_config_error(rules)
        {
            push(kind);
        }
        return violations;
    };

    if let Some(expected) = type_mismatch(&field.kind, value) {
        push(ViolationKind::TypeMismatch {
            expected,
            found: value.shape(),
        });
        return violations;
    }

    match &field.kind {
        FieldKind::Text(rules) | FieldKind::Textarea(rules) => {
            let text = value.as_text().unwrap_or_default();
            for kind in text_violations(rules, text) {
                push(kind);
            }
        }
        FieldKind::Email { .. } => {
            let text = value.as_text().unwrap_or_default();
            if !is_email(text) {
                push(ViolationKind::InvalidEmail);
            }
        }
        FieldKind::Radio(rules) | FieldKind::Select(rules) => {
            let text = value.as_text().unwrap_or_default();
            if !rules.contains(text) {
                push(ViolationKind::NotAnOption);
            }
        }
        FieldKind::Date { .. } => {
            let text = value.as_text().unwrap_or_default();
            if parse_date(text).is_none() {
                push(ViolationKind::InvalidDate);
            }
        }
        FieldKind::Number { .. } | FieldKind::Checkbox { .. } | FieldKind::Derived(_) => {}
    }

    violations
}

fn is_empty(kind: &FieldKind, value: &FieldValue) -> bool {
    match (kind, value) {
        (FieldKind::Checkbox { .. }, FieldValue::Bool(checked)) => !checked,
        (FieldKind::Number { .. }, FieldValue::Text(text)) => text.trim().is_empty(),
        _ => value.is_blank(),
    }
}

/// Name of the expected shape when `value` cannot be read as the kind's type.
fn type_mismatch(kind: &FieldKind, value: &FieldValue) -> Option<&'static str> {
    let fits = match kind {
        FieldKind::Text(_)
        | FieldKind::Textarea(_)
        | FieldKind::Email { .. }
        | FieldKind::Radio(_)
        | FieldKind::Select(_)
        | FieldKind::Date { .. } => matches!(value, FieldValue::Text(_)),
        FieldKind::Number { .. } => value.as_number().is_some(),
        FieldKind::Checkbox { .. } => matches!(value, FieldValue::Bool(_)),
        FieldKind::Derived(_) => true,
    };
    if fits {
        return None;
    }
    Some(match kind {
        FieldKind::Number { .. } => "number",
        FieldKind::Checkbox { .. } => "boolean",
        _ => "string",
    })
}

fn text_violations(rules: &TextRules, text: &str) -> Vec<ViolationKind> {
    let mut found = Vec::new();
    let actual = text.chars().count();

    if let Some(min) = rules.min_length
        && actual < min
    {
        found.push(ViolationKind::TooShort { min, actual });
    }
    if let Some(max) = rules.max_length
        && actual > max
    {
        found.push(ViolationKind::TooLong { max, actual });
    }

    if let Some(pattern) = &rules.pattern {
        match Regex::new(pattern) {
            Ok(regex) => {
                if !regex.is_match(text) {
                    found.push(ViolationKind::PatternMismatch);
                }
            }
            Err(error) => found.push(ViolationKind::InvalidPattern {
                error: error.to_string(),
            }),
        }
    }

    found
}

/// A broken pattern is a schema problem, reported even when the value is
/// empty and the pattern never gets applied.
fn pattern_config_error(rules: &TextRules) -> Option<ViolationKind> {
    let pattern = rules.pattern.as_ref()?;
    Regex::new(pattern)
        .err()
        .map(|error| ViolationKind::InvalidPattern {
            error: error.to_string(),
        })
}

pub(crate) fn is_email(text: &str) -> bool {
    match EMAIL.as_ref() {
        Ok(regex) => regex.is_match(text),
        Err(_) => false,
    }
}
