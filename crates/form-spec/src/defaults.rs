use crate::spec::field::FieldKind;
use crate::spec::form::FormSchema;
use crate::values::{FieldValue, ValueSet};

/// Values a freshly rendered form starts from: each input field's default,
/// with unchecked checkboxes for checkboxes that have none. Derived fields
/// are left for the evaluator.
pub fn initial_values(schema: &FormSchema) -> ValueSet {
    let mut values = ValueSet::new();
    for field in &schema.fields {
        let initial = match &field.kind {
            FieldKind::Text(rules) | FieldKind::Textarea(rules) => {
                rules.default_value.clone().map(FieldValue::Text)
            }
            FieldKind::Radio(rules) | FieldKind::Select(rules) => {
                rules.default_value.clone().map(FieldValue::Text)
            }
            FieldKind::Email { default_value } | FieldKind::Date { default_value } => {
                default_value.clone().map(FieldValue::Text)
            }
            FieldKind::Number { default_value } => default_value.map(FieldValue::Number),
            FieldKind::Checkbox { default_value } => {
                Some(FieldValue::Bool(default_value.unwrap_or(false)))
            }
            FieldKind::Derived(_) => None,
        };
        if let Some(value) = initial {
            values.insert(field.id.clone(), value);
        }
    }
    values
}
