use crate::config::EngineConfig;
use crate::constraint::validate_field;
use crate::derived::evaluate_with;
use crate::graph::build_graph;
use crate::report::{FormReport, ValidationResult, Violation, ViolationKind};
use crate::spec::form::FormSchema;
use crate::values::ValueSet;

pub fn validate_form(schema: &FormSchema, values: &ValueSet) -> FormReport {
    validate_form_with(schema, values, &EngineConfig::default())
}

/// Validates `values` against `schema`, computing derived fields first.
///
/// Keys in `values` that the schema does not know are dropped, as are values
/// supplied for derived fields. A broken dependency graph fails the whole
/// form without any per-field checks.
pub fn validate_form_with(
    schema: &FormSchema,
    values: &ValueSet,
    config: &EngineConfig,
) -> FormReport {
    let base: ValueSet = values
        .restricted_to(schema)
        .iter()
        .filter(|(id, _)| {
            schema
                .field(id.as_str())
                .is_some_and(|field| !field.is_derived())
        })
        .map(|(id, value)| (id.clone(), value.clone()))
        .collect();

    let graph = match build_graph(schema) {
        Ok(graph) => graph,
        Err(error) => {
            tracing::debug!(form = %schema.id, %error, "form schema cannot be evaluated");
            return FormReport {
                overall_valid: false,
                form_error: Some(error),
                field_errors: ValidationResult::new(),
                resolved_values: base,
            };
        }
    };

    let derived = evaluate_with(&graph, schema, &base, config);
    let resolved = base.merged_with(&derived.values);

    let mut field_errors = ValidationResult::new();
    for field in &schema.fields {
        let mut violations = validate_field(field, resolved.get(field.id.as_str()));
        if let Some(error) = derived.unresolved.get(&field.id) {
            violations.retain(|violation| !matches!(violation.kind, ViolationKind::Required));
            violations.push(Violation::new(
                field,
                ViolationKind::Unresolved {
                    error: error.clone(),
                },
            ));
        }
        field_errors.record(&field.id, violations);
    }

    let overall_valid = field_errors.is_clean();
    tracing::trace!(
        form = %schema.id,
        valid = overall_valid,
        failing = field_errors.failing().count(),
        "validated form"
    );

    FormReport {
        overall_valid,
        form_error: None,
        field_errors,
        resolved_values: resolved,
    }
}
