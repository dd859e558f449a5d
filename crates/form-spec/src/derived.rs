use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::formula::{EvalError, Formula, Scope, Value};
use crate::graph::FormGraph;
use crate::spec::field::{Derivation, FieldId, FieldKind, FieldSchema};
use crate::spec::form::FormSchema;
use crate::values::{FieldValue, ValueSet};

/// Derived-field outcomes: computed values, and an error for every derived
/// field that could not be computed.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Derived {
    pub values: ValueSet,
    pub unresolved: BTreeMap<FieldId, EvalError>,
}

impl Derived {
    pub fn error(&self, id: &str) -> Option<&EvalError> {
        self.unresolved.get(id)
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.values.contains(id)
    }
}

/// Computes every derived field with the default engine limits.
pub fn evaluate(graph: &FormGraph, schema: &FormSchema, base: &ValueSet) -> Derived {
    evaluate_with(graph, schema, base, &EngineConfig::default())
}

/// Computes derived fields in the graph's evaluation order.
///
/// Parents are read from `base` for input fields and from earlier results for
/// derived fields; values `base` holds for derived ids are ignored. A failure
/// only affects the failing field and the derived fields downstream of it.
/// `graph` must have been built from `schema`.
pub fn evaluate_with(
    graph: &FormGraph,
    schema: &FormSchema,
    base: &ValueSet,
    config: &EngineConfig,
) -> Derived {
    let mut derived = Derived::default();

    for &index in graph.evaluation_order() {
        let Some(field) = schema.fields.get(index) else {
            continue;
        };
        let Some(derivation) = field.kind.derivation() else {
            continue;
        };

        let parents = graph.parents_of(index);
        match derive_one(derivation, parents, graph, schema, base, &derived, config) {
            Ok(value) => derived.values.insert(field.id.clone(), value),
            Err(error) => {
                tracing::debug!(field = %field.id, %error, "derived value left unresolved");
                derived.unresolved.insert(field.id.clone(), error);
            }
        }
    }

    derived
}

fn derive_one(
    derivation: &Derivation,
    parents: &[usize],
    graph: &FormGraph,
    schema: &FormSchema,
    base: &ValueSet,
    derived: &Derived,
    config: &EngineConfig,
) -> Result<FieldValue, EvalError> {
    if let Some(parent) = parents
        .iter()
        .filter_map(|&parent| graph.id(parent))
        .find(|parent| derived.unresolved.contains_key(parent.as_str()))
    {
        return Err(EvalError::UpstreamUnresolved {
            parent: parent.clone(),
        });
    }

    let formula = Formula::parse(&derivation.formula, config)?;

    let mut scope = Scope::new();
    for &parent in parents {
        let (Some(id), Some(field)) = (graph.id(parent), schema.fields.get(parent)) else {
            continue;
        };
        let value = if field.is_derived() {
            derived.values.get(id.as_str())
        } else {
            base.get(id.as_str())
        };
        scope.bind(id.as_str(), value.and_then(|value| bind(field, value)));
    }

    Ok(match formula.evaluate(&scope)? {
        Value::Number(number) => FieldValue::Number(number),
        Value::Text(text) => FieldValue::Text(text),
        Value::Bool(flag) => FieldValue::Bool(flag),
    })
}

/// Formula value for a parent's field value; `None` when the parent is empty.
fn bind(field: &FieldSchema, value: &FieldValue) -> Option<Value> {
    if value.is_blank() {
        return None;
    }
    let numeric = matches!(field.kind, FieldKind::Number { .. });
    Some(match value {
        FieldValue::Number(number) => Value::Number(*number),
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Text(text) if numeric => match value.as_number() {
            Some(number) => Value::Number(number),
            None => Value::Text(text.clone()),
        },
        FieldValue::Text(text) => Value::Text(text.clone()),
        FieldValue::List(items) => Value::Text(items.join(", ")),
    })
}
