use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::spec::field::FieldId;
use crate::spec::form::FormSchema;

/// Why a schema's derivation references cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum GraphError {
    #[error("field '{field}' depends on unknown field '{parent}'")]
    UnknownParent { field: FieldId, parent: FieldId },
    #[error("derived fields depend on each other in a cycle: {}", render_cycle(.cycle))]
    Cycle { cycle: Vec<FieldId> },
    #[error("field id '{id}' is used by more than one field")]
    DuplicateId { id: FieldId },
}

fn render_cycle(cycle: &[FieldId]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(FieldId::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Dependency graph over a schema's fields. Node `i` is `schema.fields[i]`;
/// edges run from a parent to the derived field that reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct FormGraph {
    ids: Vec<FieldId>,
    edges: Vec<(usize, usize)>,
    parents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl FormGraph {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: usize) -> Option<&FieldId> {
        self.ids.get(index)
    }

    /// `(parent, child)` index pairs.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Indices of the fields `index` reads, in declaration order without
    /// duplicates. Empty for input fields.
    pub fn parents_of(&self, index: usize) -> &[usize] {
        self.parents.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Derived field indices, each after every derived field it reads, ties
    /// broken by schema position.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    pub fn evaluation_order_ids(&self) -> impl Iterator<Item = &FieldId> {
        self.order.iter().map(|index| &self.ids[*index])
    }
}

/// Builds the dependency graph for `schema`, rejecting duplicate ids,
/// references to unknown fields, and derivation cycles.
pub fn build_graph(schema: &FormSchema) -> Result<FormGraph, GraphError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(schema.fields.len());
    for (position, field) in schema.fields.iter().enumerate() {
        if index.insert(field.id.as_str(), position).is_some() {
            return Err(GraphError::DuplicateId {
                id: field.id.clone(),
            });
        }
    }

    let mut parents = vec![Vec::new(); schema.fields.len()];
    let mut edges = Vec::new();
    let mut derived = Vec::new();
    for (child, field) in schema.fields.iter().enumerate() {
        let Some(derivation) = field.kind.derivation() else {
            continue;
        };
        derived.push(child);
        for parent_id in derivation.parents() {
            let parent = *index
                .get(parent_id.as_str())
                .ok_or_else(|| GraphError::UnknownParent {
                    field: field.id.clone(),
                    parent: parent_id.clone(),
                })?;
            parents[child].push(parent);
            edges.push((parent, child));
        }
    }

    let ids: Vec<FieldId> = schema.fields.iter().map(|field| field.id.clone()).collect();

    let mut marks = vec![Mark::Unvisited; ids.len()];
    for &node in &derived {
        if marks[node] == Mark::Unvisited {
            find_cycle(node, &parents, &mut marks).map_err(|cycle| GraphError::Cycle {
                cycle: cycle.into_iter().map(|index| ids[index].clone()).collect(),
            })?;
        }
    }

    let order = evaluation_order(&derived, &parents, ids.len());
    tracing::debug!(
        fields = ids.len(),
        derived = order.len(),
        edges = edges.len(),
        "built field dependency graph"
    );

    Ok(FormGraph {
        ids,
        edges,
        parents,
        order,
    })
}

/// Iterative depth-first walk from `start` towards its parents over a stack
/// of `(node, next parent position)`. Returns the cycle as the stack segment
/// that starts at the node found in progress.
fn find_cycle(
    start: usize,
    parents: &[Vec<usize>],
    marks: &mut [Mark],
) -> Result<(), Vec<usize>> {
    let mut stack = vec![(start, 0usize)];
    marks[start] = Mark::InProgress;

    while let Some(top) = stack.last_mut() {
        let (node, next) = *top;
        let Some(&parent) = parents[node].get(next) else {
            marks[node] = Mark::Done;
            stack.pop();
            continue;
        };
        top.1 += 1;

        match marks[parent] {
            Mark::InProgress => {
                let from = stack.iter().position(|&(step, _)| step == parent).unwrap_or(0);
                return Err(stack[from..].iter().map(|&(step, _)| step).collect());
            }
            Mark::Unvisited => {
                marks[parent] = Mark::InProgress;
                stack.push((parent, 0));
            }
            Mark::Done => {}
        }
    }
    Ok(())
}

/// Kahn's algorithm restricted to derived nodes; the ready set is ordered by
/// schema index so independent fields keep their listing order.
fn evaluation_order(derived: &[usize], parents: &[Vec<usize>], len: usize) -> Vec<usize> {
    let mut is_derived = vec![false; len];
    for &node in derived {
        is_derived[node] = true;
    }

    let mut pending = vec![0usize; len];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
    for &node in derived {
        for &parent in &parents[node] {
            if is_derived[parent] {
                pending[node] += 1;
                children[parent].push(node);
            }
        }
    }

    let mut ready: BTreeSet<usize> = derived
        .iter()
        .copied()
        .filter(|node| pending[*node] == 0)
        .collect();
    let mut order = Vec::with_capacity(derived.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &child in &children[node] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.insert(child);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::{FieldKind, FieldSchema};

    fn field(id: &str, kind: FieldKind) -> FieldSchema {
        FieldSchema {
            id: FieldId::new(id),
            label: id.to_uppercase(),
            required: false,
            placeholder: None,
            kind,
        }
    }

    fn form(fields: Vec<FieldSchema>) -> FormSchema {
        let mut schema = FormSchema::new("graph test");
        schema.fields = fields;
        schema
    }

    fn ids(graph: &FormGraph) -> Vec<&str> {
        graph.evaluation_order_ids().map(FieldId::as_str).collect()
    }

    #[test]
    fn orders_chain_regardless_of_listing_order() {
        let schema = form(vec![
            field("d2", FieldKind::derived(["d1"], "d1 + 1")),
            field("d1", FieldKind::derived(["x"], "x * 2")),
            field("x", FieldKind::number()),
        ]);
        let graph = build_graph(&schema).expect("acyclic");
        assert_eq!(ids(&graph), vec!["d1", "d2"]);
        assert_eq!(graph.edges(), &[(1, 0), (2, 1)]);
        assert_eq!(graph.parents_of(0), &[1]);
        assert!(graph.parents_of(2).is_empty());
        assert_eq!(graph.id(1).map(FieldId::as_str), Some("d1"));
        assert_eq!(graph.id(3), None);
    }

    #[test]
    fn long_acyclic_chain_builds_without_recursion() {
        let length = 30_000;
        let mut fields = vec![field("f0", FieldKind::number())];
        for step in 1..=length {
            let parent = format!("f{}", step - 1);
            fields.push(field(
                &format!("f{step}"),
                FieldKind::derived([parent.as_str()], "1"),
            ));
        }
        // Listed leaf-first so the walk has to descend the whole chain.
        fields.reverse();
        let graph = build_graph(&form(fields)).expect("acyclic");

        let order = ids(&graph);
        assert_eq!(order.len(), length);
        assert_eq!(order.first(), Some(&"f1"));
        assert_eq!(order.last(), Some(&format!("f{length}").as_str()));
    }

    #[test]
    fn long_chain_closing_on_itself_reports_the_whole_cycle() {
        let length = 30_000;
        let fields = (0..length)
            .map(|step| {
                let parent = format!("f{}", (step + 1) % length);
                field(&format!("f{step}"), FieldKind::derived([parent.as_str()], "1"))
            })
            .collect();
        match build_graph(&form(fields)) {
            Err(GraphError::Cycle { cycle }) => {
                assert_eq!(cycle.len(), length);
                assert_eq!(cycle[0].as_str(), "f0");
                assert_eq!(cycle[1].as_str(), "f1");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn independent_derived_fields_keep_schema_order() {
        let schema = form(vec![
            field("a", FieldKind::number()),
            field("late", FieldKind::derived(["early"], "early + 1")),
            field("second", FieldKind::derived(["a"], "a + 2")),
            field("early", FieldKind::derived(["a"], "a + 1")),
        ]);
        let graph = build_graph(&schema).expect("acyclic");
        assert_eq!(ids(&graph), vec!["second", "early", "late"]);
    }

    #[test]
    fn detects_two_field_cycle() {
        let schema = form(vec![
            field("a", FieldKind::derived(["b"], "b + 1")),
            field("b", FieldKind::derived(["a"], "a + 1")),
        ]);
        let err = build_graph(&schema).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                cycle: vec![FieldId::new("a"), FieldId::new("b")]
            }
        );
        assert_eq!(
            err.to_string(),
            "derived fields depend on each other in a cycle: a -> b -> a"
        );
    }

    #[test]
    fn detects_transitive_cycle_behind_acyclic_prefix() {
        let schema = form(vec![
            field("x", FieldKind::number()),
            field("entry", FieldKind::derived(["p"], "p")),
            field("p", FieldKind::derived(["q", "x"], "q + x")),
            field("q", FieldKind::derived(["r"], "r")),
            field("r", FieldKind::derived(["p"], "p")),
        ]);
        match build_graph(&schema) {
            Err(GraphError::Cycle { cycle }) => {
                let names: Vec<&str> = cycle.iter().map(FieldId::as_str).collect();
                assert_eq!(names, vec!["p", "q", "r"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let schema = form(vec![field("loop", FieldKind::derived(["loop"], "loop + 1"))]);
        assert_eq!(
            build_graph(&schema),
            Err(GraphError::Cycle {
                cycle: vec![FieldId::new("loop")]
            })
        );
    }

    #[test]
    fn reports_unknown_parent() {
        let schema = form(vec![
            field("age", FieldKind::number()),
            field("next", FieldKind::derived(["agee"], "agee + 1")),
        ]);
        assert_eq!(
            build_graph(&schema),
            Err(GraphError::UnknownParent {
                field: FieldId::new("next"),
                parent: FieldId::new("agee"),
            })
        );
    }

    #[test]
    fn rejects_duplicate_ids() {
        let schema = form(vec![
            field("name", FieldKind::text()),
            field("name", FieldKind::email()),
        ]);
        assert!(matches!(
            build_graph(&schema),
            Err(GraphError::DuplicateId { .. })
        ));
    }
}
