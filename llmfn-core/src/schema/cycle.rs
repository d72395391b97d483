use super::{FieldType, NamedType, SchemaTable};
use crate::error::SchemaError;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reject classes that require each other with no way to terminate.
///
/// Only required fields contribute edges. Optional and list fields always
/// have a finite value (`null`, `[]`), and a union only contributes edges
/// when every one of its variants does.
pub(super) fn check_required_cycles(table: &SchemaTable) -> Result<(), SchemaError> {
    let mut graph: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for def in table.types.values() {
        if let NamedType::Class(class) = def {
            let mut deps = BTreeSet::new();
            for field in class.fields.iter().filter(|f| f.required) {
                deps.extend(required_deps(table, &field.field_type));
            }
            graph.insert(class.name.as_str(), deps);
        }
    }

    let mut tarjan = Tarjan::new(&graph);
    for node in graph.keys() {
        if !tarjan.index.contains_key(node) {
            tarjan.visit(node);
        }
    }

    for component in tarjan.components {
        let is_cycle = component.len() > 1
            || graph
                .get(component[0])
                .is_some_and(|deps| deps.contains(component[0]));
        if is_cycle {
            let mut names: Vec<String> = component.iter().map(|s| s.to_string()).collect();
            names.reverse();
            names.push(names[0].clone());
            return Err(SchemaError::InfiniteCycle(names));
        }
    }
    Ok(())
}

fn required_deps<'a>(table: &'a SchemaTable, field_type: &'a FieldType) -> BTreeSet<&'a str> {
    match field_type {
        FieldType::Primitive(_) | FieldType::Optional(_) | FieldType::List(_) => BTreeSet::new(),
        FieldType::Ref(name) => match table.get(name) {
            Some(NamedType::Class(_)) => BTreeSet::from([name.as_str()]),
            _ => BTreeSet::new(),
        },
        FieldType::Union(variants) => {
            let mut all = BTreeSet::new();
            for variant in variants {
                let deps = required_deps(table, variant);
                if deps.is_empty() {
                    return BTreeSet::new();
                }
                all.extend(deps);
            }
            all
        }
    }
}

struct Tarjan<'g, 'a> {
    graph: &'g BTreeMap<&'a str, BTreeSet<&'a str>>,
    index: HashMap<&'a str, usize>,
    low: HashMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: BTreeSet<&'a str>,
    components: Vec<Vec<&'a str>>,
}

impl<'g, 'a> Tarjan<'g, 'a> {
    fn new(graph: &'g BTreeMap<&'a str, BTreeSet<&'a str>>) -> Self {
        Self {
            graph,
            index: HashMap::new(),
            low: HashMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, node: &'a str) {
        let next = self.index.len();
        self.index.insert(node, next);
        self.low.insert(node, next);
        self.stack.push(node);
        self.on_stack.insert(node);

        let graph = self.graph;
        if let Some(deps) = graph.get(node) {
            for &dep in deps {
                if !self.index.contains_key(dep) {
                    self.visit(dep);
                    let low = self.low[node].min(self.low[dep]);
                    self.low.insert(node, low);
                } else if self.on_stack.contains(dep) {
                    let low = self.low[node].min(self.index[dep]);
                    self.low.insert(node, low);
                }
            }
        }

        if self.low[node] == self.index[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member);
                if member == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SchemaError;
    use crate::schema::{ClassDef, FieldType, SchemaTable};

    #[test]
    fn test_mutual_required_cycle_rejected() {
        let err = SchemaTable::builder()
            .class(ClassDef::new("A").field("b", FieldType::reference("B")))
            .class(ClassDef::new("B").field("a", FieldType::reference("A")))
            .build()
            .unwrap_err();

        match err {
            SchemaError::InfiniteCycle(path) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"A".to_string()));
                assert!(path.contains(&"B".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_direct_self_requirement_rejected() {
        let err = SchemaTable::builder()
            .class(ClassDef::new("Loop").field("again", FieldType::reference("Loop")))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::InfiniteCycle(vec!["Loop".into(), "Loop".into()])
        );
    }

    #[test]
    fn test_cycle_broken_by_list_or_union_branch() {
        let table = SchemaTable::builder()
            .class(
                ClassDef::new("Tree")
                    .field("children", FieldType::list(FieldType::reference("Tree"))),
            )
            .class(ClassDef::new("Expr").field(
                "operand",
                FieldType::union(vec![FieldType::reference("Expr"), FieldType::int()]),
            ))
            .build();
        assert!(table.is_ok());
    }

    #[test]
    fn test_optional_field_does_not_count() {
        let table = SchemaTable::builder()
            .class(ClassDef::new("A").optional_field("b", FieldType::reference("B")))
            .class(ClassDef::new("B").field("a", FieldType::reference("A")))
            .build();
        assert!(table.is_ok());
    }
}
