use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::SchemaModel;

/// Summary of the dependency graph structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Foreign key dependency diagnostics for a schema.
///
/// Generation never follows `principal_order`; it resolves principals on
/// demand. The report exists to explain depth and cycle failures up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub summary: DependencySummary,
    /// Principals before dependents, when the graph is acyclic.
    pub principal_order: Option<Vec<String>>,
    /// Entity types left on a cycle (self references included).
    pub cycle: Option<Vec<String>>,
    /// Longest chain of foreign key links, when the graph is acyclic.
    pub longest_chain: Option<usize>,
}

/// Build a deterministic dependency report for a schema.
pub fn build_dependency_report(schema: &SchemaModel) -> DependencyReport {
    let graph = build_adjacency(schema);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let summary = DependencySummary { nodes, edges };

    match toposort(&graph) {
        Ok(order) => {
            let longest_chain = longest_chain(schema, &order);
            DependencyReport {
                summary,
                principal_order: Some(order),
                cycle: None,
                longest_chain: Some(longest_chain),
            }
        }
        Err(cycle) => DependencyReport {
            summary,
            principal_order: None,
            cycle: Some(cycle),
            longest_chain: None,
        },
    }
}

/// Edges point from principal to dependent.
fn build_adjacency(schema: &SchemaModel) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for entity in &schema.entities {
        graph.entry(entity.name.clone()).or_default();
        for fk in &entity.foreign_keys {
            graph
                .entry(fk.principal.clone())
                .or_default()
                .insert(entity.name.clone());
        }
    }

    graph
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<String, usize> = graph.keys().map(|node| (node.clone(), 0)).collect();

    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target.clone()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| node.clone())
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target.clone());
                    }
                }
            }
        }
        order.push(node);
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| node)
            .collect())
    }
}

/// Principals come first in `order`, so every chain length is known before
/// its dependents are visited.
fn longest_chain(schema: &SchemaModel, order: &[String]) -> usize {
    let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
    for name in order {
        let links = schema
            .entity(name)
            .map(|entity| {
                entity
                    .foreign_keys
                    .iter()
                    .map(|fk| depth.get(fk.principal.as_str()).copied().unwrap_or(0) + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        depth.insert(name.as_str(), links);
    }
    depth.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chain_schema(links: usize) -> SchemaModel {
        let entities: Vec<_> = (0..=links)
            .map(|index| {
                let mut entity = json!({
                    "name": format!("E{index}"),
                    "fields": [
                        {"name": "Id", "kind": "integer"},
                        {"name": "NextId", "kind": "integer"}
                    ],
                    "primary_key": ["Id"]
                });
                if index < links {
                    entity["foreign_keys"] =
                        json!([{"columns": ["NextId"], "principal": format!("E{}", index + 1)}]);
                }
                entity
            })
            .collect();
        SchemaModel::from_value(json!({"schema_version": "0.1", "entities": entities}))
            .expect("schema")
    }

    #[test]
    fn orders_principals_before_dependents() {
        let report = build_dependency_report(&chain_schema(3));
        let order = report.principal_order.expect("acyclic");
        assert_eq!(order, vec!["E3", "E2", "E1", "E0"]);
        assert_eq!(report.longest_chain, Some(3));
        assert_eq!(report.summary.edges, 3);
    }

    #[test]
    fn reports_self_reference_as_cycle() {
        let schema = SchemaModel::from_value(json!({
            "schema_version": "0.1",
            "entities": [{
                "name": "Employee",
                "fields": [
                    {"name": "Id", "kind": "integer"},
                    {"name": "ManagerId", "kind": "integer"}
                ],
                "primary_key": ["Id"],
                "foreign_keys": [{"columns": ["ManagerId"], "principal": "Employee"}]
            }]
        }))
        .expect("schema");

        let report = build_dependency_report(&schema);
        assert!(report.principal_order.is_none());
        assert!(report.longest_chain.is_none());
        assert_eq!(report.cycle, Some(vec!["Employee".to_string()]));
    }
}
