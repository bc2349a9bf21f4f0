//! Relationship graph analysis.
//!
//! Builds a directed graph from the dataset's relationship columns and
//! derives degree metrics, weakly-connected components, per-type
//! patterns, cycles, and orphans. Traversals are iterative with explicit
//! stacks; cycle search is depth-limited.

use super::{mean, percentile, round2};
use crate::dataset::{Dataset, Projection, ScanRequest};
use crate::error::Result;
use ahash::{AHashMap, AHashSet};
use serde_json::{json, Value};
use std::sync::Arc;

/// Cycles reported per analysis.
const MAX_CYCLES: usize = 10;
/// Orphans reported per analysis.
const MAX_ORPHANS: usize = 100;
/// Row cap for the orphan scan.
const ORPHAN_SCAN_LIMIT: usize = 10_000;
/// Component sizes reported per analysis.
const COMPONENT_SIZE_LIMIT: usize = 10;
/// Co-occurring type pairs reported per analysis.
const TYPE_PAIR_LIMIT: usize = 5;

type Graph = AHashMap<String, Vec<(String, String)>>;

/// Analyzes the document relationship graph.
pub struct RelationshipAnalyzer {
    dataset: Arc<dyn Dataset>,
}

impl RelationshipAnalyzer {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self { dataset }
    }

    /// Runs one analysis pass.
    pub async fn analyze(
        &self,
        max_depth: usize,
        relationship_types: Option<&[String]>,
        include_orphans: bool,
    ) -> Result<Value> {
        let graph = self.build_graph(relationship_types).await?;

        let metrics = graph_metrics(&graph);
        let components = connected_components(&graph);
        let patterns = relationship_patterns(&graph);
        let cycles = find_cycles(&graph, max_depth);

        let mut results = json!({
            "summary": metrics,
            "components": {
                "count": components.len(),
                "sizes": components.iter().take(COMPONENT_SIZE_LIMIT).map(Vec::len).collect::<Vec<_>>(),
                "largest_component": components.first().map_or(0, Vec::len),
            },
            "patterns": patterns,
            "cycles": {
                "found": !cycles.is_empty(),
                "count": cycles.len(),
                "examples": cycles.iter().take(5).collect::<Vec<_>>(),
            },
        });

        if include_orphans {
            let orphans = self.find_orphans(&graph).await?;
            results["orphans"] = json!({
                "count": orphans.len(),
                "document_ids": orphans.iter().take(20).collect::<Vec<_>>(),
            });
        }

        Ok(results)
    }

    /// Scans `(id, relationships)` and assembles the directed graph,
    /// optionally restricted to a set of relationship types.
    async fn build_graph(&self, relationship_types: Option<&[String]>) -> Result<Graph> {
        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection {
                    relationships: true,
                    ..Projection::ids_only()
                },
                ..ScanRequest::default()
            })
            .await?;

        let mut graph: Graph = AHashMap::new();
        for batch in batches {
            let Some(relationship_lists) = &batch.relationships else {
                continue;
            };
            for (id, relationships) in batch.ids.iter().zip(relationship_lists.iter()) {
                for rel in relationships {
                    let type_name = rel.relationship_type.to_string();
                    if relationship_types.is_some_and(|types| !types.contains(&type_name)) {
                        continue;
                    }
                    if let Some(target) = rel.target_key() {
                        graph
                            .entry(id.to_string())
                            .or_default()
                            .push((type_name, target));
                    }
                }
            }
        }
        Ok(graph)
    }

    /// Documents present in the dataset but absent from the graph as
    /// either source or target.
    async fn find_orphans(&self, graph: &Graph) -> Result<Vec<String>> {
        let mut connected: AHashSet<String> = graph.keys().cloned().collect();
        for edges in graph.values() {
            connected.extend(edges.iter().map(|(_, target)| target.clone()));
        }

        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection::ids_only(),
                limit: Some(ORPHAN_SCAN_LIMIT),
                ..ScanRequest::default()
            })
            .await?;

        let mut orphans = Vec::new();
        'outer: for batch in batches {
            for id in &batch.ids {
                let key = id.to_string();
                if !connected.contains(&key) {
                    orphans.push(key);
                    if orphans.len() >= MAX_ORPHANS {
                        break 'outer;
                    }
                }
            }
        }
        Ok(orphans)
    }
}

fn graph_metrics(graph: &Graph) -> Value {
    let mut nodes: AHashSet<&str> = graph.keys().map(String::as_str).collect();
    let mut in_degree: AHashMap<&str, u64> = AHashMap::new();
    let mut edge_count = 0u64;

    for edges in graph.values() {
        edge_count += edges.len() as u64;
        for (_, target) in edges {
            nodes.insert(target.as_str());
            *in_degree.entry(target.as_str()).or_default() += 1;
        }
    }

    let out_degrees: Vec<f64> = graph.values().map(|edges| edges.len() as f64).collect();
    let mut degrees = out_degrees.clone();
    degrees.resize(nodes.len(), 0.0);

    json!({
        "node_count": nodes.len(),
        "edge_count": edge_count,
        "avg_degree": round2(if nodes.is_empty() { 0.0 } else { edge_count as f64 / nodes.len() as f64 }),
        "max_out_degree": out_degrees.iter().copied().fold(0.0, f64::max) as u64,
        "max_in_degree": in_degree.values().copied().max().unwrap_or(0),
        "degree_distribution": {
            "mean": round2(mean(&degrees)),
            "median": round2(percentile(&degrees, 0.5)),
            "std": round2(super::std_dev(&degrees)),
        },
    })
}

/// Weakly-connected components via iterative DFS over the undirected
/// projection, sorted largest first.
fn connected_components(graph: &Graph) -> Vec<Vec<String>> {
    let mut adjacency: AHashMap<&str, AHashSet<&str>> = AHashMap::new();
    let mut all_nodes: AHashSet<&str> = graph.keys().map(String::as_str).collect();

    for (source, edges) in graph {
        for (_, target) in edges {
            adjacency.entry(source.as_str()).or_default().insert(target);
            adjacency.entry(target.as_str()).or_default().insert(source);
            all_nodes.insert(target.as_str());
        }
    }

    let mut sorted_nodes: Vec<&str> = all_nodes.iter().copied().collect();
    sorted_nodes.sort_unstable();

    let mut visited: AHashSet<&str> = AHashSet::new();
    let mut components = Vec::new();

    for node in sorted_nodes {
        if visited.contains(node) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            component.push(current.to_string());
            if let Some(neighbours) = adjacency.get(current) {
                stack.extend(neighbours.iter().filter(|n| !visited.contains(*n)));
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    components.sort_by(|a, b| b.len().cmp(&a.len()));
    components
}

fn relationship_patterns(graph: &Graph) -> Value {
    let mut type_counts: AHashMap<&str, u64> = AHashMap::new();
    let mut type_pairs: AHashMap<(String, String), u64> = AHashMap::new();

    for edges in graph.values() {
        for (rel_type, _) in edges {
            *type_counts.entry(rel_type.as_str()).or_default() += 1;
        }
        for (i, (type1, _)) in edges.iter().enumerate() {
            for (type2, _) in &edges[i + 1..] {
                let pair = if type1 <= type2 {
                    (type1.clone(), type2.clone())
                } else {
                    (type2.clone(), type1.clone())
                };
                *type_pairs.entry(pair).or_default() += 1;
            }
        }
    }

    let mut pairs: Vec<((String, String), u64)> = type_pairs.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    json!({
        "type_distribution": type_counts
            .into_iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<serde_json::Map<_, _>>(),
        "common_pairs": pairs
            .iter()
            .take(TYPE_PAIR_LIMIT)
            .map(|((type1, type2), count)| json!({"types": [type1, type2], "count": count}))
            .collect::<Vec<_>>(),
    })
}

/// Depth-limited cycle search with path tracking. Self-loops (cycle
/// length ≤ 2) are ignored; at most [`MAX_CYCLES`] cycles are returned.
fn find_cycles(graph: &Graph, max_depth: usize) -> Vec<Vec<String>> {
    let mut cycles: Vec<Vec<String>> = Vec::new();

    let mut start_nodes: Vec<&String> = graph.keys().collect();
    start_nodes.sort_unstable();

    for start in start_nodes {
        // Iterative DFS carrying the path; each frame owns its path copy
        // so sibling branches don't see each other's visits.
        let mut stack: Vec<(String, Vec<String>)> = vec![(start.clone(), Vec::new())];
        while let Some((node, path)) = stack.pop() {
            if path.len() > max_depth {
                continue;
            }
            if let Some(pos) = path.iter().position(|n| *n == node) {
                let mut cycle: Vec<String> = path[pos..].to_vec();
                cycle.push(node);
                if cycle.len() > 2 && !cycles.contains(&cycle) {
                    cycles.push(cycle);
                }
                continue;
            }
            let mut next_path = path;
            next_path.push(node.clone());
            if let Some(edges) = graph.get(&node) {
                for (_, target) in edges {
                    stack.push((target.clone(), next_path.clone()));
                }
            }
        }
        if cycles.len() >= MAX_CYCLES {
            cycles.truncate(MAX_CYCLES);
            break;
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::types::{FrameRecord, Relationship, RelationshipType};
    use uuid::Uuid;

    async fn dataset_with_edges(
        edges: &[(usize, usize, RelationshipType)],
        node_count: usize,
    ) -> (Arc<dyn Dataset>, Vec<Uuid>) {
        let ds = MemoryDataset::new();
        let mut records: Vec<FrameRecord> = (0..node_count)
            .map(|i| FrameRecord::new(format!("node {i}")))
            .collect();
        let ids: Vec<Uuid> = records.iter().map(|r| r.uuid).collect();
        for (from, to, rel_type) in edges {
            records[*from]
                .relationships
                .push(Relationship::to_uuid(*rel_type, ids[*to]));
        }
        for record in records {
            ds.add(record).await.unwrap();
        }
        (Arc::new(ds), ids)
    }

    #[tokio::test]
    async fn test_metrics_and_components() {
        // Two components: {0,1,2} chained, {3,4} linked; node 5 orphaned
        let (ds, _) = dataset_with_edges(
            &[
                (0, 1, RelationshipType::Parent),
                (1, 2, RelationshipType::Parent),
                (3, 4, RelationshipType::Related),
            ],
            6,
        )
        .await;
        let analyzer = RelationshipAnalyzer::new(ds);
        let result = analyzer.analyze(3, None, true).await.unwrap();

        assert_eq!(result["summary"]["node_count"], 5);
        assert_eq!(result["summary"]["edge_count"], 3);
        assert_eq!(result["components"]["count"], 2);
        assert_eq!(result["components"]["largest_component"], 3);
        assert_eq!(result["orphans"]["count"], 1);
        assert_eq!(result["cycles"]["found"], false);
        assert_eq!(result["patterns"]["type_distribution"]["parent"], 2);
    }

    #[tokio::test]
    async fn test_cycle_detection_ignores_self_loops() {
        // 0 -> 1 -> 2 -> 0 plus a self-loop on 3
        let (ds, _) = dataset_with_edges(
            &[
                (0, 1, RelationshipType::Related),
                (1, 2, RelationshipType::Related),
                (2, 0, RelationshipType::Related),
                (3, 3, RelationshipType::Related),
            ],
            4,
        )
        .await;
        let analyzer = RelationshipAnalyzer::new(ds);
        let result = analyzer.analyze(5, None, false).await.unwrap();

        assert_eq!(result["cycles"]["found"], true);
        let examples = result["cycles"]["examples"].as_array().unwrap();
        // Every reported cycle has length > 2 (no self-loops)
        for cycle in examples {
            assert!(cycle.as_array().unwrap().len() > 2);
        }
    }

    #[tokio::test]
    async fn test_type_filter_restricts_graph() {
        let (ds, _) = dataset_with_edges(
            &[
                (0, 1, RelationshipType::Parent),
                (1, 2, RelationshipType::Reference),
            ],
            3,
        )
        .await;
        let analyzer = RelationshipAnalyzer::new(ds);
        let result = analyzer
            .analyze(3, Some(&["parent".to_string()]), false)
            .await
            .unwrap();
        assert_eq!(result["summary"]["edge_count"], 1);
        assert!(result["patterns"]["type_distribution"]
            .get("reference")
            .is_none());
    }

    #[tokio::test]
    async fn test_components_are_disjoint_and_cover_nodes() {
        let (ds, _) = dataset_with_edges(
            &[
                (0, 1, RelationshipType::Related),
                (2, 3, RelationshipType::Related),
                (4, 5, RelationshipType::Related),
            ],
            6,
        )
        .await;
        let analyzer = RelationshipAnalyzer::new(ds);
        let result = analyzer.analyze(3, None, true).await.unwrap();

        let sizes = result["components"]["sizes"].as_array().unwrap();
        let total: u64 = sizes.iter().map(|s| s.as_u64().unwrap()).sum();
        assert_eq!(total, result["summary"]["node_count"].as_u64().unwrap());
        // No orphan belongs to a component of size > 1
        assert_eq!(result["orphans"]["count"], 0);
    }
}
