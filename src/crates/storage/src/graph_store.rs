//! The knowledge graph: relational persistence for nodes/edges plus an
//! in-memory `petgraph` view for hop expansion at retrieval time (spec.md
//! §3 Graph Node/Edge, §4.3 fusion, §4.4 step 5).

use crate::connection::DatabaseConnection;
use crate::error::map_sqlx;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use ragcore::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const MIN_EDGE_SCORE_PERSIST: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeType {
    Concept,
    Definition,
    Process,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Concept => "Concept",
            NodeType::Definition => "Definition",
            NodeType::Process => "Process",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Concept" => Some(NodeType::Concept),
            "Definition" => Some(NodeType::Definition),
            "Process" => Some(NodeType::Process),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    RelatedTo,
    Defines,
    DependsOn,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::RelatedTo => "RELATED_TO",
            EdgeType::Defines => "DEFINES",
            EdgeType::DependsOn => "DEPENDS_ON",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub text: String,
    pub chunk_ids: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub score: f64,
    pub context: Option<String>,
}

/// Lowercases, collapses whitespace, and strips punctuation so dedup keys
/// ignore casing/spacing while display keeps the original `name`.
pub fn normalize_name(name: &str) -> String {
    let collapsed: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct GraphStore {
    conn: DatabaseConnection,
}

impl GraphStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn pool(&self) -> &sqlx::SqlitePool {
        self.conn.pool()
    }

    /// Inserts or merges a node by its dedup key `(tenant, version, type,
    /// normalized_name)`: chunk id lists union, confidence takes the max
    /// (spec.md §3 Graph Node invariant).
    pub async fn upsert_node(
        &self,
        tenant_id: &str,
        version: i64,
        node_type: NodeType,
        name: &str,
        text: &str,
        chunk_ids: &[String],
        confidence: f64,
    ) -> Result<String> {
        let normalized = normalize_name(name);

        let existing: Option<(String, String, f64)> = sqlx::query_as(
            "SELECT id, chunk_ids, confidence FROM graph_nodes
             WHERE tenant_id = ? AND version = ? AND node_type = ? AND normalized_name = ?",
        )
        .bind(tenant_id)
        .bind(version)
        .bind(node_type.as_str())
        .bind(&normalized)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx)?;

        if let Some((id, existing_chunk_ids_json, existing_confidence)) = existing {
            let mut merged: HashSet<String> = serde_json::from_str(&existing_chunk_ids_json).unwrap_or_default();
            merged.extend(chunk_ids.iter().cloned());
            let merged_json = serde_json::to_string(&merged).unwrap_or_else(|_| "[]".to_string());
            let merged_confidence = existing_confidence.max(confidence);

            sqlx::query("UPDATE graph_nodes SET chunk_ids = ?, confidence = ? WHERE id = ?")
                .bind(&merged_json)
                .bind(merged_confidence)
                .bind(&id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx)?;
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        let chunk_ids_json = serde_json::to_string(chunk_ids).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO graph_nodes (id, tenant_id, version, node_type, name, normalized_name, text, chunk_ids, confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(version)
        .bind(node_type.as_str())
        .bind(name)
        .bind(&normalized)
        .bind(text)
        .bind(&chunk_ids_json)
        .bind(confidence)
        .execute(self.pool())
        .await
        .map_err(map_sqlx)?;
        Ok(id)
    }

    /// Discards edges scoring below 0.5 per spec.md §3 Graph Edge invariant.
    pub async fn insert_edge(
        &self,
        tenant_id: &str,
        version: i64,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        score: f64,
        context: Option<&str>,
        dependency_subtype: Option<&str>,
    ) -> Result<Option<String>> {
        if score < MIN_EDGE_SCORE_PERSIST {
            return Ok(None);
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO graph_edges (id, tenant_id, version, source_id, target_id, edge_type, score, context, dependency_subtype)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(version)
        .bind(source_id)
        .bind(target_id)
        .bind(edge_type.as_str())
        .bind(score)
        .bind(context)
        .bind(dependency_subtype)
        .execute(self.pool())
        .await
        .map_err(map_sqlx)?;
        Ok(Some(id))
    }

    pub async fn nodes_by_chunk(&self, tenant_id: &str, version: i64, chunk_id: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<(String, String, String, String, String, f64)> = sqlx::query_as(
            "SELECT id, node_type, name, text, chunk_ids, confidence FROM graph_nodes WHERE tenant_id = ? AND version = ?",
        )
        .bind(tenant_id)
        .bind(version)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, node_type, name, text, chunk_ids_json, confidence)| {
                let chunk_ids: Vec<String> = serde_json::from_str(&chunk_ids_json).unwrap_or_default();
                if !chunk_ids.iter().any(|c| c == chunk_id) {
                    return None;
                }
                Some(GraphNode { id, node_type: NodeType::parse(&node_type)?, name, text, chunk_ids, confidence })
            })
            .collect())
    }

    pub async fn delete_version(&self, tenant_id: &str, version: i64) -> Result<()> {
        sqlx::query("DELETE FROM graph_edges WHERE tenant_id = ? AND version = ?")
            .bind(tenant_id)
            .bind(version)
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM graph_nodes WHERE tenant_id = ? AND version = ?")
            .bind(tenant_id)
            .bind(version)
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// Loads the full (tenant, version) subgraph into memory for traversal.
    pub async fn load_traversal(&self, tenant_id: &str, version: i64) -> Result<GraphTraversal> {
        let node_rows: Vec<(String, String, String, String, String, f64)> = sqlx::query_as(
            "SELECT id, node_type, name, text, chunk_ids, confidence FROM graph_nodes WHERE tenant_id = ? AND version = ?",
        )
        .bind(tenant_id)
        .bind(version)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;

        let edge_rows: Vec<(String, String, String, String, f64, Option<String>)> = sqlx::query_as(
            "SELECT id, source_id, target_id, edge_type, score, context FROM graph_edges WHERE tenant_id = ? AND version = ?",
        )
        .bind(tenant_id)
        .bind(version)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;

        let mut graph = UnGraph::<GraphNode, GraphEdge>::new_undirected();
        let mut index_by_id = HashMap::new();

        for (id, node_type, name, text, chunk_ids_json, confidence) in node_rows {
            let Some(node_type) = NodeType::parse(&node_type) else { continue };
            let chunk_ids: Vec<String> = serde_json::from_str(&chunk_ids_json).unwrap_or_default();
            let node = GraphNode { id: id.clone(), node_type, name, text, chunk_ids, confidence };
            let idx = graph.add_node(node);
            index_by_id.insert(id, idx);
        }

        for (id, source_id, target_id, edge_type, score, context) in edge_rows {
            let (Some(&src), Some(&dst)) = (index_by_id.get(&source_id), index_by_id.get(&target_id)) else { continue };
            let edge_type = match edge_type.as_str() {
                "DEFINES" => EdgeType::Defines,
                "DEPENDS_ON" => EdgeType::DependsOn,
                _ => EdgeType::RelatedTo,
            };
            graph.add_edge(src, dst, GraphEdge { id, source_id, target_id, edge_type, score, context });
        }

        Ok(GraphTraversal { graph, index_by_id })
    }
}

pub struct GraphTraversal {
    graph: UnGraph<GraphNode, GraphEdge>,
    index_by_id: HashMap<String, NodeIndex>,
}

#[derive(Debug, Clone)]
pub struct ExpandedNode {
    pub node: GraphNode,
    pub hop: u32,
    /// Highest-scoring edge through which this node was reached from a seed.
    pub max_incident_edge_score: f64,
}

impl GraphTraversal {
    pub fn node_by_name(&self, query: &str) -> Option<&GraphNode> {
        let normalized = normalize_name(query);
        self.graph.node_weights().find(|n| normalize_name(&n.name) == normalized)
    }

    /// BFS expansion up to `max_hops`, following only edges scoring at
    /// least `min_edge_score`, capped at `max_nodes` total (spec.md §4.4
    /// step 5: ≤2 hops, edges ≥0.7, cap 20).
    pub fn expand(&self, seed_ids: &[String], max_hops: u32, min_edge_score: f64, max_nodes: usize) -> Vec<ExpandedNode> {
        let mut visited: HashMap<NodeIndex, ExpandedNode> = HashMap::new();
        let mut frontier: Vec<NodeIndex> = Vec::new();

        for seed_id in seed_ids {
            if let Some(&idx) = self.index_by_id.get(seed_id) {
                if let Some(node) = self.graph.node_weight(idx) {
                    visited.insert(idx, ExpandedNode { node: node.clone(), hop: 0, max_incident_edge_score: 1.0 });
                    frontier.push(idx);
                }
            }
        }

        for hop in 1..=max_hops {
            if visited.len() >= max_nodes {
                break;
            }
            let mut next_frontier = Vec::new();
            for &idx in &frontier {
                for edge_ref in self.graph.edges(idx) {
                    if visited.len() >= max_nodes {
                        break;
                    }
                    let edge = edge_ref.weight();
                    if edge.score < min_edge_score {
                        continue;
                    }
                    let neighbor = edge_ref.target();
                    let node = match self.graph.node_weight(neighbor) {
                        Some(n) => n.clone(),
                        None => continue,
                    };
                    match visited.get_mut(&neighbor) {
                        Some(existing) => {
                            existing.max_incident_edge_score = existing.max_incident_edge_score.max(edge.score);
                        }
                        None => {
                            visited.insert(neighbor, ExpandedNode { node, hop, max_incident_edge_score: edge.score });
                            next_frontier.push(neighbor);
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        let mut result: Vec<ExpandedNode> = visited.into_values().collect();
        result.truncate(max_nodes);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> GraphStore {
        let conn = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        conn.run_migrations().await.unwrap();
        GraphStore::new(conn)
    }

    #[test]
    fn normalize_name_collapses_case_and_punctuation() {
        assert_eq!(normalize_name("  Retry  Policy! "), "retry policy");
        assert_eq!(normalize_name("Retry-Policy"), "retry policy");
    }

    #[tokio::test]
    async fn upsert_node_merges_chunk_ids_and_max_confidence() {
        let store = store().await;
        let id1 = store
            .upsert_node("t1", 1, NodeType::Concept, "Retry Policy", "desc", &["c1".into()], 0.6)
            .await
            .unwrap();
        let id2 = store
            .upsert_node("t1", 1, NodeType::Concept, "retry policy", "desc", &["c2".into()], 0.9)
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let nodes = store.nodes_by_chunk("t1", 1, "c2").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].confidence, 0.9);
        assert!(nodes[0].chunk_ids.contains(&"c1".to_string()));
    }

    #[tokio::test]
    async fn insert_edge_discards_below_threshold() {
        let store = store().await;
        let a = store.upsert_node("t1", 1, NodeType::Concept, "A", "", &[], 0.9).await.unwrap();
        let b = store.upsert_node("t1", 1, NodeType::Concept, "B", "", &[], 0.9).await.unwrap();
        let dropped = store.insert_edge("t1", 1, &a, &b, EdgeType::RelatedTo, 0.3, None, None).await.unwrap();
        assert!(dropped.is_none());
        let kept = store.insert_edge("t1", 1, &a, &b, EdgeType::RelatedTo, 0.8, None, None).await.unwrap();
        assert!(kept.is_some());
    }

    #[tokio::test]
    async fn expand_respects_hop_limit_and_edge_threshold() {
        let store = store().await;
        let a = store.upsert_node("t1", 1, NodeType::Concept, "A", "", &[], 0.9).await.unwrap();
        let b = store.upsert_node("t1", 1, NodeType::Concept, "B", "", &[], 0.9).await.unwrap();
        let c = store.upsert_node("t1", 1, NodeType::Concept, "C", "", &[], 0.9).await.unwrap();
        store.insert_edge("t1", 1, &a, &b, EdgeType::RelatedTo, 0.8, None, None).await.unwrap();
        store.insert_edge("t1", 1, &b, &c, EdgeType::RelatedTo, 0.5, None, None).await.unwrap();

        let traversal = store.load_traversal("t1", 1).await.unwrap();
        let expanded = traversal.expand(&[a.clone()], 2, 0.7, 20);
        let ids: Vec<_> = expanded.iter().map(|n| n.node.id.clone()).collect();
        assert!(ids.contains(&a));
        assert!(ids.contains(&b));
        assert!(!ids.contains(&c));
    }

    #[tokio::test]
    async fn expand_caps_total_nodes() {
        let store = store().await;
        let seed = store.upsert_node("t1", 1, NodeType::Concept, "Seed", "", &[], 0.9).await.unwrap();
        for i in 0..30 {
            let other = store.upsert_node("t1", 1, NodeType::Concept, &format!("N{i}"), "", &[], 0.9).await.unwrap();
            store.insert_edge("t1", 1, &seed, &other, EdgeType::RelatedTo, 0.9, None, None).await.unwrap();
        }
        let traversal = store.load_traversal("t1", 1).await.unwrap();
        let expanded = traversal.expand(&[seed], 2, 0.7, 20);
        assert!(expanded.len() <= 20);
    }
}
