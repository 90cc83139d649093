//! The Hybrid Retriever (spec.md §4.4): vector top-K plus keyword/entity
//! seeded two-hop graph expansion, fused into one ranked, budget-truncated
//! context block.

use crate::retrieval::tokens::estimate_tokens;
use llm_gateway::Gateway;
use ragcore::error::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use storage::{GraphStore, NodeType, VectorStore};

const MAX_EXPANSION_HOPS: u32 = 2;
const EXPANSION_MIN_EDGE_SCORE: f64 = 0.7;
const MAX_EXPANDED_NODES: usize = 20;
const VECTOR_WEIGHT: f64 = 0.7;
const GRAPH_WEIGHT: f64 = 0.3;
pub const DEFAULT_TOP_K: u64 = 8;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TOKEN_BUDGET: usize = 3000;

/// One piece of evidence behind an assembled answer: either a vector chunk
/// or a graph node surfaced by keyword/expansion seeding (spec.md §4.4 step
/// 7 — source kind ∈ {vector, graph}).
#[derive(Debug, Clone)]
pub enum RetrievedSource {
    Chunk {
        chunk_id: String,
        document_id: String,
        chunk_index: i64,
        page: Option<i64>,
        section: Option<String>,
        text: String,
        fused_score: f64,
    },
    GraphNode {
        node_id: String,
        name: String,
        node_type: NodeType,
        text: String,
        hop: u32,
        score: f64,
    },
}

impl RetrievedSource {
    pub fn text(&self) -> &str {
        match self {
            RetrievedSource::Chunk { text, .. } => text,
            RetrievedSource::GraphNode { text, .. } => text,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            RetrievedSource::Chunk { fused_score, .. } => *fused_score,
            RetrievedSource::GraphNode { score, .. } => *score,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub context_text: String,
    pub sources: Vec<RetrievedSource>,
    pub truncated: bool,
}

/// Retrieval parameters read from [`crate::config::ServerConfig`] at
/// construction time (spec.md §6: `TOP_K`, `VECTOR_SCORE_THRESHOLD`,
/// `MAX_HOPS`).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalTuning {
    pub top_k: u64,
    pub score_threshold: f32,
    pub max_hops: u32,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, score_threshold: DEFAULT_SCORE_THRESHOLD, max_hops: MAX_EXPANSION_HOPS }
    }
}

pub struct HybridRetriever {
    graph: GraphStore,
    vectors: Arc<VectorStore>,
    gateway: Arc<Gateway>,
    tuning: RetrievalTuning,
}

impl HybridRetriever {
    pub fn new(graph: GraphStore, vectors: Arc<VectorStore>, gateway: Arc<Gateway>) -> Self {
        Self::with_tuning(graph, vectors, gateway, RetrievalTuning::default())
    }

    pub fn with_tuning(graph: GraphStore, vectors: Arc<VectorStore>, gateway: Arc<Gateway>, tuning: RetrievalTuning) -> Self {
        Self { graph, vectors, gateway, tuning }
    }

    /// Runs the full retrieval procedure for `query` against the tenant's
    /// active build version, truncating the assembled context to
    /// `token_budget` (default [`DEFAULT_TOKEN_BUDGET`]).
    pub async fn retrieve(&self, tenant_id: &str, version: i64, query: &str, token_budget: Option<usize>) -> Result<RetrievedContext> {
        let budget = token_budget.unwrap_or(DEFAULT_TOKEN_BUDGET);

        let query_embedding = self.gateway.embed(query.to_string()).await?;
        let vector_matches = self.vectors.search(tenant_id, version, query_embedding, self.tuning.top_k, self.tuning.score_threshold).await?;
        let traversal = self.graph.load_traversal(tenant_id, version).await?;

        // Keyword-seeded expansion runs even when vector search returns
        // nothing, so a query that only names an entity still surfaces its
        // graph neighborhood (spec.md §4.4 step 4).
        let mut seed_ids: HashSet<String> = HashSet::new();
        for phrase in extract_keyword_phrases(query) {
            if let Some(node) = traversal.node_by_name(&phrase) {
                seed_ids.insert(node.id.clone());
            }
        }
        for matched in &vector_matches {
            for node in self.graph.nodes_by_chunk(tenant_id, version, &matched.payload.chunk_id).await? {
                seed_ids.insert(node.id);
            }
        }

        let seed_ids: Vec<String> = seed_ids.into_iter().collect();
        let expanded = traversal.expand(&seed_ids, self.tuning.max_hops, EXPANSION_MIN_EDGE_SCORE, MAX_EXPANDED_NODES);

        Ok(fuse_and_assemble(vector_matches, expanded, budget))
    }
}

/// Fuses vector matches and expanded graph nodes into one ranked,
/// budget-truncated context (spec.md §4.4 steps 6-7). Pure function over
/// already-fetched data so it can run independently of the vector store,
/// graph store, and LLM gateway — including the case where `vector_matches`
/// is empty but `expanded` is not (§8 seed scenario 6: graph-only
/// retrieval must still produce non-empty sources).
fn fuse_and_assemble(vector_matches: Vec<storage::VectorMatch>, expanded: Vec<storage::ExpandedNode>, budget: usize) -> RetrievedContext {
    let mut chunk_edge_score: HashMap<String, f64> = HashMap::new();
    for node in &expanded {
        for chunk_id in &node.node.chunk_ids {
            let entry = chunk_edge_score.entry(chunk_id.clone()).or_insert(0.0);
            *entry = entry.max(node.max_incident_edge_score);
        }
    }

    let mut chunk_sources: Vec<RetrievedSource> = vector_matches
        .into_iter()
        .map(|matched| {
            let graph_score = chunk_edge_score.get(&matched.payload.chunk_id).copied().unwrap_or(0.0);
            let fused_score = VECTOR_WEIGHT * matched.score as f64 + GRAPH_WEIGHT * graph_score;
            RetrievedSource::Chunk {
                chunk_id: matched.payload.chunk_id,
                document_id: matched.payload.document_id,
                chunk_index: matched.payload.chunk_index,
                page: matched.payload.page,
                section: matched.payload.section,
                text: matched.payload.text,
                fused_score,
            }
        })
        .collect();
    // Tie-break: equal fused score → earlier chunk_index wins (spec.md §4.4).
    let chunk_index = |source: &RetrievedSource| match source {
        RetrievedSource::Chunk { chunk_index, .. } => *chunk_index,
        RetrievedSource::GraphNode { .. } => 0,
    };
    chunk_sources.sort_by(|a, b| {
        b.score().partial_cmp(&a.score()).unwrap_or(std::cmp::Ordering::Equal).then_with(|| chunk_index(a).cmp(&chunk_index(b)))
    });

    let mut definitions: Vec<_> = expanded.iter().filter(|n| n.node.node_type == NodeType::Definition).collect();
    let mut concepts: Vec<_> = expanded.iter().filter(|n| n.node.node_type == NodeType::Concept).collect();
    let mut processes: Vec<_> = expanded.iter().filter(|n| n.node.node_type == NodeType::Process).collect();
    // Tie-break: equal fused score → lower-hop nodes win (spec.md §4.4).
    for group in [&mut definitions, &mut concepts, &mut processes] {
        group.sort_by(|a, b| {
            b.max_incident_edge_score
                .partial_cmp(&a.max_incident_edge_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hop.cmp(&b.hop))
        });
    }

    let mut blocks: Vec<(String, RetrievedSource)> = Vec::new();
    for node in &definitions {
        blocks.push((format!("Definition: {} — {}", node.node.name, node.node.text), graph_source(node)));
    }
    for source in &chunk_sources {
        blocks.push((source.text().to_string(), source.clone()));
    }
    for node in &concepts {
        blocks.push((format!("Concept: {} — {}", node.node.name, node.node.text), graph_source(node)));
    }
    for node in &processes {
        blocks.push((format!("Process: {} — {}", node.node.name, node.node.text), graph_source(node)));
    }

    let (context_text, truncated, used_sources) = assemble_within_budget(blocks, budget);
    RetrievedContext { context_text, sources: used_sources, truncated }
}

/// Builds the graph-kind source descriptor for an expanded node, carried
/// alongside its formatted context block so truncation can drop the two
/// together (spec.md §4.4 step 7, §8 scenario 6).
fn graph_source(node: &storage::ExpandedNode) -> RetrievedSource {
    RetrievedSource::GraphNode {
        node_id: node.node.id.clone(),
        name: node.node.name.clone(),
        node_type: node.node.node_type,
        text: node.node.text.clone(),
        hop: node.hop,
        score: node.max_incident_edge_score,
    }
}

/// Appends blocks in order until the running token estimate would exceed
/// `budget`; the first block is always kept even if it alone exceeds budget,
/// so retrieval never returns an empty context for an answerable query.
/// Each block carries the source descriptor it was built from, so a
/// truncated block also drops its source from the returned list.
fn assemble_within_budget(blocks: Vec<(String, RetrievedSource)>, budget: usize) -> (String, bool, Vec<RetrievedSource>) {
    let mut used = String::new();
    let mut used_sources = Vec::new();
    let mut truncated = false;

    for (index, (block, source)) in blocks.into_iter().enumerate() {
        let candidate = if used.is_empty() { block.clone() } else { format!("{used}\n\n{block}") };
        if index > 0 && estimate_tokens(&candidate) > budget {
            truncated = true;
            break;
        }
        used = candidate;
        used_sources.push(source);
    }

    (used, truncated, used_sources)
}

/// Extracts runs of two or more consecutive capitalized words (e.g. "Retry
/// Policy") as candidate entity names for keyword-seeded graph expansion.
fn extract_keyword_phrases(query: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let flush = |current: &mut Vec<&str>, phrases: &mut Vec<String>| {
        if current.len() >= 2 {
            phrases.push(current.join(" "));
        }
        current.clear();
    };

    for word in query.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
        let starts_upper = trimmed.chars().next().is_some_and(char::is_uppercase);
        if starts_upper && !trimmed.is_empty() {
            current.push(trimmed);
        } else {
            flush(&mut current, &mut phrases);
        }
    }
    flush(&mut current, &mut phrases);
    phrases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multi_word_capitalized_phrases() {
        let phrases = extract_keyword_phrases("How does the Retry Policy interact with the Ingestion Pipeline?");
        assert_eq!(phrases, vec!["Retry Policy".to_string(), "Ingestion Pipeline".to_string()]);
    }

    #[test]
    fn ignores_single_capitalized_words() {
        assert!(extract_keyword_phrases("What is Photosynthesis").is_empty());
    }

    fn dummy_source(tag: &str) -> RetrievedSource {
        RetrievedSource::GraphNode {
            node_id: tag.to_string(),
            name: tag.to_string(),
            node_type: NodeType::Concept,
            text: tag.to_string(),
            hop: 0,
            score: 0.0,
        }
    }

    #[test]
    fn assembles_blocks_until_budget_exceeded() {
        let blocks = vec![
            ("a".repeat(40), dummy_source("a")),
            ("b".repeat(40), dummy_source("b")),
            ("c".repeat(40), dummy_source("c")),
        ];
        let (text, truncated, sources) = assemble_within_budget(blocks, 15);
        assert!(truncated);
        assert!(text.contains('a'));
        assert!(!text.contains('b'));
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn keeps_first_block_even_if_it_alone_exceeds_budget() {
        let blocks = vec![("x".repeat(500), dummy_source("x"))];
        let (text, truncated, sources) = assemble_within_budget(blocks, 10);
        assert!(!truncated);
        assert!(!text.is_empty());
        assert_eq!(sources.len(), 1);
    }

    fn expanded_node(id: &str, node_type: NodeType, name: &str, chunk_ids: Vec<&str>, edge_score: f64) -> storage::ExpandedNode {
        storage::ExpandedNode {
            node: storage::GraphNode {
                id: id.to_string(),
                node_type,
                name: name.to_string(),
                text: format!("{name} definition text"),
                chunk_ids: chunk_ids.into_iter().map(str::to_string).collect(),
                confidence: 0.9,
            },
            hop: 0,
            max_incident_edge_score: edge_score,
        }
    }

    fn vector_match(chunk_id: &str, document_id: &str, chunk_index: i64, score: f32) -> storage::VectorMatch {
        storage::VectorMatch {
            payload: storage::ChunkPayload {
                chunk_id: chunk_id.to_string(),
                tenant_id: "t1".to_string(),
                document_id: document_id.to_string(),
                build_version: 1,
                chunk_index,
                page: Some(1),
                section: None,
                text: format!("chunk {chunk_id} text"),
                is_table: false,
                is_caption: false,
                heading_level: None,
            },
            score,
        }
    }

    #[test]
    fn graph_only_retrieval_surfaces_graph_sources_when_vector_search_is_empty() {
        let expanded = vec![expanded_node("n1", NodeType::Definition, "GraphRAG", vec![], 0.9)];
        let context = fuse_and_assemble(vec![], expanded, DEFAULT_TOKEN_BUDGET);

        assert!(!context.sources.is_empty());
        assert!(matches!(context.sources[0], RetrievedSource::GraphNode { .. }));
        assert!(context.context_text.contains("GraphRAG"));
    }

    #[test]
    fn single_doc_happy_path_orders_definitions_before_chunks() {
        let expanded = vec![expanded_node("n1", NodeType::Definition, "Photosynthesis", vec!["c1"], 0.8)];
        let matches = vec![vector_match("c1", "doc1", 0, 0.95)];
        let context = fuse_and_assemble(matches, expanded, DEFAULT_TOKEN_BUDGET);

        assert_eq!(context.sources.len(), 2);
        assert!(matches!(context.sources[0], RetrievedSource::GraphNode { .. }));
        assert!(matches!(context.sources[1], RetrievedSource::Chunk { .. }));
        assert!(!context.truncated);
    }
}
