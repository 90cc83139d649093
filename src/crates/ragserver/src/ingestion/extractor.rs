//! The extract(70) stage (spec.md §4.3): a rule-based pass unioned with an
//! LLM structured-extraction pass, fused by max-confidence merge on
//! normalized name/type/overlapping chunk set.

use crate::ingestion::chunker::Chunk;
use llm_gateway::Gateway;
use ragcore::{ChatRequest, Message};
use serde::Deserialize;
use storage::{normalize_name, EdgeType, NodeType};
use std::collections::HashMap;

const RULE_CONFIDENCE: f64 = 0.9;
const MIN_EDGE_SCORE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ExtractedNode {
    pub node_type: NodeType,
    pub name: String,
    pub text: String,
    pub chunk_ids: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct ExtractedEdge {
    pub source_name: String,
    pub target_name: String,
    pub edge_type: EdgeType,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct ExtractedGraph {
    pub nodes: Vec<ExtractedNode>,
    pub edges: Vec<ExtractedEdge>,
}

#[derive(Deserialize)]
struct LlmEntity {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    description: String,
}

#[derive(Deserialize)]
struct LlmRelation {
    source: String,
    target: String,
    relation: String,
    score: f64,
}

#[derive(Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    entities: Vec<LlmEntity>,
    #[serde(default)]
    relations: Vec<LlmRelation>,
}

fn extraction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": "string", "enum": ["Concept", "Definition", "Process"]},
                        "description": {"type": "string"}
                    },
                    "required": ["name", "type", "description"]
                }
            },
            "relations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": {"type": "string"},
                        "target": {"type": "string"},
                        "relation": {"type": "string", "enum": ["RELATED_TO", "DEFINES", "DEPENDS_ON"]},
                        "score": {"type": "integer"}
                    },
                    "required": ["source", "target", "relation", "score"]
                }
            }
        },
        "required": ["entities", "relations"]
    })
}

/// Extracts a definition candidate from lines like `X is defined as …` or
/// `X: …`.
fn rule_based_definitions(chunk: &Chunk) -> Vec<ExtractedNode> {
    let mut nodes = Vec::new();
    for line in chunk.text.lines() {
        let trimmed = line.trim();
        if let Some(colon) = trimmed.find(':') {
            let (term, rest) = trimmed.split_at(colon);
            let rest = rest.trim_start_matches(':').trim();
            if !term.is_empty() && term.split_whitespace().count() <= 6 && !rest.is_empty() {
                nodes.push(ExtractedNode {
                    node_type: NodeType::Definition,
                    name: term.trim().to_string(),
                    text: rest.to_string(),
                    chunk_ids: vec![chunk.chunk_id.clone()],
                    confidence: RULE_CONFIDENCE,
                });
                continue;
            }
        }
        if let Some(idx) = trimmed.to_lowercase().find(" is defined as ") {
            let term = trimmed[..idx].trim();
            let definition = trimmed[idx + " is defined as ".len()..].trim();
            if !term.is_empty() && !definition.is_empty() {
                nodes.push(ExtractedNode {
                    node_type: NodeType::Definition,
                    name: term.to_string(),
                    text: definition.to_string(),
                    chunk_ids: vec![chunk.chunk_id.clone()],
                    confidence: RULE_CONFIDENCE,
                });
            }
        }
    }

    if let Some(heading) = chunk.heading_level {
        let _ = heading;
    }
    nodes
}

/// Recognizes numbered procedures ("1. ...", "Step 1: ...") as Process
/// candidates.
fn rule_based_processes(chunk: &Chunk) -> Vec<ExtractedNode> {
    let numbered_lines: Vec<&str> = chunk
        .text
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with(|c: char| c.is_ascii_digit()) && trimmed.contains('.')
                || trimmed.to_lowercase().starts_with("step ")
        })
        .collect();

    if numbered_lines.len() < 2 {
        return Vec::new();
    }

    let name = chunk.section.clone().unwrap_or_else(|| "Procedure".to_string());
    vec![ExtractedNode {
        node_type: NodeType::Process,
        name,
        text: numbered_lines.join("\n"),
        chunk_ids: vec![chunk.chunk_id.clone()],
        confidence: RULE_CONFIDENCE,
    }]
}

fn normalize_relation_type(relation: &str) -> EdgeType {
    match relation {
        "DEFINES" => EdgeType::Defines,
        "DEPENDS_ON" => EdgeType::DependsOn,
        _ => EdgeType::RelatedTo,
    }
}

/// Prompts the LLM for structured entities/relations on a single chunk.
/// Responses that fail to parse against the schema are discarded for that
/// chunk rather than failing the pipeline (spec.md §4.3).
async fn llm_pass(gateway: &Gateway, chunk: &Chunk) -> Option<(Vec<ExtractedNode>, Vec<ExtractedEdge>)> {
    let prompt = format!(
        "Extract entities and relations from the following text as JSON matching the schema. \
         Entity types are Concept, Definition, or Process. Relation types are RELATED_TO, DEFINES, \
         or DEPENDS_ON with an integer score 0-100.\n\nText:\n{}",
        chunk.text
    );
    let request = ChatRequest::new(vec![Message::human(prompt)]).with_json_schema(extraction_schema());
    let response = gateway.chat(request).await.ok()?;
    let content = response.message.text()?;
    let parsed: LlmExtraction = serde_json::from_str(content).ok()?;

    let nodes = parsed
        .entities
        .into_iter()
        .filter_map(|e| {
            let node_type = NodeType::parse(&e.kind)?;
            Some(ExtractedNode {
                node_type,
                name: e.name,
                text: e.description,
                chunk_ids: vec![chunk.chunk_id.clone()],
                confidence: 0.7,
            })
        })
        .collect();

    let edges = parsed
        .relations
        .into_iter()
        .map(|r| ExtractedEdge {
            source_name: r.source,
            target_name: r.target,
            edge_type: normalize_relation_type(&r.relation),
            score: (r.score / 100.0).clamp(0.0, 1.0),
        })
        .collect();

    Some((nodes, edges))
}

/// Fuses the rule pass and LLM pass across all chunks of a document:
/// dedup key is `(normalized name, type)`, merging chunk id sets and
/// taking the max confidence; edges below 0.5 are dropped.
pub async fn extract(gateway: &Gateway, chunks: &[Chunk]) -> ExtractedGraph {
    let mut merged: HashMap<(String, &'static str), ExtractedNode> = HashMap::new();
    let mut edges = Vec::new();

    for chunk in chunks {
        if chunk.is_table {
            continue;
        }
        for node in rule_based_definitions(chunk).into_iter().chain(rule_based_processes(chunk)) {
            merge_node(&mut merged, node);
        }

        if let Some((llm_nodes, llm_edges)) = llm_pass(gateway, chunk).await {
            for node in llm_nodes {
                merge_node(&mut merged, node);
            }
            edges.extend(llm_edges);
        }
    }

    let edges = edges.into_iter().filter(|e| e.score >= MIN_EDGE_SCORE).collect();
    ExtractedGraph { nodes: merged.into_values().collect(), edges }
}

fn merge_node(merged: &mut HashMap<(String, &'static str), ExtractedNode>, node: ExtractedNode) {
    let key = (normalize_name(&node.name), node.node_type.as_str());
    merged
        .entry(key)
        .and_modify(|existing| {
            existing.confidence = existing.confidence.max(node.confidence);
            for chunk_id in &node.chunk_ids {
                if !existing.chunk_ids.contains(chunk_id) {
                    existing.chunk_ids.push(chunk_id.clone());
                }
            }
        })
        .or_insert(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::chunker::Chunk;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            chunk_id: "c1".into(),
            chunk_index: 0,
            page: 1,
            section: Some("Intro".into()),
            text: text.into(),
            is_table: false,
            is_caption: false,
            heading_level: None,
        }
    }

    #[test]
    fn rule_pass_recognizes_colon_definitions() {
        let nodes = rule_based_definitions(&chunk("Photosynthesis: the process by which plants convert light into energy"));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_type, NodeType::Definition);
        assert_eq!(nodes[0].name, "Photosynthesis");
    }

    #[test]
    fn rule_pass_recognizes_is_defined_as() {
        let nodes = rule_based_definitions(&chunk("Osmosis is defined as the movement of water across a membrane"));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "Osmosis");
    }

    #[test]
    fn rule_pass_requires_at_least_two_numbered_steps() {
        let single = rule_based_processes(&chunk("1. Only one step"));
        assert!(single.is_empty());
        let multi = rule_based_processes(&chunk("1. Gather inputs\n2. Run the reaction"));
        assert_eq!(multi.len(), 1);
        assert_eq!(multi[0].node_type, NodeType::Process);
    }

    #[test]
    fn merge_node_unions_chunk_ids_and_keeps_max_confidence() {
        let mut merged = HashMap::new();
        merge_node(
            &mut merged,
            ExtractedNode { node_type: NodeType::Concept, name: "Retry Policy".into(), text: "a".into(), chunk_ids: vec!["c1".into()], confidence: 0.6 },
        );
        merge_node(
            &mut merged,
            ExtractedNode { node_type: NodeType::Concept, name: "retry policy".into(), text: "b".into(), chunk_ids: vec!["c2".into()], confidence: 0.9 },
        );
        assert_eq!(merged.len(), 1);
        let node = merged.values().next().unwrap();
        assert_eq!(node.confidence, 0.9);
        assert_eq!(node.chunk_ids.len(), 2);
    }
}
