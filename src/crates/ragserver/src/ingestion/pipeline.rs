//! The Ingestion Orchestrator (spec.md §4.1): drives one document through
//! parse → chunk → embed → extract → graph → finalize, retrying each
//! stage on transient failure and publishing progress to the bus.

use crate::bus::EventBus;
use crate::ingestion::chunker::chunk_blocks;
use crate::ingestion::extractor::extract;
use crate::ingestion::parser::PdfParser;
use crate::version_manager::VersionManager;
use llm_gateway::Gateway;
use ragcore::error::{CoreError, Result};
use std::future::Future;
use std::sync::Arc;
use storage::{ChunkPayload, DocumentStatus, EdgeType, GraphStore, MetaStore, VectorStore};
use tooling::async_utils::retry::RetryPolicy;

/// Progress event published to the bus, keyed by document id.
#[derive(Debug, Clone)]
pub struct IngestionEvent {
    pub stage: String,
    pub progress: i64,
    pub error: Option<String>,
}

impl Default for IngestionEvent {
    fn default() -> Self {
        Self { stage: "pending".to_string(), progress: 0, error: None }
    }
}

pub type ProgressBus = Arc<EventBus<IngestionEvent>>;

pub fn new_progress_bus() -> ProgressBus {
    Arc::new(EventBus::new())
}

fn stage_retry_policy() -> RetryPolicy {
    RetryPolicy::new(4).with_initial_interval(60.0).with_backoff_factor(2.0).with_max_interval(240.0).with_jitter(false)
}

/// Retries `op` on transient `CoreError`s with the 60s/120s/240s backoff
/// schedule (spec.md §4.1); validation/permanent/cancelled errors are
/// terminal and returned immediately.
async fn with_stage_retry<F, Fut, T>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = stage_retry_policy();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_terminal() => return Err(err),
            Err(err) => {
                if !policy.should_retry(attempt + 1) {
                    return Err(err);
                }
                let delay = policy.calculate_delay(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "ingestion stage failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

pub struct IngestionPipeline {
    meta: MetaStore,
    graph: GraphStore,
    vectors: Arc<VectorStore>,
    gateway: Arc<Gateway>,
    versions: Arc<VersionManager>,
    bus: ProgressBus,
    parser: Arc<dyn PdfParser>,
}

impl IngestionPipeline {
    pub fn new(
        meta: MetaStore,
        graph: GraphStore,
        vectors: Arc<VectorStore>,
        gateway: Arc<Gateway>,
        versions: Arc<VersionManager>,
        bus: ProgressBus,
        parser: Arc<dyn PdfParser>,
    ) -> Self {
        Self { meta, graph, vectors, gateway, versions, bus, parser }
    }

    fn publish(&self, document_id: &str, status: DocumentStatus, error: Option<&str>) {
        self.bus.publish(
            document_id,
            IngestionEvent { stage: status.as_str().to_string(), progress: status.progress_mark(), error: error.map(str::to_string) },
        );
    }

    /// Advances the document's stage in the relational store *before*
    /// publishing the progress event, per spec.md §4.1.
    async fn advance(&self, document_id: &str, status: DocumentStatus, error: Option<&str>) -> Result<()> {
        self.meta.advance_document_stage(document_id, status, error).await?;
        self.publish(document_id, status, error);
        Ok(())
    }

    /// Runs the full six-stage pipeline for one document. Errors are
    /// recorded on the document row as `failed`; the caller (worker pool)
    /// does not need to re-raise beyond logging.
    pub async fn run_document(&self, tenant_id: &str, document_id: &str, version: i64, file_bytes: Vec<u8>) -> Result<()> {
        if let Err(err) = self.run_stages(tenant_id, document_id, version, &file_bytes).await {
            let _ = self.meta.advance_document_stage(document_id, DocumentStatus::Failed, Some(&err.to_string())).await;
            self.publish(document_id, DocumentStatus::Failed, Some(&err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    async fn run_stages(&self, tenant_id: &str, document_id: &str, version: i64, file_bytes: &[u8]) -> Result<()> {
        self.advance(document_id, DocumentStatus::Parsing, None).await?;
        let blocks = with_stage_retry(|| self.parser.parse(file_bytes)).await?;
        let page_count = blocks.iter().map(|b| b.page).max().unwrap_or(0);

        self.advance(document_id, DocumentStatus::Chunking, None).await?;
        let chunks = chunk_blocks(document_id, &blocks);

        self.advance(document_id, DocumentStatus::Embedding, None).await?;
        for chunk in &chunks {
            let embedding = with_stage_retry(|| self.gateway.embed(chunk.text.clone())).await?;
            let payload = ChunkPayload {
                chunk_id: chunk.chunk_id.clone(),
                tenant_id: tenant_id.to_string(),
                document_id: document_id.to_string(),
                build_version: version,
                chunk_index: chunk.chunk_index,
                page: Some(chunk.page),
                section: chunk.section.clone(),
                text: chunk.text.clone(),
                is_table: chunk.is_table,
                is_caption: chunk.is_caption,
                heading_level: chunk.heading_level,
            };
            with_stage_retry(|| self.vectors.upsert_chunk(tenant_id, version, embedding.clone(), payload.clone())).await?;
        }

        self.advance(document_id, DocumentStatus::Extracting, None).await?;
        let extracted = extract(&self.gateway, &chunks).await;

        self.advance(document_id, DocumentStatus::Graphing, None).await?;
        let mut node_ids = std::collections::HashMap::new();
        for node in &extracted.nodes {
            let id = with_stage_retry(|| {
                self.graph.upsert_node(tenant_id, version, node.node_type, &node.name, &node.text, &node.chunk_ids, node.confidence)
            })
            .await?;
            node_ids.insert(storage::normalize_name(&node.name), id);
        }
        for edge in &extracted.edges {
            let (Some(source_id), Some(target_id)) =
                (node_ids.get(&storage::normalize_name(&edge.source_name)), node_ids.get(&storage::normalize_name(&edge.target_name)))
            else {
                continue;
            };
            with_stage_retry(|| {
                self.graph.insert_edge(tenant_id, version, source_id, target_id, edge.edge_type, edge.score, None, dependency_subtype(edge.edge_type))
            })
            .await?;
        }

        self.meta.set_document_counts(document_id, page_count, chunks.len() as i64, extracted.nodes.len() as i64).await?;
        self.advance(document_id, DocumentStatus::Completed, None).await?;

        self.versions.try_activate(tenant_id, version).await?;
        Ok(())
    }
}

fn dependency_subtype(edge_type: EdgeType) -> Option<&'static str> {
    matches!(edge_type, EdgeType::DependsOn).then_some("generic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_retry_policy_matches_backoff_schedule() {
        let policy = stage_retry_policy();
        assert_eq!(policy.calculate_delay(0).as_secs_f64(), 60.0);
        assert_eq!(policy.calculate_delay(1).as_secs_f64(), 120.0);
        assert_eq!(policy.calculate_delay(2).as_secs_f64(), 240.0);
    }

    #[tokio::test]
    async fn stage_retry_does_not_retry_terminal_errors() {
        let mut calls = 0;
        let result: Result<()> = with_stage_retry(|| {
            calls += 1;
            async { Err(CoreError::validation("bad input")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_retry_retries_transient_errors_up_to_limit() {
        let mut calls = 0;
        let result: Result<()> = with_stage_retry(|| {
            calls += 1;
            async { Err(CoreError::transient("upstream down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }
}
