//! The vector store: one Qdrant collection per `(tenant, build_version)`,
//! named `chatbot_{tenant_uuid}_v{version}` per spec.md §3's persistence
//! bindings.

use qdrant_client::qdrant::{
    vectors_config::Config, CreateCollection, Distance, PointStruct, ScoredPoint, SearchPoints,
    VectorParams, VectorsConfig,
};
use qdrant_client::Qdrant;
use ragcore::error::Result;
use ragcore::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub build_version: i64,
    pub chunk_index: i64,
    pub page: Option<i64>,
    pub section: Option<String>,
    pub text: String,
    pub is_table: bool,
    pub is_caption: bool,
    pub heading_level: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub payload: ChunkPayload,
    pub score: f32,
}

pub struct VectorStore {
    client: Qdrant,
    dimension: u64,
}

fn collection_name(tenant_id: &str, version: i64) -> String {
    format!("chatbot_{tenant_id}_v{version}")
}

fn map_qdrant(err: impl std::fmt::Display) -> CoreError {
    CoreError::transient(format!("vector store error: {err}"))
}

impl VectorStore {
    pub fn new(url: &str, dimension: u64) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(map_qdrant)?;
        Ok(Self { client, dimension })
    }

    /// Creates the collection for a new build version. Called once when the
    /// version opens (spec.md §4.7); a no-op if it already exists.
    pub async fn ensure_collection(&self, tenant_id: &str, version: i64) -> Result<()> {
        let name = collection_name(tenant_id, version);
        if self.client.collection_exists(&name).await.map_err(map_qdrant)? {
            return Ok(());
        }
        self.client
            .create_collection(CreateCollection {
                collection_name: name,
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: self.dimension,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(map_qdrant)?;
        Ok(())
    }

    pub async fn upsert_chunk(&self, tenant_id: &str, version: i64, embedding: Vec<f32>, payload: ChunkPayload) -> Result<()> {
        let name = collection_name(tenant_id, version);
        let payload_json = serde_json::to_value(&payload).map_err(|e| CoreError::internal(e.to_string()))?;
        let payload_map: HashMap<String, qdrant_client::qdrant::Value> = qdrant_client::Payload::try_from(payload_json)
            .map_err(map_qdrant)?
            .into();

        let point = PointStruct::new(payload.chunk_id.clone(), embedding, payload_map);
        self.client
            .upsert_points(qdrant_client::qdrant::UpsertPoints {
                collection_name: name,
                points: vec![point],
                ..Default::default()
            })
            .await
            .map_err(map_qdrant)?;
        Ok(())
    }

    /// Top-K search against the active `(tenant, version)` collection,
    /// filtering results below `threshold` (default 0.7, spec.md §4.4 step 2).
    pub async fn search(
        &self,
        tenant_id: &str,
        version: i64,
        query_vector: Vec<f32>,
        top_k: u64,
        threshold: f32,
    ) -> Result<Vec<VectorMatch>> {
        let name = collection_name(tenant_id, version);
        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: name,
                vector: query_vector,
                limit: top_k,
                score_threshold: Some(threshold),
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(map_qdrant)?;

        response
            .result
            .into_iter()
            .map(|point| to_vector_match(point))
            .collect::<Result<Vec<_>>>()
    }

    pub async fn delete_collection(&self, tenant_id: &str, version: i64) -> Result<()> {
        let name = collection_name(tenant_id, version);
        self.client.delete_collection(name).await.map_err(map_qdrant)?;
        Ok(())
    }
}

fn to_vector_match(point: ScoredPoint) -> Result<VectorMatch> {
    let payload_json = qdrant_client::Payload::from(point.payload)
        .into();
    let payload: ChunkPayload = serde_json::from_value(payload_json).map_err(|e| CoreError::internal(e.to_string()))?;
    Ok(VectorMatch { payload, score: point.score })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_embeds_tenant_and_version() {
        assert_eq!(collection_name("acme", 3), "chatbot_acme_v3");
    }
}
