//! Row types for the relational store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Processing,
    Active,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Processing => "processing",
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(TenantStatus::Processing),
            "active" => Some(TenantStatus::Active),
            "inactive" => Some(TenantStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub persona_tone: Option<String>,
    pub persona_language: Option<String>,
    pub persona_greeting: Option<String>,
    pub persona_system_prompt: Option<String>,
    pub persona_fallback_message: Option<String>,
    pub access_slug: String,
    pub status: String,
    pub active_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Parsing,
    Chunking,
    Embedding,
    Extracting,
    Graphing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Parsing => "parsing",
            DocumentStatus::Chunking => "chunking",
            DocumentStatus::Embedding => "embedding",
            DocumentStatus::Extracting => "extracting",
            DocumentStatus::Graphing => "graphing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Progress percent mark reached upon *entering* this stage (spec.md §4.1).
    pub fn progress_mark(&self) -> i64 {
        match self {
            DocumentStatus::Pending => 0,
            DocumentStatus::Parsing => 10,
            DocumentStatus::Chunking => 30,
            DocumentStatus::Embedding => 50,
            DocumentStatus::Extracting => 70,
            DocumentStatus::Graphing => 90,
            DocumentStatus::Completed => 100,
            DocumentStatus::Failed => 0,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub tenant_id: String,
    pub original_filename: String,
    pub content_locator: String,
    pub byte_size: i64,
    pub status: String,
    pub build_version: i64,
    pub page_count: i64,
    pub progress: i64,
    pub last_error: Option<String>,
    pub chunk_count: i64,
    pub entity_count: i64,
    pub processed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildVersionStatus {
    Building,
    Ready,
    Active,
    Archived,
}

impl BuildVersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVersionStatus::Building => "building",
            BuildVersionStatus::Ready => "ready",
            BuildVersionStatus::Active => "active",
            BuildVersionStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BuildVersionRow {
    pub tenant_id: String,
    pub version: i64,
    pub status: String,
    pub created_at: String,
    pub activated_at: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub tenant_id: String,
    pub created_at: String,
    pub expires_at: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub sources: Option<String>,
    pub created_at: String,
    pub response_time_ms: Option<i64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub retrieval_count: Option<i64>,
    pub retrieval_time_ms: Option<i64>,
    pub cancelled: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyStatsRow {
    pub tenant_id: String,
    pub date: String,
    pub sessions: i64,
    pub messages: i64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub retrieval_count: i64,
}
