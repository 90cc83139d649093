//! The relational store: tenants, documents, build versions, sessions,
//! messages, and daily stats. Owns lifecycle and statistics per spec.md §3's
//! ownership summary.

use crate::connection::DatabaseConnection;
use crate::error::map_sqlx;
use crate::models::{BuildVersionRow, DailyStatsRow, DocumentRow, DocumentStatus, MessageRole, MessageRow, SessionRow, TenantRow, TenantStatus};
use chrono::{Duration as ChronoDuration, Utc};
use ragcore::error::Result;
use uuid::Uuid;

/// Default session lifetime when the caller doesn't supply `SESSION_TTL_MIN`
/// (spec.md §6 names a default of 30 minutes).
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct MetaStore {
    conn: DatabaseConnection,
}

impl MetaStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let conn = DatabaseConnection::new(database_url).await.map_err(map_sqlx)?;
        conn.run_migrations().await.map_err(crate::error::map_migrate)?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.conn.pool()
    }

    /// Shares the underlying connection pool with a [`crate::graph_store::GraphStore`]
    /// so both stores operate on the same SQLite database.
    pub fn connection(&self) -> DatabaseConnection {
        self.conn.clone()
    }

    // ---- Tenants -----------------------------------------------------

    pub async fn create_tenant(
        &self,
        name: &str,
        persona_tone: Option<&str>,
        persona_language: Option<&str>,
        persona_greeting: Option<&str>,
        persona_system_prompt: Option<&str>,
        persona_fallback_message: Option<&str>,
        access_slug: &str,
    ) -> Result<TenantRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query_as::<_, TenantRow>(
            "INSERT INTO tenants
                (id, name, persona_tone, persona_language, persona_greeting,
                 persona_system_prompt, persona_fallback_message, access_slug,
                 status, active_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             RETURNING *",
        )
        .bind(&id)
        .bind(name)
        .bind(persona_tone)
        .bind(persona_language)
        .bind(persona_greeting)
        .bind(persona_system_prompt)
        .bind(persona_fallback_message)
        .bind(access_slug)
        .bind(TenantStatus::Processing.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx)
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Option<TenantRow>> {
        sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<TenantRow>> {
        sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE access_slug = ?")
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)
    }

    pub async fn set_tenant_status(&self, id: &str, status: TenantStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE tenants SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// Cascade delete across the relational store. The vector and graph
    /// stores are cleaned up separately by the Version Manager.
    pub async fn delete_tenant(&self, id: &str) -> Result<()> {
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM messages WHERE session_id IN (SELECT id FROM sessions WHERE tenant_id = ?)")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        sqlx::query("DELETE FROM sessions WHERE tenant_id = ?").bind(id).execute(&mut *tx).await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM documents WHERE tenant_id = ?").bind(id).execute(&mut *tx).await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM build_versions WHERE tenant_id = ?").bind(id).execute(&mut *tx).await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM daily_stats WHERE tenant_id = ?").bind(id).execute(&mut *tx).await.map_err(map_sqlx)?;
        sqlx::query("DELETE FROM tenants WHERE id = ?").bind(id).execute(&mut *tx).await.map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    // ---- Build versions ------------------------------------------------

    /// Opens a new build version for `tenant_id`: version 1 if none exist
    /// yet, otherwise `max(version) + 1`. Status starts `building`.
    pub async fn open_build_version(&self, tenant_id: &str) -> Result<i64> {
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx)?;
        let max_version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM build_versions WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let next_version = max_version.unwrap_or(0) + 1;
        let now = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO build_versions (tenant_id, version, status, created_at) VALUES (?, ?, 'building', ?)")
            .bind(tenant_id)
            .bind(next_version)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(next_version)
    }

    pub async fn get_build_version(&self, tenant_id: &str, version: i64) -> Result<Option<BuildVersionRow>> {
        sqlx::query_as::<_, BuildVersionRow>("SELECT * FROM build_versions WHERE tenant_id = ? AND version = ?")
            .bind(tenant_id)
            .bind(version)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)
    }

    pub async fn list_build_versions(&self, tenant_id: &str) -> Result<Vec<BuildVersionRow>> {
        sqlx::query_as::<_, BuildVersionRow>("SELECT * FROM build_versions WHERE tenant_id = ? ORDER BY version")
            .bind(tenant_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)
    }

    /// Atomic activation per spec.md §4.7: mark `version` ready then active,
    /// archive the previously active version, and flip the tenant's
    /// `active_version`/`status` — all inside one transaction so readers
    /// never observe a half-applied activation.
    pub async fn activate_build_version(&self, tenant_id: &str, version: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx)?;

        sqlx::query("UPDATE build_versions SET status = 'archived' WHERE tenant_id = ? AND status = 'active'")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        sqlx::query("UPDATE build_versions SET status = 'active', activated_at = ? WHERE tenant_id = ? AND version = ?")
            .bind(&now)
            .bind(tenant_id)
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        sqlx::query("UPDATE tenants SET active_version = ?, status = 'active', updated_at = ? WHERE id = ?")
            .bind(version)
            .bind(&now)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    // ---- Documents -------------------------------------------------------

    pub async fn create_document(&self, tenant_id: &str, original_filename: &str, content_locator: &str, byte_size: i64, build_version: i64) -> Result<DocumentRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query_as::<_, DocumentRow>(
            "INSERT INTO documents
                (id, tenant_id, original_filename, content_locator, byte_size,
                 status, build_version, page_count, progress, chunk_count,
                 entity_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?)
             RETURNING *",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(original_filename)
        .bind(content_locator)
        .bind(byte_size)
        .bind(DocumentStatus::Pending.as_str())
        .bind(build_version)
        .bind(&now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx)
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentRow>> {
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)
    }

    pub async fn list_documents(&self, tenant_id: &str) -> Result<Vec<DocumentRow>> {
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE tenant_id = ? ORDER BY created_at")
            .bind(tenant_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)
    }

    /// Writes the document's stage transactionally, as required before any
    /// progress event publishes (spec.md §4.1).
    pub async fn advance_document_stage(&self, document_id: &str, status: DocumentStatus, last_error: Option<&str>) -> Result<()> {
        let processed_at = matches!(status, DocumentStatus::Completed).then(|| Utc::now().to_rfc3339());
        sqlx::query(
            "UPDATE documents SET status = ?, progress = ?, last_error = ?, processed_at = COALESCE(?, processed_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(status.progress_mark())
        .bind(last_error)
        .bind(processed_at)
        .bind(document_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    pub async fn set_document_counts(&self, document_id: &str, page_count: i64, chunk_count: i64, entity_count: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET page_count = ?, chunk_count = ?, entity_count = ? WHERE id = ?")
            .bind(page_count)
            .bind(chunk_count)
            .bind(entity_count)
            .bind(document_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?").bind(id).execute(self.pool()).await.map_err(map_sqlx)?;
        Ok(())
    }

    // ---- Sessions and messages --------------------------------------------

    pub async fn create_session(&self, tenant_id: &str, ttl_minutes: i64) -> Result<SessionRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::minutes(ttl_minutes);

        sqlx::query_as::<_, SessionRow>(
            "INSERT INTO sessions (id, tenant_id, created_at, expires_at, message_count) VALUES (?, ?, ?, ?, 0) RETURNING *",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx)
    }

    pub fn session_is_expired(session: &SessionRow) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&session.expires_at) {
            Ok(expires_at) => Utc::now() > expires_at,
            Err(_) => true,
        }
    }

    /// Persists a user message and, within the same transaction, increments
    /// the session's message count and today's daily stats row. Spec.md
    /// §4.5 step 2 requires this increment to be synchronous, not deferred
    /// to a background stats worker.
    pub async fn persist_user_message(&self, session: &SessionRow, content: &str) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let is_first_message = session.message_count == 0;
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx)?;

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (id, session_id, role, content, created_at, cancelled, failed)
             VALUES (?, ?, ?, ?, ?, 0, 0) RETURNING *",
        )
        .bind(&id)
        .bind(&session.id)
        .bind(MessageRole::User.as_str())
        .bind(content)
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query("UPDATE sessions SET message_count = message_count + 1 WHERE id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let date = now.format("%Y-%m-%d").to_string();
        sqlx::query(
            "INSERT INTO daily_stats (tenant_id, date, sessions, messages) VALUES (?, ?, ?, 1)
             ON CONFLICT(tenant_id, date) DO UPDATE SET
                sessions = daily_stats.sessions + excluded.sessions,
                messages = daily_stats.messages + 1",
        )
        .bind(&session.tenant_id)
        .bind(&date)
        .bind(if is_first_message { 1 } else { 0 })
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn persist_assistant_message(
        &self,
        session_id: &str,
        tenant_id: &str,
        content: &str,
        sources_json: Option<&str>,
        response_time_ms: i64,
        input_tokens: i64,
        output_tokens: i64,
        retrieval_count: i64,
        retrieval_time_ms: i64,
        cancelled: bool,
        failed: bool,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut tx = self.conn.pool().begin().await.map_err(map_sqlx)?;

        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages
                (id, session_id, role, content, sources, created_at, response_time_ms,
                 input_tokens, output_tokens, retrieval_count, retrieval_time_ms, cancelled, failed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(session_id)
        .bind(MessageRole::Assistant.as_str())
        .bind(content)
        .bind(sources_json)
        .bind(now.to_rfc3339())
        .bind(response_time_ms)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(retrieval_count)
        .bind(retrieval_time_ms)
        .bind(cancelled)
        .bind(failed)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let date = now.format("%Y-%m-%d").to_string();
        sqlx::query(
            "INSERT INTO daily_stats (tenant_id, date, input_tokens, output_tokens, retrieval_count)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, date) DO UPDATE SET
                input_tokens = daily_stats.input_tokens + excluded.input_tokens,
                output_tokens = daily_stats.output_tokens + excluded.output_tokens,
                retrieval_count = daily_stats.retrieval_count + excluded.retrieval_count",
        )
        .bind(tenant_id)
        .bind(&date)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(retrieval_count)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(row)
    }

    /// The most recent `n` turns of a session in chronological order — the
    /// *tail* of the history, not the head (spec.md §4.5 step 3 corrects a
    /// head/tail bug in the source this was distilled from).
    pub async fn recent_turns(&self, session_id: &str, n: u32) -> Result<Vec<MessageRow>> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(n as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn daily_stats(&self, tenant_id: &str, since_days: u32) -> Result<Vec<DailyStatsRow>> {
        let since = (Utc::now() - ChronoDuration::days(since_days as i64)).format("%Y-%m-%d").to_string();
        sqlx::query_as::<_, DailyStatsRow>("SELECT * FROM daily_stats WHERE tenant_id = ? AND date >= ? ORDER BY date")
            .bind(tenant_id)
            .bind(since)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> MetaStore {
        MetaStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_tenant_starts_at_version_zero() {
        let store = store().await;
        let tenant = store.create_tenant("Acme Support", None, None, None, None, None, "acme-support").await.unwrap();
        assert_eq!(tenant.active_version, 0);
        assert_eq!(tenant.status, "processing");
    }

    #[tokio::test]
    async fn build_versions_increment_per_tenant() {
        let store = store().await;
        let tenant = store.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let v1 = store.open_build_version(&tenant.id).await.unwrap();
        let v2 = store.open_build_version(&tenant.id).await.unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn activation_is_atomic_and_archives_previous() {
        let store = store().await;
        let tenant = store.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let v1 = store.open_build_version(&tenant.id).await.unwrap();
        store.activate_build_version(&tenant.id, v1).await.unwrap();

        let v2 = store.open_build_version(&tenant.id).await.unwrap();
        store.activate_build_version(&tenant.id, v2).await.unwrap();

        let tenant = store.get_tenant(&tenant.id).await.unwrap().unwrap();
        assert_eq!(tenant.active_version, v2);

        let versions = store.list_build_versions(&tenant.id).await.unwrap();
        let v1_row = versions.iter().find(|v| v.version == v1).unwrap();
        assert_eq!(v1_row.status, "archived");
    }

    #[tokio::test]
    async fn user_message_increments_session_and_stats_synchronously() {
        let store = store().await;
        let tenant = store.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let session = store.create_session(&tenant.id, DEFAULT_SESSION_TTL_MINUTES).await.unwrap();

        store.persist_user_message(&session, "hello").await.unwrap();
        let session = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(session.message_count, 1);

        let stats = store.daily_stats(&tenant.id, 1).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].sessions, 1);
        assert_eq!(stats[0].messages, 1);
    }

    #[tokio::test]
    async fn recent_turns_returns_tail_in_chronological_order() {
        let store = store().await;
        let tenant = store.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let session = store.create_session(&tenant.id, DEFAULT_SESSION_TTL_MINUTES).await.unwrap();

        for i in 0..5 {
            store.persist_user_message(&session, &format!("msg {i}")).await.unwrap();
        }

        let turns = store.recent_turns(&session.id, 3).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, "msg 2");
        assert_eq!(turns[2].content, "msg 4");
    }

    #[tokio::test]
    async fn session_expiry_is_detected() {
        let store = store().await;
        let tenant = store.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let mut session = store.create_session(&tenant.id, DEFAULT_SESSION_TTL_MINUTES).await.unwrap();
        assert!(!MetaStore::session_is_expired(&session));

        session.expires_at = (Utc::now() - ChronoDuration::minutes(1)).to_rfc3339();
        assert!(MetaStore::session_is_expired(&session));
    }
}
