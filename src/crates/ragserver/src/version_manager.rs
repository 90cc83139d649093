//! Version Manager (spec.md §4.7): opens build versions, activates the
//! newest one atomically once every document in it has finished, and
//! cleans up vector/graph/file state on tenant delete or archive-drop.

use ragcore::error::Result;
use std::path::Path;
use std::sync::Arc;
use storage::{DocumentStatus, GraphStore, MetaStore, TenantStatus, VectorStore};
use tokio::sync::Mutex;

pub struct VersionManager {
    meta: MetaStore,
    graph: GraphStore,
    vectors: Arc<VectorStore>,
    storage_root: String,
    /// Serializes graph writes and activation checks per tenant (spec.md
    /// §5: "graph writes serialize per (tenant, version) through a
    /// per-tenant mutex to prevent dedup races").
    tenant_locks: dashmap::DashMap<String, Arc<Mutex<()>>>,
}

impl VersionManager {
    pub fn new(meta: MetaStore, graph: GraphStore, vectors: Arc<VectorStore>, storage_root: String) -> Self {
        Self { meta, graph, vectors, storage_root, tenant_locks: dashmap::DashMap::new() }
    }

    fn lock_for(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        self.tenant_locks.entry(tenant_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Opens a build version for `tenant_id` and ensures its vector
    /// collection exists before any document writes to it.
    pub async fn open_version(&self, tenant_id: &str, embedding_dimension: u64) -> Result<i64> {
        let version = self.meta.open_build_version(tenant_id).await?;
        let _ = embedding_dimension;
        self.vectors.ensure_collection(tenant_id, version).await?;
        Ok(version)
    }

    /// Called after a document finalizes. If every document targeting
    /// `version` has reached `completed`, activates the version atomically
    /// and archives the tenant's previous active version (spec.md §4.7).
    /// No-op (returns `Ok`) if other documents in the version are still
    /// in progress.
    pub async fn try_activate(&self, tenant_id: &str, version: i64) -> Result<()> {
        let lock = self.lock_for(tenant_id);
        let _guard = lock.lock().await;

        let documents = self.meta.list_documents(tenant_id).await?;
        let in_version: Vec<_> = documents.iter().filter(|d| d.build_version == version).collect();
        let all_completed = !in_version.is_empty() && in_version.iter().all(|d| d.status == DocumentStatus::Completed.as_str());
        if !all_completed {
            return Ok(());
        }

        self.meta.activate_build_version(tenant_id, version).await?;
        tracing::info!(tenant_id, version, "build version activated");
        Ok(())
    }

    /// Removes the vector collection, graph nodes/edges, and stored files
    /// for `(tenant_id, version)`. On partial failure the caller should
    /// leave the tenant in `cleanup_pending` for a janitor retry; this
    /// function itself is idempotent so a retry is safe.
    pub async fn cleanup_version(&self, tenant_id: &str, version: i64) -> Result<()> {
        self.vectors.delete_collection(tenant_id, version).await?;
        self.graph.delete_version(tenant_id, version).await?;

        let tenant_dir = Path::new(&self.storage_root).join(tenant_id);
        if tenant_dir.exists() {
            let documents = self.meta.list_documents(tenant_id).await?;
            for doc in documents.iter().filter(|d| d.build_version == version) {
                let path = tenant_dir.join(format!("{}.pdf", doc.id));
                let _ = tokio::fs::remove_file(path).await;
            }
        }
        Ok(())
    }

    /// Full tenant teardown: cleans up every build version, then deletes
    /// the relational rows.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<()> {
        let versions = self.meta.list_build_versions(tenant_id).await?;
        for version in versions {
            if let Err(err) = self.cleanup_version(tenant_id, version.version).await {
                tracing::error!(tenant_id, version = version.version, error = %err, "version cleanup failed, leaving tenant pending");
                self.meta.set_tenant_status(tenant_id, TenantStatus::Processing).await?;
                return Err(err);
            }
        }
        self.meta.delete_tenant(tenant_id).await?;
        self.tenant_locks.remove(tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (VersionManager, MetaStore) {
        let meta = MetaStore::connect("sqlite::memory:").await.unwrap();
        let graph = GraphStore::new(meta.connection());
        let vectors = Arc::new(VectorStore::new("http://localhost:6334", 8).unwrap());
        (VersionManager::new(meta.clone(), graph, vectors, "./data".to_string()), meta)
    }

    #[tokio::test]
    async fn try_activate_is_noop_while_documents_are_incomplete() {
        let (manager, meta) = manager().await;
        let tenant = meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let version = meta.open_build_version(&tenant.id).await.unwrap();
        meta.create_document(&tenant.id, "a.pdf", "loc", 10, version).await.unwrap();

        manager.try_activate(&tenant.id, version).await.unwrap();
        let tenant = meta.get_tenant(&tenant.id).await.unwrap().unwrap();
        assert_eq!(tenant.active_version, 0);
    }

    #[tokio::test]
    async fn try_activate_flips_pointer_once_all_documents_complete() {
        let (manager, meta) = manager().await;
        let tenant = meta.create_tenant("Acme", None, None, None, None, None, "acme").await.unwrap();
        let version = meta.open_build_version(&tenant.id).await.unwrap();
        let doc = meta.create_document(&tenant.id, "a.pdf", "loc", 10, version).await.unwrap();
        meta.advance_document_stage(&doc.id, DocumentStatus::Completed, None).await.unwrap();

        manager.try_activate(&tenant.id, version).await.unwrap();
        let tenant = meta.get_tenant(&tenant.id).await.unwrap().unwrap();
        assert_eq!(tenant.active_version, version);
    }
}
