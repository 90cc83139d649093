//! Server configuration, loaded entirely from environment variables per
//! spec.md §6's deployment model — no config file, so a container can be
//! configured with nothing but its environment.

use tooling::config::{get_env, get_env_or, get_env_parse_or};
use tooling::ToolingError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub qdrant_url: String,
    pub storage_root: String,
    pub admin_bootstrap_email: Option<String>,
    pub admin_bootstrap_password_hash: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub llm_remote_base_url: Option<String>,
    pub llm_remote_model: Option<String>,
    pub llm_remote_api_key: Option<String>,
    pub embedding_dim: u64,
    pub worker_concurrency: usize,
    pub llm_concurrency: usize,
    pub top_k: u64,
    pub vector_score_threshold: f32,
    pub max_hops: u32,
    pub context_token_budget: usize,
    pub session_ttl_min: i64,
    pub history_turns: u32,
    pub max_document_bytes: u64,
}

/// Marker values that indicate the operator never set a real bootstrap
/// credential; refused at boot per spec.md §9 Open Question 3.
const PLACEHOLDER_PASSWORD_HASHES: &[&str] = &["", "changeme", "admin", "password"];

impl ServerConfig {
    pub fn from_env() -> Result<Self, ToolingError> {
        let admin_bootstrap_password_hash = get_env_or("ADMIN_BOOTSTRAP_PASSWORD_HASH", "")?;
        if PLACEHOLDER_PASSWORD_HASHES.contains(&admin_bootstrap_password_hash.to_lowercase().as_str()) {
            return Err(ToolingError::General(
                "ADMIN_BOOTSTRAP_PASSWORD_HASH is unset or a known placeholder value; refusing to boot with a public default admin account".to_string(),
            ));
        }

        Ok(Self {
            host: get_env_or("HOST", "0.0.0.0")?,
            port: get_env_parse_or("PORT", 8080u16)?,
            database_path: get_env_or("DATABASE_PATH", "ragserver.db")?,
            qdrant_url: get_env_or("QDRANT_URL", "http://localhost:6334")?,
            storage_root: get_env_or("STORAGE_ROOT", "./data/documents")?,
            admin_bootstrap_email: get_env("ADMIN_BOOTSTRAP_EMAIL")?,
            admin_bootstrap_password_hash,
            llm_base_url: get_env_or("LLM_BASE_URL", "http://localhost:11434")?,
            llm_model: get_env_or("LLM_MODEL", "llama3")?,
            embedding_base_url: get_env_or("EMBEDDING_BASE_URL", "http://localhost:11434")?,
            embedding_model: get_env_or("EMBEDDING_MODEL", "llama3")?,
            llm_remote_base_url: get_env("LLM_REMOTE_BASE_URL")?,
            llm_remote_model: get_env("LLM_REMOTE_MODEL")?,
            llm_remote_api_key: get_env("LLM_REMOTE_API_KEY")?,
            embedding_dim: get_env_parse_or("EMBEDDING_DIM", 768u64)?,
            worker_concurrency: get_env_parse_or("WORKER_CONCURRENCY", 3usize)?,
            llm_concurrency: get_env_parse_or("LLM_CONCURRENCY", 2usize)?,
            top_k: get_env_parse_or("TOP_K", 8u64)?,
            vector_score_threshold: get_env_parse_or("VECTOR_SCORE_THRESHOLD", 0.7f32)?,
            max_hops: get_env_parse_or("MAX_HOPS", 2u32)?,
            context_token_budget: get_env_parse_or("CONTEXT_TOKEN_BUDGET", 3000usize)?,
            session_ttl_min: get_env_parse_or("SESSION_TTL_MIN", 30i64)?,
            history_turns: get_env_parse_or("HISTORY_TURNS", 10u32)?,
            max_document_bytes: get_env_parse_or("MAX_DOCUMENT_BYTES", 104_857_600u64)?,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn refuses_boot_without_bootstrap_hash() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ADMIN_BOOTSTRAP_PASSWORD_HASH");
        assert!(ServerConfig::from_env().is_err());
    }

    #[test]
    fn refuses_boot_with_placeholder_hash() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ADMIN_BOOTSTRAP_PASSWORD_HASH", "changeme");
        assert!(ServerConfig::from_env().is_err());
        std::env::remove_var("ADMIN_BOOTSTRAP_PASSWORD_HASH");
    }

    #[test]
    fn loads_with_real_hash_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ADMIN_BOOTSTRAP_PASSWORD_HASH", "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.llm_concurrency, 2);
        std::env::remove_var("ADMIN_BOOTSTRAP_PASSWORD_HASH");
    }
}
