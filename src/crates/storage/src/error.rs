//! Maps `sqlx` and `qdrant_client` failures onto the shared error taxonomy.

use ragcore::CoreError;

pub fn map_sqlx(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::RowNotFound => CoreError::not_found("row not found"),
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            CoreError::conflict(db_err.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => CoreError::transient(err.to_string()),
        other => CoreError::permanent(other.to_string()),
    }
}

pub fn map_migrate(err: sqlx::migrate::MigrateError) -> CoreError {
    CoreError::internal(format!("migration failed: {err}"))
}
