//! HTTP API layer: tenant-facing chat (SSE) and administrator CRUD routes.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use middleware::cors_layer;
pub use response::{ErrorResponse, PaginatedResponse, SuccessResponse};
pub use routes::{create_router, AppState};

pub mod prelude {
    pub use crate::api::error::{ApiError, ApiResult};
    pub use crate::api::response::*;
}
