//! Shared types for the HTTP API layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::core_state::CoreState;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Authenticated user, injected into request extensions by the auth
/// middleware after the bearer token resolved to a live session.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}
