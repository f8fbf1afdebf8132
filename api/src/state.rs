use std::sync::Arc;

use socra_core::orchestrator::SessionOrchestrator;
use sqlx::PgPool;

use crate::session_locks::SessionLocks;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub tutor: Arc<SessionOrchestrator>,
    pub locks: Arc<SessionLocks>,
}
