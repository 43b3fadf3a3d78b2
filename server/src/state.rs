use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::Hub;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret
    pub jwt_secret: Vec<u8>,
    /// Lifetime of issued access tokens, in hours
    pub token_ttl_hours: i64,
    /// Live push sessions per user
    pub hub: Arc<Hub>,
}
