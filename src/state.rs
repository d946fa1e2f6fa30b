use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::middleware::rate_limit::RateLimiter;
use crate::relay::Relay;
use crate::sprite::SpriteBuilder;
use crate::storage::BlobStore;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub blobs: Arc<dyn BlobStore>,
    pub sprites: Arc<SpriteBuilder>,
    pub relay: Arc<Relay>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Root of the local blob store; its public half is served at `/cdn`.
    pub storage_path: PathBuf,
    pub test_mode: bool,
}
