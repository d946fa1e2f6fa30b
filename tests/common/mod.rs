#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Path as UrlPath;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use http::{Method, Request};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use whamserver::config::SpriteConfig;
use whamserver::db;
use whamserver::middleware::rate_limit::RateLimiter;
use whamserver::models::user::{Role, User};
use whamserver::relay::Relay;
use whamserver::routes;
use whamserver::sprite::codec::{AudioCodec, SpriteFormat};
use whamserver::sprite::layout::FRAME_BYTES;
use whamserver::sprite::{BuildError, SpriteBuilder};
use whamserver::state::AppState;
use whamserver::storage::local::LocalBlobStore;
use whamserver::storage::{self, BlobStore, StorageError};

pub const PUBLIC_URL: &str = "http://wham.test";

/// Raw PCM bytes for a clip of `ms` milliseconds (44.1 kHz, stereo, s16le).
pub fn pcm_clip(ms: u64, fill: u8) -> Vec<u8> {
    let frames = ms * 44_100 / 1000;
    vec![fill; (frames * FRAME_BYTES) as usize]
}

/// Codec that treats every input as canonical PCM already, so tests need no
/// ffmpeg. Decoding and encoding are plain copies.
pub struct PassthroughCodec;

#[async_trait]
impl AudioCodec for PassthroughCodec {
    async fn decode_pcm(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        tokio::fs::copy(input, output)
            .await
            .map(|_| ())
            .map_err(|e| BuildError::Encode(e.to_string()))
    }

    async fn encode(
        &self,
        pcm: &Path,
        output: &Path,
        _format: SpriteFormat,
    ) -> Result<(), BuildError> {
        tokio::fs::copy(pcm, output)
            .await
            .map(|_| ())
            .map_err(|e| BuildError::Encode(e.to_string()))
    }
}

/// Codec whose encode step always fails.
pub struct FailingEncodeCodec;

#[async_trait]
impl AudioCodec for FailingEncodeCodec {
    async fn decode_pcm(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        PassthroughCodec.decode_pcm(input, output).await
    }

    async fn encode(
        &self,
        _pcm: &Path,
        _output: &Path,
        format: SpriteFormat,
    ) -> Result<(), BuildError> {
        Err(BuildError::Encode(format!("{format} encoder exited with status 1")))
    }
}

/// Local blob store that refuses uploads of keys ending in `failing_ext`.
pub struct FailingUploadStore {
    pub inner: LocalBlobStore,
    pub failing_ext: &'static str,
}

#[async_trait]
impl BlobStore for FailingUploadStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if key.ends_with(&format!(".{}", self.failing_ext)) {
            return Err(StorageError::Unavailable(format!("{key}: 503 backend error")));
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn make_public(&self, key: &str) -> Result<(), StorageError> {
        self.inner.make_public(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }
}

/// A user created for testing, bundling the User record with its raw token.
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Knobs for a `TestServer`'s sprite pipeline and blob store.
pub struct ServerOptions {
    pub gap_ms: u64,
    pub formats: Vec<SpriteFormat>,
    pub codec: Arc<dyn AudioCodec>,
    /// Uploads of keys with this extension fail.
    pub failing_upload_ext: Option<&'static str>,
    pub source_prefixes: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            gap_ms: 1000,
            formats: vec![SpriteFormat::Mp3],
            codec: Arc::new(PassthroughCodec),
            failing_upload_ext: None,
            source_prefixes: Vec::new(),
        }
    }
}

/// Test server that owns an in-memory SQLite pool and full AppState.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
    pub storage_path: PathBuf,
    pub staging_path: PathBuf,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_options(ServerOptions::default()).await
    }

    pub async fn with_sprite_options(gap_ms: u64, formats: Vec<SpriteFormat>) -> Self {
        Self::with_options(ServerOptions {
            gap_ms,
            formats,
            ..Default::default()
        })
        .await
    }

    pub async fn with_options(options: ServerOptions) -> Self {
        let pool = db::create_pool("sqlite::memory:")
            .await
            .expect("failed to create test pool");

        let storage_path = storage::temp_storage_path();
        let staging_path = storage::temp_storage_path();
        let local = LocalBlobStore::new(&storage_path, PUBLIC_URL);
        local.ensure_dirs().await.expect("failed to create test storage");
        let blobs: Arc<dyn BlobStore> = match options.failing_upload_ext {
            Some(failing_ext) => Arc::new(FailingUploadStore {
                inner: local,
                failing_ext,
            }),
            None => Arc::new(local),
        };

        let sprite_config = SpriteConfig {
            staging_path: staging_path.clone(),
            gap_ms: options.gap_ms,
            formats: options.formats,
            encode_workers: 2,
            ffmpeg: "ffmpeg".to_string(),
            fetch_timeout_secs: 5,
            source_prefixes: options.source_prefixes,
        };
        let sprites = Arc::new(SpriteBuilder::new(
            sprite_config,
            options.codec,
            Arc::clone(&blobs),
        ));

        let state = AppState {
            db: pool,
            blobs,
            sprites,
            relay: Arc::new(Relay::new()),
            rate_limiter: Arc::new(RateLimiter::default()),
            storage_path: storage_path.clone(),
            test_mode: true,
        };

        Self {
            state,
            storage_path,
            staging_path,
        }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    /// Create a user with a bearer token. The first user of a server is an admin.
    pub async fn create_user_with_token(&self, username: &str) -> TestUser {
        let user = db::users::create_user(self.pool(), username, "not-a-real-hash")
            .await
            .expect("failed to create test user");
        let token = db::users::issue_token(self.pool(), &user.id)
            .await
            .expect("failed to issue test token");
        TestUser { user, token }
    }

    pub async fn create_admin_with_token(&self, username: &str) -> TestUser {
        let mut test_user = self.create_user_with_token(username).await;
        sqlx::query("UPDATE users SET role = 'admin' WHERE id = ?")
            .bind(&test_user.user.id)
            .execute(self.pool())
            .await
            .expect("failed to set admin role");
        test_user.user.role = Role::Admin;
        test_user
    }

    /// Create a user that is never an admin, even on an empty database.
    pub async fn create_member_with_token(&self, username: &str) -> TestUser {
        let mut test_user = self.create_user_with_token(username).await;
        sqlx::query("UPDATE users SET role = 'user' WHERE id = ?")
            .bind(&test_user.user.id)
            .execute(self.pool())
            .await
            .expect("failed to set user role");
        test_user.user.role = Role::User;
        test_user
    }

    /// Public objects currently in the local blob store.
    pub fn public_objects(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(LocalBlobStore::public_dir(&self.storage_path))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn read_public(&self, key: &str) -> Vec<u8> {
        std::fs::read(LocalBlobStore::public_dir(&self.storage_path).join(key))
            .expect("public object missing")
    }

    /// Entries left behind in the staging root.
    pub fn staging_entries(&self) -> usize {
        std::fs::read_dir(&self.staging_path)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.storage_path).ok();
        std::fs::remove_dir_all(&self.staging_path).ok();
    }
}

// ---------------------------------------------------------------------------
// Clip fixture server
// ---------------------------------------------------------------------------

/// Serves fixture clips at `/clips/{name}`. Unknown names return 404.
pub struct ClipServer {
    pub base_url: String,
}

impl ClipServer {
    pub async fn start(clips: Vec<(&str, &str, Vec<u8>)>) -> Self {
        let clips: Arc<HashMap<String, (String, Vec<u8>)>> = Arc::new(
            clips
                .into_iter()
                .map(|(name, ct, bytes)| (name.to_string(), (ct.to_string(), bytes)))
                .collect(),
        );

        let app = axum::Router::new().route(
            "/clips/{name}",
            get(move |UrlPath(name): UrlPath<String>| {
                let clips = Arc::clone(&clips);
                async move {
                    match clips.get(&name) {
                        Some((ct, bytes)) => {
                            ([(header::CONTENT_TYPE, ct.clone())], bytes.clone()).into_response()
                        }
                        None => StatusCode::NOT_FOUND.into_response(),
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://127.0.0.1:{}", addr.port()),
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/clips/{name}", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Request builder helpers
// ---------------------------------------------------------------------------

/// Build an authenticated request with no body.
pub fn authenticated_request(method: Method, uri: &str, auth_header: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth_header)
        .body(Body::empty())
        .unwrap()
}

/// Build an authenticated request with a JSON body.
pub fn authenticated_json_request(
    method: Method,
    uri: &str,
    auth_header: &str,
    body: &serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth_header)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Build an unauthenticated request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Build an authenticated multipart upload with a single `audio` file part.
pub fn multipart_upload(
    uri: &str,
    auth_header: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let boundary = "whamtestboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Authorization", auth_header)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Soundboard request body in the `{"data": {...}}` shape.
pub fn soundboard_body(title: &str, status: Option<&str>, audio: &[String]) -> serde_json::Value {
    let sounds: Vec<serde_json::Value> = audio
        .iter()
        .enumerate()
        .map(|(i, url)| serde_json::json!({ "audio": url, "uid": format!("s{i}"), "emojiId": "tada" }))
        .collect();
    let mut data = serde_json::json!({ "title": title, "sounds": sounds });
    if let Some(status) = status {
        data["status"] = serde_json::json!(status);
    }
    serde_json::json!({ "data": data })
}

/// Parse a response body into a `serde_json::Value`.
pub async fn parse_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn test_app() -> axum::Router {
    let server = TestServer::new().await;
    // Storage directories are removed with the server; the router only needs
    // them for /cdn, which these callers do not hit.
    routes::router(server.state.clone())
}
