pub mod gcs;
pub mod local;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

pub const MAX_CLIP_SIZE: usize = 10 * 1024 * 1024; // 10 MB

pub const ALLOWED_CLIP_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/wave",
    "audio/x-wav",
    "audio/ogg",
];

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    NotFound(String),
    Denied(String),
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "object not found: {msg}"),
            StorageError::Denied(msg) => write!(f, "permission denied: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "blob store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Durable object storage for uploaded clips and built sprites.
///
/// Objects are private after `put` until `make_public` resolves; the URL
/// returned by `put` only serves once the object is public.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn make_public(&self, key: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Validate an uploaded clip and return the file extension to store it under.
pub fn validate_clip(content_type: &str, size: usize) -> Result<&'static str, String> {
    if !ALLOWED_CLIP_TYPES.contains(&content_type) {
        return Err(format!(
            "unsupported audio type: {content_type}. allowed: mp3, wav, ogg"
        ));
    }
    if size == 0 {
        return Err("audio file is empty".to_string());
    }
    if size > MAX_CLIP_SIZE {
        return Err(format!(
            "audio exceeds maximum size of {} MB",
            MAX_CLIP_SIZE / (1024 * 1024)
        ));
    }
    Ok(mime_to_ext(content_type))
}

pub fn mime_to_ext(content_type: &str) -> &'static str {
    match content_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}

/// Key for a raw clip uploaded by `user_id`.
pub fn clip_key(user_id: &str, ext: &str) -> String {
    format!(
        "user-{user_id}-{}-{:06x}.{ext}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() & 0xFF_FFFF
    )
}

/// Key for a sprite built for `owner_id`, without extension.
pub fn sprite_key_stem(owner_id: &str) -> String {
    format!(
        "sprite-user-{owner_id}-{}-{:06x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() & 0xFF_FFFF
    )
}

/// Whether `key` names an object created on behalf of `user_id`.
pub fn key_belongs_to(key: &str, user_id: &str) -> bool {
    key.starts_with(&format!("user-{user_id}-"))
        || key.starts_with(&format!("sprite-user-{user_id}-"))
}

/// Whether `key` is a raw clip uploaded by `user_id`. Sprites do not count.
pub fn is_clip_of(key: &str, user_id: &str) -> bool {
    key.starts_with(&format!("user-{user_id}-"))
}

/// Extract the object key from a public URL (or a bare key).
pub fn key_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|k| !k.is_empty() && *k != "." && *k != "..")
}

/// Resolve a storage path to a unique temp directory for tests.
pub fn temp_storage_path() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("wham-test-{}", uuid::Uuid::new_v4()));
    path
}
