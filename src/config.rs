use std::path::PathBuf;

use crate::sprite::codec::SpriteFormat;

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local,
    Gcs,
}

#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub bucket: String,
    pub access_token: String,
}

/// Knobs for the sprite build pipeline.
#[derive(Debug, Clone)]
pub struct SpriteConfig {
    pub staging_path: PathBuf,
    /// Silence inserted between consecutive clips.
    pub gap_ms: u64,
    /// Output encodings; the first one is the soundboard's sprite.
    pub formats: Vec<SpriteFormat>,
    pub encode_workers: usize,
    pub ffmpeg: String,
    pub fetch_timeout_secs: u64,
    /// URL prefixes a sprite source must start with. Empty accepts any
    /// http(s) URL.
    pub source_prefixes: Vec<String>,
}

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub test_mode: bool,
    pub storage_backend: StorageBackend,
    pub storage_path: PathBuf,
    pub public_url: String,
    pub gcs: Option<GcsConfig>,
    pub sprite: SpriteConfig,
}

pub const DEFAULT_BUCKET: &str = "wham-uploads";
pub const DEFAULT_GAP_MS: u64 = 1000;

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4020);

        let storage_backend = match std::env::var("WHAM_STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let gcs = if storage_backend == StorageBackend::Gcs {
            let access_token = std::env::var("GCS_ACCESS_TOKEN")
                .expect("GCS_ACCESS_TOKEN is required when WHAM_STORAGE_BACKEND=gcs");
            let bucket =
                std::env::var("WHAM_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());
            Some(GcsConfig {
                bucket,
                access_token,
            })
        } else {
            None
        };

        let public_url = std::env::var("WHAM_PUBLIC_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        // By default only clips already in our own blob store can be fetched.
        let source_prefixes = match std::env::var("WHAM_SOURCE_PREFIXES") {
            Ok(v) if v.trim() == "*" => Vec::new(),
            Ok(v) => v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => match &gcs {
                Some(gcs) => vec![format!("https://storage.googleapis.com/{}/", gcs.bucket)],
                None => vec![format!("{public_url}/cdn/")],
            },
        };

        let formats = std::env::var("WHAM_SPRITE_FORMATS")
            .ok()
            .map(|v| parse_formats(&v))
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| vec![SpriteFormat::Mp3]);

        let sprite = SpriteConfig {
            staging_path: std::env::var("WHAM_STAGING_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./tmp")),
            gap_ms: std::env::var("WHAM_SPRITE_GAP_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_GAP_MS),
            formats,
            encode_workers: std::env::var("WHAM_ENCODE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            ffmpeg: std::env::var("WHAM_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string()),
            fetch_timeout_secs: std::env::var("WHAM_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            source_prefixes,
        };

        Self {
            port,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:wham.db?mode=rwc".to_string()),
            test_mode: std::env::var("WHAM_TEST_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            storage_backend,
            storage_path: std::env::var("WHAM_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./cdn")),
            public_url,
            gcs,
            sprite,
        }
    }
}

/// Parse a comma separated format list, skipping unknown entries.
fn parse_formats(value: &str) -> Vec<SpriteFormat> {
    let mut formats = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<SpriteFormat>() {
            Ok(f) if !formats.contains(&f) => formats.push(f),
            Ok(_) => {}
            Err(_) => tracing::warn!("ignoring unknown sprite format {part:?}"),
        }
    }
    formats
}
