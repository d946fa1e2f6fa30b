use std::path::{Path, PathBuf};

use super::codec::SpriteFormat;
use super::BuildError;

/// Extensions accepted as sprite sources.
pub const SOURCE_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "flac", "webm"];

/// One clip to be placed in a sprite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSound {
    pub url: String,
    pub ext: String,
}

impl SourceSound {
    /// Build a source from a clip URL, taking the extension from its path.
    pub fn parse(url: &str) -> Result<Self, String> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| format!("invalid audio url: {url:?}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("audio url must be http(s): {url:?}"));
        }
        let ext = parsed
            .path_segments()
            .and_then(|s| s.last())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| format!("audio url has no supported extension: {url:?}"))?;
        Ok(Self {
            url: parsed.to_string(),
            ext,
        })
    }

    /// Whether the source lives under one of `prefixes`. An empty list
    /// accepts everything. The stored URL is already normalized, so dot
    /// segments cannot climb out of a prefix.
    pub fn is_under(&self, prefixes: &[String]) -> bool {
        prefixes.is_empty() || prefixes.iter().any(|p| self.url.starts_with(p.as_str()))
    }

    /// File name a source is staged under. Zero padding keeps lexical order
    /// equal to request order.
    pub fn staged_name(&self, index: usize) -> String {
        format!("{index:04}.{}", self.ext)
    }
}

/// A per-owner working directory that is removed when the job ends.
///
/// `cleanup` removes it asynchronously; `Drop` is the fallback for panics and
/// early returns.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    removed: bool,
}

impl StagingDir {
    pub async fn create(root: &Path, key: &str) -> Result<Self, BuildError> {
        let path = root.join(staging_key(key));
        // A crashed run may have left files behind.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&path).await.map_err(|e| {
                BuildError::Encode(format!("failed to reset staging directory: {e}"))
            })?;
        }
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| BuildError::Encode(format!("failed to create staging directory: {e}")))?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cleanup(mut self) {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove staging {:?}: {e}", self.path),
        }
        self.removed = true;
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

fn staging_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Working state of one sprite build.
#[derive(Debug)]
pub struct SpriteJob {
    pub owner_id: String,
    pub sources: Vec<SourceSound>,
    pub formats: Vec<SpriteFormat>,
    pub staging: StagingDir,
}

impl SpriteJob {
    pub fn staged_path(&self, index: usize) -> PathBuf {
        self.staging.path().join(self.sources[index].staged_name(index))
    }

    pub fn pcm_path(&self, index: usize) -> PathBuf {
        self.staging.path().join(format!("{index:04}.pcm"))
    }

    pub fn merged_pcm_path(&self) -> PathBuf {
        self.staging.path().join("sprite.pcm")
    }

    pub fn output_path(&self, stem: &str, format: SpriteFormat) -> PathBuf {
        self.staging.path().join(format!("{stem}.{}", format.ext()))
    }

    pub async fn finish(self) {
        self.staging.cleanup().await;
    }
}

/// Uploaded result of one export format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteAsset {
    pub format: SpriteFormat,
    pub key: String,
    pub url: String,
}

/// What a successful build hands back to the soundboard write.
#[derive(Debug, Clone)]
pub struct SpriteOutput {
    pub assets: Vec<SpriteAsset>,
    /// `[start_ms, end_ms]` per source, in request order.
    pub offsets: Vec<[u64; 2]>,
}

impl SpriteOutput {
    /// URL of the primary export.
    pub fn sprite_url(&self) -> &str {
        self.assets.first().map(|a| a.url.as_str()).unwrap_or("")
    }
}
