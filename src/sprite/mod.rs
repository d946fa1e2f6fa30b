//! Soundboard sprite build pipeline.
//!
//! A build runs fetch → concatenate/encode → publish for one owner. Builds for
//! the same owner queue behind each other so they never share a staging
//! directory; builds for different owners run in parallel. Every codec process
//! (decode or encode) holds a slot of one shared semaphore, so the number of
//! running ffmpeg children never exceeds the configured worker count.

pub mod codec;
pub mod fetch;
pub mod job;
pub mod layout;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::future::try_join_all;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::SpriteConfig;
use crate::storage::{self, BlobStore};
use codec::{AudioCodec, SpriteFormat};
use job::{SourceSound, SpriteAsset, SpriteJob, SpriteOutput, StagingDir};
use layout::{SpriteLayout, FRAME_BYTES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A source is unreachable, not audio, or too large.
    Fetch(String),
    /// Decoding, concatenation or encoding failed.
    Encode(String),
    /// The blob store rejected or could not take the sprite.
    Upload(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Fetch(msg) => write!(f, "fetch failed: {msg}"),
            BuildError::Encode(msg) => write!(f, "encode failed: {msg}"),
            BuildError::Upload(msg) => write!(f, "upload failed: {msg}"),
        }
    }
}

impl std::error::Error for BuildError {}

pub struct SpriteBuilder {
    client: reqwest::Client,
    codec: Arc<dyn AudioCodec>,
    blobs: Arc<dyn BlobStore>,
    config: SpriteConfig,
    encode_slots: Semaphore,
    owner_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SpriteBuilder {
    pub fn new(
        config: SpriteConfig,
        codec: Arc<dyn AudioCodec>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            codec,
            blobs,
            encode_slots: Semaphore::new(config.encode_workers.max(1)),
            config,
            owner_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SpriteConfig {
        &self.config
    }

    /// Build and publish a sprite for `sources` on behalf of `owner_id`.
    ///
    /// The build runs on its own task: if the caller goes away mid-build the
    /// work still completes or fails and staging is still removed.
    pub async fn build(
        self: &Arc<Self>,
        sources: Vec<SourceSound>,
        owner_id: &str,
    ) -> Result<SpriteOutput, BuildError> {
        let builder = Arc::clone(self);
        let owner_id = owner_id.to_string();
        tokio::spawn(async move { builder.run(sources, owner_id).await })
            .await
            .map_err(|e| BuildError::Encode(format!("sprite build task failed: {e}")))?
    }

    async fn run(&self, sources: Vec<SourceSound>, owner_id: String) -> Result<SpriteOutput, BuildError> {
        let lock = self
            .owner_locks
            .entry(owner_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.run_exclusive(sources, &owner_id).await
        };

        drop(lock);
        self.owner_locks
            .remove_if(&owner_id, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn run_exclusive(
        &self,
        sources: Vec<SourceSound>,
        owner_id: &str,
    ) -> Result<SpriteOutput, BuildError> {
        let staging = StagingDir::create(&self.config.staging_path, owner_id).await?;
        let job = SpriteJob {
            owner_id: owner_id.to_string(),
            sources,
            formats: self.config.formats.clone(),
            staging,
        };

        let started = Instant::now();
        let result = self.execute(&job).await;
        let count = job.sources.len();
        job.finish().await;

        match &result {
            Ok(output) => tracing::info!(
                "built sprite for {owner_id}: {count} sound(s) in {:?} -> {}",
                started.elapsed(),
                output.sprite_url()
            ),
            Err(e) => tracing::warn!("sprite build for {owner_id} failed: {e}"),
        }
        result
    }

    async fn execute(&self, job: &SpriteJob) -> Result<SpriteOutput, BuildError> {
        if job.sources.is_empty() {
            return Err(BuildError::Encode("no sounds to build".to_string()));
        }
        let staged = fetch::fetch_all(&self.client, job).await?;
        let (offsets, outputs) = self.concatenate(job, &staged).await?;
        let assets = self.publish(outputs).await?;
        Ok(SpriteOutput { assets, offsets })
    }

    async fn concatenate(
        &self,
        job: &SpriteJob,
        staged: &[PathBuf],
    ) -> Result<(Vec<[u64; 2]>, Vec<(SpriteFormat, PathBuf)>), BuildError> {
        let decodes = staged.iter().enumerate().map(|(index, input)| {
            let pcm = job.pcm_path(index);
            async move {
                {
                    let _permit = self.encode_slot().await?;
                    self.codec.decode_pcm(input, &pcm).await?;
                }
                let len = tokio::fs::metadata(&pcm)
                    .await
                    .map_err(|e| BuildError::Encode(format!("sound {index} did not decode: {e}")))?
                    .len();
                Ok::<_, BuildError>((pcm, layout::frames_in(len)))
            }
        });
        let clips = try_join_all(decodes).await?;

        let frames: Vec<u64> = clips.iter().map(|(_, frames)| *frames).collect();
        let layout = SpriteLayout::plan(&frames, self.config.gap_ms).map_err(|index| {
            BuildError::Encode(format!("sound {index} is too short to place in a sprite"))
        })?;

        let merged = job.merged_pcm_path();
        write_merged(&merged, &clips, &layout).await?;

        let stem = storage::sprite_key_stem(&job.owner_id);
        let mut outputs = Vec::with_capacity(job.formats.len());
        for &format in &job.formats {
            let output = job.output_path(&stem, format);
            let _permit = self.encode_slot().await?;
            self.codec.encode(&merged, &output, format).await?;
            outputs.push((format, output));
        }

        Ok((layout.offsets(), outputs))
    }

    /// One slot of the codec worker pool. Every decode or encode holds one.
    async fn encode_slot(&self) -> Result<SemaphorePermit<'_>, BuildError> {
        self.encode_slots
            .acquire()
            .await
            .map_err(|_| BuildError::Encode("encoder pool closed".to_string()))
    }

    async fn publish(
        &self,
        outputs: Vec<(SpriteFormat, PathBuf)>,
    ) -> Result<Vec<SpriteAsset>, BuildError> {
        let mut assets = Vec::with_capacity(outputs.len());
        for (format, path) in outputs {
            match self.upload(format, &path).await {
                Ok(asset) => assets.push(asset),
                Err(e) => {
                    self.discard(&assets).await;
                    return Err(e);
                }
            }
        }
        Ok(assets)
    }

    async fn upload(&self, format: SpriteFormat, path: &Path) -> Result<SpriteAsset, BuildError> {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BuildError::Encode(format!("bad sprite path {path:?}")))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BuildError::Encode(format!("encoded sprite missing: {e}")))?;

        let url = self
            .blobs
            .put(&key, bytes, format.content_type())
            .await
            .map_err(|e| BuildError::Upload(e.to_string()))?;

        if let Err(e) = self.blobs.make_public(&key).await {
            if let Err(del) = self.blobs.delete(&key).await {
                tracing::warn!("failed to remove unpublished sprite {key}: {del}");
            }
            return Err(BuildError::Upload(e.to_string()));
        }

        Ok(SpriteAsset { format, key, url })
    }

    /// Best-effort removal of uploaded sprite assets.
    pub async fn discard(&self, assets: &[SpriteAsset]) {
        for asset in assets {
            if let Err(e) = self.blobs.delete(&asset.key).await {
                tracing::warn!("failed to discard sprite asset {}: {e}", asset.key);
            }
        }
    }
}

/// Write every clip back-to-back into `dest`, with silence between clips.
async fn write_merged(
    dest: &Path,
    clips: &[(PathBuf, u64)],
    layout: &SpriteLayout,
) -> Result<(), BuildError> {
    let io_err = |e: std::io::Error| BuildError::Encode(format!("failed to write sprite pcm: {e}"));

    let mut out = BufWriter::new(File::create(dest).await.map_err(io_err)?);
    let silence = vec![0u8; layout.gap_bytes() as usize];

    for (index, (pcm, frames)) in clips.iter().enumerate() {
        if index > 0 {
            out.write_all(&silence).await.map_err(io_err)?;
        }
        let mut clip = File::open(pcm).await.map_err(io_err)?.take(frames * FRAME_BYTES);
        tokio::io::copy(&mut clip, &mut out).await.map_err(io_err)?;
    }

    out.flush().await.map_err(io_err)?;
    Ok(())
}
