use std::path::{Path, PathBuf};

use futures_util::future::try_join_all;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::job::{SourceSound, SpriteJob};
use super::BuildError;

/// Largest source clip the pipeline will download.
pub const MAX_SOURCE_SIZE: u64 = 20 * 1024 * 1024;

/// Download every source of `job` into its staging directory concurrently.
///
/// Returns staged paths in request order. The first failure aborts the
/// remaining downloads; the staging directory is purged by the caller.
pub async fn fetch_all(
    client: &reqwest::Client,
    job: &SpriteJob,
) -> Result<Vec<PathBuf>, BuildError> {
    let downloads = job
        .sources
        .iter()
        .enumerate()
        .map(|(index, source)| fetch_one(client, index, source, job.staged_path(index)));
    try_join_all(downloads).await
}

async fn fetch_one(
    client: &reqwest::Client,
    index: usize,
    source: &SourceSound,
    dest: PathBuf,
) -> Result<PathBuf, BuildError> {
    let resp = client
        .get(&source.url)
        .send()
        .await
        .map_err(|e| BuildError::Fetch(format!("sound {index} is unreachable: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(BuildError::Fetch(format!(
            "sound {index} could not be downloaded ({status})"
        )));
    }

    if let Some(content_type) = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        if !is_audio_content_type(content_type) {
            return Err(BuildError::Fetch(format!(
                "sound {index} is not audio ({content_type})"
            )));
        }
    }

    if resp.content_length().is_some_and(|len| len > MAX_SOURCE_SIZE) {
        return Err(BuildError::Fetch(format!("sound {index} is too large")));
    }

    let written = stream_capped(resp, &dest, index, MAX_SOURCE_SIZE).await?;
    tracing::debug!("staged sound {index} ({written} bytes) at {:?}", dest);
    Ok(dest)
}

/// Stream a response body into `dest`, failing as soon as it passes `limit`.
async fn stream_capped(
    mut resp: reqwest::Response,
    dest: &Path,
    index: usize,
    limit: u64,
) -> Result<u64, BuildError> {
    let stage_err =
        |e: std::io::Error| BuildError::Encode(format!("failed to stage {}: {e}", dest.display()));

    let mut file = File::create(dest).await.map_err(stage_err)?;
    let mut written: u64 = 0;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| BuildError::Fetch(format!("sound {index} download failed: {e}")))?
    {
        written += chunk.len() as u64;
        if written > limit {
            return Err(BuildError::Fetch(format!("sound {index} is too large")));
        }
        file.write_all(&chunk).await.map_err(stage_err)?;
    }
    file.flush().await.map_err(stage_err)?;

    if written == 0 {
        return Err(BuildError::Fetch(format!("sound {index} is empty")));
    }
    Ok(written)
}

fn is_audio_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("audio/") || mime == "application/octet-stream"
}
