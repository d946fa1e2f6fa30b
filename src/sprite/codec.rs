use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::process::Command;

use super::layout::{CHANNELS, SAMPLE_RATE};
use super::BuildError;

/// Encodings a sprite can be exported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteFormat {
    Mp3,
    Ogg,
    M4a,
    Wav,
}

impl SpriteFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            SpriteFormat::Mp3 => "mp3",
            SpriteFormat::Ogg => "ogg",
            SpriteFormat::M4a => "m4a",
            SpriteFormat::Wav => "wav",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            SpriteFormat::Mp3 => "audio/mpeg",
            SpriteFormat::Ogg => "audio/ogg",
            SpriteFormat::M4a => "audio/mp4",
            SpriteFormat::Wav => "audio/wav",
        }
    }

    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            SpriteFormat::Mp3 => &["-c:a", "libmp3lame", "-b:a", "128k"],
            SpriteFormat::Ogg => &["-c:a", "libvorbis", "-q:a", "4"],
            SpriteFormat::M4a => &["-c:a", "aac", "-b:a", "128k"],
            SpriteFormat::Wav => &["-c:a", "pcm_s16le"],
        }
    }
}

impl fmt::Display for SpriteFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}

impl FromStr for SpriteFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(SpriteFormat::Mp3),
            "ogg" => Ok(SpriteFormat::Ogg),
            "m4a" | "aac" => Ok(SpriteFormat::M4a),
            "wav" => Ok(SpriteFormat::Wav),
            other => Err(format!("unknown sprite format: {other}")),
        }
    }
}

/// Converts between source clips, canonical PCM and export encodings.
///
/// Canonical PCM is raw signed 16-bit little endian at 44.1 kHz, stereo
/// (see [`super::layout`]).
#[async_trait]
pub trait AudioCodec: Send + Sync {
    async fn decode_pcm(&self, input: &Path, output: &Path) -> Result<(), BuildError>;

    async fn encode(
        &self,
        pcm: &Path,
        output: &Path,
        format: SpriteFormat,
    ) -> Result<(), BuildError>;
}

/// Codec backed by an external `ffmpeg` binary.
pub struct FfmpegCodec {
    binary: String,
}

impl FfmpegCodec {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<(), BuildError> {
        tracing::debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| BuildError::Encode(format!("failed to run {}: {e}", self.binary)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BuildError::Encode(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )))
        }
    }
}

fn pcm_shape() -> Vec<String> {
    vec![
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-ac".into(),
        CHANNELS.to_string(),
    ]
}

pub fn decode_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-y".into()];
    args.push("-i".into());
    args.push(input.display().to_string());
    args.push("-acodec".into());
    args.push("pcm_s16le".into());
    args.extend(pcm_shape());
    args.push(output.display().to_string());
    args
}

pub fn encode_args(pcm: &Path, output: &Path, format: SpriteFormat) -> Vec<String> {
    let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-y".into()];
    args.extend(pcm_shape());
    args.push("-i".into());
    args.push(pcm.display().to_string());
    args.extend(format.codec_args().iter().map(|s| s.to_string()));
    args.push(output.display().to_string());
    args
}

#[async_trait]
impl AudioCodec for FfmpegCodec {
    async fn decode_pcm(&self, input: &Path, output: &Path) -> Result<(), BuildError> {
        self.run(decode_args(input, output)).await
    }

    async fn encode(
        &self,
        pcm: &Path,
        output: &Path,
        format: SpriteFormat,
    ) -> Result<(), BuildError> {
        self.run(encode_args(pcm, output, format)).await
    }
}
