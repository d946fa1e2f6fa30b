use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "My new soundboard";
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_SOUNDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundboardStatus {
    #[default]
    Drafted,
    Published,
    Archived,
}

impl SoundboardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundboardStatus::Drafted => "drafted",
            SoundboardStatus::Published => "published",
            SoundboardStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for SoundboardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundboardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drafted" => Ok(SoundboardStatus::Drafted),
            "published" => Ok(SoundboardStatus::Published),
            "archived" => Ok(SoundboardStatus::Archived),
            _ => Err("status is either: published, drafted, archived".to_string()),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_emoji_skin() -> String {
    "1".to_string()
}

/// One playable slot of a soundboard.
///
/// `times` is `[start_ms, end_ms]` within the sprite. It is written only by the
/// sprite builder; whatever a client sends there is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub times: Vec<u64>,
    pub audio: String,
    #[serde(default = "default_true")]
    pub use_emoji: bool,
    #[serde(default)]
    pub emoji_id: String,
    #[serde(default = "default_emoji_skin")]
    pub emoji_skin: String,
    #[serde(default)]
    pub emoji_native: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub custom: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Soundboard {
    pub id: String,
    pub title: String,
    pub status: SoundboardStatus,
    pub sounds: Vec<Sound>,
    pub sprite: String,
    #[serde(rename = "author")]
    pub author_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SoundboardInput {
    pub title: Option<String>,
    pub status: Option<String>,
    pub sounds: Option<Vec<Sound>>,
}

/// Request body wrapper: `{"data": {...}}`.
#[derive(Debug, Deserialize)]
pub struct SoundboardRequest {
    pub data: SoundboardInput,
}

/// Normalized fields ready to be written.
#[derive(Debug, Clone)]
pub struct SoundboardWrite {
    pub title: String,
    pub status: SoundboardStatus,
    pub sounds: Vec<Sound>,
    pub sprite: String,
}

pub fn normalize_title(title: Option<&str>) -> Result<Option<String>, String> {
    let Some(title) = title else {
        return Ok(None);
    };
    let title = title.trim();
    if title.is_empty() {
        return Err("title cannot be empty".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("title must be at most {MAX_TITLE_LEN} characters"));
    }
    Ok(Some(title.to_string()))
}

pub fn parse_status(status: Option<&str>) -> Result<Option<SoundboardStatus>, String> {
    status.map(SoundboardStatus::from_str).transpose()
}

/// Reject a sound list the pipeline cannot build. Returns the cleaned list with
/// client `times` dropped and titles trimmed.
pub fn validate_sounds(sounds: Vec<Sound>) -> Result<Vec<Sound>, String> {
    if sounds.is_empty() {
        return Err("a soundboard needs at least one sound".to_string());
    }
    if sounds.len() > MAX_SOUNDS {
        return Err(format!("a soundboard holds at most {MAX_SOUNDS} sounds"));
    }
    sounds
        .into_iter()
        .enumerate()
        .map(|(i, mut sound)| {
            if sound.audio.trim().is_empty() {
                return Err(format!("sounds[{i}] must have an audio file"));
            }
            sound.audio = sound.audio.trim().to_string();
            sound.title = sound
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
            sound.times.clear();
            Ok(sound)
        })
        .collect()
}

/// Copy sprite offsets onto sounds by position.
pub fn attach_offsets(sounds: &mut [Sound], offsets: &[[u64; 2]]) {
    for (sound, [start, end]) in sounds.iter_mut().zip(offsets.iter().copied()) {
        sound.times = vec![start, end];
    }
}

/// A published soundboard must be playable: a sprite and timed sounds.
pub fn check_publishable(
    status: SoundboardStatus,
    sprite: &str,
    sounds: &[Sound],
) -> Result<(), String> {
    if status != SoundboardStatus::Published {
        return Ok(());
    }
    if sprite.is_empty() {
        return Err("a published soundboard must have a sprite".to_string());
    }
    if let Some(i) = sounds.iter().position(|s| s.times.len() != 2) {
        return Err(format!("sounds[{i}] has no times"));
    }
    Ok(())
}
