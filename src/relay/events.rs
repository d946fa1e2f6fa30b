use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub const MAX_ROOM_ID_LEN: usize = 128;
pub const MAX_SOUND_UID_LEN: usize = 128;

/// Events a client may send over the relay connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Join(String),
    Leave(String),
    Sound(String),
    Emoji(EmojiData),
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiData {
    #[serde(rename = "emojiId")]
    pub emoji_id: String,
    #[serde(rename = "emojiNative", default)]
    pub emoji_native: String,
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, String> {
        let event: ClientEvent =
            serde_json::from_str(text).map_err(|e| format!("malformed event: {e}"))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            ClientEvent::Join(room) | ClientEvent::Leave(room) => {
                if room.is_empty() || room.len() > MAX_ROOM_ID_LEN {
                    return Err(format!(
                        "room id must be between 1 and {MAX_ROOM_ID_LEN} characters"
                    ));
                }
            }
            ClientEvent::Sound(uid) => {
                if uid.is_empty() || uid.len() > MAX_SOUND_UID_LEN {
                    return Err(format!(
                        "sound uid must be between 1 and {MAX_SOUND_UID_LEN} characters"
                    ));
                }
            }
            ClientEvent::Emoji(emoji) => {
                if emoji.emoji_id.is_empty() {
                    return Err("emojiId is required".to_string());
                }
            }
            ClientEvent::Heartbeat => {}
        }
        Ok(())
    }
}

/// A fan-out message on the relay's broadcast channel.
///
/// Recipients are resolved from room membership at publish time, so a session
/// sharing several rooms with the sender still gets one copy.
#[derive(Debug, Clone)]
pub struct RelayBroadcast {
    pub recipients: HashSet<String>,
    pub event: serde_json::Value,
}

pub fn sound_event(uid: &str) -> serde_json::Value {
    serde_json::json!({ "type": "sound", "data": uid })
}

pub fn emoji_event(emoji: &EmojiData) -> serde_json::Value {
    serde_json::json!({ "type": "emoji", "data": emoji })
}

pub fn error_event(message: &str) -> serde_json::Value {
    serde_json::json!({ "type": "error", "data": { "message": message } })
}
