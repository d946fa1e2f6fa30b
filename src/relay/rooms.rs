use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::events::RelayBroadcast;

/// Room membership plus the single broadcast channel all sessions read.
///
/// Membership changes only come from a session's own join/leave/disconnect.
/// Rooms exist while they have members.
pub struct Relay {
    rooms: DashMap<String, HashSet<String>>,
    tx: broadcast::Sender<RelayBroadcast>,
}

impl Relay {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            rooms: DashMap::new(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayBroadcast> {
        self.tx.subscribe()
    }

    /// Returns `false` when the session was already in the room.
    pub fn join(&self, session_id: &str, room_id: &str) -> bool {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(session_id.to_string())
    }

    pub fn leave(&self, session_id: &str, room_id: &str) {
        let emptied = match self.rooms.get_mut(room_id) {
            Some(mut members) => {
                members.remove(session_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }
    }

    pub fn leave_all<'a>(&self, session_id: &str, rooms: impl IntoIterator<Item = &'a String>) {
        for room_id in rooms {
            self.leave(session_id, room_id);
        }
    }

    pub fn members(&self, room_id: &str) -> HashSet<String> {
        self.rooms
            .get(room_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Everyone sharing at least one of `rooms` with the sender, minus the sender.
    pub fn recipients<'a>(
        &self,
        sender: &str,
        rooms: impl IntoIterator<Item = &'a String>,
    ) -> HashSet<String> {
        let mut recipients = HashSet::new();
        for room_id in rooms {
            if let Some(members) = self.rooms.get(room_id.as_str()) {
                recipients.extend(members.iter().filter(|m| *m != sender).cloned());
            }
        }
        recipients
    }

    /// Queue `event` for every other member of the sender's rooms.
    /// Returns how many sessions it was addressed to.
    pub fn publish<'a>(
        &self,
        sender: &str,
        rooms: impl IntoIterator<Item = &'a String>,
        event: serde_json::Value,
    ) -> usize {
        let recipients = self.recipients(sender, rooms);
        let count = recipients.len();
        if count > 0 {
            let _ = self.tx.send(RelayBroadcast { recipients, event });
        }
        count
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
