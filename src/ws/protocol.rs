//! WebSocket protocol message definitions
//! These are the wire types between participants and the authoritative host

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::snapshot::RaceState;

/// Intents sent by any participant to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Intent {
    /// Register with the race
    Join { id: String, name: String },

    /// Toggle lobby readiness
    Ready { id: String, ready: bool },

    /// Roll the dice in the current gear
    Roll { id: String },

    /// Stop rolling for this leg
    Hold { id: String },

    /// Change gear; `d` is -1 or 1
    Shift { id: String, d: i32 },

    /// Trade a roll of capacity for a clean car
    Repair { id: String },

    /// Start the race from the lobby, or skip the checkpoint countdown
    HostStart,
}

impl Intent {
    /// Participant the intent acts for, if any
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::Join { id, .. }
            | Self::Ready { id, .. }
            | Self::Roll { id }
            | Self::Hold { id }
            | Self::Shift { id, .. }
            | Self::Repair { id } => Some(id),
            Self::HostStart => None,
        }
    }
}

/// Messages sent from the host to participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full race state after a mutation
    Snapshot {
        /// Distinguishes races hosted in the same room
        #[serde(rename = "raceId")]
        race_id: Uuid,
        /// Increases with every snapshot of a race
        version: u64,
        state: RaceState,
    },

    /// Sent only to the connection whose message was rejected
    Error { code: String, message: String },
}
