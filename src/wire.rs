//! System channel messages and the codec used to put them on the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Error, PeerId, PlayerMap};

// --- System channel names ---
pub const CHANNEL_WELCOME: &str = "welcome";
pub const CHANNEL_PLAYER_INFO: &str = "playerInfo";
pub const CHANNEL_GAME_JOIN: &str = "gameJoin";

/// Channel names the room reserves for its own coordination traffic.
pub const SYSTEM_CHANNELS: [&str; 3] = [CHANNEL_WELCOME, CHANNEL_PLAYER_INFO, CHANNEL_GAME_JOIN];

pub fn is_system_channel(name: &str) -> bool {
    SYSTEM_CHANNELS.contains(&name)
}

/// Sent by the host to a peer that has just joined the transport room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub admin_id: PeerId,
    pub player_info: PlayerMap,
}

/// Sent to the host by a peer that is not yet in the roster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameJoin {
    #[serde(default)]
    pub chat_self_id: Option<String>,
    pub name: String,
}

/// Encoding shared by every peer of a room.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Plain JSON, readable by browser peers.
    #[default]
    Json,
    /// Compact binary encoding.
    Postcard,
}

impl WireFormat {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, Error> {
        let bytes = match self {
            WireFormat::Json => serde_json::to_vec(value)?,
            WireFormat::Postcard => postcard::to_stdvec(value)?,
        };
        Ok(Bytes::from(bytes))
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Error> {
        Ok(match self {
            WireFormat::Json => serde_json::from_slice(bytes)?,
            WireFormat::Postcard => postcard::from_bytes(bytes)?,
        })
    }
}
