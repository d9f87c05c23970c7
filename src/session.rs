//! Session parameters handed to a game page by whoever launched it.

use anyhow::Result;
use url::{Url, form_urlencoded};

use crate::{PeerId, WireFormat};

pub const DEFAULT_APP_ID: &str = "p2p-game-room";
pub const DEFAULT_SELF_NAME: &str = "N00B";

// --- Query parameter keys ---
const PARAM_ROOM_ID: &str = "gameRoomId";
const PARAM_HOST_ID: &str = "hostSelfId";
const PARAM_CHAT_ID: &str = "chatSelfId";
const PARAM_NAME: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Namespace shared by every peer of this application.
    pub app_id: String,
    /// Room to join. Without one the room stays offline.
    pub room_id: Option<String>,
    /// Designated host. Without one the local peer hosts.
    pub host_id: Option<PeerId>,
    /// Identity of this peer in the launching chat, forwarded to the host.
    pub chat_self_id: Option<String>,
    /// Name used for the local placeholder and the join request.
    pub self_name: String,
    pub wire_format: WireFormat,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            room_id: None,
            host_id: None,
            chat_self_id: None,
            self_name: DEFAULT_SELF_NAME.to_string(),
            wire_format: WireFormat::default(),
        }
    }
}

impl Session {
    /// Read session parameters from a query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut session = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                PARAM_ROOM_ID => session.room_id = Some(value.into_owned()),
                PARAM_HOST_ID => session.host_id = Some(PeerId::new(value.into_owned())),
                PARAM_CHAT_ID => session.chat_self_id = Some(value.into_owned()),
                PARAM_NAME => session.self_name = value.into_owned(),
                _ => {}
            }
        }
        session
    }

    /// Read session parameters from the query part of a full URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        Ok(Self::from_query(url.query().unwrap_or_default()))
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_host(mut self, host_id: PeerId) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn with_chat_self_id(mut self, chat_self_id: impl Into<String>) -> Self {
        self.chat_self_id = Some(chat_self_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.self_name = name.into();
        self
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }
}
