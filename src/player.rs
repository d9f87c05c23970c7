use std::{
    collections::HashMap,
    fmt::Display,
    ops::{Deref, DerefMut},
};

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Who drives a player: a person on some peer, or a bot run by the host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerControl {
    #[default]
    Local,
    Bot,
}

/// Declared identity of a player in the room roster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PeerId,
    pub name: String,
    pub control: PlayerControl,
}

impl Display for PlayerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.control {
            PlayerControl::Local => write!(f, "{}", self.name),
            PlayerControl::Bot => write!(f, "{} (bot)", self.name),
        }
    }
}

impl PlayerInfo {
    pub fn new(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            control: PlayerControl::Local,
        }
    }

    pub fn bot(id: PeerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            control: PlayerControl::Bot,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.control == PlayerControl::Bot
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct PlayerMap(HashMap<PeerId, PlayerInfo>);

impl Deref for PlayerMap {
    type Target = HashMap<PeerId, PlayerInfo>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PlayerMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<PlayerInfo> for PlayerMap {
    fn from_iter<I: IntoIterator<Item = PlayerInfo>>(iter: I) -> Self {
        Self(iter.into_iter().map(|info| (info.id.clone(), info)).collect())
    }
}

impl Display for PlayerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut players: Vec<_> = self.0.iter().collect();
        players.sort_by(|a, b| a.0.cmp(b.0));
        for (id, player) in players {
            let id: String = id.as_str().chars().take(10).collect();
            writeln!(f, "[{}...]: '{}'", id, player)?;
        }
        Ok(())
    }
}
